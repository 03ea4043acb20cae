mod cli;
mod config_loader;

use clap::Parser;
use chainsync_node::SyncNode;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Parse CLI
    let args = cli::Cli::parse();

    // 2. Load Config
    let config = config_loader::load_node_config(&args.config, args.data_dir)?;

    // 3. Setup Logging
    let _log_guard = config.logging.init()?;
    info!("Loaded config from {:?}", args.config);

    // 4. Initialize Node
    let (start_index, end_index) = (config.start_index, config.end_index);
    let node = SyncNode::new(config)?;

    // 5. Run
    match args.command {
        Some(cli::Commands::Counters) => {
            for (name, value) in node.counter_values().await? {
                println!("{}: {}", name, value);
            }
        }
        Some(cli::Commands::Sync { start_index: start, end_index: end }) => {
            node.run(start.unwrap_or(start_index), end.unwrap_or(end_index)).await?;
        }
        None => node.run(start_index, end_index).await?,
    }

    Ok(())
}
