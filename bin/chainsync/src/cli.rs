use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "chainsync")]
#[command(about = "Stateful blockchain syncer", long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
    pub config: PathBuf,

    /// Path to the data directory
    #[arg(short, long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sync blocks into local storage (default)
    Sync {
        /// First index to sync; -1 resumes after the stored head
        #[arg(long, allow_hyphen_values = true)]
        start_index: Option<i64>,

        /// Last index to sync; -1 syncs until an end condition
        #[arg(long, allow_hyphen_values = true)]
        end_index: Option<i64>,
    },
    /// Print the stored sync counters
    Counters,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sync_range() {
        let cli = Cli::try_parse_from(["chainsync", "sync", "--start-index", "-1", "--end-index", "100"]).unwrap();
        match cli.command {
            Some(Commands::Sync { start_index, end_index }) => {
                assert_eq!(start_index, Some(-1));
                assert_eq!(end_index, Some(100));
            }
            other => panic!("unexpected command: {:?}", other),
        }
        assert_eq!(cli.config, PathBuf::from("config.toml"));
    }

    #[test]
    fn test_parse_counters_with_data_dir() {
        let cli = Cli::try_parse_from(["chainsync", "-d", "/tmp/sync", "counters"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Counters)));
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/sync")));
    }
}
