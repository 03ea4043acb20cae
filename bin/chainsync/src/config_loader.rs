use anyhow::Result;
use chainsync_common::utils::config::load_config;
use chainsync_node::NodeConfig;
use std::path::{Path, PathBuf};

pub fn load_node_config<P: AsRef<Path>>(path: P, data_dir_override: Option<PathBuf>) -> Result<NodeConfig> {
    let mut config: NodeConfig = load_config(path)?;

    if let Some(dd) = data_dir_override {
        config.data_dir = dd.to_string_lossy().to_string();
    }

    Ok(config)
}
