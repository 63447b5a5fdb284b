use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use tokio::fs;
use crate::backup::{BackupConfig, BackuperOptions};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PruningConfig {
    pub enabled: bool,
    /// Zero or negative keeps no backup at all.
    pub keep_files: i64,
}

impl Default for PruningConfig {
    fn default() -> Self {
        PruningConfig {
            enabled: false,
            keep_files: 5,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BackuperConfig {
    pub dir: String,
    /// Minutes between backups, in `[1, 1440)`.
    pub frequency: i64,
    pub enable_vacuum: bool,
    pub enable_compression: bool,
    #[serde(default)]
    pub pruning: PruningConfig,
}

impl Default for BackuperConfig {
    fn default() -> Self {
        BackuperConfig {
            dir: "backups".to_string(),
            frequency: 240,
            enable_vacuum: true,
            enable_compression: true,
            pruning: PruningConfig::default(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub backuper: BackuperConfig,
}

impl Config {
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Config, Box<dyn std::error::Error>> {
        let config_str = fs::read_to_string(path).await?;
        let config: Config = toml::from_str(&config_str)?;
        Ok(config)
    }

    /// Writes the config as TOML, creating the parent directory when needed.
    pub async fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, toml::to_string(self)?).await?;
        Ok(())
    }

    pub fn backup_config(&self) -> BackupConfig {
        let pruning = &self.backuper.pruning;
        BackupConfig::default()
            .with_vacuum(self.backuper.enable_vacuum)
            .with_compression(self.backuper.enable_compression)
            .with_pruning(pruning.enabled, usize::try_from(pruning.keep_files).unwrap_or(0))
    }

    pub fn backuper_options<P: AsRef<Path>>(&self, source_path: P) -> BackuperOptions {
        BackuperOptions {
            source_path: source_path.as_ref().to_path_buf(),
            backup_dir: PathBuf::from(&self.backuper.dir),
            config: self.backup_config(),
        }
    }
}
