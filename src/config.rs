use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::Context;
use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::rename::DEFAULT_RENAME_FORMAT;

pub const API_KEY_ENV: &str = "TVDB_API_KEY";

#[derive(Debug, Parser)]
#[command(about = "Renames TV show episodes using TheTVDB metadata")]
pub struct Args {
    /// Full path of the TV show directory to scan
    pub directory: PathBuf,
    /// Plan and log renames without touching the filesystem
    #[arg(short, long)]
    pub dry_run: bool,
    /// Rename using parsed tags only, skip episode titles
    #[arg(short, long)]
    pub tags_only: bool,
    /// Skip the remote catalog entirely
    #[arg(long)]
    pub offline: bool,
    /// Override the rename template
    #[arg(short, long)]
    pub format: Option<String>,
    /// Override log level
    #[arg(short, long)]
    pub log_level: Option<tracing::Level>,
    /// Provide custom config location
    #[arg(short, long)]
    pub config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TomlConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<String>,
    rename_format: String,
    video_extensions: Vec<String>,
    history_path: PathBuf,
    dry_run_history_path: PathBuf,
}

impl Default for TomlConfig {
    fn default() -> Self {
        let storage = AppResources::data_storage();
        Self {
            api_key: None,
            rename_format: DEFAULT_RENAME_FORMAT.to_string(),
            video_extensions: crate::library::SUPPORTED_FILES
                .iter()
                .map(|e| e.to_string())
                .collect(),
            history_path: storage.join("history.csv"),
            dry_run_history_path: storage.join("test_runs.csv"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfigFile(pub PathBuf);

impl ConfigFile {
    /// Opens the config, creating it with defaults when missing
    pub fn open(config_path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = config_path.as_ref().to_path_buf();
        match fs::OpenOptions::new()
            .read(true)
            .open(&path)
            .map_err(|e| e.kind())
        {
            Err(ErrorKind::NotFound) => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                let default_config = TomlConfig::default();
                fs::write(&path, toml::to_string_pretty(&default_config)?)?;
                tracing::info!(
                    "Created configuration file with defaults: {}",
                    path.display()
                );
                Ok(ConfigFile(path))
            }
            Err(e) => Err(anyhow::anyhow!(
                "Unknown fs error occured while opening config: {e}"
            )),
            Ok(_) => Ok(ConfigFile(path)),
        }
    }

    /// Reads contents of config and resets it to defaults in case of parse error
    fn read(&self) -> anyhow::Result<TomlConfig> {
        let buf = fs::read_to_string(&self.0)?;
        Ok(toml::from_str(&buf).unwrap_or_else(|e| {
            tracing::error!("Failed to read config: {}", e);
            tracing::info!("Resetting broken config to defaults");
            let default_config = TomlConfig::default();
            if let Ok(raw) = toml::to_string_pretty(&default_config) {
                let _ = fs::write(&self.0, raw);
            }
            default_config
        }))
    }
}

/// Paths derived from the platform data directory.
#[derive(Debug, Clone)]
pub struct AppResources {
    pub config_path: PathBuf,
    pub cache_path: PathBuf,
    pub token_path: PathBuf,
}

impl AppResources {
    const APP_NAME: &'static str = "tv-renamer";

    fn prod_storage() -> PathBuf {
        dirs::data_dir()
            .expect("target to have data directory")
            .join(Self::APP_NAME)
    }

    fn debug_storage() -> PathBuf {
        PathBuf::from(".")
    }

    pub fn data_storage() -> PathBuf {
        let is_prod = !cfg!(debug_assertions);
        if is_prod {
            Self::prod_storage()
        } else {
            Self::debug_storage()
        }
    }

    pub fn default_config_path() -> PathBuf {
        Self::data_storage().join("configuration.toml")
    }

    pub fn initiate(&self) -> anyhow::Result<()> {
        fs::create_dir_all(&self.cache_path)?;
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

impl Default for AppResources {
    fn default() -> Self {
        let storage = Self::data_storage();
        Self {
            config_path: Self::default_config_path(),
            cache_path: storage.join("cache"),
            token_path: storage.join("token.json"),
        }
    }
}

/// Runtime configuration: file config merged with CLI arguments and the
/// environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub scan_dir: PathBuf,
    pub api_key: Option<String>,
    pub rename_format: String,
    pub video_extensions: Vec<String>,
    pub history_path: PathBuf,
    pub dry_run_history_path: PathBuf,
    pub dry_run: bool,
    pub tags_only: bool,
    pub offline: bool,
    pub resources: AppResources,
}

impl Config {
    pub fn load(args: Args) -> anyhow::Result<Self> {
        let mut resources = AppResources::default();
        if let Some(config_path) = &args.config_path {
            resources.config_path = config_path.clone();
        }
        resources.initiate().context("initiate app resources")?;
        let file_config = ConfigFile::open(&resources.config_path)?.read()?;

        let api_key = std::env::var(API_KEY_ENV).ok().or(file_config.api_key);

        Ok(Config {
            scan_dir: args.directory,
            api_key,
            rename_format: args.format.unwrap_or(file_config.rename_format),
            video_extensions: file_config.video_extensions,
            history_path: file_config.history_path,
            dry_run_history_path: file_config.dry_run_history_path,
            dry_run: args.dry_run,
            tags_only: args.tags_only,
            offline: args.offline,
            resources,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_is_created_with_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("configuration.toml");
        let config = ConfigFile::open(&path).expect("create config");
        assert!(path.exists());
        let parsed = config.read().expect("read config");
        assert_eq!(parsed.rename_format, DEFAULT_RENAME_FORMAT);
        assert!(parsed.api_key.is_none());
    }

    #[test]
    fn broken_config_resets_to_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("configuration.toml");
        fs::write(&path, "rename_format = [not toml").expect("seed broken config");
        let parsed = ConfigFile::open(&path)
            .expect("open config")
            .read()
            .expect("read config");
        assert_eq!(parsed.rename_format, DEFAULT_RENAME_FORMAT);
        let rewritten = fs::read_to_string(&path).expect("config rewritten");
        assert!(rewritten.contains("rename_format"));
    }
}
