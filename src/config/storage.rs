//! Host config persistence
//!
//! Config location: ~/.youyou on macOS/Linux, %APPDATA%\Youyou on Windows

use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::types::{HostConfig, CONFIG_VERSION};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("No home or application data directory")]
    NoConfigDir,

    #[error("Config I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config version {found} is newer than supported {supported}")]
    VersionTooNew { found: u32, supported: u32 },
}

/// Directory holding `config.json` and `logs/`
pub fn config_dir() -> Result<PathBuf, StorageError> {
    let app_data = if cfg!(windows) {
        dirs::config_dir().map(|dir| dir.join("Youyou"))
    } else {
        None
    };
    app_data
        .or_else(|| dirs::home_dir().map(|home| home.join(".youyou")))
        .ok_or(StorageError::NoConfigDir)
}

pub fn log_dir() -> Result<PathBuf, StorageError> {
    Ok(config_dir()?.join("logs"))
}

pub fn config_file() -> Result<PathBuf, StorageError> {
    Ok(config_dir()?.join("config.json"))
}

/// Reads and writes [`HostConfig`] at a fixed path
pub struct ConfigStorage {
    path: PathBuf,
}

impl ConfigStorage {
    pub fn new() -> Result<Self, StorageError> {
        config_file().map(Self::with_path)
    }

    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing file yields the defaults. A file that does not parse is moved
    /// aside and the defaults are used; a newer format version is an error.
    pub async fn load(&self) -> Result<HostConfig, StorageError> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No config at {:?}, using defaults", self.path);
                return Ok(HostConfig::default());
            }
            Err(e) => return Err(e.into()),
        };

        let config = match serde_json::from_str::<HostConfig>(&contents) {
            Ok(config) => config,
            Err(parse_err) => {
                tracing::warn!("Ignoring unreadable config {:?}: {}", self.path, parse_err);
                match self.set_aside().await {
                    Ok(moved_to) => tracing::warn!("Unreadable config kept as {:?}", moved_to),
                    Err(e) => tracing::error!("Could not keep unreadable config: {}", e),
                }
                return Ok(HostConfig::default());
            }
        };

        if config.version > CONFIG_VERSION {
            return Err(StorageError::VersionTooNew {
                found: config.version,
                supported: CONFIG_VERSION,
            });
        }
        Ok(config)
    }

    /// Write via a sibling temp file and rename, so readers never see a
    /// partial file
    pub async fn save(&self, config: &HostConfig) -> Result<(), StorageError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).await?;
        }

        let staged = self.path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(config)?;
        let mut file = fs::File::create(&staged).await?;
        file.write_all(&body).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&staged, &self.path).await?;
        tracing::debug!("Saved config to {:?}", self.path);
        Ok(())
    }

    /// Copy the current file to `config.json.backup.<timestamp>`
    async fn set_aside(&self) -> Result<PathBuf, StorageError> {
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let target = self.path.with_extension(format!("json.backup.{}", stamp));
        fs::copy(&self.path, &target).await?;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_load_nonexistent() {
        let temp = tempdir().unwrap();
        let storage = ConfigStorage::with_path(temp.path().join("config.json"));

        let config = storage.load().await.unwrap();
        assert_eq!(config, HostConfig::default());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let temp = tempdir().unwrap();
        let storage = ConfigStorage::with_path(temp.path().join("nested/config.json"));

        let config = HostConfig {
            listen: "127.0.0.1:7681".to_string(),
            exit_on_last_close: false,
            ..HostConfig::default()
        };
        storage.save(&config).await.unwrap();

        let loaded = storage.load().await.unwrap();
        assert_eq!(loaded, config);
    }

    #[tokio::test]
    async fn test_corrupted_config_is_backed_up() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        let storage = ConfigStorage::with_path(path);

        let config = storage.load().await.unwrap();
        assert_eq!(config, HostConfig::default());

        let backups = std::fs::read_dir(temp.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().contains("backup"))
            .count();
        assert_eq!(backups, 1);
    }

    #[tokio::test]
    async fn test_newer_version_rejected() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("config.json");
        std::fs::write(&path, format!(r#"{{"version":{}}}"#, CONFIG_VERSION + 1)).unwrap();
        let storage = ConfigStorage::with_path(path);

        assert!(matches!(
            storage.load().await,
            Err(StorageError::VersionTooNew { .. })
        ));
    }
}
