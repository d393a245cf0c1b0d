//! Host configuration types

use serde::{Deserialize, Serialize};

use crate::local::pty::{DEFAULT_COLS, DEFAULT_ROWS};

/// Current config file format version
pub const CONFIG_VERSION: u32 = 1;

fn default_listen() -> String {
    "127.0.0.1:0".to_string()
}

fn default_true() -> bool {
    true
}

fn default_cols() -> u16 {
    DEFAULT_COLS
}

fn default_rows() -> u16 {
    DEFAULT_ROWS
}

/// Host settings persisted in `config.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConfig {
    pub version: u32,
    /// Address the relay endpoint binds to (port 0 lets the OS pick)
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Surfaces must present the host token as their first message
    #[serde(default = "default_true")]
    pub require_token: bool,
    /// Stop the host once the last surface has closed
    #[serde(default = "default_true")]
    pub exit_on_last_close: bool,
    /// Treat the host as an installed build (minimal shell environment).
    /// Unset: release builds are packaged, debug builds are not.
    #[serde(default)]
    pub packaged: Option<bool>,
    #[serde(default = "default_cols")]
    pub default_cols: u16,
    #[serde(default = "default_rows")]
    pub default_rows: u16,
}

impl HostConfig {
    pub fn is_packaged(&self) -> bool {
        self.packaged.unwrap_or(!cfg!(debug_assertions))
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            listen: default_listen(),
            require_token: true,
            exit_on_last_close: true,
            packaged: None,
            default_cols: DEFAULT_COLS,
            default_rows: DEFAULT_ROWS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: HostConfig = serde_json::from_str(r#"{"version":1,"listen":"127.0.0.1:7681"}"#).unwrap();
        assert_eq!(config.listen, "127.0.0.1:7681");
        assert!(config.require_token);
        assert!(config.exit_on_last_close);
        assert_eq!((config.default_cols, config.default_rows), (80, 24));
    }

    #[test]
    fn test_packaged_override() {
        let config = HostConfig {
            packaged: Some(true),
            ..HostConfig::default()
        };
        assert!(config.is_packaged());
    }
}
