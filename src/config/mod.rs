//! Configuration Management Module
//!
//! Host settings persisted as JSON, and the per-window options a surface
//! passes when it opens.

pub mod options;
pub mod storage;
pub mod types;

pub use options::{SurfaceOptions, Theme};
pub use storage::{config_dir, config_file, log_dir, ConfigStorage, StorageError};
pub use types::{HostConfig, CONFIG_VERSION};
