//! Configuration system for imgaudit.
//!
//! Provides TOML-based configuration with:
//! - Scan settings (`[scan]`): workflow root, file extension, image key
//! - Registry settings (`[registry]`): dev/public prefixes and the manifest probe
//! - Onezone settings (`[onezone]`): checksum recalculation endpoint
//! - Config file layering (user config + project-local overrides)

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    ConfigSource, LoadedConfig, PROJECT_CONFIG_FILE, load_config, load_config_file,
    load_config_with_options, save_config, user_config_dir, user_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;
