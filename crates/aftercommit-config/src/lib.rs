mod error;
mod file;
mod settings;

pub const CONFIG_FILE_NAME: &str = "aftercommit.toml";

pub use error::ConfigError;
pub use settings::{LogSettings, PoolSettings, Settings, discover, load, parse_settings};

pub type Result<T> = std::result::Result<T, ConfigError>;
