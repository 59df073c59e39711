use std::path::{Path, PathBuf};

use aftercommit_core::{
    DEFAULT_QUEUE_CAPACITY, DEFAULT_THREAD_NAME, DEFAULT_WORKERS, SaturationPolicy,
};

use crate::CONFIG_FILE_NAME;
use crate::error::ConfigError;
use crate::file::{LogSection, PoolSection, SettingsFile};

pub const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettings {
    workers: usize,
    queue_capacity: usize,
    saturation: SaturationPolicy,
    thread_name: String,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            saturation: SaturationPolicy::default(),
            thread_name: String::from(DEFAULT_THREAD_NAME),
        }
    }
}

impl PoolSettings {
    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers
    }

    #[must_use]
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    #[must_use]
    pub fn saturation(&self) -> SaturationPolicy {
        self.saturation
    }

    #[must_use]
    pub fn thread_name(&self) -> &str {
        &self.thread_name
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    filter: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            filter: String::from(DEFAULT_LOG_FILTER),
        }
    }
}

impl LogSettings {
    /// Directive string in `tracing_subscriber::EnvFilter` syntax.
    #[must_use]
    pub fn filter(&self) -> &str {
        &self.filter
    }
}

/// Effective settings, after defaults were applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pool: PoolSettings,
    log: LogSettings,
    source_path: Option<PathBuf>,
}

impl Settings {
    #[must_use]
    pub fn pool(&self) -> &PoolSettings {
        &self.pool
    }

    #[must_use]
    pub fn log(&self) -> &LogSettings {
        &self.log
    }

    /// File the settings were read from, or `None` when only defaults apply.
    #[must_use]
    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }
}

fn resolve_pool(section: Option<PoolSection>) -> Result<PoolSettings, ConfigError> {
    let defaults = PoolSettings::default();
    let Some(section) = section else {
        return Ok(defaults);
    };

    let workers = section.workers.unwrap_or(defaults.workers);
    if workers == 0 {
        return Err(ConfigError::Invalid {
            field: "pool.workers",
            reason: "must be at least 1",
        });
    }
    let queue_capacity = section.queue_capacity.unwrap_or(defaults.queue_capacity);
    if queue_capacity == 0 {
        return Err(ConfigError::Invalid {
            field: "pool.queue-capacity",
            reason: "must be at least 1",
        });
    }
    let thread_name = section.thread_name.unwrap_or(defaults.thread_name);
    if thread_name.trim().is_empty() {
        return Err(ConfigError::Invalid {
            field: "pool.thread-name",
            reason: "must not be empty",
        });
    }

    Ok(PoolSettings {
        workers,
        queue_capacity,
        saturation: section.saturation.unwrap_or(defaults.saturation),
        thread_name,
    })
}

fn resolve_log(section: Option<LogSection>) -> LogSettings {
    section
        .and_then(|log| log.filter)
        .map_or_else(LogSettings::default, |filter| LogSettings { filter })
}

fn resolve(file: SettingsFile, source_path: Option<PathBuf>) -> Result<Settings, ConfigError> {
    Ok(Settings {
        pool: resolve_pool(file.pool)?,
        log: resolve_log(file.log),
        source_path,
    })
}

/// Parses settings from TOML text.
///
/// # Errors
///
/// Returns `ConfigError::TomlParse` for malformed TOML or unknown keys, and
/// `ConfigError::Invalid` for out-of-range values.
pub fn parse_settings(content: &str) -> Result<Settings, ConfigError> {
    let file: SettingsFile = toml::from_str(content)?;
    resolve(file, None)
}

/// Loads settings from a specific file.
///
/// # Errors
///
/// Returns `ConfigError::Read` if the file cannot be read, `ConfigError::Parse`
/// if it is not valid settings TOML, and `ConfigError::Invalid` for
/// out-of-range values.
pub fn load(path: &Path) -> Result<Settings, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let file: SettingsFile = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    resolve(file, Some(path.to_path_buf()))
}

/// Finds `aftercommit.toml` in `start_dir` or its closest ancestor and loads it.
///
/// Returns default settings if no file exists up to the filesystem root.
///
/// # Errors
///
/// Returns `ConfigError::Read` if `start_dir` does not exist, otherwise the
/// errors of [`load`].
pub fn discover(start_dir: &Path) -> Result<Settings, ConfigError> {
    let start_dir = start_dir
        .canonicalize()
        .map_err(|source| ConfigError::Read {
            path: start_dir.to_path_buf(),
            source,
        })?;

    let mut current = start_dir.as_path();
    loop {
        let candidate = current.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            return load(&candidate);
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => return Ok(Settings::default()),
        }
    }
}
