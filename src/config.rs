// =============================================================================
// Configuration shared by every demo binary
// =============================================================================

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::managed::ObjectName;

/// Environment variable naming a TOML config file.
pub const CONFIG_ENV: &str = "PRIMERS_CONFIG";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for '{field}': {reason}")]
    Invalid { field: String, reason: String },
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PrimersConfig {
    pub log: LogConfig,
    pub deferred: DeferredConfig,
    pub pool: PoolConfig,
    pub stream: StreamConfig,
    pub managed: ManagedConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// Filter directive, overridden by `RUST_LOG`.
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeferredConfig {
    pub head: String,
    pub tail: String,
    /// Simulated work before each half of the greeting is available.
    pub delay_ms: u64,
}

impl Default for DeferredConfig {
    fn default() -> Self {
        Self {
            head: "Hello ".to_string(),
            tail: "master thesis.".to_string(),
            delay_ms: 50,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolConfig {
    pub outer_workers: usize,
    pub inner_workers: usize,
    /// `None` waits forever.
    pub join_timeout_ms: Option<u64>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            outer_workers: num_cpus::get().max(2),
            inner_workers: 1,
            join_timeout_ms: Some(5_000),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StreamConfig {
    pub count: u32,
    pub capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            count: 10,
            capacity: 16,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ManagedConfig {
    pub object_name: String,
    pub label: String,
    pub counter: i64,
}

impl Default for ManagedConfig {
    fn default() -> Self {
        Self {
            object_name: "primers:type=Greeter".to_string(),
            label: "hello".to_string(),
            counter: 0,
        }
    }
}

impl PrimersConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: PrimersConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Explicit path first, then `PRIMERS_CONFIG`, then defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        match env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path)),
            None => {
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Loads from the first command line argument, if any.
    pub fn from_args() -> Result<Self, ConfigError> {
        let path = env::args_os().nth(1).map(PathBuf::from);
        Self::load(path.as_deref())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool.outer_workers == 0 {
            return Err(ConfigError::invalid("pool.outer_workers", "must be at least 1"));
        }
        if self.pool.inner_workers == 0 {
            return Err(ConfigError::invalid("pool.inner_workers", "must be at least 1"));
        }
        if self.stream.capacity == 0 {
            return Err(ConfigError::invalid("stream.capacity", "must be at least 1"));
        }
        if let Err(err) = ObjectName::parse(&self.managed.object_name) {
            return Err(ConfigError::invalid("managed.object_name", err.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_are_valid() {
        let config = PrimersConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.stream.count, 10);
        assert_eq!(config.deferred.head, "Hello ");
        assert!(config.pool.outer_workers >= 2);
    }

    #[test]
    fn test_sample_config_parses() {
        let config = PrimersConfig::from_toml(include_str!("../primers.toml")).unwrap();
        assert_eq!(config.pool.outer_workers, 2);
        assert_eq!(config.managed.label, "hello");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = PrimersConfig::from_toml(
            r#"
            [pool]
            inner_workers = 3

            [log]
            level = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.pool.inner_workers, 3);
        assert_eq!(config.pool.join_timeout_ms, Some(5_000));
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.managed.object_name, "primers:type=Greeter");
    }

    #[test]
    fn test_zero_workers_rejected() {
        let err = PrimersConfig::from_toml("[pool]\nouter_workers = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field, .. } if field == "pool.outer_workers"));
    }

    #[test]
    fn test_bad_object_name_rejected() {
        let err = PrimersConfig::from_toml("[managed]\nobject_name = \"no-colon\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field, .. } if field == "managed.object_name"));
    }

    #[test]
    fn test_unknown_field_is_parse_error() {
        let err = PrimersConfig::from_toml("[stream]\nspeed = 3\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[stream]\ncount = 4\ncapacity = 2").unwrap();

        let config = PrimersConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.stream.count, 4);
        assert_eq!(config.stream.capacity, 2);
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = PrimersConfig::from_file(Path::new("/nonexistent/primers.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/primers.toml"));
    }
}
