//! Runtime configuration.
//!
//! Defaults are compiled in from `config/default.toml`. A user file is
//! overlaid key by key on top of them, then `B3DATA_*` environment variables
//! win over both.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Deserialize;

const DEFAULTS: &str = include_str!("../config/default.toml");

/// Description used for a class suffix missing from `tipos_acoes`.
pub const UNKNOWN_SHARE_CLASS: &str = "Tipo de Ação Desconhecido";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid config value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Config {
    pub max_workers: usize,
    pub batch_size: usize,
    pub db_path: PathBuf,
    pub statements_table: String,
    pub companies_table: String,
    pub historical_columns_both: Vec<String>,
    pub historical_columns_new: Vec<String>,
    pub statements_order: Vec<String>,
    /// Ticker class digit suffix → share class description.
    pub tipos_acoes: BTreeMap<String, String>,
    pub price_symbol_suffix: String,
    pub price_start_date: NaiveDate,
    pub b3_base_url: String,
    pub language: String,
    pub page_size: u32,
}

impl Config {
    /// The embedded defaults, validated.
    pub fn defaults() -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(DEFAULTS)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with the TOML in `content`.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut base: toml::Table = DEFAULTS.parse()?;
        let overlay: toml::Table = content.parse()?;
        base.extend(overlay);
        let config: Config = toml::Value::Table(base).try_into()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Loads `path` when given (or `b3data.toml` when present), then applies
    /// environment overrides from the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let local = Path::new("b3data.toml");
        let mut config = match path {
            Some(p) => Self::from_path(p)?,
            None if local.exists() => Self::from_path(local)?,
            None => Self::defaults()?,
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Applies `B3DATA_MAX_WORKERS`, `B3DATA_BATCH_SIZE` and `B3DATA_DB_PATH`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("B3DATA_MAX_WORKERS") {
            self.max_workers = parse_count("max_workers", &raw)?;
        }
        if let Some(raw) = lookup("B3DATA_BATCH_SIZE") {
            self.batch_size = parse_count("batch_size", &raw)?;
        }
        if let Some(raw) = lookup("B3DATA_DB_PATH") {
            self.db_path = PathBuf::from(raw);
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == 0 {
            return Err(invalid("max_workers", "must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(invalid("batch_size", "must be at least 1"));
        }
        if self.page_size == 0 {
            return Err(invalid("page_size", "must be at least 1"));
        }
        if self.historical_columns_both.is_empty() {
            return Err(invalid("historical_columns_both", "needs at least one join column"));
        }
        if self.statements_order.is_empty() {
            return Err(invalid("statements_order", "needs at least one column"));
        }
        if self.statements_table.trim().is_empty() || self.companies_table.trim().is_empty() {
            return Err(invalid("statements_table", "table names must not be blank"));
        }
        if let Some(bad) = self
            .tipos_acoes
            .keys()
            .find(|k| k.is_empty() || !k.chars().all(|c| c.is_ascii_digit()))
        {
            return Err(invalid("tipos_acoes", format!("key '{}' is not a digit suffix", bad)));
        }
        Ok(())
    }

    /// Share class description for a ticker digit suffix.
    pub fn share_class(&self, suffix: &str) -> &str {
        self.tipos_acoes
            .get(suffix)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_SHARE_CLASS)
    }
}

fn parse_count(key: &'static str, raw: &str) -> Result<usize, ConfigError> {
    raw.trim()
        .parse::<usize>()
        .map_err(|e| invalid(key, format!("'{}': {}", raw, e)))
}

fn invalid(key: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_defaults_parse_and_validate() {
        let config = Config::defaults().unwrap();
        assert_eq!(config.max_workers, 8);
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.historical_columns_both, vec!["company_name"]);
        assert_eq!(
            config.statements_order,
            vec!["company_name", "quarter", "type", "frame", "account"]
        );
        assert_eq!(config.price_symbol_suffix, ".SA");
        assert_eq!(
            config.price_start_date,
            NaiveDate::from_ymd_opt(1950, 1, 1).unwrap()
        );
        assert_eq!(config.tipos_acoes.len(), 11);
    }

    #[test]
    fn share_class_lookup_and_fallback() {
        let config = Config::defaults().unwrap();
        assert_eq!(config.share_class("3"), "Ações Ordinárias");
        assert_eq!(config.share_class("11"), "Units");
        assert_eq!(config.share_class("99"), UNKNOWN_SHARE_CLASS);
    }

    #[test]
    fn overlay_replaces_only_given_keys() {
        let config = Config::from_toml_str("max_workers = 2\ndb_path = \"/tmp/x.db\"\n").unwrap();
        assert_eq!(config.max_workers, 2);
        assert_eq!(config.db_path, PathBuf::from("/tmp/x.db"));
        assert_eq!(config.batch_size, 50);
    }

    #[test]
    fn zero_workers_rejected() {
        let err = Config::from_toml_str("max_workers = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "max_workers", .. }));
    }

    #[test]
    fn malformed_toml_is_toml_error() {
        let err = Config::from_toml_str("max_workers = [").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn env_overrides_apply_and_validate() {
        let mut config = Config::defaults().unwrap();
        config
            .apply_env_overrides(|key| match key {
                "B3DATA_MAX_WORKERS" => Some("3".into()),
                "B3DATA_DB_PATH" => Some("other.db".into()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.max_workers, 3);
        assert_eq!(config.db_path, PathBuf::from("other.db"));

        let err = config
            .apply_env_overrides(|key| (key == "B3DATA_BATCH_SIZE").then(|| "lots".into()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "batch_size", .. }));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = Config::from_path(Path::new("/nonexistent/b3data.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
