use std::env;

use thiserror::Error;

use crate::upload_service::types::{DEFAULT_LOCK_NAME, DEFAULT_MAX_BLOCKS};
use crate::workspace_client::client::{DEFAULT_API_VERSION, DEFAULT_TABLE_TITLE_PROPERTY};

pub const DEFAULT_WORKSPACE_API_URL: &str = "https://api.notion.com/v1";
pub const DEFAULT_WORKSPACE_RPS: u32 = 3;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("invalid {name} `{value}`: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Postgres url. Required, but `--database-url` may supply it instead.
    pub db_url: Option<String>,
    pub workspace_api_url: String,
    /// Only commands that call the workspace API need it.
    pub workspace_api_token: Option<String>,
    pub workspace_api_version: String,
    pub max_blocks: i64,
    pub lock_name: String,
    pub concurrency_limit: i64,
    pub workspace_rps: u32,
    pub table_title_property: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let max_blocks = parse_positive(get("MAX_BLOCKS"), "MAX_BLOCKS", DEFAULT_MAX_BLOCKS)?;
        let concurrency_limit = parse_positive(get("CONCURRENCY_LIMIT"), "CONCURRENCY_LIMIT", 1)?;
        let workspace_rps = parse_positive(
            get("WORKSPACE_RPS"),
            "WORKSPACE_RPS",
            i64::from(DEFAULT_WORKSPACE_RPS),
        )?;

        Ok(Self {
            db_url: get("DATABASE_URL"),
            workspace_api_url: get("WORKSPACE_API_URL")
                .unwrap_or_else(|| DEFAULT_WORKSPACE_API_URL.to_string()),
            workspace_api_token: get("WORKSPACE_API_TOKEN"),
            workspace_api_version: get("WORKSPACE_API_VERSION")
                .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            max_blocks,
            lock_name: get("LOCK_NAME").unwrap_or_else(|| DEFAULT_LOCK_NAME.to_string()),
            concurrency_limit,
            workspace_rps: u32::try_from(workspace_rps).map_err(|_| ConfigError::Invalid {
                name: "WORKSPACE_RPS",
                value: workspace_rps.to_string(),
                reason: "too large".to_string(),
            })?,
            table_title_property: get("TABLE_TITLE_PROPERTY")
                .unwrap_or_else(|| DEFAULT_TABLE_TITLE_PROPERTY.to_string()),
        })
    }

    /// CLI override first, then `DATABASE_URL`.
    pub fn database_url(&self, cli_override: Option<&str>) -> Result<String, ConfigError> {
        cli_override
            .map(str::to_string)
            .or_else(|| self.db_url.clone())
            .ok_or(ConfigError::Missing("DATABASE_URL (env var or --database-url)"))
    }

    pub fn require_token(&self) -> Result<&str, ConfigError> {
        self.workspace_api_token
            .as_deref()
            .ok_or(ConfigError::Missing("WORKSPACE_API_TOKEN"))
    }
}

fn parse_positive(
    raw: Option<String>,
    name: &'static str,
    default: i64,
) -> Result<i64, ConfigError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.trim().parse::<i64>() {
        Ok(value) if value > 0 => Ok(value),
        Ok(_) => Err(ConfigError::Invalid {
            name,
            value: raw,
            reason: "must be > 0".to_string(),
        }),
        Err(err) => Err(ConfigError::Invalid {
            name,
            value: raw,
            reason: err.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::{Config, ConfigError};

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_the_database_is_set() {
        let config = config_from(&[("DATABASE_URL", "postgres://localhost/wiki")])
            .expect("config should load");

        assert_eq!(config.db_url.as_deref(), Some("postgres://localhost/wiki"));
        assert_eq!(config.workspace_api_url, "https://api.notion.com/v1");
        assert_eq!(config.workspace_api_version, "2022-06-28");
        assert_eq!(config.max_blocks, 200);
        assert_eq!(config.lock_name, "Semaphore");
        assert_eq!(config.concurrency_limit, 1);
        assert_eq!(config.workspace_rps, 3);
        assert_eq!(config.table_title_property, "Name");
        assert_eq!(
            config.require_token(),
            Err(ConfigError::Missing("WORKSPACE_API_TOKEN"))
        );
    }

    #[test]
    fn cli_database_url_wins_over_env() {
        let config = config_from(&[("DATABASE_URL", "postgres://env")]).expect("config");
        assert_eq!(
            config.database_url(Some("postgres://flag")).as_deref(),
            Ok("postgres://flag")
        );
        assert_eq!(config.database_url(None).as_deref(), Ok("postgres://env"));

        let empty = config_from(&[("DATABASE_URL", "  ")]).expect("config");
        assert!(matches!(
            empty.database_url(None),
            Err(ConfigError::Missing(_))
        ));
    }

    #[test]
    fn non_positive_numbers_are_rejected() {
        let err = config_from(&[("MAX_BLOCKS", "0")]).expect_err("zero max blocks");
        assert!(matches!(err, ConfigError::Invalid { name: "MAX_BLOCKS", .. }));

        let err = config_from(&[("CONCURRENCY_LIMIT", "two")]).expect_err("not a number");
        assert!(matches!(
            err,
            ConfigError::Invalid {
                name: "CONCURRENCY_LIMIT",
                ..
            }
        ));
    }

    #[test]
    fn overrides_are_read() {
        let config = config_from(&[
            ("MAX_BLOCKS", "50"),
            ("LOCK_NAME", "WikiLock"),
            ("CONCURRENCY_LIMIT", "3"),
            ("WORKSPACE_RPS", "10"),
            ("WORKSPACE_API_TOKEN", "secret"),
        ])
        .expect("config");
        assert_eq!(config.max_blocks, 50);
        assert_eq!(config.lock_name, "WikiLock");
        assert_eq!(config.concurrency_limit, 3);
        assert_eq!(config.workspace_rps, 10);
        assert_eq!(config.require_token(), Ok("secret"));
    }
}
