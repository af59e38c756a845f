use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::warn;

use crate::error::RelayError;

#[derive(Debug, Clone)]
pub struct Config {
    pub telegram: TelegramConfig,
    /// The owner is always an admin and the only one allowed to edit the set.
    pub owner_id: u64,
    /// `None` when BIN_ID / BIN_API_KEY are absent; routing then falls back to owner-only.
    pub store: Option<StoreConfig>,
    pub server: ServerConfig,
    pub routes: RouteConfig,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    pub bin_id: String,
    pub api_key: String,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct RouteConfig {
    pub ttl: Duration,
    pub capacity: usize,
}

const DEFAULT_BASE_URL: &str = "https://api.jsonbin.io/v3";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_ROUTE_TTL_SECS: u64 = 24 * 60 * 60;
const DEFAULT_ROUTE_CAPACITY: usize = 10_000;

/// Key/value view over the TOML file: `bot_token = "..."`, `admin_id = 123`, ...
/// Keys are the lowercase forms of the environment variable names.
#[derive(Debug, Default)]
struct FileSource {
    table: toml::Table,
}

impl FileSource {
    fn get(&self, key: &str) -> Option<String> {
        match self.table.get(&key.to_ascii_lowercase())? {
            toml::Value::String(s) => Some(s.clone()),
            toml::Value::Integer(i) => Some(i.to_string()),
            other => Some(other.to_string()),
        }
    }
}

impl Config {
    /// Load from the process environment, optionally layered over a TOML file.
    /// Environment variables win over file values.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file: {}", path.display()))?;
                let table: toml::Table = toml::from_str(&content)
                    .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
                FileSource { table }
            }
            None => FileSource::default(),
        };

        let config = Self::from_lookup(|key| {
            std::env::var(key)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .or_else(|| file.get(key))
        })?;
        Ok(config)
    }

    /// Build a config from a lookup function. Values are trimmed and empty
    /// values count as absent.
    pub fn from_lookup<F>(lookup: F) -> std::result::Result<Self, RelayError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let bot_token = get("BOT_TOKEN").ok_or(RelayError::ConfigMissing("BOT_TOKEN"))?;

        let owner_id = get("ADMIN_ID")
            .ok_or(RelayError::ConfigMissing("ADMIN_ID"))?
            .parse::<u64>()
            .map_err(|e| RelayError::ConfigInvalid {
                var: "ADMIN_ID",
                reason: e.to_string(),
            })?;
        if owner_id == 0 {
            return Err(RelayError::ConfigInvalid {
                var: "ADMIN_ID",
                reason: "must be a non-zero user id".to_string(),
            });
        }

        let store = match (get("BIN_ID"), get("BIN_API_KEY")) {
            (Some(bin_id), Some(api_key)) => Some(StoreConfig {
                bin_id,
                api_key,
                base_url: get("BIN_BASE_URL")
                    .map(|u| u.trim_end_matches('/').to_string())
                    .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            }),
            (None, None) => None,
            (Some(_), None) | (None, Some(_)) => {
                warn!("Only one of BIN_ID / BIN_API_KEY is set; admin persistence disabled");
                None
            }
        };

        let port = parse_or("PORT", get("PORT"), DEFAULT_PORT)?;
        let request_timeout_secs = parse_or(
            "REQUEST_TIMEOUT_SECS",
            get("REQUEST_TIMEOUT_SECS"),
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )?;
        let ttl_secs = parse_or("ROUTE_TTL_SECS", get("ROUTE_TTL_SECS"), DEFAULT_ROUTE_TTL_SECS)?;
        let capacity = parse_or("ROUTE_CAPACITY", get("ROUTE_CAPACITY"), DEFAULT_ROUTE_CAPACITY)?;

        Ok(Config {
            telegram: TelegramConfig { bot_token },
            owner_id,
            store,
            server: ServerConfig { port },
            routes: RouteConfig {
                ttl: Duration::from_secs(ttl_secs),
                capacity: capacity.max(1),
            },
            request_timeout: Duration::from_secs(request_timeout_secs.max(1)),
        })
    }

    pub fn persistence_enabled(&self) -> bool {
        self.store.is_some()
    }
}

fn parse_or<T>(var: &'static str, value: Option<String>, default: T) -> Result<T, RelayError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(v) => v.parse::<T>().map_err(|e| RelayError::ConfigInvalid {
            var,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::from_lookup(lookup(&[("BOT_TOKEN", "t"), ("ADMIN_ID", "42")])).unwrap();
        assert_eq!(config.telegram.bot_token, "t");
        assert_eq!(config.owner_id, 42);
        assert!(config.store.is_none());
        assert!(!config.persistence_enabled());
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.routes.ttl, Duration::from_secs(86400));
        assert_eq!(config.routes.capacity, 10_000);
    }

    #[test]
    fn test_admin_id_is_trimmed() {
        let config =
            Config::from_lookup(lookup(&[("BOT_TOKEN", "t"), ("ADMIN_ID", "  1234\n")])).unwrap();
        assert_eq!(config.owner_id, 1234);
    }

    #[test]
    fn test_missing_token_is_reported() {
        let err = Config::from_lookup(lookup(&[("ADMIN_ID", "1")])).unwrap_err();
        assert_eq!(err, RelayError::ConfigMissing("BOT_TOKEN"));

        let err = Config::from_lookup(lookup(&[("BOT_TOKEN", "  "), ("ADMIN_ID", "1")])).unwrap_err();
        assert_eq!(err, RelayError::ConfigMissing("BOT_TOKEN"));
    }

    #[test]
    fn test_missing_or_bad_admin_id() {
        let err = Config::from_lookup(lookup(&[("BOT_TOKEN", "t")])).unwrap_err();
        assert_eq!(err, RelayError::ConfigMissing("ADMIN_ID"));

        let err = Config::from_lookup(lookup(&[("BOT_TOKEN", "t"), ("ADMIN_ID", "abc")])).unwrap_err();
        assert!(matches!(err, RelayError::ConfigInvalid { var: "ADMIN_ID", .. }));

        let err = Config::from_lookup(lookup(&[("BOT_TOKEN", "t"), ("ADMIN_ID", "0")])).unwrap_err();
        assert!(matches!(err, RelayError::ConfigInvalid { var: "ADMIN_ID", .. }));
    }

    #[test]
    fn test_store_requires_both_credentials() {
        let config = Config::from_lookup(lookup(&[
            ("BOT_TOKEN", "t"),
            ("ADMIN_ID", "1"),
            ("BIN_ID", "abc"),
        ]))
        .unwrap();
        assert!(config.store.is_none());

        let config = Config::from_lookup(lookup(&[
            ("BOT_TOKEN", "t"),
            ("ADMIN_ID", "1"),
            ("BIN_ID", "abc"),
            ("BIN_API_KEY", "key"),
            ("BIN_BASE_URL", "http://localhost:1234/v3/"),
        ]))
        .unwrap();
        assert_eq!(
            config.store,
            Some(StoreConfig {
                bin_id: "abc".to_string(),
                api_key: "key".to_string(),
                base_url: "http://localhost:1234/v3".to_string(),
            })
        );
    }

    #[test]
    fn test_store_defaults_to_jsonbin() {
        let config = Config::from_lookup(lookup(&[
            ("BOT_TOKEN", "t"),
            ("ADMIN_ID", "1"),
            ("BIN_ID", "abc"),
            ("BIN_API_KEY", "key"),
        ]))
        .unwrap();
        assert_eq!(config.store.unwrap().base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_invalid_port() {
        let err = Config::from_lookup(lookup(&[
            ("BOT_TOKEN", "t"),
            ("ADMIN_ID", "1"),
            ("PORT", "http"),
        ]))
        .unwrap_err();
        assert!(matches!(err, RelayError::ConfigInvalid { var: "PORT", .. }));
    }

    #[test]
    fn test_file_source_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "bot_token = \"from-file\"\nadmin_id = 77\nport = 9000\nbin_id = \"bin\"\nbin_api_key = \"k\""
        )
        .unwrap();

        let content = std::fs::read_to_string(file.path()).unwrap();
        let source = FileSource {
            table: toml::from_str(&content).unwrap(),
        };
        let config = Config::from_lookup(|key| source.get(key)).unwrap();
        assert_eq!(config.telegram.bot_token, "from-file");
        assert_eq!(config.owner_id, 77);
        assert_eq!(config.server.port, 9000);
        assert!(config.persistence_enabled());
    }
}
