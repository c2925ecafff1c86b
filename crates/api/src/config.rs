//! Process configuration read from the environment.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use catering_observability::LogFormat;
use thiserror::Error;

const DEFAULT_MAX_CONNECTIONS: u32 = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("DATABASE_URL must be set when USE_PERSISTENT_STORES=true")]
    MissingDatabaseUrl,
}

/// Which store adapter backs the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    InMemory,
    Postgres {
        database_url: String,
        max_connections: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub store: StoreConfig,
    pub catalog_seed: Option<PathBuf>,
    pub log_format: LogFormat,
    /// Fallbacks taken while reading the environment. Reported once logging
    /// is up, since `log_format` itself comes from here.
    pub warnings: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key lookup.
    ///
    /// Malformed values fall back to their default and are listed in
    /// `warnings`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut warnings = Vec::new();
        let bind_addr =
            parsed(&lookup, "BIND_ADDR", &mut warnings).unwrap_or_else(default_bind_addr);
        let persistent =
            parsed_bool(&lookup, "USE_PERSISTENT_STORES", &mut warnings).unwrap_or(false);

        let store = if persistent {
            let database_url = lookup("DATABASE_URL")
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::MissingDatabaseUrl)?;
            let max_connections =
                parsed::<u32, _>(&lookup, "DATABASE_MAX_CONNECTIONS", &mut warnings)
                    .filter(|n| *n > 0)
                    .unwrap_or(DEFAULT_MAX_CONNECTIONS);
            StoreConfig::Postgres {
                database_url,
                max_connections,
            }
        } else {
            StoreConfig::InMemory
        };

        let catalog_seed = lookup("CATALOG_SEED")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);
        let log_format = parsed(&lookup, "LOG_FORMAT", &mut warnings).unwrap_or_default();

        Ok(Self {
            bind_addr,
            store,
            catalog_seed,
            log_format,
            warnings,
        })
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn parsed<T, F>(lookup: &F, key: &str, warnings: &mut Vec<String>) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warnings.push(format!("invalid value {raw:?} for {key}; using default"));
            None
        }
    }
}

fn parsed_bool<F>(lookup: &F, key: &str, warnings: &mut Vec<String>) -> Option<bool>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            warnings.push(format!("invalid boolean {raw:?} for {key}; using default"));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_use_in_memory_store() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.bind_addr.to_string(), "0.0.0.0:8080");
        assert_eq!(cfg.store, StoreConfig::InMemory);
        assert_eq!(cfg.catalog_seed, None);
        assert_eq!(cfg.log_format, LogFormat::Json);
        assert!(cfg.warnings.is_empty());
    }

    #[test]
    fn persistent_mode_requires_database_url() {
        assert_eq!(
            config(&[("USE_PERSISTENT_STORES", "true")]),
            Err(ConfigError::MissingDatabaseUrl)
        );
    }

    #[test]
    fn persistent_mode_reads_pool_settings() {
        let cfg = config(&[
            ("USE_PERSISTENT_STORES", "TRUE"),
            ("DATABASE_URL", "postgres://localhost/catering"),
            ("DATABASE_MAX_CONNECTIONS", "4"),
        ])
        .unwrap();
        assert_eq!(
            cfg.store,
            StoreConfig::Postgres {
                database_url: "postgres://localhost/catering".to_string(),
                max_connections: 4,
            }
        );
    }

    #[test]
    fn malformed_values_fall_back_to_defaults() {
        let cfg = config(&[
            ("BIND_ADDR", "not-an-address"),
            ("USE_PERSISTENT_STORES", "maybe"),
            ("LOG_FORMAT", "xml"),
        ])
        .unwrap();
        assert_eq!(cfg.bind_addr, default_bind_addr());
        assert_eq!(cfg.store, StoreConfig::InMemory);
        assert_eq!(cfg.log_format, LogFormat::Json);
        assert_eq!(cfg.warnings.len(), 3);
        for key in ["BIND_ADDR", "USE_PERSISTENT_STORES", "LOG_FORMAT"] {
            assert!(cfg.warnings.iter().any(|w| w.contains(key)), "{key}");
        }

        let cfg = config(&[
            ("USE_PERSISTENT_STORES", "1"),
            ("DATABASE_URL", "postgres://db/catering"),
            ("DATABASE_MAX_CONNECTIONS", "0"),
        ])
        .unwrap();
        assert!(matches!(
            cfg.store,
            StoreConfig::Postgres { max_connections: DEFAULT_MAX_CONNECTIONS, .. }
        ));
    }

    #[test]
    fn explicit_values_are_used() {
        let cfg = config(&[
            ("BIND_ADDR", "127.0.0.1:9000"),
            ("CATALOG_SEED", "/etc/catering/seed.json"),
            ("LOG_FORMAT", "pretty"),
        ])
        .unwrap();
        assert_eq!(cfg.bind_addr.port(), 9000);
        assert_eq!(cfg.catalog_seed, Some(PathBuf::from("/etc/catering/seed.json")));
        assert_eq!(cfg.log_format, LogFormat::Pretty);
    }
}
