//! Service Configuration Settings
//!
//! Configuration types for the anomaly stream service, loaded from
//! environment variables.

use std::path::PathBuf;
use std::time::Duration;

use crate::domain::observation::DEFAULT_ANOMALY_THRESHOLD;
use crate::domain::symbol_state::DEFAULT_WINDOW_SIZE;

/// Stream pacing and scoring window settings.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSettings {
    /// Rolling window length fed to the scorer.
    pub window_size: usize,
    /// Scores strictly above this are anomalies.
    pub anomaly_threshold: f64,
    /// Pause between ticks.
    pub tick_interval: Duration,
    /// Number of anomalies returned by recent-anomaly queries.
    pub recent_limit: usize,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            anomaly_threshold: DEFAULT_ANOMALY_THRESHOLD,
            tick_interval: Duration::from_secs(1),
            recent_limit: 15,
        }
    }
}

/// Tick data location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSettings {
    /// Directory holding one `<SYMBOL>.csv` per feed.
    pub data_dir: PathBuf,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

/// Scorer settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoringSettings {
    /// Expected number of features per tick.
    pub feature_dim: usize,
    /// Optional JSON feature scaler.
    pub scaler_path: Option<PathBuf>,
}

impl Default for ScoringSettings {
    fn default() -> Self {
        Self {
            feature_dim: 5,
            scaler_path: None,
        }
    }
}

/// Anomaly store settings.
#[derive(Clone, PartialEq, Eq)]
pub struct PersistenceSettings {
    /// PostgreSQL URL. When absent the in-memory store is used.
    pub database_url: Option<String>,
    /// Connection pool size.
    pub max_connections: u32,
}

impl Default for PersistenceSettings {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: 5,
        }
    }
}

impl std::fmt::Debug for PersistenceSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceSettings")
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "[REDACTED]"),
            )
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// HTTP surface settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// REST and WebSocket port.
    pub http_port: u16,
    /// Origins allowed by CORS.
    pub cors_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            http_port: 8000,
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(),
            ],
        }
    }
}

/// Complete service configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppConfig {
    /// Stream settings.
    pub stream: StreamSettings,
    /// Data source settings.
    pub data: DataSettings,
    /// Scorer settings.
    pub scoring: ScoringSettings,
    /// Anomaly store settings.
    pub persistence: PersistenceSettings,
    /// HTTP settings.
    pub server: ServerSettings,
}

impl AppConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is present but invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is present but invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader { lookup };
        let defaults = Self::default();

        let stream = StreamSettings {
            window_size: env.parse("ANOMALY_WINDOW_SIZE", defaults.stream.window_size)?,
            anomaly_threshold: env.parse("ANOMALY_THRESHOLD", defaults.stream.anomaly_threshold)?,
            tick_interval: env
                .parse::<u64>("ANOMALY_TICK_INTERVAL_MS", 1_000)
                .map(Duration::from_millis)?,
            recent_limit: env.parse("ANOMALY_RECENT_LIMIT", defaults.stream.recent_limit)?,
        };

        let data = DataSettings {
            data_dir: env
                .non_empty("ANOMALY_DATA_DIR")
                .map_or(defaults.data.data_dir, PathBuf::from),
        };

        let scoring = ScoringSettings {
            feature_dim: env.parse("ANOMALY_FEATURE_DIM", defaults.scoring.feature_dim)?,
            scaler_path: env.non_empty("ANOMALY_SCALER_PATH").map(PathBuf::from),
        };

        let persistence = PersistenceSettings {
            database_url: env.non_empty("DATABASE_URL"),
            max_connections: env.parse(
                "DATABASE_MAX_CONNECTIONS",
                defaults.persistence.max_connections,
            )?,
        };

        let server = ServerSettings {
            http_port: env.parse("ANOMALY_HTTP_PORT", defaults.server.http_port)?,
            cors_origins: env.non_empty("ANOMALY_CORS_ORIGINS").map_or(
                defaults.server.cors_origins,
                |v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(ToString::to_string)
                        .collect()
                },
            ),
        };

        let config = Self {
            stream,
            data,
            scoring,
            persistence,
            server,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stream.window_size == 0 {
            return Err(ConfigError::invalid("ANOMALY_WINDOW_SIZE", "must be at least 1"));
        }
        if !self.stream.anomaly_threshold.is_finite() || self.stream.anomaly_threshold < 0.0 {
            return Err(ConfigError::invalid(
                "ANOMALY_THRESHOLD",
                "must be a finite, non-negative number",
            ));
        }
        if self.scoring.feature_dim == 0 {
            return Err(ConfigError::invalid("ANOMALY_FEATURE_DIM", "must be at least 1"));
        }
        if self.persistence.max_connections == 0 {
            return Err(ConfigError::invalid(
                "DATABASE_MAX_CONNECTIONS",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable could not be parsed.
    #[error("environment variable {key} has invalid value {value:?}")]
    Unparsable {
        /// Variable name.
        key: String,
        /// Raw value.
        value: String,
    },
    /// Environment variable parsed but violates a constraint.
    #[error("environment variable {key} {reason}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Violated constraint.
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &str, reason: &str) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn non_empty(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        match self.non_empty(key) {
            None => Ok(default),
            Some(value) => value.parse().map_err(|_| ConfigError::Unparsable {
                key: key.to_string(),
                value,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use test_case::test_case;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let config = load(&[]).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.stream.window_size, 60);
        assert!((config.stream.anomaly_threshold - 0.000_087).abs() < f64::EPSILON);
        assert_eq!(config.stream.tick_interval, Duration::from_secs(1));
        assert_eq!(config.stream.recent_limit, 15);
        assert_eq!(config.server.http_port, 8000);
        assert!(config.persistence.database_url.is_none());
    }

    #[test]
    fn overrides_are_applied() {
        let config = load(&[
            ("ANOMALY_WINDOW_SIZE", "30"),
            ("ANOMALY_THRESHOLD", "0.5"),
            ("ANOMALY_TICK_INTERVAL_MS", "250"),
            ("ANOMALY_DATA_DIR", "/srv/ticks"),
            ("ANOMALY_SCALER_PATH", "/srv/scaler.json"),
            ("DATABASE_URL", "postgres://localhost/anomalies"),
            ("ANOMALY_CORS_ORIGINS", "http://a.test, http://b.test,"),
        ])
        .unwrap();

        assert_eq!(config.stream.window_size, 30);
        assert_eq!(config.stream.tick_interval, Duration::from_millis(250));
        assert_eq!(config.data.data_dir, PathBuf::from("/srv/ticks"));
        assert_eq!(
            config.scoring.scaler_path,
            Some(PathBuf::from("/srv/scaler.json"))
        );
        assert_eq!(
            config.server.cors_origins,
            vec!["http://a.test", "http://b.test"]
        );
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config = load(&[("ANOMALY_WINDOW_SIZE", "  "), ("DATABASE_URL", "")]).unwrap();
        assert_eq!(config.stream.window_size, 60);
        assert!(config.persistence.database_url.is_none());
    }

    #[test_case("ANOMALY_WINDOW_SIZE", "0" ; "zero window")]
    #[test_case("ANOMALY_THRESHOLD", "-1" ; "negative threshold")]
    #[test_case("ANOMALY_THRESHOLD", "NaN" ; "nan threshold")]
    #[test_case("ANOMALY_FEATURE_DIM", "0" ; "zero features")]
    #[test_case("DATABASE_MAX_CONNECTIONS", "0" ; "empty pool")]
    fn constraint_violations_are_rejected(key: &str, value: &str) {
        let err = load(&[(key, value)]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: ref k, .. } if k == key));
    }

    #[test]
    fn unparsable_values_are_rejected() {
        let err = load(&[("ANOMALY_HTTP_PORT", "eighty")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Unparsable {
                key: "ANOMALY_HTTP_PORT".to_string(),
                value: "eighty".to_string(),
            }
        );
    }

    #[test]
    fn database_url_is_redacted() {
        let settings = PersistenceSettings {
            database_url: Some("postgres://user:secret@db/anomalies".to_string()),
            max_connections: 5,
        };
        let debug = format!("{settings:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
