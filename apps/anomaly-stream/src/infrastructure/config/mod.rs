//! Configuration Module
//!
//! Configuration loading for the anomaly stream service.

mod settings;

pub use settings::{
    AppConfig, ConfigError, DataSettings, PersistenceSettings, ScoringSettings, ServerSettings,
    StreamSettings,
};
