//! Loading and validation of settings.
//!
//! Values defined in the configuration file can be overridden by environment
//! variables with the `FEDSUM` prefix, for example
//! `FEDSUM_API__BIND_ADDRESS=0.0.0.0:8081`.

use std::{fmt, path::Path};

use config::{Config, ConfigError, Environment};
use serde::de::{self, Deserializer, Visitor};
use thiserror::Error;
use tracing_subscriber::filter::EnvFilter;
use validator::{Validate, ValidationErrors};

#[derive(Error, Debug)]
/// An error related to loading and validation of settings.
pub enum SettingsError {
    #[error("configuration loading failed: {0}")]
    Loading(#[from] ConfigError),
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationErrors),
}

#[derive(Debug, Validate, Deserialize)]
/// The combined settings.
///
/// Each section in the configuration file corresponds to the identically
/// named settings field.
pub struct Settings {
    pub api: ApiSettings,
    pub log: LoggingSettings,
    #[validate]
    pub protocol: ProtocolSettings,
}

impl Settings {
    /// Loads and validates the settings via a configuration file.
    ///
    /// # Errors
    /// Fails when the loading of the configuration file or its validation
    /// failed.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let settings: Settings = Self::load(path)?;
        settings.validate()?;
        Ok(settings)
    }

    fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut config = Config::new();
        config.merge(config::File::from(path.as_ref()))?;
        config.merge(Environment::with_prefix("fedsum").separator("__"))?;
        config.try_into()
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
/// REST API settings.
pub struct ApiSettings {
    /// The address to which the REST API should be bound.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [api]
    /// bind_address = "0.0.0.0:8081"
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// FEDSUM_API__BIND_ADDRESS=127.0.0.1:8081
    /// ```
    pub bind_address: std::net::SocketAddr,
}

#[derive(Debug, Validate, Deserialize, Clone, Copy)]
/// Round protocol settings.
pub struct ProtocolSettings {
    /// The number of submissions a round needs before it can be aggregated.
    /// Aggregating fewer than two submissions would republish an individual
    /// participant's update, so the minimum is two.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [protocol]
    /// min_submissions = 2
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// FEDSUM_PROTOCOL__MIN_SUBMISSIONS=2
    /// ```
    #[validate(range(min = 2))]
    pub min_submissions: u64,
}

#[derive(Debug, Deserialize)]
/// Logging settings.
pub struct LoggingSettings {
    /// A comma-separated list of logging directives.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [log]
    /// filter = "info"
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// FEDSUM_LOG__FILTER=info
    /// ```
    #[serde(deserialize_with = "deserialize_env_filter")]
    pub filter: EnvFilter,
}

fn deserialize_env_filter<'de, D>(deserializer: D) -> Result<EnvFilter, D::Error>
where
    D: Deserializer<'de>,
{
    struct EnvFilterVisitor;

    impl<'de> Visitor<'de> for EnvFilterVisitor {
        type Value = EnvFilter;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            write!(formatter, "a valid tracing filter directive")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            EnvFilter::try_new(value)
                .map_err(|_| de::Error::invalid_value(serde::de::Unexpected::Str(value), &self))
        }
    }

    deserializer.deserialize_str(EnvFilterVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_protocol_settings() {
        assert!(ProtocolSettings { min_submissions: 2 }.validate().is_ok());
        assert!(ProtocolSettings { min_submissions: 5 }.validate().is_ok());
        assert!(ProtocolSettings { min_submissions: 1 }.validate().is_err());
        assert!(ProtocolSettings { min_submissions: 0 }.validate().is_err());
    }

    #[test]
    fn test_deserialize_log_filter() {
        let settings: LoggingSettings = serde_json::from_str(r#"{"filter": "info"}"#).unwrap();
        assert_eq!(settings.filter.to_string(), "info");
        assert!(
            serde_json::from_str::<LoggingSettings>(r#"{"filter": "fedsum=debug=trace"}"#).is_err()
        );
    }
}
