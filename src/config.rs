use clap::{Parser, ValueEnum};
use reqwest::Url;
use thiserror::Error;

use crate::session_guard::{Credentials, EnlightenUrls, GatewayAuth};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("invalid gateway address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("either ENVOY_JWT or both ENVOY_USERNAME and ENVOY_PASSWORD must be set")]
    MissingCredentials,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Prometheus exporter for Enphase IQ Gateways
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct ExporterConfig {
    #[arg(long, env = "ENVOY_ADDRESS", help = "Gateway base URL, e.g. https://envoy.local")]
    pub address: Option<String>,

    #[arg(long, env = "ENVOY_SERIAL", help = "Gateway serial number")]
    pub serial: Option<String>,

    #[arg(long, env = "ENVOY_JWT", hide_env_values = true, help = "Pre-issued gateway token")]
    pub jwt: Option<String>,

    #[arg(long, env = "ENVOY_USERNAME", help = "Enlighten account username")]
    pub username: Option<String>,

    #[arg(
        long,
        env = "ENVOY_PASSWORD",
        hide_env_values = true,
        help = "Enlighten account password"
    )]
    pub password: Option<String>,

    #[arg(long, env = "EXPORTER_PORT", default_value_t = 9090, help = "Port to serve metrics on")]
    pub port: u16,

    #[arg(
        long,
        env = "LOG_LEVEL",
        default_value = "info",
        help = "Log level (trace, debug, info, warn, error)"
    )]
    pub log_level: String,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl ExporterConfig {
    /// Validates the gateway settings and turns them into [`Credentials`].
    /// A token takes precedence over Enlighten account credentials.
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        let address = non_empty(&self.address)
            .ok_or(ConfigError::Missing("ENVOY_ADDRESS"))?
            .trim_end_matches('/');
        Url::parse(address).map_err(|e| ConfigError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })?;
        let serial = non_empty(&self.serial).ok_or(ConfigError::Missing("ENVOY_SERIAL"))?;

        let auth = match (
            non_empty(&self.jwt),
            non_empty(&self.username),
            non_empty(&self.password),
        ) {
            (Some(token), _, _) => GatewayAuth::Token(token.to_string()),
            (None, Some(username), Some(password)) => GatewayAuth::Enlighten {
                username: username.to_string(),
                password: password.to_string(),
            },
            _ => return Err(ConfigError::MissingCredentials),
        };

        Ok(Credentials {
            address: address.to_string(),
            serial: serial.to_string(),
            auth,
            enlighten: EnlightenUrls::default(),
        })
    }
}
