use clap::{Arg, Command};

use serde::Deserialize;

use crate::apis::Apis;
use crate::storage;

#[derive(Deserialize)]
pub struct WebhookConfig {
    /// Address the webhook server binds to.
    pub listen_address: String,
    /// Secret path component updates are POSTed to. Deliveries naming any
    /// other token are dropped.
    pub token: String,
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_queue_size() -> usize {
    2048
}

fn default_workers() -> usize {
    4
}

#[derive(Deserialize)]
pub struct Configuration {
    pub webhook: WebhookConfig,
    pub storage: Option<storage::Config>,
    pub apis: Apis,
}

#[derive(Debug)]
pub enum ConfigurationError {
    FileError(String),
    ParsingError(String),
}

impl std::fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigurationError::FileError(e) => write!(f, "Configuration File Error: {e}"),
            ConfigurationError::ParsingError(e) => write!(f, "Configuration Parsing Error: {e}"),
        }
    }
}

impl std::error::Error for ConfigurationError {}

pub fn configure() -> Result<Configuration, ConfigurationError> {
    let matches = Command::new("Jester")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Webhook driven joke bot with daily quotas and community ratings")
        .arg(
            Arg::new("config")
                .help("Path to the configuration toml file")
                .long("config")
                .default_value("./jester/resources/jester.toml"),
        )
        .arg(
            Arg::new("secrets")
                .help("Path to an optional secrets json file interpolated into the config")
                .long("secrets"),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config").unwrap();
    let mut config = std::fs::read_to_string(config_path).map_err(|e| {
        ConfigurationError::FileError(format!(
            "Failed to read configuration file {config_path}: {e}"
        ))
    })?;

    if let Some(secrets_path) = matches.get_one::<String>("secrets") {
        config = interpolate_secrets(config, secrets_path)?;
    }

    toml::from_str(&config).map_err(|e| ConfigurationError::ParsingError(e.to_string()))
}

/// Replace secret markers in the raw config text with the values from a
/// JSON object of marker to string. Markers are plain substrings, so
/// whatever naming scheme the deployment uses works unchanged.
pub fn interpolate_secrets(
    mut config: String,
    secrets_path: &str,
) -> Result<String, ConfigurationError> {
    let secrets = std::fs::read(secrets_path).map_err(|e| {
        ConfigurationError::FileError(format!("Failed to read secrets file {secrets_path}: {e}"))
    })?;

    let secrets = serde_json::from_slice::<serde_json::Value>(&secrets)
        .map_err(|e| ConfigurationError::ParsingError(format!("Secrets file is not JSON: {e}")))?;

    let Some(secrets) = secrets.as_object() else {
        return Err(ConfigurationError::ParsingError(
            "Secrets file must contain a top level object".to_string(),
        ));
    };

    for (marker, value) in secrets {
        let Some(value) = value.as_str() else {
            return Err(ConfigurationError::ParsingError(format!(
                "Secret [{marker}] must be a string"
            )));
        };
        config = config.replace(marker, value);
    }

    Ok(config)
}
