use reqwest::Client;

use serde::Deserialize;

use std::time::Duration;

use super::{ApiError, DEFAULT_TIMEOUT_SECONDS};

#[derive(Deserialize)]
pub struct JokesConfig {
    /// Endpoint returning a random two part joke as JSON.
    #[serde(default = "default_joke_url")]
    pub url: String,
    pub api_timeout_seconds: Option<u64>,
}

fn default_joke_url() -> String {
    "https://official-joke-api.appspot.com/random_joke".to_string()
}

impl Default for JokesConfig {
    fn default() -> Self {
        Self {
            url: default_joke_url(),
            api_timeout_seconds: None,
        }
    }
}

pub struct Jokes {
    config: JokesConfig,
    client: Client,
}

#[derive(Debug)]
pub enum JokesError {
    UnexpectedStatusCode(u16),
    BadResponse(String),
}

impl std::fmt::Display for JokesError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JokesError::UnexpectedStatusCode(code) => {
                write!(f, "Joke provider returned status code [{code}]")
            }
            JokesError::BadResponse(e) => write!(f, "Joke provider body was unusable: {e}"),
        }
    }
}

/// The joke delivered by the provider. The source language is English;
/// translation happens downstream when the user's locale asks for it.
#[derive(Deserialize, Debug, Clone)]
pub struct Joke {
    pub setup: String,
    pub punchline: String,
}

impl Jokes {
    pub fn new(config: JokesConfig) -> Self {
        let timeout_seconds = config.api_timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .unwrap();

        Self { config, client }
    }

    /// Fetch one random joke. Anything but a 200 with a decodable body is a
    /// recoverable failure the caller turns into a user facing apology.
    pub async fn random_joke(&self) -> Result<Joke, ApiError> {
        match self.client.get(&self.config.url).send().await {
            Ok(r) => {
                let status = r.status();
                if status != 200 {
                    return Err(ApiError::JokesError(JokesError::UnexpectedStatusCode(
                        status.as_u16(),
                    )));
                }

                r.json::<Joke>()
                    .await
                    .map_err(|e| ApiError::JokesError(JokesError::BadResponse(e.to_string())))
            }
            Err(e) => Err(ApiError::NetworkError(e)),
        }
    }
}
