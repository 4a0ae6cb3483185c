use reqwest::Client;

use serde::{Deserialize, Serialize};

use std::time::Duration;

use super::{ApiError, DEFAULT_TIMEOUT_SECONDS};

#[derive(Deserialize)]
pub struct TranslateConfig {
    /// A LibreTranslate compatible translation endpoint.
    #[serde(default = "default_translate_url")]
    pub url: String,
    pub api_key: Option<String>,
    pub api_timeout_seconds: Option<u64>,
}

fn default_translate_url() -> String {
    "https://libretranslate.com/translate".to_string()
}

impl Default for TranslateConfig {
    fn default() -> Self {
        Self {
            url: default_translate_url(),
            api_key: None,
            api_timeout_seconds: None,
        }
    }
}

pub struct Translate {
    config: TranslateConfig,
    client: Client,
}

#[derive(Debug)]
pub enum TranslateError {
    UnexpectedStatusCode(u16),
    BadResponse(String),
}

impl std::fmt::Display for TranslateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TranslateError::UnexpectedStatusCode(code) => {
                write!(f, "Translation provider returned status code [{code}]")
            }
            TranslateError::BadResponse(e) => {
                write!(f, "Translation provider body was unusable: {e}")
            }
        }
    }
}

#[derive(Serialize)]
struct TranslationRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Deserialize)]
struct TranslationResponse {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

impl Translate {
    pub fn new(config: TranslateConfig) -> Self {
        let timeout_seconds = config.api_timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .unwrap();

        Self { config, client }
    }

    pub async fn translate(
        &self,
        text: &str,
        source: &str,
        target: &str,
    ) -> Result<String, ApiError> {
        let request = TranslationRequest {
            q: text,
            source,
            target,
            format: "text",
            api_key: self.config.api_key.as_deref(),
        };

        match self.client.post(&self.config.url).json(&request).send().await {
            Ok(r) => {
                let status = r.status();
                if status != 200 {
                    return Err(ApiError::TranslateError(
                        TranslateError::UnexpectedStatusCode(status.as_u16()),
                    ));
                }

                let response: TranslationResponse = r.json().await.map_err(|e| {
                    ApiError::TranslateError(TranslateError::BadResponse(e.to_string()))
                })?;
                Ok(response.translated_text)
            }
            Err(e) => Err(ApiError::NetworkError(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> Translate {
        Translate::new(TranslateConfig {
            url: format!("{}/translate", server.uri()),
            api_key: None,
            api_timeout_seconds: None,
        })
    }

    #[tokio::test]
    async fn translates_between_languages() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/translate"))
            .and(body_partial_json(serde_json::json!({
                "q": "hello",
                "source": "en",
                "target": "uk",
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "translatedText": "привіт" })),
            )
            .mount(&server)
            .await;

        let translated = client_for(&server)
            .translate("hello", "en", "uk")
            .await
            .unwrap();
        assert_eq!(translated, "привіт");
    }

    #[tokio::test]
    async fn provider_failures_are_recoverable_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let outcome = client_for(&server).translate("hello", "en", "uk").await;
        assert!(matches!(
            outcome,
            Err(ApiError::TranslateError(
                TranslateError::UnexpectedStatusCode(429)
            ))
        ));
    }
}
