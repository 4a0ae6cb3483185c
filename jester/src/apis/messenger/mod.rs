pub mod updates;

use reqwest::Client;

use serde::{Deserialize, Serialize};
use serde_json::json;

use std::time::Duration;

use super::{ApiError, DEFAULT_TIMEOUT_SECONDS};

#[derive(Deserialize)]
pub struct MessengerConfig {
    /// The bot token issued by the messaging platform.
    pub token: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Public URL updates should be delivered to. When set, the platform
    /// webhook can be (re)registered at boot or via the GET route.
    pub webhook_url: Option<String>,
    pub api_timeout_seconds: Option<u64>,
}

fn default_base_url() -> String {
    "https://api.telegram.org".to_string()
}

pub struct Messenger {
    config: MessengerConfig,
    client: Client,
}

#[derive(Debug)]
pub enum MessengerError {
    UnexpectedStatusCode(u16),
    WebhookUrlNotConfigured,
}

impl std::fmt::Display for MessengerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessengerError::UnexpectedStatusCode(code) => {
                write!(f, "Messenger API returned status code [{code}]")
            }
            MessengerError::WebhookUrlNotConfigured => {
                write!(f, "No public webhook URL is configured")
            }
        }
    }
}

enum Method {
    SendMessage,
    AnswerCallbackQuery,
    EditMessageReplyMarkup,
    DeleteWebhook,
    SetWebhook,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self {
            Self::SendMessage => write!(f, "sendMessage"),
            Self::AnswerCallbackQuery => write!(f, "answerCallbackQuery"),
            Self::EditMessageReplyMarkup => write!(f, "editMessageReplyMarkup"),
            Self::DeleteWebhook => write!(f, "deleteWebhook"),
            Self::SetWebhook => write!(f, "setWebhook"),
        }
    }
}

/// An inline keyboard attached to an outbound message. Button payloads are
/// the structured callback tokens the dispatcher parses back out of vote
/// and language selection events.
#[derive(Serialize, Debug, Clone)]
pub struct InlineKeyboard {
    inline_keyboard: Vec<Vec<InlineButton>>,
}

impl InlineKeyboard {
    pub fn row(buttons: Vec<InlineButton>) -> Self {
        Self {
            inline_keyboard: vec![buttons],
        }
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct InlineButton {
    text: String,
    callback_data: String,
}

impl InlineButton {
    pub fn new(text: &str, callback_data: &str) -> Self {
        Self {
            text: text.to_string(),
            callback_data: callback_data.to_string(),
        }
    }
}

impl Messenger {
    pub fn new(config: MessengerConfig) -> Self {
        let timeout_seconds = config.api_timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .unwrap();

        Self { config, client }
    }

    pub fn has_webhook_url(&self) -> bool {
        self.config.webhook_url.is_some()
    }

    async fn call_method(&self, method: Method, body: serde_json::Value) -> Result<(), ApiError> {
        match self
            .client
            .post(format!(
                "{}/bot{}/{method}",
                self.config.base_url, self.config.token
            ))
            .json(&body)
            .send()
            .await
        {
            Ok(r) => {
                let status = r.status();
                if status == 200 {
                    return Ok(());
                }
                let response = r.text().await;
                error!(
                    "Messenger API {method} returned: {}",
                    response.unwrap_or_default()
                );

                Err(ApiError::MessengerError(
                    MessengerError::UnexpectedStatusCode(status.as_u16()),
                ))
            }
            Err(e) => Err(ApiError::NetworkError(e)),
        }
    }

    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<InlineKeyboard>,
    ) -> Result<(), ApiError> {
        let body = match keyboard {
            Some(keyboard) => json!({
                "chat_id": chat_id,
                "text": text,
                "parse_mode": "Markdown",
                "reply_markup": keyboard,
            }),
            None => json!({
                "chat_id": chat_id,
                "text": text,
                "parse_mode": "Markdown",
            }),
        };

        self.call_method(Method::SendMessage, body).await
    }

    /// Acknowledge a callback so the client stops showing its spinner. The
    /// text appears as a small toast on the user's screen.
    pub async fn answer_callback(&self, callback_id: &str, text: &str) -> Result<(), ApiError> {
        self.call_method(
            Method::AnswerCallbackQuery,
            json!({ "callback_query_id": callback_id, "text": text }),
        )
        .await
    }

    /// Remove the inline keyboard from a delivered message. Sending the
    /// edit without a reply markup clears it.
    pub async fn clear_reply_markup(&self, chat_id: i64, message_id: i64) -> Result<(), ApiError> {
        self.call_method(
            Method::EditMessageReplyMarkup,
            json!({ "chat_id": chat_id, "message_id": message_id }),
        )
        .await
    }

    /// Point the platform's webhook at the configured public URL, dropping
    /// whatever registration was there before.
    pub async fn register_webhook(&self) -> Result<(), ApiError> {
        let url = self.config.webhook_url.as_ref().ok_or(
            ApiError::MessengerError(MessengerError::WebhookUrlNotConfigured),
        )?;

        self.call_method(Method::DeleteWebhook, json!({})).await?;
        self.call_method(Method::SetWebhook, json!({ "url": url }))
            .await
    }
}
