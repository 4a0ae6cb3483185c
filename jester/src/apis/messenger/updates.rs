//! Inbound webhook payload shapes. Only the fields the dispatcher acts on
//! are modeled; everything else the platform sends is ignored on decode,
//! which keeps old binaries compatible with new payload fields.

use serde::Deserialize;

#[derive(Deserialize, Debug)]
pub struct Update {
    #[serde(default)]
    pub update_id: i64,
    pub message: Option<IncomingMessage>,
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Deserialize, Debug)]
pub struct IncomingMessage {
    pub message_id: i64,
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct Chat {
    pub id: i64,
}

#[derive(Deserialize, Debug)]
pub struct CallbackQuery {
    pub id: String,
    /// The opaque token a button carried. Absent or unparseable data is
    /// dropped by the dispatcher, never an error.
    pub data: Option<String>,
    /// The message the pressed button was attached to.
    pub message: Option<IncomingMessage>,
}
