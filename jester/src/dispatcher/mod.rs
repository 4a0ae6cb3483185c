use chrono::Utc;

use crossbeam_channel::Receiver;

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::apis::messenger::updates::{CallbackQuery, IncomingMessage, Update};
use crate::apis::messenger::{InlineButton, InlineKeyboard};
use crate::apis::{Api, ApiError};
use crate::quota::{Consumption, Locale, QuotaTracker, JOKES_CATEGORY};
use crate::ratings::{RatingLedger, RatingsError, Vote};
use crate::text;

pub const TOP_LIST_SIZE: usize = 10;

/// One inbound webhook delivery, exactly as the platform sent it. Parsing
/// happens on the dispatcher threads, not in the server route, so a slow
/// or hostile payload never delays the webhook acknowledgement.
pub struct Message {
    pub body: Vec<u8>,
}

/// The intent resolved from one inbound update.
#[derive(Debug, PartialEq, Eq)]
pub enum Event {
    Start,
    SetLocale(Locale),
    Check,
    RequestJoke,
    Vote { joke_id: String, vote: Vote },
    TopList,
    Help,
}

/// Commands may arrive suffixed with the bot name ("/joke@SomeBot") in
/// group chats. Anything unrecognized resolves to no event at all.
fn resolve_command(text: &str) -> Option<Event> {
    let command = text.split_whitespace().next()?;
    let command = command.split('@').next().unwrap_or(command);

    match command {
        "/start" => Some(Event::Start),
        "/joke" => Some(Event::RequestJoke),
        "/top_jokes" => Some(Event::TopList),
        "/check" => Some(Event::Check),
        "/help" => Some(Event::Help),
        _ => None,
    }
}

/// Callback tokens are the opaque strings our own keyboards carry. They
/// come back from the open internet, so parse defensively: any token that
/// is not exactly what we emit is ignored.
fn resolve_callback(data: &str) -> Option<Event> {
    let mut parts = data.split(':');
    match parts.next()? {
        "lang" => {
            let locale = match parts.next()? {
                "uk" => Locale::Uk,
                "en" => Locale::En,
                _ => return None,
            };
            match parts.next() {
                None => Some(Event::SetLocale(locale)),
                Some(_) => None,
            }
        }
        "vote" => {
            let vote = match parts.next()? {
                "like" => Vote::Like,
                "dislike" => Vote::Dislike,
                _ => return None,
            };
            let joke_id = parts.next()?;
            if joke_id.is_empty() || parts.next().is_some() {
                return None;
            }
            Some(Event::Vote {
                joke_id: joke_id.to_string(),
                vote,
            })
        }
        _ => None,
    }
}

pub struct Dispatcher {
    _handles: Vec<JoinHandle<()>>,
}

impl Dispatcher {
    /// Start the worker threads that drain the update queue. Each worker
    /// processes one update at a time; concurrency across users comes from
    /// running several workers.
    pub fn start(
        receiver: Receiver<Message>,
        api: Arc<Api>,
        quota: Arc<QuotaTracker>,
        ratings: Arc<RatingLedger>,
        workers: usize,
    ) -> Self {
        let mut handles = Vec::new();
        for _ in 0..workers.max(1) {
            let receiver = receiver.clone();
            let handler = Handler {
                api: api.clone(),
                quota: quota.clone(),
                ratings: ratings.clone(),
            };

            handles.push(thread::spawn(move || {
                while let Ok(update) = receiver.recv() {
                    handler.process(update);
                }
            }));
        }

        Self { _handles: handles }
    }
}

struct Handler {
    api: Arc<Api>,
    quota: Arc<QuotaTracker>,
    ratings: Arc<RatingLedger>,
}

impl Handler {
    fn process(&self, update: Message) {
        let update: Update = match serde_json::from_slice(&update.body) {
            Ok(update) => update,
            Err(e) => {
                warn!("Dropping undecodable update: {e}");
                return;
            }
        };

        self.api.runtime.block_on(self.handle_update(update));
    }

    async fn handle_update(&self, update: Update) {
        if let Some(message) = update.message {
            self.handle_chat_message(message).await;
        } else if let Some(callback) = update.callback_query {
            self.handle_callback(callback).await;
        }
    }

    async fn handle_chat_message(&self, message: IncomingMessage) {
        let Some(text) = message.text.as_deref() else {
            return;
        };
        let chat_id = message.chat.id;
        let Some(event) = resolve_command(text) else {
            debug!("Ignoring a non-command message in chat {chat_id}");
            return;
        };

        let outcome = match event {
            Event::Start => self.handle_start(chat_id).await,
            Event::RequestJoke => self.handle_joke(chat_id).await,
            Event::Check => self.handle_check(chat_id).await,
            Event::TopList => self.handle_top(chat_id).await,
            Event::Help => self.handle_help(chat_id).await,
            // These two only ever arrive as callbacks.
            Event::SetLocale(_) | Event::Vote { .. } => Ok(()),
        };

        if let Err(e) = outcome {
            error!("Failed handling an update for chat {chat_id}: {e}");
        }
    }

    async fn handle_callback(&self, callback: CallbackQuery) {
        let Some(data) = callback.data.as_deref() else {
            return;
        };
        let Some(event) = resolve_callback(data) else {
            warn!("Ignoring an unrecognized callback token");
            return;
        };

        let outcome = match event {
            Event::SetLocale(locale) => self.handle_set_locale(&callback, locale).await,
            Event::Vote { joke_id, vote } => self.handle_vote(&callback, &joke_id, vote).await,
            _ => Ok(()),
        };

        if let Err(e) = outcome {
            error!("Failed handling a callback: {e}");
        }
    }

    async fn handle_start(&self, chat_id: i64) -> Result<(), ApiError> {
        let record = self.quota.resolve_user(&chat_id.to_string(), Utc::now()).await;

        let keyboard = InlineKeyboard::row(vec![
            InlineButton::new("Українська", "lang:uk"),
            InlineButton::new("English", "lang:en"),
        ]);
        self.api
            .messenger
            .send_message(chat_id, text::CHOOSE_LANGUAGE, Some(keyboard))
            .await?;

        self.api
            .messenger
            .send_message(chat_id, text::help(record.locale), None)
            .await
    }

    async fn handle_help(&self, chat_id: i64) -> Result<(), ApiError> {
        let locale = self.quota.locale(&chat_id.to_string()).await;
        self.api
            .messenger
            .send_message(chat_id, text::help(locale), None)
            .await
    }

    async fn handle_check(&self, chat_id: i64) -> Result<(), ApiError> {
        let user_id = chat_id.to_string();
        let locale = self.quota.locale(&user_id).await;
        let left = self
            .quota
            .remaining(&user_id, JOKES_CATEGORY, Utc::now())
            .await;

        self.api
            .messenger
            .send_message(chat_id, &text::check_report(locale, left), None)
            .await
    }

    /// The only multi-step path. A quota slot is reserved up front and
    /// handed back if the providers fail before anything was delivered, so
    /// an outage does not burn the user's day.
    async fn handle_joke(&self, chat_id: i64) -> Result<(), ApiError> {
        let user_id = chat_id.to_string();
        let locale = self.quota.locale(&user_id).await;

        match self
            .quota
            .try_consume(&user_id, JOKES_CATEGORY, Utc::now())
            .await
        {
            Consumption::Denied => {
                return self
                    .api
                    .messenger
                    .send_message(chat_id, text::limit_reached(locale), None)
                    .await;
            }
            Consumption::Authorized => {}
        }

        let joke = match self.fetch_localized_joke(locale).await {
            Ok(joke) => joke,
            Err(e) => {
                error!("Joke delivery failed for chat {chat_id}: {e}");
                self.quota.release(&user_id, JOKES_CATEGORY).await;
                return self
                    .api
                    .messenger
                    .send_message(chat_id, text::joke_failed(locale), None)
                    .await;
            }
        };

        let joke_id = match self
            .ratings
            .insert(joke.setup.clone(), joke.punchline.clone())
            .await
        {
            Ok(id) => id,
            Err(e) => {
                error!("Could not record a delivered joke for chat {chat_id}: {e}");
                self.quota.release(&user_id, JOKES_CATEGORY).await;
                return self
                    .api
                    .messenger
                    .send_message(chat_id, text::joke_failed(locale), None)
                    .await;
            }
        };

        let keyboard = InlineKeyboard::row(vec![
            InlineButton::new("👍", &format!("vote:like:{joke_id}")),
            InlineButton::new("👎", &format!("vote:dislike:{joke_id}")),
        ]);
        self.api
            .messenger
            .send_message(
                chat_id,
                &text::joke_message(locale, &joke.setup, &joke.punchline),
                Some(keyboard),
            )
            .await
    }

    async fn fetch_localized_joke(
        &self,
        locale: Locale,
    ) -> Result<crate::apis::jokes::Joke, ApiError> {
        let mut joke = self.api.jokes.random_joke().await?;

        // The provider serves English; everything else goes through the
        // translation collaborator.
        if locale != Locale::En {
            joke.setup = self
                .api
                .translate
                .translate(&joke.setup, Locale::En.code(), locale.code())
                .await?;
            joke.punchline = self
                .api
                .translate
                .translate(&joke.punchline, Locale::En.code(), locale.code())
                .await?;
        }

        Ok(joke)
    }

    async fn handle_top(&self, chat_id: i64) -> Result<(), ApiError> {
        let locale = self.quota.locale(&chat_id.to_string()).await;

        match self.ratings.top(TOP_LIST_SIZE).await {
            None => {
                self.api
                    .messenger
                    .send_message(chat_id, text::top_empty(locale), None)
                    .await
            }
            Some(ranked) => {
                let mut body = String::from(text::top_header(locale));
                for (position, (_, joke)) in ranked.iter().enumerate() {
                    body.push_str(&text::top_entry(position + 1, joke));
                }

                self.api
                    .messenger
                    .send_message(chat_id, &body, None)
                    .await
            }
        }
    }

    async fn handle_set_locale(
        &self,
        callback: &CallbackQuery,
        locale: Locale,
    ) -> Result<(), ApiError> {
        let Some(message) = callback.message.as_ref() else {
            return Ok(());
        };

        self.quota
            .set_locale(&message.chat.id.to_string(), locale, Utc::now())
            .await;

        self.api
            .messenger
            .answer_callback(&callback.id, text::language_changed(locale))
            .await?;
        self.api
            .messenger
            .send_message(message.chat.id, text::language_changed(locale), None)
            .await
    }

    async fn handle_vote(
        &self,
        callback: &CallbackQuery,
        joke_id: &str,
        vote: Vote,
    ) -> Result<(), ApiError> {
        let message = callback.message.as_ref();
        let locale = match message {
            Some(message) => self.quota.locale(&message.chat.id.to_string()).await,
            None => Locale::default(),
        };

        match self.ratings.apply_vote(joke_id, vote).await {
            Ok(updated) => {
                self.api
                    .messenger
                    .answer_callback(&callback.id, text::vote_counted(locale))
                    .await?;

                if let Some(message) = message {
                    self.api
                        .messenger
                        .clear_reply_markup(message.chat.id, message.message_id)
                        .await?;
                    self.api
                        .messenger
                        .send_message(message.chat.id, &text::tally(locale, &updated), None)
                        .await?;
                }
                Ok(())
            }
            Err(RatingsError::UnknownJoke(_)) => {
                // The record was lost between delivery and vote, most likely
                // to a store reset. Acknowledge softly and move on.
                self.api
                    .messenger
                    .answer_callback(&callback.id, text::vote_unknown(locale))
                    .await
            }
            Err(e) => {
                error!("Could not apply a vote to joke [{joke_id}]: {e}");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::apis::jokes::JokesConfig;
    use crate::apis::messenger::MessengerConfig;
    use crate::apis::translate::TranslateConfig;
    use crate::apis::Apis;
    use crate::quota::DAILY_LIMIT;
    use crate::storage::Storage;

    use tokio::runtime::Runtime;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn commands_resolve_to_events() {
        assert_eq!(resolve_command("/start"), Some(Event::Start));
        assert_eq!(resolve_command("/joke"), Some(Event::RequestJoke));
        assert_eq!(resolve_command("/joke@SomeBot"), Some(Event::RequestJoke));
        assert_eq!(resolve_command("/top_jokes"), Some(Event::TopList));
        assert_eq!(resolve_command("/check extra words"), Some(Event::Check));
        assert_eq!(resolve_command("/help"), Some(Event::Help));

        assert_eq!(resolve_command("/unknown"), None);
        assert_eq!(resolve_command("just chatting"), None);
        assert_eq!(resolve_command(""), None);
        assert_eq!(resolve_command("   "), None);
    }

    #[test]
    fn callback_tokens_resolve_to_events() {
        assert_eq!(resolve_callback("lang:uk"), Some(Event::SetLocale(Locale::Uk)));
        assert_eq!(resolve_callback("lang:en"), Some(Event::SetLocale(Locale::En)));
        assert_eq!(
            resolve_callback("vote:like:123456"),
            Some(Event::Vote {
                joke_id: "123456".to_string(),
                vote: Vote::Like,
            })
        );
        assert_eq!(
            resolve_callback("vote:dislike:654321"),
            Some(Event::Vote {
                joke_id: "654321".to_string(),
                vote: Vote::Dislike,
            })
        );
    }

    #[test]
    fn malformed_callback_tokens_are_ignored() {
        for token in [
            "",
            "lang",
            "lang:fr",
            "lang:uk:extra",
            "vote",
            "vote:maybe:123456",
            "vote:like",
            "vote:like:",
            "vote:like:123:456",
            "something:else",
        ] {
            assert_eq!(resolve_callback(token), None, "token {token:?}");
        }
    }

    // Field order matters: the mock server must drop while the runtime
    // hosting it is still alive.
    struct TestBot {
        server: MockServer,
        handler: Handler,
        quota: Arc<QuotaTracker>,
        ratings: Arc<RatingLedger>,
        rt: Runtime,
    }

    // The handler is exercised outside any async context, the way the
    // worker threads run it: the Api aggregate owns its runtime and the
    // test owns another for the mock server and assertions.
    fn test_bot() -> TestBot {
        let rt = Runtime::new().unwrap();
        let server = rt.block_on(MockServer::start());

        let api = Arc::new(Api::new(Apis {
            messenger: MessengerConfig {
                token: "TEST".to_string(),
                base_url: server.uri(),
                webhook_url: None,
                api_timeout_seconds: None,
            },
            jokes: Some(JokesConfig {
                url: format!("{}/random_joke", server.uri()),
                api_timeout_seconds: None,
            }),
            translate: Some(TranslateConfig {
                url: format!("{}/translate", server.uri()),
                api_key: None,
                api_timeout_seconds: None,
            }),
        }));

        let storage = Arc::new(Storage::in_memory());
        let quota = Arc::new(rt.block_on(QuotaTracker::new(storage.clone())));
        let ratings = Arc::new(rt.block_on(RatingLedger::new(storage)));

        let handler = Handler {
            api,
            quota: quota.clone(),
            ratings: ratings.clone(),
        };

        TestBot {
            server,
            handler,
            quota,
            ratings,
            rt,
        }
    }

    fn command_update(chat_id: i64, text: &str) -> Message {
        Message {
            body: serde_json::json!({
                "update_id": 1,
                "message": {
                    "message_id": 5,
                    "chat": { "id": chat_id },
                    "text": text,
                },
            })
            .to_string()
            .into_bytes(),
        }
    }

    fn callback_update(chat_id: i64, data: &str) -> Message {
        Message {
            body: serde_json::json!({
                "update_id": 2,
                "callback_query": {
                    "id": "cb1",
                    "data": data,
                    "message": {
                        "message_id": 5,
                        "chat": { "id": chat_id },
                    },
                },
            })
            .to_string()
            .into_bytes(),
        }
    }

    fn mount_messenger_ok(bot: &TestBot) {
        bot.rt.block_on(
            Mock::given(method("POST"))
                .and(path("/botTEST/sendMessage"))
                .respond_with(ResponseTemplate::new(200))
                .mount(&bot.server),
        );
        bot.rt.block_on(
            Mock::given(method("POST"))
                .and(path("/botTEST/answerCallbackQuery"))
                .respond_with(ResponseTemplate::new(200))
                .mount(&bot.server),
        );
        bot.rt.block_on(
            Mock::given(method("POST"))
                .and(path("/botTEST/editMessageReplyMarkup"))
                .respond_with(ResponseTemplate::new(200))
                .mount(&bot.server),
        );
    }

    #[test]
    fn a_joke_request_consumes_quota_and_records_the_joke() {
        let bot = test_bot();
        mount_messenger_ok(&bot);
        bot.rt.block_on(
            Mock::given(method("GET"))
                .and(path("/random_joke"))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "setup": "Setup?",
                    "punchline": "Punchline."
                })))
                .mount(&bot.server),
        );
        bot.rt.block_on(
            Mock::given(method("POST"))
                .and(path("/translate"))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_json(serde_json::json!({ "translatedText": "переклад" })),
                )
                .mount(&bot.server),
        );

        bot.handler.process(command_update(42, "/joke"));

        assert_eq!(
            bot.rt
                .block_on(bot.quota.remaining("42", JOKES_CATEGORY, Utc::now())),
            DAILY_LIMIT - 1
        );
        let top = bot.rt.block_on(bot.ratings.top(1)).unwrap();
        // The default locale is Ukrainian, so the stored joke is the
        // translated text.
        assert_eq!(top[0].1.setup, "переклад");
    }

    #[test]
    fn a_provider_failure_hands_the_reserved_slot_back() {
        let bot = test_bot();
        mount_messenger_ok(&bot);
        bot.rt.block_on(
            Mock::given(method("GET"))
                .and(path("/random_joke"))
                .respond_with(ResponseTemplate::new(500))
                .mount(&bot.server),
        );

        bot.handler.process(command_update(42, "/joke"));

        assert_eq!(
            bot.rt
                .block_on(bot.quota.remaining("42", JOKES_CATEGORY, Utc::now())),
            DAILY_LIMIT
        );
        assert_eq!(bot.rt.block_on(bot.ratings.len()), 0);
    }

    #[test]
    fn an_exhausted_user_gets_the_limit_message_and_no_provider_call() {
        let bot = test_bot();
        bot.rt.block_on(
            Mock::given(method("POST"))
                .and(path("/botTEST/sendMessage"))
                .and(body_partial_json(serde_json::json!({
                    "text": text::limit_reached(Locale::Uk),
                })))
                .respond_with(ResponseTemplate::new(200))
                .expect(1)
                .mount(&bot.server),
        );
        let now = Utc::now();
        for _ in 0..DAILY_LIMIT {
            bot.rt
                .block_on(bot.quota.try_consume("42", JOKES_CATEGORY, now));
        }

        // No joke provider mock is mounted; if the handler called it the
        // 404 would release the slot and skip the limit message.
        bot.handler.process(command_update(42, "/joke"));

        assert_eq!(
            bot.rt
                .block_on(bot.quota.remaining("42", JOKES_CATEGORY, now)),
            0
        );
    }

    #[test]
    fn a_vote_callback_updates_the_ledger() {
        let bot = test_bot();
        mount_messenger_ok(&bot);
        let joke_id = bot
            .rt
            .block_on(bot.ratings.insert("s".to_string(), "p".to_string()))
            .unwrap();

        bot.handler
            .process(callback_update(42, &format!("vote:like:{joke_id}")));

        let top = bot.rt.block_on(bot.ratings.top(1)).unwrap();
        assert_eq!(top[0].1.likes, 1);
    }

    #[test]
    fn a_vote_for_an_unknown_joke_is_acknowledged_softly() {
        let bot = test_bot();
        bot.rt.block_on(
            Mock::given(method("POST"))
                .and(path("/botTEST/answerCallbackQuery"))
                .and(body_partial_json(serde_json::json!({
                    "text": text::vote_unknown(Locale::Uk),
                })))
                .respond_with(ResponseTemplate::new(200))
                .expect(1)
                .mount(&bot.server),
        );

        bot.handler.process(callback_update(42, "vote:like:999999"));

        assert!(bot.rt.block_on(bot.ratings.top(1)).is_none());
    }

    #[test]
    fn a_language_callback_switches_the_locale() {
        let bot = test_bot();
        mount_messenger_ok(&bot);

        bot.handler.process(callback_update(42, "lang:en"));

        assert_eq!(bot.rt.block_on(bot.quota.locale("42")), Locale::En);
    }

    #[test]
    fn garbage_payloads_are_dropped_without_side_effects() {
        let bot = test_bot();

        bot.handler.process(Message {
            body: b"not json".to_vec(),
        });
        bot.handler.process(callback_update(42, "vote:like:"));
        bot.handler.process(command_update(42, "hello there"));

        assert_eq!(bot.rt.block_on(bot.quota.user_count()), 0);
        assert!(bot.rt.block_on(bot.ratings.top(1)).is_none());
    }
}
