pub mod jokes;
pub mod messenger;
pub mod translate;

use serde::Deserialize;
use tokio::runtime::Runtime;

use jokes::{Jokes, JokesConfig};
use messenger::{Messenger, MessengerConfig};
use translate::{Translate, TranslateConfig};

/// Used when an API config does not set its own request timeout. Provider
/// calls get one attempt within this bound; there is no retry.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 5;

/// All the external collaborators the dispatcher talks to, plus the
/// runtime its worker threads use to drive the async calls.
pub struct Api {
    pub runtime: Runtime,
    pub messenger: Messenger,
    pub jokes: Jokes,
    pub translate: Translate,
}

#[derive(Deserialize)]
pub struct Apis {
    pub messenger: MessengerConfig,
    pub jokes: Option<JokesConfig>,
    pub translate: Option<TranslateConfig>,
}

#[derive(Debug)]
pub enum ApiError {
    NetworkError(reqwest::Error),
    JokesError(jokes::JokesError),
    MessengerError(messenger::MessengerError),
    TranslateError(translate::TranslateError),
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::NetworkError(e) => write!(f, "Network Error: {e}"),
            ApiError::JokesError(e) => write!(f, "Joke Provider Error: {e}"),
            ApiError::MessengerError(e) => write!(f, "Messenger Error: {e}"),
            ApiError::TranslateError(e) => write!(f, "Translation Error: {e}"),
        }
    }
}

impl Api {
    pub fn new(config: Apis) -> Self {
        let messenger = Messenger::new(config.messenger);
        let jokes = Jokes::new(config.jokes.unwrap_or_default());
        let translate = Translate::new(config.translate.unwrap_or_default());

        Self {
            runtime: Runtime::new().unwrap(),
            messenger,
            jokes,
            translate,
        }
    }
}
