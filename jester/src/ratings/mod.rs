use ring::rand::{SecureRandom, SystemRandom};

use serde::{Deserialize, Serialize};

use tokio::sync::Mutex;

use std::collections::HashMap;
use std::sync::Arc;

use crate::storage::Storage;

const JOKES_SET: &str = "jokes";

// Id generation retries on collision; with a six digit id space running out
// of attempts means the ledger is pathologically full.
const MAX_ID_ATTEMPTS: u32 = 64;

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct JokeRecord {
    pub setup: String,
    pub punchline: String,
    #[serde(default)]
    pub likes: u32,
    #[serde(default)]
    pub dislikes: u32,
    /// Insertion sequence, used as the deterministic ranking tie-break.
    /// Restored as max + 1 when the set is loaded, so ordering survives
    /// process restarts.
    #[serde(default)]
    pub seq: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Vote {
    Like,
    Dislike,
}

#[derive(Debug)]
pub enum RatingsError {
    /// A vote arrived for an id the ledger does not know. Expected when the
    /// store was reset between delivery and vote; the caller reports it
    /// softly instead of failing the handler.
    UnknownJoke(String),
    IdGeneration,
}

impl std::fmt::Display for RatingsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RatingsError::UnknownJoke(id) => write!(f, "No joke with id [{id}] is on record"),
            RatingsError::IdGeneration => write!(f, "Could not generate an unused joke id"),
        }
    }
}

impl std::error::Error for RatingsError {}

struct LedgerState {
    records: HashMap<String, JokeRecord>,
    next_seq: u64,
}

/// The durable community rating ledger. Records are created when a joke is
/// delivered, mutated only by votes, and never deleted; ratings come from
/// the whole user population, not just the original recipient.
pub struct RatingLedger {
    storage: Arc<Storage>,
    rng: SystemRandom,
    jokes: Mutex<LedgerState>,
}

impl RatingLedger {
    pub async fn new(storage: Arc<Storage>) -> Self {
        let records: HashMap<String, JokeRecord> = storage.load_set(JOKES_SET).await;
        let next_seq = records.values().map(|r| r.seq + 1).max().unwrap_or(0);

        Self {
            storage,
            rng: SystemRandom::new(),
            jokes: Mutex::new(LedgerState { records, next_seq }),
        }
    }

    pub async fn len(&self) -> usize {
        self.jokes.lock().await.records.len()
    }

    /// Store a freshly delivered joke with zero votes and return its new
    /// id. The id is guaranteed unused at the moment of insertion.
    pub async fn insert(&self, setup: String, punchline: String) -> Result<String, RatingsError> {
        let mut state = self.jokes.lock().await;
        let id = self.generate_id(&state.records)?;

        let record = JokeRecord {
            setup,
            punchline,
            likes: 0,
            dislikes: 0,
            seq: state.next_seq,
        };
        state.next_seq += 1;
        state.records.insert(id.clone(), record);

        self.persist(&state.records).await;
        Ok(id)
    }

    /// Count a vote and return the updated record. Unknown ids are reported,
    /// not fatal, because at least once webhook delivery means votes can
    /// outlive the record they refer to.
    pub async fn apply_vote(&self, joke_id: &str, vote: Vote) -> Result<JokeRecord, RatingsError> {
        let mut state = self.jokes.lock().await;
        let record = state
            .records
            .get_mut(joke_id)
            .ok_or_else(|| RatingsError::UnknownJoke(joke_id.to_string()))?;

        match vote {
            Vote::Like => record.likes += 1,
            Vote::Dislike => record.dislikes += 1,
        }
        let updated = record.clone();

        self.persist(&state.records).await;
        Ok(updated)
    }

    /// The top `n` jokes by likes, earlier insertions winning ties. `None`
    /// means the ledger holds no records at all, which is different from
    /// records existing that nobody has liked yet.
    pub async fn top(&self, n: usize) -> Option<Vec<(String, JokeRecord)>> {
        let state = self.jokes.lock().await;
        if state.records.is_empty() {
            return None;
        }

        let mut ranked: Vec<(String, JokeRecord)> = state
            .records
            .iter()
            .map(|(id, record)| (id.clone(), record.clone()))
            .collect();
        ranked.sort_by(|a, b| b.1.likes.cmp(&a.1.likes).then(a.1.seq.cmp(&b.1.seq)));
        ranked.truncate(n);

        Some(ranked)
    }

    /// Six decimal digits drawn from the system RNG, regenerated until the
    /// id is not already taken.
    fn generate_id(&self, records: &HashMap<String, JokeRecord>) -> Result<String, RatingsError> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let mut buf = [0u8; 4];
            if self.rng.fill(&mut buf).is_err() {
                error!("Failed to generate randomness!! This should be impossible.");
                return Err(RatingsError::IdGeneration);
            }

            let id = (100_000 + u32::from_be_bytes(buf) % 900_000).to_string();
            if !records.contains_key(&id) {
                return Ok(id);
            }
        }

        Err(RatingsError::IdGeneration)
    }

    async fn persist(&self, records: &HashMap<String, JokeRecord>) {
        if let Err(e) = self.storage.save_set(JOKES_SET, records).await {
            error!("Failed to persist joke records: {e}");
        }
    }
}
