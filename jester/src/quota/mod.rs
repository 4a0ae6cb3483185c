use chrono::{DateTime, Duration, Utc};

use serde::{Deserialize, Serialize};

use tokio::sync::Mutex;

use std::collections::HashMap;
use std::sync::Arc;

use crate::storage::Storage;

/// How many content items of one category a user may receive per window.
pub const DAILY_LIMIT: u32 = 20;

/// The only counter category wired up today. Records hold a counter per
/// category so adding another one later cannot interfere with this one.
pub const JOKES_CATEGORY: &str = "jokes";

const USERS_SET: &str = "users";

fn accounting_window() -> Duration {
    Duration::hours(24)
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum Locale {
    #[serde(rename = "uk")]
    Uk,
    #[serde(rename = "en")]
    En,
}

impl Default for Locale {
    fn default() -> Self {
        Locale::Uk
    }
}

impl Locale {
    pub fn code(&self) -> &'static str {
        match self {
            Locale::Uk => "uk",
            Locale::En => "en",
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct UserRecord {
    /// Content served per category since the window started.
    #[serde(default)]
    pub counters: HashMap<String, u32>,
    pub window_start: DateTime<Utc>,
    #[serde(default)]
    pub locale: Locale,
}

impl UserRecord {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            counters: HashMap::new(),
            window_start: now,
            locale: Locale::default(),
        }
    }

    pub fn served(&self, category: &str) -> u32 {
        self.counters.get(category).copied().unwrap_or(0)
    }

    /// Reset the counters if the accounting window has passed. Returns
    /// whether a reset was applied so the caller knows to persist it.
    pub fn roll_if_expired(&mut self, now: DateTime<Utc>) -> bool {
        if now - self.window_start > accounting_window() {
            self.counters.clear();
            self.window_start = now;
            true
        } else {
            false
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Consumption {
    Authorized,
    Denied,
}

/// Tracks per user daily usage. All record access goes through one lock
/// held across the full read-modify-persist sequence, which is what keeps
/// concurrent webhook deliveries from losing each other's updates.
pub struct QuotaTracker {
    storage: Arc<Storage>,
    users: Mutex<HashMap<String, UserRecord>>,
}

impl QuotaTracker {
    pub async fn new(storage: Arc<Storage>) -> Self {
        let users = storage.load_set(USERS_SET).await;
        Self {
            storage,
            users: Mutex::new(users),
        }
    }

    pub async fn user_count(&self) -> usize {
        self.users.lock().await.len()
    }

    /// Returns the user's record, creating and persisting a default one on
    /// first contact.
    pub async fn resolve_user(&self, user_id: &str, now: DateTime<Utc>) -> UserRecord {
        let mut users = self.users.lock().await;
        match users.get(user_id) {
            Some(record) => record.clone(),
            None => {
                let record = UserRecord::new(now);
                users.insert(user_id.to_string(), record.clone());
                self.persist(&users).await;
                record
            }
        }
    }

    /// The sole gate in front of the external provider calls. Applies the
    /// window rollover, then either takes one slot and persists or denies
    /// without mutating the counter.
    pub async fn try_consume(
        &self,
        user_id: &str,
        category: &str,
        now: DateTime<Utc>,
    ) -> Consumption {
        let mut users = self.users.lock().await;
        let mut dirty = !users.contains_key(user_id);
        let record = users
            .entry(user_id.to_string())
            .or_insert_with(|| UserRecord::new(now));
        dirty |= record.roll_if_expired(now);

        let outcome = if record.served(category) < DAILY_LIMIT {
            *record.counters.entry(category.to_string()).or_insert(0) += 1;
            dirty = true;
            Consumption::Authorized
        } else {
            Consumption::Denied
        };

        if dirty {
            self.persist(&users).await;
        }
        outcome
    }

    /// Hands back a slot taken by `try_consume` when the delivery it was
    /// reserved for never happened.
    pub async fn release(&self, user_id: &str, category: &str) {
        let mut users = self.users.lock().await;
        let Some(record) = users.get_mut(user_id) else {
            return;
        };
        let Some(counter) = record.counters.get_mut(category) else {
            return;
        };
        if *counter == 0 {
            return;
        }
        *counter -= 1;
        self.persist(&users).await;
    }

    /// How many items the user may still receive in the current window.
    /// Read only in spirit, but an expired window is persisted here too so
    /// a stale window start never survives a report.
    pub async fn remaining(&self, user_id: &str, category: &str, now: DateTime<Utc>) -> u32 {
        let mut users = self.users.lock().await;
        let mut dirty = !users.contains_key(user_id);
        let record = users
            .entry(user_id.to_string())
            .or_insert_with(|| UserRecord::new(now));
        dirty |= record.roll_if_expired(now);
        let left = DAILY_LIMIT.saturating_sub(record.served(category));

        if dirty {
            self.persist(&users).await;
        }
        left
    }

    pub async fn set_locale(&self, user_id: &str, locale: Locale, now: DateTime<Utc>) {
        let mut users = self.users.lock().await;
        users
            .entry(user_id.to_string())
            .or_insert_with(|| UserRecord::new(now))
            .locale = locale;
        self.persist(&users).await;
    }

    pub async fn locale(&self, user_id: &str) -> Locale {
        let users = self.users.lock().await;
        users
            .get(user_id)
            .map(|record| record.locale)
            .unwrap_or_default()
    }

    /// A failed save is logged rather than propagated. The in-memory state
    /// stays authoritative for the process lifetime and the next successful
    /// save writes the full set again.
    async fn persist(&self, users: &HashMap<String, UserRecord>) {
        if let Err(e) = self.storage.save_set(USERS_SET, users).await {
            error!("Failed to persist user records: {e}");
        }
    }
}
