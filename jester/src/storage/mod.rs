use async_trait::async_trait;

mod memory;
mod sled;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use std::collections::HashMap;

#[derive(Deserialize)]
pub struct Config {
    pub sled: Option<sled::Config>,
}

/// Persistence for the two record sets jester keeps: user quota records
/// and joke rating records. Each set is a full mapping of string id to
/// JSON encoded record. Callers always read and write an entire set, so
/// any read-modify-write sequence must happen under the caller's own
/// serialization boundary.
pub struct Storage {
    database: Box<dyn StorageProvider + Send + Sync>,
}

#[derive(Debug)]
pub enum StorageError {
    CouldNotAccessStorage(String),
    Access(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CouldNotAccessStorage(ref e) => {
                write!(f, "Accessing the storage datastore was not possible: {e}")
            }
            StorageError::Access(ref e) => write!(f, "There was a failure accessing a set: {e}"),
        }
    }
}

impl std::error::Error for StorageError {}

#[async_trait]
pub trait StorageProvider {
    async fn load_set(&self, set: &str) -> Result<Vec<(String, Vec<u8>)>, StorageError>;
    /// Replace the full contents of a set. A concurrent reader must see
    /// either the previous contents or the new contents, never a mix.
    async fn replace_set(
        &self,
        set: &str,
        entries: Vec<(String, Vec<u8>)>,
    ) -> Result<(), StorageError>;
}

impl Storage {
    pub fn new(config: Config) -> Result<Self, StorageError> {
        let database: Box<dyn StorageProvider + Send + Sync> = match config.sled {
            Some(sled) => Box::new(sled::Sled::new(sled)?),
            None => {
                warn!("No storage backend configured; state will not survive a restart");
                Box::new(memory::Memory::new())
            }
        };

        Ok(Storage { database })
    }

    pub fn in_memory() -> Self {
        Storage {
            database: Box::new(memory::Memory::new()),
        }
    }

    /// Load a full record set. This fails soft: an absent or unreadable
    /// backing store yields an empty mapping, and entries that no longer
    /// decode are skipped, so the service keeps running with whatever
    /// state is recoverable.
    pub async fn load_set<T: DeserializeOwned>(&self, set: &str) -> HashMap<String, T> {
        let entries = match self.database.load_set(set).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Could not load set [{set}], starting it empty: {e}");
                return HashMap::new();
            }
        };

        let mut records = HashMap::new();
        for (id, value) in entries {
            match serde_json::from_slice(&value) {
                Ok(record) => {
                    records.insert(id, record);
                }
                Err(e) => warn!("Skipping undecodable record [{id}] in set [{set}]: {e}"),
            }
        }

        records
    }

    /// Persist a full record set, overwriting whatever the set held before.
    pub async fn save_set<T: Serialize>(
        &self,
        set: &str,
        records: &HashMap<String, T>,
    ) -> Result<(), StorageError> {
        let mut entries = Vec::with_capacity(records.len());
        for (id, record) in records {
            let value = serde_json::to_vec(record).map_err(|e| {
                StorageError::Access(format!("Could not encode record [{id}] in set [{set}]: {e}"))
            })?;
            entries.push((id.clone(), value));
        }

        self.database.replace_set(set, entries).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
    struct Record {
        name: String,
        count: u32,
    }

    fn sample_records() -> HashMap<String, Record> {
        let mut records = HashMap::new();
        for (id, name, count) in [("1", "first", 3), ("2", "second", 0), ("3", "third", 9)] {
            records.insert(
                id.to_string(),
                Record {
                    name: name.to_string(),
                    count,
                },
            );
        }
        records
    }

    #[tokio::test]
    async fn round_trip_through_memory_provider() {
        let storage = Storage::in_memory();
        let records = sample_records();

        storage.save_set("things", &records).await.unwrap();
        let loaded: HashMap<String, Record> = storage.load_set("things").await;

        assert_eq!(loaded, records);
    }

    #[tokio::test]
    async fn round_trip_through_sled_provider() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(Config {
            sled: Some(super::sled::Config {
                path: dir.path().join("db").to_string_lossy().to_string(),
            }),
        })
        .unwrap();
        let records = sample_records();

        storage.save_set("things", &records).await.unwrap();
        let loaded: HashMap<String, Record> = storage.load_set("things").await;

        assert_eq!(loaded, records);
    }

    #[tokio::test]
    async fn save_replaces_the_previous_set_contents() {
        let storage = Storage::in_memory();
        storage.save_set("things", &sample_records()).await.unwrap();

        let mut reduced = HashMap::new();
        reduced.insert(
            "9".to_string(),
            Record {
                name: "only".to_string(),
                count: 1,
            },
        );
        storage.save_set("things", &reduced).await.unwrap();

        let loaded: HashMap<String, Record> = storage.load_set("things").await;
        assert_eq!(loaded, reduced);
    }

    #[tokio::test]
    async fn load_skips_undecodable_entries() {
        let storage = Storage::in_memory();
        storage
            .database
            .replace_set(
                "things",
                vec![
                    ("1".to_string(), b"{\"name\":\"ok\",\"count\":1}".to_vec()),
                    ("2".to_string(), b"not json at all".to_vec()),
                ],
            )
            .await
            .unwrap();

        let loaded: HashMap<String, Record> = storage.load_set("things").await;
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded["1"].name, "ok");
    }

    #[tokio::test]
    async fn sets_are_independent() {
        let storage = Storage::in_memory();
        storage.save_set("left", &sample_records()).await.unwrap();

        let right: HashMap<String, Record> = storage.load_set("right").await;
        assert!(right.is_empty());
    }
}
