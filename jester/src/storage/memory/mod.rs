use async_trait::async_trait;

use std::collections::HashMap;
use std::sync::Mutex;

use super::{StorageError, StorageProvider};

/// Keeps every set in process memory. Used by the tests and by deployments
/// that run without a configured backend.
pub struct Memory {
    sets: Mutex<HashMap<String, HashMap<String, Vec<u8>>>>,
}

impl Memory {
    pub fn new() -> Self {
        Self {
            sets: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl StorageProvider for Memory {
    async fn load_set(&self, set: &str) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
        let sets = self
            .sets
            .lock()
            .map_err(|e| StorageError::Access(format!("Memory set lock poisoned: {e}")))?;

        let entries = match sets.get(set) {
            Some(entries) => entries
                .iter()
                .map(|(id, value)| (id.clone(), value.clone()))
                .collect(),
            None => Vec::new(),
        };

        Ok(entries)
    }

    async fn replace_set(
        &self,
        set: &str,
        entries: Vec<(String, Vec<u8>)>,
    ) -> Result<(), StorageError> {
        let mut sets = self
            .sets
            .lock()
            .map_err(|e| StorageError::Access(format!("Memory set lock poisoned: {e}")))?;

        sets.insert(set.to_string(), entries.into_iter().collect());
        Ok(())
    }
}
