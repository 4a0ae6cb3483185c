use async_trait::async_trait;

use serde::Deserialize;

use sled::{Batch, Db};

use super::{StorageError, StorageProvider};

#[derive(Deserialize)]
pub struct Config {
    pub path: String,
}

pub struct Sled {
    db: Db,
}

impl Sled {
    pub fn new(config: Config) -> Result<Self, StorageError> {
        let db: sled::Db = sled::open(&config.path)
            .map_err(|e| StorageError::CouldNotAccessStorage(e.to_string()))?;
        Ok(Self { db })
    }
}

#[async_trait]
impl StorageProvider for Sled {
    async fn load_set(&self, set: &str) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
        let tree = self
            .db
            .open_tree(set.as_bytes())
            .map_err(|_| StorageError::Access(format!("Could not open Sled tree {set}")))?;

        // Entries that fail to come back out of the tree are dropped here;
        // the facade layer treats them the same as undecodable records.
        let entries: Vec<(String, Vec<u8>)> = tree
            .iter()
            .filter_map(|x| match x {
                Ok((k, v)) => match String::from_utf8(k.to_vec()) {
                    Ok(id) => Some((id, v.to_vec())),
                    Err(_) => {
                        error!("Storage Error: non UTF-8 key in tree {set}");
                        None
                    }
                },
                Err(e) => {
                    error!("Storage Error Listing Entries: {e}");
                    None
                }
            })
            .collect();

        Ok(entries)
    }

    async fn replace_set(
        &self,
        set: &str,
        entries: Vec<(String, Vec<u8>)>,
    ) -> Result<(), StorageError> {
        let tree = self
            .db
            .open_tree(set.as_bytes())
            .map_err(|_| StorageError::Access(format!("Could not open Sled tree {set}")))?;

        // A single batch removes whatever the tree held and writes the new
        // contents, so concurrent readers never observe a partial set.
        let mut batch = Batch::default();
        for key in tree.iter().keys() {
            match key {
                Ok(key) => batch.remove(key),
                Err(e) => {
                    return Err(StorageError::Access(format!(
                        "Could not enumerate keys in Sled tree {set}: {e}"
                    )))
                }
            }
        }

        for (id, value) in entries {
            batch.insert(id.as_bytes(), value);
        }

        tree.apply_batch(batch)
            .map_err(|e| StorageError::Access(format!("Could not overwrite Sled tree {set}: {e}")))
    }
}
