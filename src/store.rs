//! Keyed JSON documents with a sequence-numbered change feed.
//!
//! Every write bumps the store-wide sequence number. A change feed returns, per key, only the
//! latest change after the requested point, so replaying from the beginning yields the current
//! documents plus the deletions the store still remembers.

use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::StoreError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Since {
    Beginning,
    Now,
    Seq(u64),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Upsert {
    Unchanged,
    Written(u64),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Change {
    pub seq: u64,
    pub key: String,
    /// `None` for a deletion.
    pub doc: Option<Value>,
}

pub trait DocumentStore: Send {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Replaces the document at `key` with what `update` returns for the current one. Returning
    /// `None`, or a document equal to the current one, leaves the store untouched.
    fn upsert(
        &mut self,
        key: &str,
        update: &mut dyn FnMut(Option<&Value>) -> Option<Value>,
    ) -> Result<Upsert, StoreError>;

    /// Returns false if there was nothing to delete.
    fn delete(&mut self, key: &str) -> Result<bool, StoreError>;

    fn changes(&self, prefix: &str, since: Since) -> Result<Vec<Change>, StoreError>;

    fn last_seq(&self) -> u64;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Entry {
    seq: u64,
    doc: Option<Value>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct Documents {
    seq: u64,
    entries: BTreeMap<String, Entry>,
}

impl Documents {
    fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key).and_then(|entry| entry.doc.as_ref())
    }

    fn upsert(&mut self, key: &str, update: &mut dyn FnMut(Option<&Value>) -> Option<Value>) -> Upsert {
        let current = self.get(key);
        match update(current) {
            Some(doc) if Some(&doc) != current => {
                self.seq += 1;
                self.entries.insert(key.to_string(), Entry { seq: self.seq, doc: Some(doc) });
                Upsert::Written(self.seq)
            }
            _ => Upsert::Unchanged,
        }
    }

    fn delete(&mut self, key: &str) -> bool {
        if self.get(key).is_none() {
            return false;
        }
        self.seq += 1;
        self.entries.insert(key.to_string(), Entry { seq: self.seq, doc: None });
        true
    }

    fn changes(&self, prefix: &str, since: Since) -> Vec<Change> {
        let after = match since {
            Since::Beginning => 0,
            Since::Now => self.seq,
            Since::Seq(seq) => seq,
        };
        let mut changes: Vec<Change> = self
            .entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .filter(|(_, entry)| entry.seq > after && (since != Since::Beginning || entry.doc.is_some()))
            .map(|(key, entry)| Change {
                seq: entry.seq,
                key: key.clone(),
                doc: entry.doc.clone(),
            })
            .collect();
        changes.sort_by_key(|change| change.seq);
        changes
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: Documents,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }
}

impl DocumentStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.documents.get(key).cloned())
    }

    fn upsert(
        &mut self,
        key: &str,
        update: &mut dyn FnMut(Option<&Value>) -> Option<Value>,
    ) -> Result<Upsert, StoreError> {
        Ok(self.documents.upsert(key, update))
    }

    fn delete(&mut self, key: &str) -> Result<bool, StoreError> {
        Ok(self.documents.delete(key))
    }

    fn changes(&self, prefix: &str, since: Since) -> Result<Vec<Change>, StoreError> {
        Ok(self.documents.changes(prefix, since))
    }

    fn last_seq(&self) -> u64 {
        self.documents.seq
    }
}

/// The whole store in one JSON file, rewritten through a temporary file on every write.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    documents: Documents,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<JsonFileStore, StoreError> {
        let path = path.into();
        let documents = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| StoreError::Json {
                key: path.display().to_string(),
                source,
            })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Documents::default(),
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.display().to_string(),
                    source,
                })
            }
        };
        debug!("opened store {} at seq {}", path.display(), documents.seq);
        Ok(JsonFileStore { path, documents })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(&self.documents).map_err(|source| StoreError::Json {
            key: self.path.display().to_string(),
            source,
        })?;
        write_atomic(&self.path, &bytes).map_err(|source| StoreError::Io {
            path: self.path.display().to_string(),
            source,
        })
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}

impl DocumentStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.documents.get(key).cloned())
    }

    fn upsert(
        &mut self,
        key: &str,
        update: &mut dyn FnMut(Option<&Value>) -> Option<Value>,
    ) -> Result<Upsert, StoreError> {
        let upsert = self.documents.upsert(key, update);
        if let Upsert::Written(seq) = upsert {
            self.persist()?;
            debug!(seq, "wrote {key}");
        }
        Ok(upsert)
    }

    fn delete(&mut self, key: &str) -> Result<bool, StoreError> {
        let deleted = self.documents.delete(key);
        if deleted {
            self.persist()?;
            debug!("deleted {key}");
        }
        Ok(deleted)
    }

    fn changes(&self, prefix: &str, since: Since) -> Result<Vec<Change>, StoreError> {
        Ok(self.documents.changes(prefix, since))
    }

    fn last_seq(&self) -> u64 {
        self.documents.seq
    }
}
