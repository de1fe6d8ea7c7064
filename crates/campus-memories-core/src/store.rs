use std::collections::BTreeSet;

use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::error::{StoreError, ValidationError};
use crate::model::{
    Category, CategoryCounts, CategoryFilter, Coordinate, Memory, MemoryId, PhotoPayload,
};
use crate::storage::KeyValueStorage;

pub const DEFAULT_STORAGE_KEY: &str = "campus-memories";
pub const DELETE_PROMPT: &str = "Are you sure you want to delete this memory?";

/// Yes/no prompt shown before a destructive action.
pub trait Confirmation {
    fn confirm(&mut self, prompt: &str) -> bool;
}

impl<F> Confirmation for F
where
    F: FnMut(&str) -> bool,
{
    fn confirm(&mut self, prompt: &str) -> bool {
        self(prompt)
    }
}

/// Unvalidated input for [`MemoryStore::create`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewMemory {
    pub title: String,
    pub description: String,
    pub category: Option<Category>,
    pub position: Coordinate,
    pub photos: Vec<PhotoPayload>,
}

impl NewMemory {
    /// Trim free-text fields and check the creation invariants.
    ///
    /// # Errors
    /// Returns a [`ValidationError`] for an empty title, a missing category, or
    /// a non-finite coordinate.
    pub fn validate(&self) -> Result<(String, String, Category), ValidationError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        let Some(category) = self.category else {
            return Err(ValidationError::MissingCategory);
        };
        if !self.position.is_finite() {
            return Err(ValidationError::InvalidCoordinate {
                lat: self.position.lat,
                lng: self.position.lng,
            });
        }
        Ok((title.to_string(), self.description.trim().to_string(), category))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum LoadSource {
    /// Nothing was stored under the key yet.
    Fresh,
    Restored,
    /// Some or all of the stored value was unusable and was dropped.
    Recovered,
}

#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
pub struct LoadReport {
    pub source: LoadSource,
    pub loaded: usize,
    pub skipped: Vec<String>,
}

/// Authoritative collection of memories, written through to durable storage on
/// every mutation.
#[derive(Debug)]
pub struct MemoryStore<S> {
    storage: S,
    key: String,
    memories: Vec<Memory>,
}

impl<S> MemoryStore<S>
where
    S: KeyValueStorage,
{
    /// Load the collection stored under [`DEFAULT_STORAGE_KEY`].
    pub fn load(storage: S) -> (Self, LoadReport) {
        Self::load_with_key(storage, DEFAULT_STORAGE_KEY)
    }

    /// Load the collection stored under `key`.
    ///
    /// Never fails: an unreadable or unparsable value yields an empty
    /// collection, and individual records that cannot be decoded, carry an
    /// empty title, or repeat an earlier id are dropped. Every drop is logged
    /// and listed in the returned report.
    pub fn load_with_key(storage: S, key: impl Into<String>) -> (Self, LoadReport) {
        let key = key.into();
        let (memories, report) = match storage.get(&key) {
            Ok(Some(raw)) if !raw.trim().is_empty() => decode_collection(&raw),
            Ok(_) => (
                Vec::new(),
                LoadReport { source: LoadSource::Fresh, loaded: 0, skipped: Vec::new() },
            ),
            Err(err) => {
                warn!(key = %key, error = %err, "memory storage unreadable; starting empty");
                (
                    Vec::new(),
                    LoadReport {
                        source: LoadSource::Recovered,
                        loaded: 0,
                        skipped: vec![err.to_string()],
                    },
                )
            }
        };
        debug!(key = %key, loaded = report.loaded, source = ?report.source, "memories loaded");
        (Self { storage, key, memories }, report)
    }

    /// Validate and append a new memory, then persist the whole collection.
    ///
    /// # Errors
    /// Returns [`StoreError::Validation`] without touching the collection when
    /// the input is invalid, and a storage/encode error (with the append rolled
    /// back) when persistence fails.
    pub fn create(&mut self, input: NewMemory) -> Result<Memory, StoreError> {
        let (title, description, category) = input.validate()?;

        let mut id = MemoryId::new();
        while self.memories.iter().any(|memory| memory.id == id) {
            id = MemoryId::new();
        }

        let memory = Memory {
            id,
            title,
            description,
            category,
            lat: input.position.lat,
            lng: input.position.lng,
            photos: input.photos,
            created_at: OffsetDateTime::now_utc(),
        };

        self.memories.push(memory.clone());
        if let Err(err) = self.persist() {
            self.memories.pop();
            return Err(err);
        }

        debug!(
            id = %memory.id,
            category = %memory.category,
            photos = memory.photos.len(),
            "memory created"
        );
        Ok(memory)
    }

    /// Remove the memory with `id` after the user confirms.
    ///
    /// Returns `Ok(true)` when a record was removed. A declined prompt or an
    /// unknown id leaves the collection and storage untouched.
    ///
    /// # Errors
    /// Returns a storage/encode error, with the record restored, when the
    /// rewritten collection cannot be persisted.
    pub fn delete(
        &mut self,
        id: &MemoryId,
        confirmation: &mut impl Confirmation,
    ) -> Result<bool, StoreError> {
        if !confirmation.confirm(DELETE_PROMPT) {
            debug!(id = %id, "memory delete declined");
            return Ok(false);
        }

        let Some(index) = self.memories.iter().position(|memory| &memory.id == id) else {
            debug!(id = %id, "memory delete ignored: unknown id");
            return Ok(false);
        };

        let removed = self.memories.remove(index);
        if let Err(err) = self.persist() {
            self.memories.insert(index, removed);
            return Err(err);
        }

        debug!(id = %id, remaining = self.memories.len(), "memory deleted");
        Ok(true)
    }

    fn persist(&mut self) -> Result<(), StoreError> {
        let encoded = serde_json::to_string(&self.memories)?;
        self.storage.set(&self.key, &encoded)?;
        Ok(())
    }
}

impl<S> MemoryStore<S> {
    /// Memories matching `filter`, in collection order.
    #[must_use]
    pub fn filter(&self, filter: CategoryFilter) -> Vec<&Memory> {
        self.memories.iter().filter(|memory| filter.matches(memory.category)).collect()
    }

    #[must_use]
    pub fn counts_by_category(&self) -> CategoryCounts {
        CategoryCounts::tally(&self.memories)
    }

    #[must_use]
    pub fn get(&self, id: &MemoryId) -> Option<&Memory> {
        self.memories.iter().find(|memory| &memory.id == id)
    }

    #[must_use]
    pub fn memories(&self) -> &[Memory] {
        &self.memories
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.memories.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.memories.is_empty()
    }

    #[must_use]
    pub fn storage_key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn into_storage(self) -> S {
        self.storage
    }
}

fn decode_collection(raw: &str) -> (Vec<Memory>, LoadReport) {
    let values = match serde_json::from_str::<Vec<serde_json::Value>>(raw) {
        Ok(values) => values,
        Err(err) => {
            warn!(error = %err, "stored memories are not a JSON array; starting empty");
            return (
                Vec::new(),
                LoadReport {
                    source: LoadSource::Recovered,
                    loaded: 0,
                    skipped: vec![format!("collection: {err}")],
                },
            );
        }
    };

    let mut memories = Vec::with_capacity(values.len());
    let mut seen = BTreeSet::new();
    let mut skipped = Vec::new();
    for (index, value) in values.into_iter().enumerate() {
        let memory = match serde_json::from_value::<Memory>(value) {
            Ok(memory) => memory,
            Err(err) => {
                skipped.push(format!("record {index}: {err}"));
                continue;
            }
        };
        if memory.title.trim().is_empty() {
            skipped.push(format!("record {index}: empty title"));
            continue;
        }
        if memory.id.as_str().trim().is_empty() {
            skipped.push(format!("record {index}: empty id"));
            continue;
        }
        if !seen.insert(memory.id.clone()) {
            skipped.push(format!("record {index}: duplicate id {}", memory.id));
            continue;
        }
        memories.push(memory);
    }

    for reason in &skipped {
        warn!(reason = %reason, "dropped unreadable stored memory");
    }

    let source = if skipped.is_empty() { LoadSource::Restored } else { LoadSource::Recovered };
    let loaded = memories.len();
    (memories, LoadReport { source, loaded, skipped })
}
