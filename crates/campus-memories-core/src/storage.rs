//! Durable key-value storage seam.
//!
//! The memory collection lives under a single named key; every write replaces
//! the key's full value.

use std::collections::HashMap;

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum StorageError {
    #[error("storage read failed for key `{key}`: {message}")]
    Read { key: String, message: String },
    #[error("storage write failed for key `{key}`: {message}")]
    Write { key: String, message: String },
}

pub trait KeyValueStorage {
    /// Return the full value under `key`, or `None` when nothing was stored yet.
    ///
    /// # Errors
    /// Returns [`StorageError::Read`] when the backend cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Replace the full value under `key`.
    ///
    /// # Errors
    /// Returns [`StorageError::Write`] when the backend rejects the write.
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
}

impl<T> KeyValueStorage for &mut T
where
    T: KeyValueStorage + ?Sized,
{
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set(key, value)
    }
}

/// Process-local storage for tests and throwaway sessions.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStorage {
    entries: HashMap<String, String>,
    writes: usize,
}

impl InMemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_entry(key: &str, value: &str) -> Self {
        let mut storage = Self::default();
        storage.entries.insert(key.to_string(), value.to_string());
        storage
    }

    /// Number of successful `set` calls since construction.
    #[must_use]
    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl KeyValueStorage for InMemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value.to_string());
        self.writes += 1;
        Ok(())
    }
}
