use crate::storage::StorageError;

/// Rejections raised before a memory enters the store. Messages are shown to
/// the user verbatim.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum ValidationError {
    #[error("Please enter a title")]
    EmptyTitle,
    #[error("Please select a memory type")]
    MissingCategory,
    #[error("location must be a finite coordinate, got {lat}, {lng}")]
    InvalidCoordinate { lat: f64, lng: f64 },
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("failed to encode memory collection: {0}")]
    Encode(#[from] serde_json::Error),
}

impl StoreError {
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no memory draft is open; click the map to start one")]
    NoDraft,
    #[error(transparent)]
    Store(#[from] StoreError),
}
