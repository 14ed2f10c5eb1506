//! Storage contract shared by the SQLite store and the in-memory store.

use thiserror::Error;

use crate::query::VideoFilter;
use crate::video::{Video, VideoInput};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("video {0} not found")]
    NotFound(String),
    #[error("video {0} already exists")]
    Conflict(String),
    #[error("{0}")]
    Storage(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<r2d2::Error> for StoreError {
    fn from(err: r2d2::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(format!("encoding stored JSON: {err}"))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Blocking CRUD + list operations over the video collection.
///
/// Implementations are shared across request tasks, so every method takes
/// `&self`. Callers on an async runtime should run them on the blocking
/// pool.
pub trait VideoRepository: Send + Sync {
    /// Inserts `video` as-is. Fails with [`StoreError::Conflict`] when the id
    /// is taken.
    fn create(&self, video: &Video) -> StoreResult<()>;

    /// Replaces every field but `id` and `createdAt`, returning the stored
    /// record.
    fn update(&self, id: &str, input: &VideoInput) -> StoreResult<Video>;

    fn delete(&self, id: &str) -> StoreResult<()>;

    /// Returns the requested page and the number of matching rows.
    fn list(&self, filter: &VideoFilter) -> StoreResult<(Vec<Video>, u64)>;
}
