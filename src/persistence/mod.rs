//! Persistence boundary for finished recordings.
//!
//! The real storage backend is an external collaborator; the core only
//! depends on the [`ArtifactStore`] trait and always has a local fallback
//! path available when the collaborator is down.

mod local;

pub use local::LocalArtifactStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

use crate::audio::WavBlob;
use crate::metrics::AggregatedWindow;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("recording not found: {0}")]
    NotFound(String),
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
}

/// Metadata stored alongside an uploaded artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingMetadata {
    pub duration_secs: f64,
    pub analysis_summary: Option<AggregatedWindow>,
}

/// Handle to an uploaded artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecording {
    pub id: String,
    pub url: String,
}

/// A listed recording.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingRecord {
    pub id: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub metadata: RecordingMetadata,
}

/// Upload/fetch/delete interface to the storage collaborator.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store name for logging
    fn name(&self) -> &str;

    async fn upload(
        &self,
        artifact: &WavBlob,
        metadata: &RecordingMetadata,
    ) -> Result<StoredRecording, PersistenceError>;

    async fn fetch_all(&self) -> Result<Vec<RecordingRecord>, PersistenceError>;

    async fn delete(&self, id: &str) -> Result<(), PersistenceError>;
}

/// Wraps a primary store with a local cache fallback so persistence failures
/// degrade instead of surfacing as fatal.
pub struct FallbackStore {
    primary: Arc<dyn ArtifactStore>,
    cache: Arc<LocalArtifactStore>,
}

impl FallbackStore {
    pub fn new(primary: Arc<dyn ArtifactStore>, cache: Arc<LocalArtifactStore>) -> Self {
        Self { primary, cache }
    }

    /// Upload to the primary store; on failure, cache locally. The boolean
    /// reports whether the result is degraded (served from the cache).
    pub async fn upload_with_fallback(
        &self,
        artifact: &WavBlob,
        metadata: &RecordingMetadata,
    ) -> Result<(StoredRecording, bool), PersistenceError> {
        match self.primary.upload(artifact, metadata).await {
            Ok(stored) => Ok((stored, false)),
            Err(e) => {
                warn!(
                    "Upload to {} failed ({}), caching locally",
                    self.primary.name(),
                    e
                );
                let stored = self.cache.upload(artifact, metadata).await?;
                Ok((stored, true))
            }
        }
    }
}

#[async_trait]
impl ArtifactStore for FallbackStore {
    fn name(&self) -> &str {
        "fallback-store"
    }

    async fn upload(
        &self,
        artifact: &WavBlob,
        metadata: &RecordingMetadata,
    ) -> Result<StoredRecording, PersistenceError> {
        let (stored, _) = self.upload_with_fallback(artifact, metadata).await?;
        Ok(stored)
    }

    async fn fetch_all(&self) -> Result<Vec<RecordingRecord>, PersistenceError> {
        match self.primary.fetch_all().await {
            Ok(records) => Ok(records),
            Err(e) => {
                warn!(
                    "Fetch from {} failed ({}), serving local cache",
                    self.primary.name(),
                    e
                );
                self.cache.fetch_all().await
            }
        }
    }

    async fn delete(&self, id: &str) -> Result<(), PersistenceError> {
        match self.primary.delete(id).await {
            Ok(()) => Ok(()),
            Err(PersistenceError::NotFound(_)) => self.cache.delete(id).await,
            Err(e) => {
                warn!(
                    "Delete on {} failed ({}), trying local cache",
                    self.primary.name(),
                    e
                );
                self.cache.delete(id).await
            }
        }
    }
}
