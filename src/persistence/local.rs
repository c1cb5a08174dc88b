use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::audio::WavBlob;

use super::{
    ArtifactStore, PersistenceError, RecordingMetadata, RecordingRecord, StoredRecording,
};

/// Filesystem-backed store: `{id}.wav` next to `{id}.json` under one root
/// directory. Serves as both the default store and the degraded-mode cache.
pub struct LocalArtifactStore {
    root: PathBuf,
}

impl LocalArtifactStore {
    pub fn new(root: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        info!("Local artifact store at {}", root.display());
        Ok(Self { root })
    }

    fn wav_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}.wav"))
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}.json"))
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    fn name(&self) -> &str {
        "local-store"
    }

    async fn upload(
        &self,
        artifact: &WavBlob,
        metadata: &RecordingMetadata,
    ) -> Result<StoredRecording, PersistenceError> {
        let id = uuid::Uuid::new_v4().to_string();
        let wav_path = self.wav_path(&id);
        let record_path = self.record_path(&id);

        tokio::fs::write(&wav_path, artifact.as_bytes()).await?;

        let record = RecordingRecord {
            id: id.clone(),
            url: format!("file://{}", wav_path.display()),
            created_at: Utc::now(),
            metadata: metadata.clone(),
        };
        let json = serde_json::to_vec_pretty(&record)?;
        tokio::fs::write(&record_path, json).await?;

        info!(
            "Stored recording {} ({} bytes, {:.1}s)",
            id,
            artifact.len(),
            metadata.duration_secs
        );

        Ok(StoredRecording {
            id,
            url: record.url,
        })
    }

    async fn fetch_all(&self) -> Result<Vec<RecordingRecord>, PersistenceError> {
        let mut records = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map_or(false, |ext| ext == "json") {
                let bytes = tokio::fs::read(&path).await?;
                let record: RecordingRecord = serde_json::from_slice(&bytes)?;
                records.push(record);
            }
        }
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    async fn delete(&self, id: &str) -> Result<(), PersistenceError> {
        let record_path = self.record_path(id);
        if !record_path.exists() {
            return Err(PersistenceError::NotFound(id.to_string()));
        }
        tokio::fs::remove_file(&record_path).await?;
        let wav_path = self.wav_path(id);
        if wav_path.exists() {
            tokio::fs::remove_file(&wav_path).await?;
        }
        info!("Deleted recording {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::encode_wav;

    fn metadata() -> RecordingMetadata {
        RecordingMetadata {
            duration_secs: 1.0,
            analysis_summary: None,
        }
    }

    #[tokio::test]
    async fn upload_fetch_delete_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path()).unwrap();
        let blob = encode_wav(&[0.1; 16000], 16000).unwrap();

        let stored = store.upload(&blob, &metadata()).await.unwrap();
        assert!(stored.url.ends_with(".wav"));

        let records = store.fetch_all().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, stored.id);
        assert!((records[0].metadata.duration_secs - 1.0).abs() < 1e-9);

        store.delete(&stored.id).await.unwrap();
        assert!(store.fetch_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_missing_recording_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path()).unwrap();
        assert!(matches!(
            store.delete("nope").await,
            Err(PersistenceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn fallback_store_degrades_to_cache() {
        use super::super::FallbackStore;
        use std::sync::Arc;

        struct DownStore;

        #[async_trait]
        impl ArtifactStore for DownStore {
            fn name(&self) -> &str {
                "down"
            }

            async fn upload(
                &self,
                _artifact: &WavBlob,
                _metadata: &RecordingMetadata,
            ) -> Result<StoredRecording, PersistenceError> {
                Err(PersistenceError::Unavailable("offline".to_string()))
            }

            async fn fetch_all(&self) -> Result<Vec<RecordingRecord>, PersistenceError> {
                Err(PersistenceError::Unavailable("offline".to_string()))
            }

            async fn delete(&self, _id: &str) -> Result<(), PersistenceError> {
                Err(PersistenceError::Unavailable("offline".to_string()))
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(LocalArtifactStore::new(dir.path()).unwrap());
        let store = FallbackStore::new(Arc::new(DownStore), Arc::clone(&cache));

        let blob = encode_wav(&[0.2; 8000], 16000).unwrap();
        let (stored, degraded) = store
            .upload_with_fallback(&blob, &metadata())
            .await
            .unwrap();
        assert!(degraded);

        // Fetch also degrades to the cache, which has the record.
        let records = store.fetch_all().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, stored.id);
    }
}
