use crate::core::error::CacheWriteError;
use crate::core::io::Storage;
use crate::services::speech::{SpeechAudio, SpeechRequest};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum SpeechStatus {
    Pending,
    Ready(Arc<SpeechAudio>),
    Failed(String),
}

impl SpeechStatus {
    pub fn is_resolved(&self) -> bool {
        !matches!(self, SpeechStatus::Pending)
    }
}

#[derive(Debug)]
struct Slot {
    request: SpeechRequest,
    status: RwLock<SpeechStatus>,
}

/// Shared reference to one cache entry. Reads always see a whole status,
/// never a partially written one.
#[derive(Debug, Clone)]
pub struct SpeechHandle {
    slot: Arc<Slot>,
}

impl SpeechHandle {
    fn new(request: SpeechRequest) -> Self {
        Self {
            slot: Arc::new(Slot {
                request,
                status: RwLock::new(SpeechStatus::Pending),
            }),
        }
    }

    pub fn request(&self) -> &SpeechRequest {
        &self.slot.request
    }

    pub fn status(&self) -> SpeechStatus {
        self.slot
            .status
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn same_entry(&self, other: &SpeechHandle) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }

    /// PENDING → `status`. Returns false if the entry was already resolved.
    fn resolve(&self, status: SpeechStatus) -> bool {
        let mut current = self.slot.status.write().unwrap_or_else(|e| e.into_inner());
        if current.is_resolved() {
            return false;
        }
        *current = status;
        true
    }
}

#[derive(Serialize, Deserialize)]
struct ClipMeta {
    text: String,
    voice: String,
    duration_ms: u64,
}

/// Speech line → synthesized audio, in memory and on disk.
///
/// The index lock is only held to find or insert a slot; each entry's status
/// has its own lock, so unrelated lines resolve independently.
pub struct SpeechCache {
    entries: Mutex<HashMap<SpeechRequest, SpeechHandle>>,
    storage: Arc<dyn Storage>,
    folder: String,
}

impl SpeechCache {
    pub fn new(storage: Arc<dyn Storage>, folder: &str) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            storage,
            folder: folder.to_string(),
        }
    }

    /// Returns the existing entry, or inserts a PENDING one. The flag is true
    /// only for the caller that created the entry.
    pub fn get_or_create(&self, request: &SpeechRequest) -> (SpeechHandle, bool) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = entries.get(request) {
            return (handle.clone(), false);
        }
        let handle = SpeechHandle::new(request.clone());
        entries.insert(request.clone(), handle.clone());
        (handle, true)
    }

    /// Non-blocking status read. `None` means the line was never requested.
    pub fn lookup(&self, request: &SpeechRequest) -> Option<SpeechStatus> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(request).map(|handle| handle.status())
    }

    /// PENDING → READY, then persists the clip. A second completion for the
    /// same line is ignored. Persistence failures are logged only.
    pub async fn mark_ready(&self, request: &SpeechRequest, audio: SpeechAudio) -> bool {
        let audio = Arc::new(audio);
        let (handle, _) = self.get_or_create(request);
        if !handle.resolve(SpeechStatus::Ready(audio.clone())) {
            debug!("Ignoring duplicate completion for {:?}", request.text());
            return false;
        }
        if let Err(e) = self.persist(request, &audio).await {
            warn!("{}", e);
        }
        true
    }

    /// PENDING → FAILED. A second completion for the same line is ignored.
    pub fn mark_failed(&self, request: &SpeechRequest, reason: &str) -> bool {
        let (handle, _) = self.get_or_create(request);
        handle.resolve(SpeechStatus::Failed(reason.to_string()))
    }

    /// Resolves the entry from the durable store if a previous run saved it.
    pub async fn restore(&self, request: &SpeechRequest) -> bool {
        match self.load_durable(request).await {
            Some(audio) => {
                let (handle, _) = self.get_or_create(request);
                handle.resolve(SpeechStatus::Ready(Arc::new(audio)))
            }
            None => false,
        }
    }

    async fn load_durable(&self, request: &SpeechRequest) -> Option<SpeechAudio> {
        let (audio_path, meta_path) = self.paths(request);
        match self.storage.exists(&meta_path).await {
            Ok(true) => {}
            Ok(false) => return None,
            Err(e) => {
                warn!("Durable cache lookup failed for {}: {:#}", meta_path, e);
                return None;
            }
        }

        let meta: Option<ClipMeta> = match self.storage.read(&meta_path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).ok(),
            Err(_) => None,
        };
        let meta = match meta {
            Some(meta) if meta.text == request.text() && meta.voice == request.voice() => meta,
            _ => {
                warn!("Discarding corrupt durable cache entry {}", meta_path);
                let _ = self.storage.delete(&meta_path).await;
                return None;
            }
        };

        match self.storage.read(&audio_path).await {
            Ok(bytes) => Some(SpeechAudio {
                bytes,
                duration: Duration::from_millis(meta.duration_ms),
            }),
            Err(e) => {
                warn!("Durable cache clip unreadable {}: {:#}", audio_path, e);
                None
            }
        }
    }

    async fn persist(
        &self,
        request: &SpeechRequest,
        audio: &SpeechAudio,
    ) -> Result<(), CacheWriteError> {
        let (audio_path, meta_path) = self.paths(request);
        let fail = |reason: String| CacheWriteError {
            key: request.durable_key(),
            reason,
        };

        let meta = ClipMeta {
            text: request.text().to_string(),
            voice: request.voice().to_string(),
            duration_ms: audio.duration.as_millis() as u64,
        };
        let meta = serde_json::to_vec_pretty(&meta).map_err(|e| fail(e.to_string()))?;

        // Clip first: the sidecar marks the entry complete.
        self.storage
            .write(&audio_path, &audio.bytes)
            .await
            .map_err(|e| fail(format!("{:#}", e)))?;
        self.storage
            .write(&meta_path, &meta)
            .await
            .map_err(|e| fail(format!("{:#}", e)))?;
        Ok(())
    }

    fn paths(&self, request: &SpeechRequest) -> (String, String) {
        let key = request.durable_key();
        let folder = Path::new(&self.folder);
        (
            folder.join(format!("{}.wav", key)).to_string_lossy().to_string(),
            folder.join(format!("{}.json", key)).to_string_lossy().to_string(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::io::NativeStorage;
    use crate::services::speech::testing::clip;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;

    struct ReadOnlyStorage;

    #[async_trait]
    impl Storage for ReadOnlyStorage {
        async fn read(&self, path: &str) -> Result<Vec<u8>> {
            Err(anyhow!("no such key: {}", path))
        }
        async fn write(&self, _path: &str, _content: &[u8]) -> Result<()> {
            Err(anyhow!("disk full"))
        }
        async fn delete(&self, _path: &str) -> Result<()> {
            Ok(())
        }
        async fn exists(&self, _path: &str) -> Result<bool> {
            Ok(false)
        }
    }

    fn native_cache(dir: &Path) -> SpeechCache {
        SpeechCache::new(Arc::new(NativeStorage::new()), dir.to_str().unwrap())
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let cache = SpeechCache::new(Arc::new(ReadOnlyStorage), "unused");
        let request = SpeechRequest::new("WATCH IT!", "alloy");

        let (first, created) = cache.get_or_create(&request);
        assert!(created);
        let (second, created_again) = cache.get_or_create(&SpeechRequest::new(" WATCH IT! ", "alloy"));
        assert!(!created_again);
        assert!(first.same_entry(&second));
        assert_eq!(cache.lookup(&request), Some(SpeechStatus::Pending));
    }

    #[test]
    fn test_lookup_unknown_is_none() {
        let cache = SpeechCache::new(Arc::new(ReadOnlyStorage), "unused");
        assert_eq!(cache.lookup(&SpeechRequest::new("Hey ya!", "echo")), None);
    }

    #[tokio::test]
    async fn test_resolution_is_first_write_wins() {
        let cache = SpeechCache::new(Arc::new(ReadOnlyStorage), "unused");
        let request = SpeechRequest::new("Hey ya!", "echo");
        let (handle, _) = cache.get_or_create(&request);

        assert!(cache.mark_failed(&request, "quota"));
        assert!(!cache.mark_ready(&request, clip(500)).await);
        assert!(!cache.mark_failed(&request, "again"));
        assert_eq!(handle.status(), SpeechStatus::Failed("quota".to_string()));
    }

    #[tokio::test]
    async fn test_durable_write_failure_is_not_fatal() {
        let cache = SpeechCache::new(Arc::new(ReadOnlyStorage), "unused");
        let request = SpeechRequest::new("I don't care", "echo");

        assert!(cache.mark_ready(&request, clip(700)).await);
        match cache.lookup(&request) {
            Some(SpeechStatus::Ready(audio)) => {
                assert_eq!(audio.duration, Duration::from_millis(700))
            }
            other => panic!("expected ready, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_persisted_clip_restores_in_new_cache() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let request = SpeechRequest::new("Okay I have to go to work", "alloy");

        let first = native_cache(temp_dir.path());
        assert!(first.mark_ready(&request, clip(1250)).await);

        let second = native_cache(temp_dir.path());
        assert!(second.restore(&request).await);
        match second.lookup(&request) {
            Some(SpeechStatus::Ready(audio)) => {
                assert_eq!(audio.duration, Duration::from_millis(1250));
                assert_eq!(audio.bytes, clip(1250).bytes);
            }
            other => panic!("expected ready, got {:?}", other),
        }

        // Absence is a normal state.
        let other = SpeechRequest::new("Hey ya!", "echo");
        assert!(!second.restore(&other).await);
        assert_eq!(second.lookup(&other), None);
        Ok(())
    }

    #[tokio::test]
    async fn test_corrupt_sidecar_is_discarded() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let request = SpeechRequest::new("Hey ya!", "echo");
        let cache = native_cache(temp_dir.path());
        assert!(cache.mark_ready(&request, clip(300)).await);

        let meta_path = temp_dir
            .path()
            .join(format!("{}.json", request.durable_key()));
        std::fs::write(&meta_path, b"{ not json")?;

        let fresh = native_cache(temp_dir.path());
        assert!(!fresh.restore(&request).await);
        assert!(!meta_path.exists());
        Ok(())
    }
}
