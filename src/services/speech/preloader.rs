use crate::core::config::SpeechConfig;
use crate::services::speech::{SpeechCache, SpeechHandle, SpeechRequest, SpeechSource, Synthesizer};
use futures_util::StreamExt;
use log::{debug, info, warn};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct PreloadPolicy {
    pub workers: usize,
    pub max_retries: u32,
    pub backoff: Duration,
    pub jitter: Duration,
}

impl Default for PreloadPolicy {
    fn default() -> Self {
        Self {
            workers: 2,
            max_retries: 3,
            backoff: Duration::from_millis(500),
            jitter: Duration::from_millis(100),
        }
    }
}

impl From<&SpeechConfig> for PreloadPolicy {
    fn from(config: &SpeechConfig) -> Self {
        Self {
            workers: config.workers.max(1),
            max_retries: config.max_retries,
            backoff: Duration::from_millis(config.retry_backoff_ms),
            jitter: Duration::from_millis(config.retry_jitter_ms),
        }
    }
}

impl PreloadPolicy {
    /// Exponential backoff with random jitter.
    fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.backoff.saturating_mul(2u32.saturating_pow(attempt));
        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..=jitter_ms)
        };
        base.saturating_add(Duration::from_millis(jitter))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Restored,
    Synthesized,
    Failed,
}

/// Background synthesis of script lines ahead of playback.
///
/// Requests are taken in the order they were queued and processed by at
/// most `workers` concurrent tasks. Each distinct line is synthesized at
/// most once: only the caller that created the cache entry queues it.
pub struct SpeechPreloader {
    cache: Arc<SpeechCache>,
    queue: mpsc::UnboundedSender<SpeechRequest>,
    worker: JoinHandle<()>,
}

impl SpeechPreloader {
    /// Starts the worker pool. Must be called inside a tokio runtime.
    pub fn spawn(
        cache: Arc<SpeechCache>,
        synthesizer: Arc<dyn Synthesizer>,
        policy: PreloadPolicy,
    ) -> Self {
        let (queue, rx) = mpsc::unbounded_channel();
        info!(
            "Speech preloader started ({} provider, {} workers)",
            synthesizer.name(),
            policy.workers.max(1)
        );
        let worker = tokio::spawn(run_workers(rx, cache.clone(), synthesizer, policy));
        Self {
            cache,
            queue,
            worker,
        }
    }

    /// Queues every request not already known to the cache, keeping order.
    /// Returns how many were newly queued. Never blocks.
    pub fn schedule<I>(&self, requests: I) -> usize
    where
        I: IntoIterator<Item = SpeechRequest>,
    {
        requests
            .into_iter()
            .filter(|request| self.enqueue(request).1)
            .count()
    }

    pub fn cache(&self) -> &Arc<SpeechCache> {
        &self.cache
    }

    /// Stops accepting work and waits for in-flight syntheses so their
    /// results reach the durable store.
    pub async fn drain(self) {
        drop(self.queue);
        if let Err(e) = self.worker.await {
            warn!("Speech preloader worker ended abnormally: {}", e);
        }
    }

    fn enqueue(&self, request: &SpeechRequest) -> (SpeechHandle, bool) {
        let (handle, created) = self.cache.get_or_create(request);
        if created && self.queue.send(request.clone()).is_err() {
            self.cache.mark_failed(request, "speech preloader stopped");
        }
        (handle, created)
    }
}

impl SpeechSource for SpeechPreloader {
    fn request(&self, request: &SpeechRequest) -> SpeechHandle {
        self.enqueue(request).0
    }
}

async fn run_workers(
    rx: mpsc::UnboundedReceiver<SpeechRequest>,
    cache: Arc<SpeechCache>,
    synthesizer: Arc<dyn Synthesizer>,
    policy: PreloadPolicy,
) {
    let workers = policy.workers.max(1);
    let requests = futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|request| (request, rx))
    });

    requests
        .map(|request| {
            let cache = cache.clone();
            let synthesizer = synthesizer.clone();
            let policy = policy.clone();
            async move {
                let outcome = preload_one(&cache, synthesizer.as_ref(), &policy, &request).await;
                (request, outcome)
            }
        })
        .buffer_unordered(workers)
        .for_each(|(request, outcome)| async move {
            debug!("Preloaded {:?} [{}]: {:?}", request.text(), request.voice(), outcome);
        })
        .await;
}

async fn preload_one(
    cache: &SpeechCache,
    synthesizer: &dyn Synthesizer,
    policy: &PreloadPolicy,
    request: &SpeechRequest,
) -> Outcome {
    if cache.restore(request).await {
        debug!("Durable cache hit for {:?}", request.text());
        return Outcome::Restored;
    }

    let mut attempt = 0;
    loop {
        match synthesizer.synthesize(request).await {
            Ok(audio) => {
                cache.mark_ready(request, audio).await;
                return Outcome::Synthesized;
            }
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                let delay = policy.delay_for(attempt);
                warn!(
                    "Speech synthesis failed for {:?} (attempt {}/{}), retrying in {:?}: {}",
                    request.text(),
                    attempt + 1,
                    policy.max_retries + 1,
                    delay,
                    e
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                warn!("Giving up on {:?}; dialogue will be silent: {}", request.text(), e);
                cache.mark_failed(request, &e.to_string());
                return Outcome::Failed;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::io::NativeStorage;
    use crate::services::speech::testing::MockSynthesizer;
    use crate::services::speech::SpeechStatus;
    use anyhow::Result;
    use std::path::Path;
    use std::sync::atomic::Ordering;

    fn quick_policy(workers: usize, max_retries: u32) -> PreloadPolicy {
        PreloadPolicy {
            workers,
            max_retries,
            backoff: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    fn cache_in(dir: &Path) -> Arc<SpeechCache> {
        Arc::new(SpeechCache::new(
            Arc::new(NativeStorage::new()),
            dir.to_str().unwrap(),
        ))
    }

    fn lines() -> Vec<SpeechRequest> {
        vec![
            SpeechRequest::new("WATCH IT!", "alloy"),
            SpeechRequest::new("WATCH IT!", "echo"),
            SpeechRequest::new("Hey ya!", "echo"),
        ]
    }

    #[tokio::test]
    async fn test_schedule_synthesizes_each_line_once() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let cache = cache_in(temp_dir.path());
        let synth = Arc::new(MockSynthesizer::new(400));
        let preloader = SpeechPreloader::spawn(cache.clone(), synth.clone(), quick_policy(2, 0));

        assert_eq!(preloader.schedule(lines()), 3);
        // Already known: nothing new is queued.
        assert_eq!(preloader.schedule(lines()), 0);
        let handle = preloader.request(&SpeechRequest::new("Hey ya!", "echo"));
        preloader.drain().await;

        assert_eq!(synth.total_calls(), 3);
        for request in lines() {
            assert!(matches!(cache.lookup(&request), Some(SpeechStatus::Ready(_))));
        }
        assert!(matches!(handle.status(), SpeechStatus::Ready(_)));
        Ok(())
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let cache = cache_in(temp_dir.path());
        let mut mock = MockSynthesizer::new(400);
        mock.transient_failures = 2;
        let synth = Arc::new(mock);
        let preloader = SpeechPreloader::spawn(cache.clone(), synth.clone(), quick_policy(1, 3));

        let request = SpeechRequest::new("Hey ya!", "echo");
        preloader.schedule(vec![request.clone()]);
        preloader.drain().await;

        assert_eq!(synth.total_calls(), 3);
        assert!(matches!(cache.lookup(&request), Some(SpeechStatus::Ready(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_retry_exhaustion_marks_failed() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let cache = cache_in(temp_dir.path());
        let mut mock = MockSynthesizer::new(400);
        mock.transient_failures = 10;
        let synth = Arc::new(mock);
        let preloader = SpeechPreloader::spawn(cache.clone(), synth.clone(), quick_policy(1, 2));

        let request = SpeechRequest::new("Hey ya!", "echo");
        preloader.schedule(vec![request.clone()]);
        preloader.drain().await;

        assert_eq!(synth.total_calls(), 3);
        assert!(matches!(cache.lookup(&request), Some(SpeechStatus::Failed(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let cache = cache_in(temp_dir.path());
        let mut mock = MockSynthesizer::new(400);
        mock.permanent = true;
        let synth = Arc::new(mock);
        let preloader = SpeechPreloader::spawn(cache.clone(), synth.clone(), quick_policy(1, 5));

        let request = SpeechRequest::new("I don't care", "echo");
        preloader.schedule(vec![request.clone()]);
        preloader.drain().await;

        assert_eq!(synth.total_calls(), 1);
        assert!(matches!(cache.lookup(&request), Some(SpeechStatus::Failed(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_second_run_hits_durable_store() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;

        let first_synth = Arc::new(MockSynthesizer::new(650));
        let first = SpeechPreloader::spawn(
            cache_in(temp_dir.path()),
            first_synth.clone(),
            quick_policy(2, 0),
        );
        first.schedule(lines());
        first.drain().await;
        assert_eq!(first_synth.total_calls(), 3);

        let second_cache = cache_in(temp_dir.path());
        let second_synth = Arc::new(MockSynthesizer::new(650));
        let second = SpeechPreloader::spawn(
            second_cache.clone(),
            second_synth.clone(),
            quick_policy(2, 0),
        );
        second.schedule(lines());
        second.drain().await;

        assert_eq!(second_synth.total_calls(), 0);
        for request in lines() {
            match second_cache.lookup(&request) {
                Some(SpeechStatus::Ready(audio)) => {
                    assert_eq!(audio.duration, Duration::from_millis(650))
                }
                other => panic!("expected ready, got {:?}", other),
            }
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_parallelism_is_bounded() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let cache = cache_in(temp_dir.path());
        let mut mock = MockSynthesizer::new(100);
        mock.delay = Duration::from_millis(20);
        let synth = Arc::new(mock);
        let preloader = SpeechPreloader::spawn(cache, synth.clone(), quick_policy(2, 0));

        let requests: Vec<SpeechRequest> = (0..8)
            .map(|i| SpeechRequest::new(&format!("line {}", i), "alloy"))
            .collect();
        preloader.schedule(requests);
        preloader.drain().await;

        assert_eq!(synth.total_calls(), 8);
        assert!(synth.peak.load(Ordering::SeqCst) <= 2);
        Ok(())
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = PreloadPolicy {
            workers: 1,
            max_retries: 3,
            backoff: Duration::from_millis(100),
            jitter: Duration::ZERO,
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));

        let jittery = PreloadPolicy {
            jitter: Duration::from_millis(50),
            ..policy
        };
        let delay = jittery.delay_for(1);
        assert!(delay >= Duration::from_millis(200) && delay <= Duration::from_millis(250));
    }

    #[test]
    fn test_backoff_saturates_instead_of_overflowing() {
        let policy = PreloadPolicy {
            workers: 1,
            max_retries: u32::MAX,
            backoff: Duration::from_secs(u64::MAX / 4),
            jitter: Duration::from_millis(50),
        };
        let first = policy.delay_for(0);
        assert!(first >= Duration::from_secs(u64::MAX / 4));
        assert_eq!(policy.delay_for(3), Duration::MAX);
        assert_eq!(policy.delay_for(u32::MAX), Duration::MAX);
    }
}
