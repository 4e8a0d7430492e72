use crate::core::config::SpeechConfig;
use crate::core::error::SynthesisError;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::info;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

pub mod cache;
pub mod files;
pub mod openai;
pub mod preloader;

pub use cache::{SpeechCache, SpeechHandle, SpeechStatus};
pub use preloader::{PreloadPolicy, SpeechPreloader};

/// One line of dialogue in one voice. Used as the cache key.
///
/// Text is normalised on construction (trimmed, inner whitespace collapsed)
/// so trivially different spellings of the same line share an entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpeechRequest {
    text: String,
    voice: String,
}

impl SpeechRequest {
    pub fn new(text: &str, voice: &str) -> Self {
        Self {
            text: text.split_whitespace().collect::<Vec<_>>().join(" "),
            voice: voice.trim().to_string(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn voice(&self) -> &str {
        &self.voice
    }

    /// Stable hex key for the durable store.
    pub fn durable_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.voice.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.text.as_bytes());
        to_hex_lower(&hasher.finalize())
    }
}

fn to_hex_lower(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// A synthesized clip and its playback length.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechAudio {
    pub bytes: Vec<u8>,
    pub duration: Duration,
}

/// Where the controller obtains speech entries for phase dialogue.
///
/// Implementations must not block: they return a handle whose status may
/// still be PENDING.
pub trait SpeechSource: Send + Sync {
    fn request(&self, request: &SpeechRequest) -> SpeechHandle;
}

/// Lookup-only source: creates PENDING entries but never synthesizes.
impl SpeechSource for SpeechCache {
    fn request(&self, request: &SpeechRequest) -> SpeechHandle {
        self.get_or_create(request).0
    }
}

#[async_trait]
pub trait Synthesizer: Send + Sync {
    fn name(&self) -> &str;
    async fn synthesize(&self, request: &SpeechRequest) -> Result<SpeechAudio, SynthesisError>;
}

/// Stands in when no provider is configured: every line fails permanently
/// and plays as silent, fallback-timed dialogue.
pub struct DisabledSynthesizer;

#[async_trait]
impl Synthesizer for DisabledSynthesizer {
    fn name(&self) -> &str {
        "none"
    }

    async fn synthesize(&self, _request: &SpeechRequest) -> Result<SpeechAudio, SynthesisError> {
        Err(SynthesisError::Permanent(
            "speech synthesis is disabled".to_string(),
        ))
    }
}

pub fn create_synthesizer(config: &SpeechConfig) -> Result<Arc<dyn Synthesizer>> {
    info!("Initializing speech synthesizer for provider: {}", config.provider);
    match config.provider.as_str() {
        "none" => Ok(Arc::new(DisabledSynthesizer)),
        "openai" => {
            let openai_config = config
                .openai
                .clone()
                .ok_or_else(|| anyhow!("OpenAI speech config missing"))?;
            Ok(Arc::new(openai::OpenAiSynthesizer::new(openai_config)?))
        }
        "files" => {
            let files_config = config
                .files
                .clone()
                .ok_or_else(|| anyhow!("Files speech config missing"))?;
            Ok(Arc::new(files::FileSynthesizer::new(files_config)))
        }
        _ => Err(anyhow!("Unknown speech provider: {}", config.provider)),
    }
}
