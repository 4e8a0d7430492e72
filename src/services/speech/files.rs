use crate::core::config::FilesSpeechConfig;
use crate::core::error::SynthesisError;
use crate::services::speech::{SpeechAudio, SpeechRequest, Synthesizer};
use crate::utils::audio::wav_duration;
use async_trait::async_trait;
use log::debug;
use std::path::Path;

/// Serves pre-recorded WAV clips keyed by line text, optionally per voice.
pub struct FileSynthesizer {
    config: FilesSpeechConfig,
}

impl FileSynthesizer {
    pub fn new(config: FilesSpeechConfig) -> Self {
        Self { config }
    }

    fn clip_path(&self, request: &SpeechRequest) -> Option<&String> {
        let voiced = format!("{}_{}", request.text(), request.voice());
        self.config
            .clips
            .get(&voiced)
            .or_else(|| self.config.clips.get(request.text()))
    }
}

#[async_trait]
impl Synthesizer for FileSynthesizer {
    fn name(&self) -> &str {
        "files"
    }

    async fn synthesize(&self, request: &SpeechRequest) -> Result<SpeechAudio, SynthesisError> {
        let clip = self.clip_path(request).ok_or_else(|| {
            SynthesisError::Permanent(format!("no clip configured for {:?}", request.text()))
        })?;
        let path = Path::new(&self.config.folder).join(clip);
        debug!("Loading clip {:?} for {:?}", path, request.text());

        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            SynthesisError::Permanent(format!("cannot read {}: {}", path.display(), e))
        })?;
        let duration = wav_duration(&bytes).map_err(|e| {
            SynthesisError::Permanent(format!("cannot parse {}: {:#}", path.display(), e))
        })?;
        Ok(SpeechAudio { bytes, duration })
    }
}
