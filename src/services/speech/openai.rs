use crate::core::config::OpenAiSpeechConfig;
use crate::core::error::SynthesisError;
use crate::services::speech::{SpeechAudio, SpeechRequest, Synthesizer};
use crate::utils::audio::wav_duration;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::debug;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;

#[derive(Serialize)]
struct SpeechBody<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    response_format: &'a str,
}

/// OpenAI-compatible `/audio/speech` client.
pub struct OpenAiSynthesizer {
    config: OpenAiSpeechConfig,
    client: Client,
}

impl OpenAiSynthesizer {
    pub fn new(config: OpenAiSpeechConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(anyhow!("OpenAI speech api_key is empty"));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self { config, client })
    }
}

/// Maps an HTTP failure onto the retry taxonomy.
fn classify(status: StatusCode, body: &str) -> SynthesisError {
    let message = format!("speech API returned {}: {}", status, body.trim());
    if status == StatusCode::TOO_MANY_REQUESTS {
        // Quota exhaustion shares the status code with rate limiting.
        if body.contains("insufficient_quota") {
            SynthesisError::Permanent(message)
        } else {
            SynthesisError::Transient(message)
        }
    } else if status == StatusCode::REQUEST_TIMEOUT || status.is_server_error() {
        SynthesisError::Transient(message)
    } else {
        SynthesisError::Permanent(message)
    }
}

#[async_trait]
impl Synthesizer for OpenAiSynthesizer {
    fn name(&self) -> &str {
        "openai"
    }

    async fn synthesize(&self, request: &SpeechRequest) -> Result<SpeechAudio, SynthesisError> {
        let url = format!("{}/audio/speech", self.config.base_url.trim_end_matches('/'));
        let body = SpeechBody {
            model: &self.config.model,
            voice: request.voice(),
            input: request.text(),
            response_format: "wav",
        };

        debug!("Requesting speech for {:?} [{}]", request.text(), request.voice());
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| SynthesisError::Transient(format!("request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            let error_text = resp.text().await.unwrap_or_default();
            return Err(classify(status, &error_text));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| SynthesisError::Transient(format!("response body interrupted: {}", e)))?
            .to_vec();
        let duration = wav_duration(&bytes)
            .map_err(|e| SynthesisError::Permanent(format!("unreadable audio: {:#}", e)))?;
        debug!("Received {} bytes ({:?}) for {:?}", bytes.len(), duration, request.text());

        Ok(SpeechAudio { bytes, duration })
    }
}
