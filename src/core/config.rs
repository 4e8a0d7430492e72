use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::core::error::ScriptError;
use crate::services::script::{default_phases, CastVoices, Phase, Script};

pub const CONFIG_FILE: &str = "config.yml";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_cache_folder")]
    pub cache_folder: String,

    #[serde(default)]
    pub stage: StageConfig,

    #[serde(default)]
    pub actors: ActorsConfig,

    #[serde(default)]
    pub speech: SpeechConfig,

    #[serde(default = "default_phases")]
    pub script: Vec<Phase>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StageConfig {
    #[serde(default = "default_width")]
    pub width: f32,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_max_frame_seconds")]
    pub max_frame_seconds: f32,
    #[serde(default = "default_offstage_margin")]
    pub offstage_margin: f32,
    #[serde(default = "default_contact_gap")]
    pub contact_gap: f32,
    #[serde(default = "default_bounce_distance")]
    pub bounce_distance: f32,
    #[serde(default = "default_actor_speed")]
    pub actor_speed: f32, // units per second
    #[serde(default = "default_stride_length")]
    pub stride_length: f32,
    #[serde(default = "default_start_margin")]
    pub start_margin: f32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ActorConfig {
    pub name: String,
    pub voice: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ActorsConfig {
    #[serde(default = "default_left_actor")]
    pub left: ActorConfig,
    #[serde(default = "default_right_actor")]
    pub right: ActorConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SpeechConfig {
    #[serde(default = "default_speech_provider")]
    pub provider: String, // "none", "openai" or "files"
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_retry_jitter_ms")]
    pub retry_jitter_ms: u64,
    #[serde(default)]
    pub warm_before_start: bool,
    pub openai: Option<OpenAiSpeechConfig>,
    pub files: Option<FilesSpeechConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OpenAiSpeechConfig {
    pub api_key: String,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_openai_model")]
    pub model: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FilesSpeechConfig {
    #[serde(default = "default_clip_folder")]
    pub folder: String,
    /// Line text (or `text_voice`) → WAV file under `folder`.
    #[serde(default)]
    pub clips: HashMap<String, String>,
}

fn default_cache_folder() -> String {
    "cache/speech".to_string()
}
fn default_width() -> f32 {
    1000.0
}
fn default_fps() -> u32 {
    60
}
fn default_max_frame_seconds() -> f32 {
    0.25
}
fn default_offstage_margin() -> f32 {
    60.0
}
fn default_contact_gap() -> f32 {
    20.0
}
fn default_bounce_distance() -> f32 {
    120.0
}
fn default_actor_speed() -> f32 {
    180.0
}
fn default_stride_length() -> f32 {
    40.0
}
fn default_start_margin() -> f32 {
    30.0
}
fn default_left_actor() -> ActorConfig {
    ActorConfig {
        name: "Blue".to_string(),
        voice: "alloy".to_string(),
    }
}
fn default_right_actor() -> ActorConfig {
    ActorConfig {
        name: "Red".to_string(),
        voice: "echo".to_string(),
    }
}
fn default_speech_provider() -> String {
    "none".to_string()
}
fn default_workers() -> usize {
    2
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_backoff_ms() -> u64 {
    500
}
fn default_retry_jitter_ms() -> u64 {
    100
}
fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_openai_model() -> String {
    "tts-1".to_string()
}
fn default_timeout_seconds() -> u64 {
    30
}
fn default_clip_folder() -> String {
    "assets".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_folder: default_cache_folder(),
            stage: StageConfig::default(),
            actors: ActorsConfig::default(),
            speech: SpeechConfig::default(),
            script: default_phases(),
        }
    }
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            fps: default_fps(),
            max_frame_seconds: default_max_frame_seconds(),
            offstage_margin: default_offstage_margin(),
            contact_gap: default_contact_gap(),
            bounce_distance: default_bounce_distance(),
            actor_speed: default_actor_speed(),
            stride_length: default_stride_length(),
            start_margin: default_start_margin(),
        }
    }
}

impl Default for ActorsConfig {
    fn default() -> Self {
        Self {
            left: default_left_actor(),
            right: default_right_actor(),
        }
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            provider: default_speech_provider(),
            workers: default_workers(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            retry_jitter_ms: default_retry_jitter_ms(),
            warm_before_start: false,
            openai: None,
            files: None,
        }
    }
}

impl Default for OpenAiSpeechConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_openai_base_url(),
            model: default_openai_model(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl Default for FilesSpeechConfig {
    fn default() -> Self {
        Self {
            folder: default_clip_folder(),
            clips: HashMap::new(),
        }
    }
}

impl Config {
    /// Reads `config.yml` from the working directory; a missing file yields
    /// the built-in defaults.
    pub fn load_or_default() -> Result<Self> {
        let path = Path::new(CONFIG_FILE);
        if !path.exists() {
            info!("{} not found, using built-in defaults", CONFIG_FILE);
            return Ok(Self::default());
        }
        Self::load_from(path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(serde_yaml_ng::from_str(content)?)
    }

    pub fn voices(&self) -> CastVoices {
        CastVoices {
            left: self.actors.left.voice.clone(),
            right: self.actors.right.voice.clone(),
        }
    }

    /// Validated phase table. Any error here is fatal at startup.
    pub fn script(&self) -> Result<Script, ScriptError> {
        if self.actors.left.voice.trim().is_empty() {
            return Err(ScriptError::EmptyVoice { actor: "left" });
        }
        if self.actors.right.voice.trim().is_empty() {
            return Err(ScriptError::EmptyVoice { actor: "right" });
        }
        let script = Script::new(self.script.clone())?;
        script.check_contact_gap(self.stage.contact_gap)?;
        Ok(script)
    }
}
