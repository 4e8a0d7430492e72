use crate::services::script::PhaseKind;
use thiserror::Error;

/// Failure reported by a speech synthesizer.
///
/// The variant decides the retry policy: transient failures are retried by
/// the preloader, permanent ones demote the cache entry immediately.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SynthesisError {
    #[error("transient synthesis failure: {0}")]
    Transient(String),
    #[error("permanent synthesis failure: {0}")]
    Permanent(String),
}

impl SynthesisError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SynthesisError::Transient(_))
    }
}

/// Durable store write failure. Never fatal: the in-memory cache stays
/// authoritative for the current run.
#[derive(Debug, Error)]
#[error("failed to persist speech clip {key}: {reason}")]
pub struct CacheWriteError {
    pub key: String,
    pub reason: String,
}

/// Phase script configuration error, detected once at startup.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ScriptError {
    #[error("script has no phases")]
    Empty,
    #[error("first phase `{name}` must be `entering`")]
    FirstNotEntering { name: String },
    #[error("last phase `{name}` must be `exiting`")]
    LastNotExiting { name: String },
    #[error("phase `{phase}`: {field} must be a finite, non-negative number of seconds (got {value})")]
    InvalidSeconds {
        phase: String,
        field: &'static str,
        value: f32,
    },
    #[error("phase `{phase}`: distance threshold must be finite and positive (got {value})")]
    InvalidThreshold { phase: String, value: f32 },
    #[error("phase `{phase}`: speaking phases need a dialogue line")]
    MissingDialogue { phase: String },
    #[error("phase `{phase}`: dialogue text is empty")]
    EmptyDialogue { phase: String },
    #[error("phase `{phase}`: bounce loop must exit on `elapsed`")]
    UnboundedLoop { phase: String },
    #[error("phase `{phase}`: bounce_seconds is only valid on colliding phases")]
    MisplacedBounce { phase: String },
    #[error("phase `{phase}`: a {kind:?} phase can never reach its exit condition")]
    UnreachableExit { phase: String, kind: PhaseKind },
    #[error("actor `{actor}` has an empty voice id")]
    EmptyVoice { actor: &'static str },
}
