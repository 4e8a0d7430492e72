use crate::core::actor::{ActorId, Expression};
use crate::core::error::ScriptError;
use crate::services::speech::SpeechRequest;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    Entering,
    Colliding,
    Speaking,
    Pausing,
    Exiting,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Left,
    Right,
    Both,
}

impl Speaker {
    pub fn actors(self) -> &'static [ActorId] {
        match self {
            Speaker::Left => &[ActorId::Left],
            Speaker::Right => &[ActorId::Right],
            Speaker::Both => &[ActorId::Left, ActorId::Right],
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Dialogue {
    pub speaker: Speaker,
    pub text: String,
}

/// When the controller leaves a phase.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(tag = "until", rename_all = "snake_case")]
pub enum ExitCondition {
    Elapsed { seconds: f32 },
    DistanceBelow { threshold: f32 },
    AudioFinished,
    /// Both actors have walked past the stage edges.
    Offstage,
    Always,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Phase {
    pub name: String,
    pub kind: PhaseKind,
    #[serde(default)]
    pub dialogue: Option<Dialogue>,
    #[serde(default)]
    pub expression: Option<Expression>,
    pub exit: ExitCondition,
    #[serde(default = "default_fallback_seconds")]
    pub fallback_seconds: f32,
    #[serde(default)]
    pub linger_seconds: f32,
    #[serde(default)]
    pub bounce_seconds: Option<f32>,
}

fn default_fallback_seconds() -> f32 {
    2.0
}

impl Phase {
    pub fn new(name: &str, kind: PhaseKind, exit: ExitCondition) -> Self {
        Self {
            name: name.to_string(),
            kind,
            dialogue: None,
            expression: None,
            exit,
            fallback_seconds: default_fallback_seconds(),
            linger_seconds: 0.0,
            bounce_seconds: None,
        }
    }

    pub fn speaking(name: &str, speaker: Speaker, text: &str, fallback_seconds: f32) -> Self {
        Self {
            dialogue: Some(Dialogue {
                speaker,
                text: text.to_string(),
            }),
            fallback_seconds,
            ..Self::new(name, PhaseKind::Speaking, ExitCondition::AudioFinished)
        }
    }

    pub fn with_expression(mut self, expression: Expression) -> Self {
        self.expression = Some(expression);
        self
    }

    pub fn with_linger(mut self, seconds: f32) -> Self {
        self.linger_seconds = seconds;
        self
    }

    pub fn with_bounce(mut self, cycle_seconds: f32) -> Self {
        self.bounce_seconds = Some(cycle_seconds);
        self
    }

    /// A colliding phase with a bounce cycle is the bounded repeating loop.
    pub fn is_bounce_loop(&self) -> bool {
        self.kind == PhaseKind::Colliding && self.bounce_seconds.is_some()
    }

    /// Whether the motion this kind drives can ever satisfy its exit.
    /// Entering and colliding close the gap, exiting leaves the stage, the
    /// rest hold still.
    fn exit_reachable(&self) -> bool {
        match (self.kind, self.exit) {
            (
                _,
                ExitCondition::Elapsed { .. } | ExitCondition::AudioFinished | ExitCondition::Always,
            ) => true,
            (PhaseKind::Entering | PhaseKind::Colliding, ExitCondition::DistanceBelow { .. }) => {
                true
            }
            (PhaseKind::Exiting, ExitCondition::Offstage) => true,
            _ => false,
        }
    }

    fn validate(&self) -> Result<(), ScriptError> {
        let seconds = |field: &'static str, value: f32| {
            if value.is_finite() && value >= 0.0 {
                Ok(())
            } else {
                Err(ScriptError::InvalidSeconds {
                    phase: self.name.clone(),
                    field,
                    value,
                })
            }
        };

        seconds("fallback_seconds", self.fallback_seconds)?;
        seconds("linger_seconds", self.linger_seconds)?;

        match self.exit {
            ExitCondition::Elapsed { seconds: s } => seconds("elapsed", s)?,
            ExitCondition::DistanceBelow { threshold } => {
                if !threshold.is_finite() || threshold <= 0.0 {
                    return Err(ScriptError::InvalidThreshold {
                        phase: self.name.clone(),
                        value: threshold,
                    });
                }
            }
            ExitCondition::AudioFinished | ExitCondition::Offstage | ExitCondition::Always => {}
        }

        if !self.exit_reachable() {
            return Err(ScriptError::UnreachableExit {
                phase: self.name.clone(),
                kind: self.kind,
            });
        }

        if let Some(dialogue) = &self.dialogue {
            if dialogue.text.trim().is_empty() {
                return Err(ScriptError::EmptyDialogue {
                    phase: self.name.clone(),
                });
            }
        } else if self.kind == PhaseKind::Speaking {
            return Err(ScriptError::MissingDialogue {
                phase: self.name.clone(),
            });
        }

        if let Some(cycle) = self.bounce_seconds {
            if self.kind != PhaseKind::Colliding {
                return Err(ScriptError::MisplacedBounce {
                    phase: self.name.clone(),
                });
            }
            if !cycle.is_finite() || cycle <= 0.0 {
                return Err(ScriptError::InvalidSeconds {
                    phase: self.name.clone(),
                    field: "bounce_seconds",
                    value: cycle,
                });
            }
            if !matches!(self.exit, ExitCondition::Elapsed { .. }) {
                return Err(ScriptError::UnboundedLoop {
                    phase: self.name.clone(),
                });
            }
        }

        Ok(())
    }
}

/// Voice ids of the two actors, used to turn dialogue into speech requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CastVoices {
    pub left: String,
    pub right: String,
}

impl CastVoices {
    pub fn voice(&self, actor: ActorId) -> &str {
        match actor {
            ActorId::Left => &self.left,
            ActorId::Right => &self.right,
        }
    }

    /// One request per distinct voice of the speaking actors.
    pub fn requests_for(&self, dialogue: &Dialogue) -> Vec<SpeechRequest> {
        let mut requests: Vec<SpeechRequest> = Vec::new();
        for actor in dialogue.speaker.actors() {
            let request = SpeechRequest::new(&dialogue.text, self.voice(*actor));
            if !requests.contains(&request) {
                requests.push(request);
            }
        }
        requests
    }
}

/// Validated, immutable, totally ordered phase table.
#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    phases: Vec<Phase>,
}

impl Script {
    pub fn new(phases: Vec<Phase>) -> Result<Self, ScriptError> {
        let first = phases.first().ok_or(ScriptError::Empty)?;
        if first.kind != PhaseKind::Entering {
            return Err(ScriptError::FirstNotEntering {
                name: first.name.clone(),
            });
        }
        if let Some(last) = phases.last() {
            if last.kind != PhaseKind::Exiting {
                return Err(ScriptError::LastNotExiting {
                    name: last.name.clone(),
                });
            }
        }
        for phase in &phases {
            phase.validate()?;
        }
        Ok(Self { phases })
    }

    /// Colliding phases without a bounce stop the actors `contact_gap`
    /// apart, so a tighter distance threshold would never fire.
    pub fn check_contact_gap(&self, contact_gap: f32) -> Result<(), ScriptError> {
        for phase in &self.phases {
            if let (PhaseKind::Colliding, None, ExitCondition::DistanceBelow { threshold }) =
                (phase.kind, phase.bounce_seconds, phase.exit)
            {
                if threshold < contact_gap {
                    return Err(ScriptError::UnreachableExit {
                        phase: phase.name.clone(),
                        kind: phase.kind,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    /// Distinct speech requests in the order the script first references them.
    pub fn speech_requests(&self, voices: &CastVoices) -> Vec<SpeechRequest> {
        let mut seen = HashSet::new();
        self.phases
            .iter()
            .filter_map(|phase| phase.dialogue.as_ref())
            .flat_map(|dialogue| voices.requests_for(dialogue))
            .filter(|request| seen.insert(request.clone()))
            .collect()
    }
}

/// Built-in sketch: walk in, bump, banter, bounce, banter, walk off.
pub fn default_phases() -> Vec<Phase> {
    vec![
        Phase::new(
            "walking_in",
            PhaseKind::Entering,
            ExitCondition::DistanceBelow { threshold: 20.0 },
        ),
        Phase::speaking("watch_it", Speaker::Both, "WATCH IT!", 2.0)
            .with_expression(Expression::Smiling),
        Phase::speaking(
            "kidding",
            Speaker::Left,
            "Just kidding, running into people is fun!",
            3.0,
        ),
        Phase::speaking("hey_ya", Speaker::Right, "Hey ya!", 2.0),
        Phase::new(
            "bounce",
            PhaseKind::Colliding,
            ExitCondition::Elapsed { seconds: 6.0 },
        )
        .with_bounce(1.0),
        Phase::speaking("go_to_work", Speaker::Left, "Okay I have to go to work", 2.5),
        Phase::speaking("dont_care", Speaker::Right, "I don't care", 2.0).with_linger(0.4),
        Phase::new(
            "beat",
            PhaseKind::Pausing,
            ExitCondition::Elapsed { seconds: 1.0 },
        ),
        Phase::new("walking_out", PhaseKind::Exiting, ExitCondition::Offstage),
    ]
}
