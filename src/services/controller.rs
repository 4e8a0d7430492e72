use crate::core::actor::{Actor, ActorId};
use crate::core::config::{ActorsConfig, StageConfig};
use crate::services::script::{CastVoices, Dialogue, ExitCondition, Phase, PhaseKind, Script};
use crate::services::speech::{SpeechAudio, SpeechRequest, SpeechSource, SpeechStatus};
use log::{debug, info};
use std::sync::Arc;

/// Tolerance for comparing the accumulated clock against configured seconds.
const CLOCK_EPSILON: f64 = 1e-6;

/// A clip that should start playing on the tick it was reported.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioCue {
    pub request: SpeechRequest,
    pub audio: Arc<SpeechAudio>,
}

/// One-shot sound the host plays alongside the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundEffect {
    /// The actors met, or came back together during a bounce.
    Collision,
    WalkingStarted,
    WalkingStopped,
}

/// Read-only view handed to the presentation layer after every tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub left: Actor,
    pub right: Actor,
    pub phase_index: usize,
    pub phase_name: String,
    pub phase_kind: PhaseKind,
    pub phase_elapsed: f32,
    /// Line to display, if any.
    pub dialogue: Option<Dialogue>,
    /// Clips that started since the previous tick.
    pub audio_cues: Vec<AudioCue>,
    /// Effects triggered since the previous tick.
    pub effects: Vec<SoundEffect>,
    /// Completed cycles of the most recent bounce loop.
    pub bounces: u32,
    pub finished: bool,
}

/// What one `BounceLoop::advance` crossed.
#[derive(Debug, PartialEq, Eq)]
struct BounceProgress {
    completed: u32,
    /// Starts of the return half of a cycle.
    contacts: u32,
}

/// Sub-timer of a colliding phase: back off for the first half of each
/// cycle, return to contact for the second.
#[derive(Debug)]
struct BounceLoop {
    cycle: f64,
    timer: f64,
}

impl BounceLoop {
    fn new(cycle: f32) -> Self {
        Self {
            cycle: cycle as f64,
            timer: 0.0,
        }
    }

    fn advance(&mut self, delta: f64) -> BounceProgress {
        let before = self.timer / self.cycle;
        self.timer += delta;
        let after = self.timer / self.cycle;
        BounceProgress {
            completed: (after.floor() - before.floor()) as u32,
            contacts: ((after + 0.5).floor() - (before + 0.5).floor()) as u32,
        }
    }

    fn backing_off(&self) -> bool {
        self.timer % self.cycle < self.cycle / 2.0
    }
}

#[derive(Debug)]
struct ActiveDialogue {
    dialogue: Dialogue,
    /// Seconds the line is spoken for, from phase entry.
    window: f64,
}

/// Phase-sequenced state machine driving both actors.
///
/// The host calls `tick` once per frame. Speech is requested through a
/// non-blocking `SpeechSource`; whatever status an entry has when its phase
/// starts decides how long the line is held.
pub struct AnimationController {
    script: Script,
    stage: StageConfig,
    voices: CastVoices,
    speech: Arc<dyn SpeechSource>,
    left: Actor,
    right: Actor,
    index: usize,
    elapsed: f64,
    clock: f64,
    bounce: Option<BounceLoop>,
    bounces: u32,
    dialogue: Option<ActiveDialogue>,
    cues: Vec<AudioCue>,
    effects: Vec<SoundEffect>,
    /// Whether anyone was walking at the end of the last tick.
    walking: bool,
    finished: bool,
}

impl AnimationController {
    pub fn new(
        script: Script,
        stage: &StageConfig,
        cast: &ActorsConfig,
        speech: Arc<dyn SpeechSource>,
    ) -> Self {
        let left = Actor::new(
            &cast.left.name,
            &cast.left.voice,
            stage.start_margin,
            1,
            stage.actor_speed,
            stage.stride_length,
        );
        let right = Actor::new(
            &cast.right.name,
            &cast.right.voice,
            stage.width - stage.start_margin,
            -1,
            stage.actor_speed,
            stage.stride_length,
        );
        let voices = CastVoices {
            left: left.voice().to_string(),
            right: right.voice().to_string(),
        };
        let mut controller = Self {
            script,
            stage: stage.clone(),
            voices,
            speech,
            left,
            right,
            index: 0,
            elapsed: 0.0,
            clock: 0.0,
            bounce: None,
            bounces: 0,
            dialogue: None,
            cues: Vec::new(),
            effects: Vec::new(),
            walking: false,
            finished: false,
        };
        controller.begin(0);
        controller
    }

    /// Advances the animation by `delta` seconds.
    ///
    /// Once finished, the state is frozen and no speech is requested.
    pub fn tick(&mut self, delta: f32) -> Snapshot {
        if !self.finished {
            let delta = if delta.is_finite() && delta > 0.0 {
                delta as f64
            } else {
                0.0
            };
            self.elapsed += delta;
            self.clock += delta;
            self.update_actors(delta);
            if self.exit_satisfied() {
                let collided = matches!(self.phase().exit, ExitCondition::DistanceBelow { .. });
                if collided {
                    self.effects.push(SoundEffect::Collision);
                }
                self.leave_phase();
                self.begin(self.index + 1);
            }
            self.report_walking();
        }
        let mut snapshot = self.snapshot();
        snapshot.audio_cues = std::mem::take(&mut self.cues);
        snapshot.effects = std::mem::take(&mut self.effects);
        snapshot
    }

    /// Current state without advancing. Cues and effects already reported by
    /// `tick` are not repeated.
    pub fn snapshot(&self) -> Snapshot {
        let phase = self.phase();
        Snapshot {
            left: self.left.clone(),
            right: self.right.clone(),
            phase_index: self.index,
            phase_name: phase.name.clone(),
            phase_kind: phase.kind,
            phase_elapsed: self.elapsed as f32,
            dialogue: self.dialogue.as_ref().map(|d| d.dialogue.clone()),
            audio_cues: self.cues.clone(),
            effects: self.effects.clone(),
            bounces: self.bounces,
            finished: self.finished,
        }
    }

    pub fn finished(&self) -> bool {
        self.finished
    }

    /// Seconds of animation time consumed so far.
    pub fn clock(&self) -> f64 {
        self.clock
    }

    fn phase(&self) -> &Phase {
        &self.script.phases()[self.index]
    }

    fn center(&self) -> f32 {
        self.stage.width / 2.0
    }

    /// Enters phase `index`, passing straight through every phase whose exit
    /// already holds on entry. Running off the end finishes the animation.
    fn begin(&mut self, mut index: usize) {
        loop {
            if index >= self.script.len() {
                self.finish();
                return;
            }
            self.index = index;
            self.elapsed = 0.0;
            if self.enter_phase() {
                return;
            }
            self.leave_phase();
            index += 1;
        }
    }

    /// Runs entry actions. Returns false when the phase is already over, in
    /// which case its dialogue is skipped and no cue is reported.
    fn enter_phase(&mut self) -> bool {
        let phase = &self.script.phases()[self.index];
        info!(
            "Phase {} '{}' ({:?}) at {:.2}s",
            self.index, phase.name, phase.kind, self.clock
        );

        if let Some(expression) = phase.expression {
            self.left.set_expression(expression);
            self.right.set_expression(expression);
        }

        if matches!(phase.kind, PhaseKind::Speaking | PhaseKind::Pausing) {
            self.left.stop();
            self.right.stop();
        }

        if let Some(cycle) = phase.bounce_seconds.filter(|_| phase.is_bounce_loop()) {
            self.bounce = Some(BounceLoop::new(cycle));
            self.bounces = 0;
        }

        let mut cues = Vec::new();
        if let Some(dialogue) = &phase.dialogue {
            let mut ready: Option<f64> = None;
            for request in self.voices.requests_for(dialogue) {
                let handle = self.speech.request(&request);
                match handle.status() {
                    SpeechStatus::Ready(audio) => {
                        let seconds = audio.duration.as_secs_f64();
                        ready = Some(ready.map_or(seconds, |r| r.max(seconds)));
                        cues.push(AudioCue {
                            request: handle.request().clone(),
                            audio,
                        });
                    }
                    SpeechStatus::Pending => {
                        debug!("Speech for {:?} not ready, using fallback", request.text());
                    }
                    SpeechStatus::Failed(reason) => {
                        debug!("Speech for {:?} failed ({}), silent", request.text(), reason);
                    }
                }
            }
            self.dialogue = Some(ActiveDialogue {
                dialogue: dialogue.clone(),
                window: ready.unwrap_or(phase.fallback_seconds as f64),
            });
            for actor in dialogue.speaker.actors() {
                match actor {
                    ActorId::Left => self.left.set_speaking(true),
                    ActorId::Right => self.right.set_speaking(true),
                }
            }
        }

        if self.exit_satisfied() {
            if self.dialogue.is_some() {
                debug!("Skipping dialogue of phase '{}'", self.phase().name);
            }
            return false;
        }
        self.cues.extend(cues);
        true
    }

    fn leave_phase(&mut self) {
        self.dialogue = None;
        self.bounce = None;
        self.left.set_speaking(false);
        self.right.set_speaking(false);
    }

    fn finish(&mut self) {
        self.index = self.script.len() - 1;
        self.left.stop();
        self.right.stop();
        self.finished = true;
        info!("Animation finished after {:.2}s", self.clock);
    }

    fn update_actors(&mut self, delta: f64) {
        let step = delta as f32;
        let center = self.center();
        let kind = self.phase().kind;
        match kind {
            PhaseKind::Entering => {
                self.left.step(step, center);
                self.right.step(step, center);
            }
            PhaseKind::Colliding => {
                let contact = self.stage.contact_gap / 2.0;
                let reach = match self.bounce.as_mut() {
                    Some(bounce) => {
                        let progress = bounce.advance(delta);
                        self.bounces += progress.completed;
                        for _ in 0..progress.contacts {
                            self.effects.push(SoundEffect::Collision);
                        }
                        if bounce.backing_off() {
                            contact + self.stage.bounce_distance
                        } else {
                            contact
                        }
                    }
                    None => contact,
                };
                self.left.step(step, center - reach);
                self.right.step(step, center + reach);
                // Knocked back, still facing each other.
                self.left.face(1);
                self.right.face(-1);
            }
            PhaseKind::Speaking | PhaseKind::Pausing => {
                self.left.step(step, self.left.position());
                self.right.step(step, self.right.position());
            }
            PhaseKind::Exiting => {
                let margin = self.stage.offstage_margin;
                self.left.step(step, -margin);
                self.right.step(step, self.stage.width + margin);
            }
        }

        if let Some(active) = &self.dialogue {
            let speaking = self.elapsed + CLOCK_EPSILON < active.window;
            if !speaking {
                self.left.set_speaking(false);
                self.right.set_speaking(false);
            }
        }
    }

    fn report_walking(&mut self) {
        let walking = self.left.is_walking() || self.right.is_walking();
        if walking != self.walking {
            self.walking = walking;
            self.effects.push(if walking {
                SoundEffect::WalkingStarted
            } else {
                SoundEffect::WalkingStopped
            });
        }
    }

    fn exit_satisfied(&self) -> bool {
        let phase = self.phase();
        match phase.exit {
            ExitCondition::Elapsed { seconds } => self.elapsed + CLOCK_EPSILON >= seconds as f64,
            ExitCondition::DistanceBelow { threshold } => {
                (self.left.position() - self.right.position()).abs() <= threshold
            }
            ExitCondition::AudioFinished => match &self.dialogue {
                Some(active) => {
                    self.elapsed + CLOCK_EPSILON >= active.window + phase.linger_seconds as f64
                }
                None => true,
            },
            ExitCondition::Offstage => {
                let margin = self.stage.offstage_margin;
                self.left.position() <= -margin
                    && self.right.position() >= self.stage.width + margin
            }
            ExitCondition::Always => true,
        }
    }
}
