use crate::core::actor::{Actor, Expression};
use crate::services::controller::{AudioCue, Snapshot, SoundEffect};
use crate::services::script::Speaker;

/// Draws a snapshot as one line of text: the stage, then the active line.
///
/// Purely a consumer of `Snapshot`; it holds no animation state.
pub struct TerminalRenderer {
    columns: usize,
    stage_width: f32,
}

impl TerminalRenderer {
    pub fn new(columns: usize, stage_width: f32) -> Self {
        Self {
            columns: columns.max(8),
            stage_width: if stage_width > 0.0 { stage_width } else { 1.0 },
        }
    }

    pub fn render(&self, snapshot: &Snapshot) -> String {
        let mut stage = vec!['_'; self.columns];
        for actor in [&snapshot.left, &snapshot.right] {
            self.place(&mut stage, actor);
        }
        let stage: String = stage.into_iter().collect();

        let caption = match &snapshot.dialogue {
            Some(dialogue) => {
                let who = match dialogue.speaker {
                    Speaker::Left => snapshot.left.name().to_string(),
                    Speaker::Right => snapshot.right.name().to_string(),
                    Speaker::Both => {
                        format!("{} & {}", snapshot.left.name(), snapshot.right.name())
                    }
                };
                format!("{}: \"{}\"", who, dialogue.text)
            }
            None => String::new(),
        };
        format!("|{}| {:<12} {}", stage, snapshot.phase_name, caption)
    }

    pub fn cue(&self, cue: &AudioCue) -> String {
        format!(
            "[audio] {} says {:?} ({:.2}s)",
            cue.request.voice(),
            cue.request.text(),
            cue.audio.duration.as_secs_f32()
        )
    }

    pub fn effect(&self, effect: SoundEffect) -> String {
        let sound = match effect {
            SoundEffect::Collision => "*bonk*",
            SoundEffect::WalkingStarted => "footsteps start",
            SoundEffect::WalkingStopped => "footsteps stop",
        };
        format!("[sfx] {}", sound)
    }

    /// Column of a stage position, or None when it is off the stage.
    fn column(&self, position: f32) -> Option<usize> {
        if !(0.0..=self.stage_width).contains(&position) {
            return None;
        }
        let scaled = position / self.stage_width * (self.columns - 1) as f32;
        Some(scaled.round() as usize)
    }

    fn place(&self, stage: &mut [char], actor: &Actor) {
        let Some(column) = self.column(actor.position()) else {
            return;
        };
        let (head, body) = glyphs(actor);
        // Head on the side the actor faces.
        let (first, second) = if actor.facing() > 0 {
            (body, head)
        } else {
            (head, body)
        };
        stage[column] = first;
        if column + 1 < stage.len() {
            stage[column + 1] = second;
        }
    }
}

fn glyphs(actor: &Actor) -> (char, char) {
    let head = match (actor.expression(), actor.is_speaking()) {
        (Expression::Neutral, false) => 'o',
        (Expression::Neutral, true) => 'O',
        (Expression::Smiling, false) => 'u',
        (Expression::Smiling, true) => 'U',
    };
    let body = if !actor.is_walking() {
        '|'
    } else if actor.gait_phase() < 0.5 {
        '/'
    } else {
        '\\'
    };
    (head, body)
}
