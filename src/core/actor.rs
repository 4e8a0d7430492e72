use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Expression {
    #[default]
    Neutral,
    Smiling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActorId {
    Left,
    Right,
}

/// Visual state of one character on the horizontal stage line.
///
/// Pure state plus `step`; nothing here knows about phases, dialogue or
/// audio.
#[derive(Debug, Clone, PartialEq)]
pub struct Actor {
    name: String,
    voice: String,
    position: f32,
    facing: i8,
    gait: f32,
    expression: Expression,
    speaking: bool,
    walking: bool,
    speed: f32,
    stride: f32,
}

impl Actor {
    pub fn new(name: &str, voice: &str, position: f32, facing: i8, speed: f32, stride: f32) -> Self {
        Self {
            name: name.to_string(),
            voice: voice.to_string(),
            position,
            facing: if facing < 0 { -1 } else { 1 },
            gait: 0.0,
            expression: Expression::Neutral,
            speaking: false,
            walking: false,
            speed: speed.max(0.0),
            stride: if stride > 0.0 { stride } else { 1.0 },
        }
    }

    /// Moves toward `target_x` at the actor's fixed speed without overshooting.
    ///
    /// The gait offset advances by the distance actually covered, so a
    /// stationary actor never shows a walking cycle.
    pub fn step(&mut self, delta: f32, target_x: f32) {
        let offset = target_x - self.position;
        if offset == 0.0 || !delta.is_finite() || delta <= 0.0 {
            self.walking = false;
            return;
        }

        let reach = self.speed * delta;
        let travelled = offset.abs().min(reach);
        if offset.abs() <= reach {
            self.position = target_x;
        } else {
            self.position += offset.signum() * reach;
        }

        self.facing = if offset > 0.0 { 1 } else { -1 };
        self.gait = (self.gait + travelled) % self.stride;
        self.walking = travelled > 0.0;
    }

    /// Turns without moving.
    pub fn face(&mut self, facing: i8) {
        self.facing = if facing < 0 { -1 } else { 1 };
    }

    pub fn set_expression(&mut self, expression: Expression) {
        self.expression = expression;
    }

    pub fn set_speaking(&mut self, speaking: bool) {
        self.speaking = speaking;
    }

    pub fn position(&self) -> f32 {
        self.position
    }

    pub fn facing(&self) -> i8 {
        self.facing
    }

    /// Distance into the current stride, in `[0, stride)`.
    pub fn gait(&self) -> f32 {
        self.gait
    }

    /// Gait offset normalised to `[0, 1)`.
    pub fn gait_phase(&self) -> f32 {
        self.gait / self.stride
    }

    pub fn expression(&self) -> Expression {
        self.expression
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Voice id used for the actor's lines.
    pub fn voice(&self) -> &str {
        &self.voice
    }

    /// Halts any walk cycle in place.
    pub fn stop(&mut self) {
        self.walking = false;
    }

    /// Whether the last `step` covered any distance.
    pub fn is_walking(&self) -> bool {
        self.walking
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walker() -> Actor {
        Actor::new("A", "alloy", 0.0, 1, 100.0, 40.0)
    }

    #[test]
    fn test_step_moves_at_fixed_speed() {
        let mut actor = walker();
        actor.step(0.1, 500.0);
        assert!((actor.position() - 10.0).abs() < 1e-4);
        assert!(actor.is_walking());
        assert_eq!(actor.facing(), 1);
    }

    #[test]
    fn test_step_does_not_overshoot() {
        let mut actor = walker();
        actor.step(1.0, 25.0);
        assert_eq!(actor.position(), 25.0);
        assert!((actor.gait() - 25.0).abs() < 1e-4);
    }

    #[test]
    fn test_step_at_target_is_noop() {
        let mut actor = walker();
        actor.step(0.5, 10.0);
        let before = actor.clone();
        actor.step(0.5, 10.0);
        assert_eq!(actor.position(), before.position());
        assert_eq!(actor.gait(), before.gait());
        assert!(!actor.is_walking());
    }

    #[test]
    fn test_gait_tracks_distance_not_time() {
        let mut slow = Actor::new("slow", "v", 0.0, 1, 10.0, 40.0);
        let mut fast = Actor::new("fast", "v", 0.0, 1, 20.0, 40.0);
        slow.step(1.0, 100.0);
        fast.step(0.5, 100.0);
        assert!((slow.gait() - fast.gait()).abs() < 1e-4);

        // Wraps at the stride length.
        fast.step(2.0, 100.0);
        assert!((fast.gait() - 10.0).abs() < 1e-3);
        assert!((fast.gait_phase() - 0.25).abs() < 1e-3);
    }

    #[test]
    fn test_stop_keeps_position_and_gait() {
        let mut actor = walker();
        actor.step(0.1, 500.0);
        actor.stop();
        assert!(!actor.is_walking());
        assert!((actor.position() - 10.0).abs() < 1e-4);
        assert!((actor.gait() - 10.0).abs() < 1e-4);
        assert_eq!(actor.name(), "A");
        assert_eq!(actor.voice(), "alloy");
    }

    #[test]
    fn test_step_turns_toward_target() {
        let mut actor = walker();
        actor.step(0.1, -50.0);
        assert_eq!(actor.facing(), -1);
        assert!(actor.position() < 0.0);
    }

    #[test]
    fn test_setters_only_change_their_field() {
        let mut actor = walker();
        actor.set_expression(Expression::Smiling);
        actor.set_speaking(true);
        assert_eq!(actor.expression(), Expression::Smiling);
        assert!(actor.is_speaking());
        assert_eq!(actor.position(), 0.0);
        assert_eq!(actor.gait(), 0.0);
    }
}
