//! Keyboard sampling with edge detection for the one-press controls

use crate::motion::MotionInput;
use macroquad::prelude::*;

/// Raw key state for one frame
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct KeyState {
    pub forward: bool,
    pub backward: bool,
    pub turn_left: bool,
    pub turn_right: bool,
    pub run: bool,
    pub crouch: bool,
    pub jump: bool,
    pub labels: bool,
    pub quit: bool,
}

impl KeyState {
    /// Reads the keyboard (WASD or arrow keys).
    pub fn sample() -> Self {
        Self {
            forward: is_key_down(KeyCode::W) || is_key_down(KeyCode::Up),
            backward: is_key_down(KeyCode::S) || is_key_down(KeyCode::Down),
            turn_left: is_key_down(KeyCode::A) || is_key_down(KeyCode::Left),
            turn_right: is_key_down(KeyCode::D) || is_key_down(KeyCode::Right),
            run: is_key_down(KeyCode::LeftShift) || is_key_down(KeyCode::RightShift),
            crouch: is_key_down(KeyCode::C),
            jump: is_key_down(KeyCode::Space),
            labels: is_key_down(KeyCode::L),
            quit: is_key_down(KeyCode::Escape),
        }
    }
}

/// Controls that fire once per key press
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Toggles {
    pub labels: bool,
    pub quit: bool,
}

#[derive(Debug, Default)]
pub struct InputManager {
    // Previous frame key states for edge detection
    prev_key_l: bool,
    prev_key_escape: bool,
}

impl InputManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Samples the keyboard and returns this frame's toggles and held controls.
    pub fn update(&mut self) -> (Toggles, MotionInput) {
        self.process(KeyState::sample())
    }

    pub fn process(&mut self, keys: KeyState) -> (Toggles, MotionInput) {
        let toggles = Toggles {
            labels: keys.labels && !self.prev_key_l,
            quit: keys.quit && !self.prev_key_escape,
        };
        self.prev_key_l = keys.labels;
        self.prev_key_escape = keys.quit;

        let motion = MotionInput {
            forward: keys.forward,
            backward: keys.backward,
            turn_left: keys.turn_left,
            turn_right: keys.turn_right,
            run: keys.run,
            crouch: keys.crouch,
            jump: keys.jump,
        };

        (toggles, motion)
    }
}
