//! Local player kinematics: turning, walking in the facing direction, jumping and gravity
//!
//! Produces the position/rotation/animation tuple the throttler samples every frame.

use shared::{
    wrap_angle, AnimationTag, Vec3, CROUCH_MULTIPLIER, GRAVITY, GROUND_HEIGHT, JUMP_VELOCITY,
    MOVE_SPEED, PLAY_AREA_RADIUS, RUN_MULTIPLIER, TURN_SPEED,
};

/// Held controls for one frame
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MotionInput {
    pub forward: bool,
    pub backward: bool,
    pub turn_left: bool,
    pub turn_right: bool,
    pub run: bool,
    pub crouch: bool,
    pub jump: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MovementState {
    #[default]
    Idle,
    Walking,
    Running,
    Jumping,
    Crouching,
}

impl MovementState {
    pub fn animation_tag(&self) -> AnimationTag {
        match self {
            MovementState::Idle => AnimationTag::Idle,
            MovementState::Walking => AnimationTag::Walk,
            MovementState::Running => AnimationTag::Run,
            MovementState::Jumping => AnimationTag::Jump,
            MovementState::Crouching => AnimationTag::Crouch,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LocalPlayer {
    pub position: Vec3,
    pub rotation: f32,
    pub velocity: Vec3,
    pub grounded: bool,
    pub state: MovementState,
}

impl LocalPlayer {
    pub fn new(position: Vec3, rotation: f32) -> Self {
        Self {
            position: Vec3::new(position.x, position.y.max(GROUND_HEIGHT), position.z),
            rotation: wrap_angle(rotation),
            velocity: Vec3::ZERO,
            grounded: position.y <= GROUND_HEIGHT,
            state: MovementState::Idle,
        }
    }

    pub fn animation_tag(&self) -> AnimationTag {
        self.state.animation_tag()
    }

    /// Advances the player by `dt` seconds. Returns true on the frame a jump starts.
    pub fn integrate(&mut self, input: &MotionInput, dt: f32) -> bool {
        let dt = dt.max(0.0);

        if input.turn_left {
            self.rotation += TURN_SPEED * dt;
        }
        if input.turn_right {
            self.rotation -= TURN_SPEED * dt;
        }
        self.rotation = wrap_angle(self.rotation);

        let mut speed = MOVE_SPEED;
        if input.crouch {
            speed *= CROUCH_MULTIPLIER;
        } else if input.run {
            speed *= RUN_MULTIPLIER;
        }

        let direction = match (input.forward, input.backward) {
            (true, false) => 1.0,
            (false, true) => -1.0,
            _ => 0.0,
        };
        let step = speed * dt * direction;
        let move_x = self.rotation.sin() * step;
        let move_z = self.rotation.cos() * step;

        self.position.x = (self.position.x + move_x).clamp(-PLAY_AREA_RADIUS, PLAY_AREA_RADIUS);
        self.position.z = (self.position.z + move_z).clamp(-PLAY_AREA_RADIUS, PLAY_AREA_RADIUS);

        if dt > 0.0 {
            self.velocity.x = move_x / dt;
            self.velocity.z = move_z / dt;
        }

        let mut just_jumped = false;
        if input.jump && self.grounded && !input.crouch {
            self.velocity.y = JUMP_VELOCITY;
            self.grounded = false;
            just_jumped = true;
        }

        if self.grounded {
            self.position.y = GROUND_HEIGHT;
        } else {
            self.velocity.y -= GRAVITY * dt;
            self.position.y += self.velocity.y * dt;

            if self.position.y <= GROUND_HEIGHT {
                self.position.y = GROUND_HEIGHT;
                self.velocity.y = 0.0;
                self.grounded = true;
            }
        }

        let moving = direction != 0.0;
        self.state = if !self.grounded {
            MovementState::Jumping
        } else if input.crouch {
            MovementState::Crouching
        } else if moving && input.run {
            MovementState::Running
        } else if moving {
            MovementState::Walking
        } else {
            MovementState::Idle
        };

        just_jumped
    }
}
