//! Per-peer animation selection
//!
//! Continuous tags (idle, walk, run, crouch) are applied every frame; re-applying the
//! current tag keeps its phase. One-shot tags (jump) start only when not already
//! playing, at most once per run of samples carrying them, and fall back to idle
//! when done.

use shared::AnimationTag;

#[derive(Debug, Clone, PartialEq)]
pub struct AnimationState {
    current: AnimationTag,
    elapsed: f32,
    one_shot_trigger: Option<u64>,
}

impl AnimationState {
    pub fn new() -> Self {
        Self {
            current: AnimationTag::Idle,
            elapsed: 0.0,
            one_shot_trigger: None,
        }
    }

    pub fn current(&self) -> AnimationTag {
        self.current
    }

    /// Seconds since the current animation started
    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    /// 0..1 through a one-shot animation, `None` for looping ones
    pub fn progress(&self) -> Option<f32> {
        self.current
            .one_shot_duration()
            .map(|duration| (self.elapsed / duration).min(1.0))
    }

    pub fn is_playing(&self, tag: AnimationTag) -> bool {
        self.current == tag
    }

    /// Applies `tag`, which started arriving with sample number `sample_seq`.
    /// Returns true if an animation (re)started.
    pub fn select(&mut self, tag: AnimationTag, sample_seq: u64) -> bool {
        if tag.is_one_shot() {
            if self.is_playing(tag) || self.one_shot_trigger == Some(sample_seq) {
                return false;
            }
            self.one_shot_trigger = Some(sample_seq);
            self.start(tag);
            return true;
        }

        if self.current == tag {
            return false;
        }
        self.start(tag);
        true
    }

    pub fn advance(&mut self, dt: f32) {
        self.elapsed += dt.max(0.0);

        if let Some(duration) = self.current.one_shot_duration() {
            if self.elapsed >= duration {
                self.start(AnimationTag::Idle);
            }
        }
    }

    fn start(&mut self, tag: AnimationTag) {
        self.current = tag;
        self.elapsed = 0.0;
    }
}

impl Default for AnimationState {
    fn default() -> Self {
        Self::new()
    }
}
