use crate::config::TempoConfig;

pub const MIN_TEMPO: f32 = 0.5;
pub const MAX_TEMPO: f32 = 2.0;
pub const DEFAULT_TEMPO: f32 = 1.0;
/// Seconds of frame time per eased transition.
pub const TRANSITION_DURATION: f64 = 0.3;

/// Cumulative frame time within this of the duration counts as complete.
const COMPLETION_EPSILON: f64 = 1e-9;

/// Cubic ease-out, `1 - (1 - t)^3`. Monotonic on [0, 1] with no overshoot.
pub fn ease_out_cubic(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    1.0 - (1.0 - t).powi(3)
}

/// Decides whether a non-default tempo may be requested.
pub trait TempoGate {
    fn has_energy(&self) -> bool;
}

/// Discrete player intent, as produced by gesture recognition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TempoDirection {
    Slower,
    Faster,
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionPhase {
    Started,
    Completed,
}

/// Emitted when a transition begins (value = new target) and when it settles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoChange {
    pub value: f32,
    pub phase: TransitionPhase,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoState {
    pub current: f32,
    pub target: f32,
    pub transition_start_value: f32,
    pub transition_elapsed: f64,
    pub transition_duration: f64,
}

impl TempoState {
    fn settled(value: f32, duration: f64) -> Self {
        Self {
            current: value,
            target: value,
            transition_start_value: value,
            transition_elapsed: duration,
            transition_duration: duration,
        }
    }
}

/// Owns the playback-rate multiplier and eases it toward requested targets.
pub struct TempoController {
    state: TempoState,
    transitioning: bool,
    min: f32,
    max: f32,
    default: f32,
}

impl TempoController {
    pub fn new(config: &TempoConfig) -> Self {
        Self {
            state: TempoState::settled(config.default_tempo, config.transition_secs),
            transitioning: false,
            min: config.min_tempo,
            max: config.max_tempo,
            default: config.default_tempo,
        }
    }

    /// Request a new target. Returns the `Started` change if a transition began.
    ///
    /// NaN requests the default tempo; other values are clamped to the
    /// configured range. Without energy only the default may be requested.
    pub fn request_tempo(&mut self, target: f32, gate: &dyn TempoGate) -> Option<TempoChange> {
        let mut target = if target.is_nan() {
            self.default
        } else {
            target.clamp(self.min, self.max)
        };

        if target != self.default && !gate.has_energy() {
            log::debug!("Tempo {target:.2} refused: no energy, requesting default");
            target = self.default;
        }

        if target == self.state.target {
            return None;
        }

        self.state.transition_start_value = self.state.current;
        self.state.target = target;
        self.state.transition_elapsed = 0.0;
        self.transitioning = true;

        log::debug!(
            "Tempo transition {:.3} -> {target:.3}",
            self.state.transition_start_value
        );
        Some(TempoChange {
            value: target,
            phase: TransitionPhase::Started,
        })
    }

    pub fn request_direction(
        &mut self,
        direction: TempoDirection,
        gate: &dyn TempoGate,
    ) -> Option<TempoChange> {
        let target = match direction {
            TempoDirection::Slower => self.min,
            TempoDirection::Faster => self.max,
            TempoDirection::Default => self.default,
        };
        self.request_tempo(target, gate)
    }

    /// Advance by `dt` seconds of frame time. Returns `Completed` once per transition.
    pub fn tick(&mut self, dt: f64) -> Option<TempoChange> {
        if !self.transitioning {
            return None;
        }
        if dt.is_finite() && dt > 0.0 {
            self.state.transition_elapsed += dt;
        }

        let s = &mut self.state;
        if s.transition_elapsed + COMPLETION_EPSILON >= s.transition_duration {
            s.transition_elapsed = s.transition_duration;
            s.current = s.target;
            self.transitioning = false;
            return Some(TempoChange {
                value: s.target,
                phase: TransitionPhase::Completed,
            });
        }

        let eased = ease_out_cubic(s.transition_elapsed / s.transition_duration);
        let start = f64::from(s.transition_start_value);
        let target = f64::from(s.target);
        s.current = (start + (target - start) * eased) as f32;
        None
    }

    pub fn current(&self) -> f32 {
        self.state.current
    }

    pub fn target(&self) -> f32 {
        self.state.target
    }

    pub fn default_tempo(&self) -> f32 {
        self.default
    }

    pub fn is_transitioning(&self) -> bool {
        self.transitioning
    }

    pub fn state(&self) -> &TempoState {
        &self.state
    }

    /// Rate handed to the audio output.
    pub fn playback_rate(&self) -> f32 {
        self.state.current
    }

    /// Pitch shift in semitones that cancels the rate change.
    pub fn semitone_shift(&self) -> f32 {
        12.0 * self.state.current.log2()
    }

    /// Snap back to the default tempo with no transition.
    pub fn reset(&mut self) {
        self.state = TempoState::settled(self.default, self.state.transition_duration);
        self.transitioning = false;
    }
}
