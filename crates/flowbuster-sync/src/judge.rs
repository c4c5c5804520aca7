//! Hit-window timing judgments. Everything here is in audio-clock seconds.

/// Half-width of the hit window around an obstacle's arrival.
pub const GOOD_TIMING_WINDOW: f64 = 0.1;
/// Half-width of the perfect band: the inner 50% of the window.
pub const PERFECT_TIMING_WINDOW: f64 = GOOD_TIMING_WINDOW * 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Judgment {
    Perfect,
    Good,
    Miss,
}

impl Judgment {
    pub fn is_hit(self) -> bool {
        matches!(self, Judgment::Perfect | Judgment::Good)
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Judgment::Perfect => "Perfect",
            Judgment::Good => "Good",
            Judgment::Miss => "Miss",
        }
    }
}

impl std::fmt::Display for Judgment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// `Hit` and `Missed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObstacleState {
    Pending,
    Hit,
    Missed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObstacleTiming {
    pub arrival_estimate: f64,
    pub hit_window_start: f64,
    pub hit_window_end: f64,
    pub state: ObstacleState,
}

impl ObstacleTiming {
    pub fn new(arrival_estimate: f64, hit_window_start: f64, hit_window_end: f64) -> Self {
        Self {
            arrival_estimate,
            hit_window_start,
            hit_window_end,
            state: ObstacleState::Pending,
        }
    }

    /// Window of `arrival ± half_window`.
    pub fn around(arrival_estimate: f64, half_window: f64) -> Self {
        Self::new(
            arrival_estimate,
            arrival_estimate - half_window,
            arrival_estimate + half_window,
        )
    }

    pub fn is_pending(&self) -> bool {
        self.state == ObstacleState::Pending
    }

    /// Judge an action and mark the obstacle hit on Perfect/Good.
    /// A miss leaves the state untouched; expiry handles late misses.
    pub fn resolve(&mut self, action_timestamp: f64) -> Judgment {
        let judgment = judge(self, action_timestamp);
        if judgment.is_hit() {
            self.state = ObstacleState::Hit;
        }
        judgment
    }

    /// Mark a pending obstacle missed once its window has closed.
    /// Returns true on the transition.
    pub fn expire(&mut self, now: f64) -> bool {
        if self.is_pending() && now > self.hit_window_end {
            self.state = ObstacleState::Missed;
            return true;
        }
        false
    }
}

/// Classify an action against an obstacle's hit window.
///
/// Resolved obstacles always judge `Miss`: a missed obstacle cannot be
/// reopened and a hit one cannot be hit twice.
pub fn judge(obstacle: &ObstacleTiming, action_timestamp: f64) -> Judgment {
    if !obstacle.is_pending() || action_timestamp.is_nan() {
        return Judgment::Miss;
    }

    let start = obstacle.hit_window_start;
    let end = obstacle.hit_window_end;
    let center = (start + end) * 0.5;
    let perfect_half = (end - start) * 0.25;

    if (action_timestamp - center).abs() <= perfect_half {
        Judgment::Perfect
    } else if action_timestamp >= start && action_timestamp <= end {
        Judgment::Good
    } else {
        Judgment::Miss
    }
}
