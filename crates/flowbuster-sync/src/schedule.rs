use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::audio::{FeatureVector, Lane};
use crate::beat::BeatEvent;
use crate::config::TimingConfig;
use crate::judge::{Judgment, ObstacleTiming};

/// Travel time from spawn to the judgment point: two beats at 120 BPM.
pub const DEFAULT_LEAD_TIME: f64 = 1.0;

/// Lane entry in a spawn step. `Auto` follows the loudest band at the beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LaneSpec {
    Low,
    Mid,
    High,
    Auto,
}

impl LaneSpec {
    pub fn resolve(self, features: Option<&FeatureVector>) -> Lane {
        match self {
            LaneSpec::Low => Lane::Low,
            LaneSpec::Mid => Lane::Mid,
            LaneSpec::High => Lane::High,
            LaneSpec::Auto => features.and_then(|f| f.loudest_lane()).unwrap_or(Lane::Mid),
        }
    }
}

/// Repeating per-beat spawn list. Step `i` is used for beats `i + 1`,
/// `i + 1 + len`, and so on. An empty step is a rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnPattern {
    pub name: String,
    pub steps: Vec<Vec<LaneSpec>>,
}

impl Default for SpawnPattern {
    fn default() -> Self {
        Self {
            name: "every beat".into(),
            steps: vec![vec![LaneSpec::Auto]],
        }
    }
}

impl SpawnPattern {
    pub fn from_json(json: &str) -> Result<Self> {
        let pattern: Self = serde_json::from_str(json).context("parsing spawn pattern")?;
        if pattern.steps.is_empty() {
            bail!("spawn pattern '{}' has no steps", pattern.name);
        }
        Ok(pattern)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let pattern =
            Self::from_json(&contents).with_context(|| format!("loading {}", path.display()))?;
        log::info!(
            "Loaded spawn pattern '{}' ({} steps) from {}",
            pattern.name,
            pattern.steps.len(),
            path.display()
        );
        Ok(pattern)
    }

    /// Step for a 1-based beat sequence number.
    pub fn step(&self, sequence: u64) -> &[LaneSpec] {
        if self.steps.is_empty() {
            return &[];
        }
        let index = (sequence.saturating_sub(1) % self.steps.len() as u64) as usize;
        &self.steps[index]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Obstacle {
    pub id: u64,
    pub lane: Lane,
    pub beat_sequence: u64,
    pub timing: ObstacleTiming,
}

/// Result of a player action.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActionOutcome {
    pub judgment: Judgment,
    /// The obstacle the action was judged against, if any.
    pub obstacle: Option<Obstacle>,
}

/// Spawns obstacles on beats and keeps them until they are hit or missed.
pub struct ObstacleScheduler {
    pattern: SpawnPattern,
    /// Ordered by arrival; beats arrive in order so pushes keep it sorted.
    obstacles: Vec<Obstacle>,
    next_id: u64,
    lead_time: f64,
    latency_offset: f64,
    half_window: f64,
}

impl ObstacleScheduler {
    pub fn new(pattern: SpawnPattern, timing: &TimingConfig) -> Self {
        Self {
            pattern,
            obstacles: Vec::new(),
            next_id: 1,
            lead_time: timing.lead_time_secs,
            latency_offset: timing.latency_offset_secs,
            half_window: timing.good_window_secs,
        }
    }

    pub fn pattern(&self) -> &SpawnPattern {
        &self.pattern
    }

    /// Spawn this beat's step. Returns the new obstacles.
    pub fn on_beat(&mut self, beat: &BeatEvent, features: Option<&FeatureVector>) -> Vec<Obstacle> {
        let arrival = beat.timestamp + self.lead_time + self.latency_offset;
        let step = self.pattern.step(beat.sequence).to_vec();

        let mut spawned = Vec::with_capacity(step.len());
        for slot in step {
            let obstacle = Obstacle {
                id: self.next_id,
                lane: slot.resolve(features),
                beat_sequence: beat.sequence,
                timing: ObstacleTiming::around(arrival, self.half_window),
            };
            self.next_id += 1;
            log::trace!(
                "Obstacle #{} on {} lane for beat {}, arrives at {arrival:.3}s",
                obstacle.id,
                obstacle.lane,
                beat.sequence
            );
            self.obstacles.push(obstacle);
            spawned.push(obstacle);
        }
        spawned
    }

    /// Miss every pending obstacle whose window closed before `now`.
    pub fn expire(&mut self, now: f64) -> Vec<Obstacle> {
        let mut missed = Vec::new();
        for obstacle in &mut self.obstacles {
            if obstacle.timing.expire(now) {
                missed.push(*obstacle);
            }
        }
        self.prune();
        missed
    }

    /// Judge an action against the earliest pending obstacle that can still
    /// accept it, optionally restricted to one lane.
    pub fn take_action(&mut self, lane: Option<Lane>, timestamp: f64) -> ActionOutcome {
        let candidate = self.obstacles.iter_mut().find(|o| {
            o.timing.is_pending()
                && lane.is_none_or(|l| l == o.lane)
                && timestamp <= o.timing.hit_window_end
        });

        let Some(obstacle) = candidate else {
            return ActionOutcome {
                judgment: Judgment::Miss,
                obstacle: None,
            };
        };

        let judgment = obstacle.timing.resolve(timestamp);
        let snapshot = *obstacle;
        self.prune();
        ActionOutcome {
            judgment,
            obstacle: Some(snapshot),
        }
    }

    pub fn pending(&self) -> impl Iterator<Item = &Obstacle> {
        self.obstacles.iter().filter(|o| o.timing.is_pending())
    }

    pub fn pending_count(&self) -> usize {
        self.pending().count()
    }

    pub fn clear(&mut self) {
        self.obstacles.clear();
    }

    fn prune(&mut self) {
        self.obstacles.retain(|o| o.timing.is_pending());
    }
}
