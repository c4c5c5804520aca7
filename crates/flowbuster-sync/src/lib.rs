//! Audio synchronization core for the Flow Buster rhythm game.
//!
//! Detects beats from a live or simulated signal, eases the playback tempo
//! between player-requested targets, and judges player actions against
//! obstacle hit windows on the audio clock. [`SyncEngine`] ties it together
//! and is driven once per game-loop frame.

pub mod audio;
pub mod beat;
pub mod config;
pub mod energy;
pub mod engine;
pub mod error;
pub mod events;
pub mod judge;
pub mod schedule;
pub mod tempo;

pub use audio::{AudioFrame, FeatureExtractor, FeatureVector, Lane, SignalMonitor};
pub use beat::{BeatEvent, BeatMode, SignalAvailability};
pub use config::SyncConfig;
pub use engine::{FrameReport, JudgmentEvent, PlaybackState, SyncEngine};
pub use error::SignalError;
pub use judge::{Judgment, ObstacleTiming, judge};
pub use schedule::SpawnPattern;
pub use tempo::{TempoChange, TempoDirection, TransitionPhase};
