use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::beat::{
    DEFAULT_HISTORY_SIZE, DEFAULT_SENSITIVITY, MAX_DETECTABLE_BPM, NOISE_FLOOR, SIMULATED_BPM,
};
use crate::energy::{DRAIN_RATE, GOOD_BONUS, MAX_ENERGY, PERFECT_BONUS, RESTORE_RATE};
use crate::judge::GOOD_TIMING_WINDOW;
use crate::schedule::DEFAULT_LEAD_TIME;
use crate::tempo::{DEFAULT_TEMPO, MAX_TEMPO, MIN_TEMPO, TRANSITION_DURATION};

/// Accepted range for configured beat rates.
const BPM_LIMITS: RangeInclusive<f64> = 1.0..=1000.0;

/// Tempo range and transition timing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TempoConfig {
    pub min_tempo: f32,
    pub max_tempo: f32,
    pub default_tempo: f32,
    /// Seconds of frame time an eased transition takes.
    pub transition_secs: f64,
}

impl Default for TempoConfig {
    fn default() -> Self {
        Self {
            min_tempo: MIN_TEMPO,
            max_tempo: MAX_TEMPO,
            default_tempo: DEFAULT_TEMPO,
            transition_secs: TRANSITION_DURATION,
        }
    }
}

/// Beat detector tuning for both live and simulated sources.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub history_size: usize,
    pub sensitivity: f32,
    pub noise_floor: f32,
    pub max_detectable_bpm: f64,
    pub simulated_bpm: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            history_size: DEFAULT_HISTORY_SIZE,
            sensitivity: DEFAULT_SENSITIVITY,
            noise_floor: NOISE_FLOOR,
            max_detectable_bpm: MAX_DETECTABLE_BPM,
            simulated_bpm: SIMULATED_BPM,
        }
    }
}

/// Harmony energy gauge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnergyConfig {
    pub max_energy: f32,
    pub drain_rate: f32,
    pub restore_rate: f32,
    pub perfect_bonus: f32,
    pub good_bonus: f32,
}

impl Default for EnergyConfig {
    fn default() -> Self {
        Self {
            max_energy: MAX_ENERGY,
            drain_rate: DRAIN_RATE,
            restore_rate: RESTORE_RATE,
            perfect_bonus: PERFECT_BONUS,
            good_bonus: GOOD_BONUS,
        }
    }
}

/// Obstacle timing, all in audio-clock seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Half-width of the hit window around an obstacle's arrival.
    pub good_window_secs: f64,
    /// Travel time from the spawning beat to the judgment point.
    pub lead_time_secs: f64,
    /// Measured device input + output latency. Zero disables compensation.
    pub latency_offset_secs: f64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            good_window_secs: GOOD_TIMING_WINDOW,
            lead_time_secs: DEFAULT_LEAD_TIME,
            latency_offset_secs: 0.0,
        }
    }
}

/// Persisted sync-core configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub tempo: TempoConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub energy: EnergyConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub audio_device: Option<String>,
}

fn default_version() -> u32 {
    1
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            version: 1,
            tempo: TempoConfig::default(),
            detector: DetectorConfig::default(),
            energy: EnergyConfig::default(),
            timing: TimingConfig::default(),
            audio_device: None,
        }
    }
}

impl SyncConfig {
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        config_dir.join("flowbuster").join("sync.json")
    }

    /// Load from the user config dir, falling back to defaults on any problem.
    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            log::info!("No sync config found, using defaults");
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(config) => {
                log::info!("Loaded sync config from {}", path.display());
                config
            }
            Err(e) => {
                log::warn!("Failed to load sync config: {e:#}");
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(config.sanitized())
    }

    pub fn save(&self) {
        let path = Self::config_path();
        match self.save_to(&path) {
            Ok(()) => log::debug!("Saved sync config to {}", path.display()),
            Err(e) => log::error!("Failed to save sync config: {e:#}"),
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    /// Repair values a hand-edited file could get wrong. Invalid sections revert
    /// to their defaults rather than failing the load.
    pub fn sanitized(mut self) -> Self {
        let t = self.tempo;
        let tempo_ok = t.min_tempo.is_finite()
            && t.max_tempo.is_finite()
            && t.default_tempo.is_finite()
            && t.min_tempo > 0.0
            && t.min_tempo <= t.default_tempo
            && t.default_tempo <= t.max_tempo
            && t.transition_secs.is_finite()
            && t.transition_secs >= 0.0;
        if !tempo_ok {
            log::warn!("Invalid tempo config {t:?}, using defaults");
            self.tempo = TempoConfig::default();
        }

        let d = self.detector;
        if d.history_size == 0
            || !(d.sensitivity.is_finite() && d.sensitivity > 0.0)
            || !(d.noise_floor.is_finite() && d.noise_floor >= 0.0)
            || !BPM_LIMITS.contains(&d.max_detectable_bpm)
            || !BPM_LIMITS.contains(&d.simulated_bpm)
        {
            log::warn!("Invalid detector config {d:?}, using defaults");
            self.detector = DetectorConfig::default();
        }

        let e = self.energy;
        if !(e.max_energy > 0.0 && e.drain_rate >= 0.0 && e.restore_rate >= 0.0) {
            log::warn!("Invalid energy config {e:?}, using defaults");
            self.energy = EnergyConfig::default();
        }

        let w = self.timing;
        let timing_ok = w.good_window_secs > 0.0
            && w.lead_time_secs >= 0.0
            && w.latency_offset_secs.is_finite();
        if !timing_ok {
            log::warn!("Invalid timing config {w:?}, using defaults");
            self.timing = TimingConfig::default();
        }

        self
    }
}
