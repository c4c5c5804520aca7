//! Beat sources: adaptive energy-threshold detection on a live signal, or a
//! fixed-interval simulated clock when no signal is available.
//! Both emit [`BeatEvent`]s with the same sequencing guarantees.

use std::collections::VecDeque;

use crate::audio::FeatureVector;
use crate::config::DetectorConfig;

/// About one second of history at the reference analysis rate (512-sample blocks).
pub const DEFAULT_HISTORY_SIZE: usize = 43;
pub const DEFAULT_SENSITIVITY: f32 = 1.3;
/// Energies below this are silence and never produce a beat.
pub const NOISE_FLOOR: f32 = 0.001;
/// Fastest beat rate the live detector accepts, at playback tempo 1.0.
pub const MAX_DETECTABLE_BPM: f64 = 200.0;
/// Cadence of simulated beats.
pub const SIMULATED_BPM: f64 = 120.0;

/// Tolerance for transport-time boundary comparisons.
const BOUNDARY_EPSILON: f64 = 1e-9;
/// Beats emitted by one simulated advance. Boundaries past this are dropped.
const MAX_BEATS_PER_ADVANCE: usize = 64;

/// A detected (or simulated) beat. Timestamps are audio-clock seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatEvent {
    /// Starts at 1 per track, increments by exactly 1.
    pub sequence: u64,
    pub timestamp: f64,
}

/// Whether the loaded track has a usable signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAvailability {
    Available,
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeatMode {
    LiveSignal,
    Simulated,
}

impl BeatMode {
    pub fn display_name(self) -> &'static str {
        match self {
            BeatMode::LiveSignal => "live signal",
            BeatMode::Simulated => "simulated",
        }
    }
}

// ---------------------------------------------------------------------------
// Energy history (fixed-size ring buffer, zero-filled)
// ---------------------------------------------------------------------------

/// Fixed-capacity ring of recent energies. Every slot counts toward the
/// statistics, so a fresh or reset history reads as silence.
pub struct EnergyHistory {
    buf: Vec<f32>,
    write: usize,
}

impl EnergyHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0.0; capacity.max(1)],
            write: 0,
        }
    }

    /// Overwrite the oldest entry.
    pub fn push(&mut self, value: f32) {
        self.buf[self.write] = value;
        self.write = (self.write + 1) % self.buf.len();
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn mean(&self) -> f32 {
        self.buf.iter().sum::<f32>() / self.buf.len() as f32
    }

    /// Population variance over all slots.
    pub fn variance(&self) -> f32 {
        let mean = self.mean();
        self.buf.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / self.buf.len() as f32
    }

    pub fn reset(&mut self) {
        self.buf.fill(0.0);
        self.write = 0;
    }

    pub fn values(&self) -> &[f32] {
        &self.buf
    }
}

// ---------------------------------------------------------------------------
// Mode A: adaptive energy threshold
// ---------------------------------------------------------------------------

pub struct EnergyBeatDetector {
    history: EnergyHistory,
    sensitivity: f32,
    noise_floor: f32,
    max_bpm: f64,

    previous_energy: f32,
    last_beat_time: Option<f64>,
    sequence: u64,
}

impl EnergyBeatDetector {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            history: EnergyHistory::new(config.history_size),
            sensitivity: config.sensitivity,
            noise_floor: config.noise_floor,
            max_bpm: config.max_detectable_bpm,
            previous_energy: 0.0,
            last_beat_time: None,
            sequence: 0,
        }
    }

    /// Shortest gap between beats at the given playback tempo, in audio-clock seconds.
    pub fn min_interval(&self, current_tempo: f32) -> f64 {
        60.0 / self.max_bpm / f64::from(current_tempo.max(1e-3))
    }

    /// Feed one frame's features. `now` is the frame's audio-clock time.
    pub fn process(
        &mut self,
        features: &FeatureVector,
        now: f64,
        current_tempo: f32,
    ) -> Option<BeatEvent> {
        let energy = features.energy;
        self.history.push(energy);
        let previous = self.previous_energy;
        self.previous_energy = energy;

        if energy < self.noise_floor {
            return None;
        }

        let mean = self.history.mean();
        let variance = self.history.variance();
        let threshold = self.sensitivity * (1.0 + variance * 0.5);

        let loud_enough = energy > threshold * mean;
        let rising = energy > previous;
        let spaced = self
            .last_beat_time
            .is_none_or(|last| now - last > self.min_interval(current_tempo));

        if !(loud_enough && rising && spaced) {
            return None;
        }

        self.sequence += 1;
        self.last_beat_time = Some(now);
        log::trace!(
            "Beat #{} at {now:.3}s (energy {energy:.4}, mean {mean:.4}, threshold {threshold:.3})",
            self.sequence
        );
        Some(BeatEvent {
            sequence: self.sequence,
            timestamp: now,
        })
    }

    pub fn reset(&mut self) {
        self.history.reset();
        self.previous_energy = 0.0;
        self.last_beat_time = None;
        self.sequence = 0;
    }

    pub fn history(&self) -> &EnergyHistory {
        &self.history
    }

    pub fn last_sequence(&self) -> u64 {
        self.sequence
    }
}

// ---------------------------------------------------------------------------
// Mode B: fixed-interval simulation
// ---------------------------------------------------------------------------

/// Emits a beat every `60 / bpm` seconds of transport time while playing.
/// Pausing freezes the phase; resuming continues it.
pub struct SimulatedBeatClock {
    interval: f64,
    position: f64,
    playing: bool,
    sequence: u64,
    /// Grid boundaries dropped by capped advances.
    skipped: u64,
}

impl SimulatedBeatClock {
    pub fn new(bpm: f64) -> Self {
        Self {
            interval: 60.0 / bpm,
            position: 0.0,
            playing: false,
            sequence: 0,
            skipped: 0,
        }
    }

    pub fn interval(&self) -> f64 {
        self.interval
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn resume(&mut self) {
        self.playing = true;
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    /// Advance transport time and return every beat boundary crossed, in order.
    pub fn advance(&mut self, dt: f64) -> Vec<BeatEvent> {
        let mut beats = Vec::new();
        if !self.playing || dt.is_nan() || dt <= 0.0 {
            return beats;
        }

        self.position += dt;
        loop {
            let boundary = (self.sequence + self.skipped + 1) as f64 * self.interval;
            if self.position + BOUNDARY_EPSILON < boundary {
                break;
            }
            if beats.len() == MAX_BEATS_PER_ADVANCE {
                let crossed = ((self.position + BOUNDARY_EPSILON) / self.interval).floor() as u64;
                let dropped = crossed.saturating_sub(self.sequence + self.skipped);
                log::warn!("Simulated clock jumped {dt:.3}s, dropping {dropped} beats");
                self.skipped += dropped;
                break;
            }
            self.sequence += 1;
            beats.push(BeatEvent {
                sequence: self.sequence,
                timestamp: boundary,
            });
        }
        beats
    }

    pub fn reset(&mut self) {
        self.position = 0.0;
        self.sequence = 0;
        self.skipped = 0;
    }

    pub fn last_sequence(&self) -> u64 {
        self.sequence
    }
}

// ---------------------------------------------------------------------------
// Strategy selected per track
// ---------------------------------------------------------------------------

pub enum BeatSource {
    LiveSignal(EnergyBeatDetector),
    Simulated(SimulatedBeatClock),
}

impl BeatSource {
    pub fn for_signal(availability: SignalAvailability, config: &DetectorConfig) -> Self {
        match availability {
            SignalAvailability::Available => {
                BeatSource::LiveSignal(EnergyBeatDetector::new(config))
            }
            SignalAvailability::Unavailable => {
                BeatSource::Simulated(SimulatedBeatClock::new(config.simulated_bpm))
            }
        }
    }

    pub fn mode(&self) -> BeatMode {
        match self {
            BeatSource::LiveSignal(_) => BeatMode::LiveSignal,
            BeatSource::Simulated(_) => BeatMode::Simulated,
        }
    }

    /// Live path. Simulated sources ignore features.
    pub fn on_features(
        &mut self,
        features: &FeatureVector,
        now: f64,
        current_tempo: f32,
    ) -> Option<BeatEvent> {
        match self {
            BeatSource::LiveSignal(detector) => detector.process(features, now, current_tempo),
            BeatSource::Simulated(_) => None,
        }
    }

    /// Transport path. Simulated beats fall on the unscaled transport grid and
    /// are stamped on the audio clock span `[audio_start, audio_start + audio_dt]`
    /// covered by the same frame. Live sources derive beats from features only.
    pub fn advance(
        &mut self,
        transport_dt: f64,
        audio_start: f64,
        audio_dt: f64,
    ) -> Vec<BeatEvent> {
        match self {
            BeatSource::LiveSignal(_) => Vec::new(),
            BeatSource::Simulated(clock) => {
                let origin = clock.position();
                let scale = audio_dt / transport_dt;
                let mut beats = clock.advance(transport_dt);
                for beat in &mut beats {
                    beat.timestamp = audio_start + (beat.timestamp - origin) * scale;
                }
                beats
            }
        }
    }

    pub fn pause(&mut self) {
        if let BeatSource::Simulated(clock) = self {
            clock.pause();
        }
    }

    pub fn resume(&mut self) {
        if let BeatSource::Simulated(clock) = self {
            clock.resume();
        }
    }

    pub fn reset(&mut self) {
        match self {
            BeatSource::LiveSignal(detector) => detector.reset(),
            BeatSource::Simulated(clock) => clock.reset(),
        }
    }

    pub fn last_sequence(&self) -> u64 {
        match self {
            BeatSource::LiveSignal(detector) => detector.last_sequence(),
            BeatSource::Simulated(clock) => clock.last_sequence(),
        }
    }
}

// ---------------------------------------------------------------------------
// Rolling BPM estimate (display only)
// ---------------------------------------------------------------------------

const MAX_INTERVALS: usize = 8;

/// Average of recent inter-beat intervals, in audio-clock time.
pub struct BpmEstimator {
    intervals: VecDeque<f64>,
    last_beat: Option<f64>,
    bpm: f64,
}

impl BpmEstimator {
    pub fn new() -> Self {
        Self {
            intervals: VecDeque::with_capacity(MAX_INTERVALS),
            last_beat: None,
            bpm: 0.0,
        }
    }

    pub fn observe(&mut self, beat: &BeatEvent) {
        if let Some(last) = self.last_beat {
            let interval = beat.timestamp - last;
            // 30-200 BPM
            if (0.3..=2.0).contains(&interval) {
                self.intervals.push_back(interval);
                if self.intervals.len() > MAX_INTERVALS {
                    self.intervals.pop_front();
                }
                let avg = self.intervals.iter().sum::<f64>() / self.intervals.len() as f64;
                self.bpm = 60.0 / avg;
            }
        }
        self.last_beat = Some(beat.timestamp);
    }

    /// 0 until two beats have been seen.
    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn reset(&mut self) {
        self.intervals.clear();
        self.last_beat = None;
        self.bpm = 0.0;
    }
}

impl Default for BpmEstimator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: f64 = 512.0 / 44100.0;
    /// Below the noise floor, so the baseline itself never triggers.
    const QUIET: f32 = 0.0005;

    fn energy(e: f32) -> FeatureVector {
        FeatureVector::new(e, 1000.0, [e, e, e])
    }

    fn detector() -> EnergyBeatDetector {
        EnergyBeatDetector::new(&DetectorConfig::default())
    }

    /// Small deterministic generator so the property tests need no extra crates.
    struct Lcg(u64);

    impl Lcg {
        fn next_f32(&mut self) -> f32 {
            self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ((self.0 >> 40) as f32) / (1u64 << 24) as f32
        }
    }

    #[test]
    fn history_starts_zeroed_and_wraps() {
        let mut h = EnergyHistory::new(3);
        assert_eq!(h.values(), &[0.0, 0.0, 0.0]);
        h.push(1.0);
        h.push(2.0);
        h.push(3.0);
        h.push(4.0);
        assert_eq!(h.values(), &[4.0, 2.0, 3.0]);
        assert!((h.mean() - 3.0).abs() < 1e-6);
        assert!((h.variance() - 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn history_reset_clears_to_zero() {
        let mut h = EnergyHistory::new(4);
        h.push(0.7);
        h.reset();
        assert_eq!(h.values(), &[0.0; 4]);
        assert_eq!(h.mean(), 0.0);
    }

    #[test]
    fn spike_over_quiet_baseline_is_a_beat() {
        let mut d = detector();
        for i in 0..20 {
            assert!(d.process(&energy(QUIET), i as f64 * FRAME, 1.0).is_none());
        }
        let beat = d.process(&energy(0.5), 20.0 * FRAME, 1.0).expect("beat");
        assert_eq!(beat.sequence, 1);
        assert!((beat.timestamp - 20.0 * FRAME).abs() < 1e-12);
    }

    #[test]
    fn sustained_plateau_fires_once() {
        let mut d = detector();
        for i in 0..10 {
            d.process(&energy(QUIET), i as f64 * FRAME, 1.0);
        }
        let mut beats = 0;
        for i in 10..60 {
            if d.process(&energy(0.5), i as f64 * FRAME, 1.0).is_some() {
                beats += 1;
            }
        }
        assert_eq!(beats, 1);
    }

    #[test]
    fn min_interval_blocks_close_spikes() {
        let mut d = detector();
        // Spikes every 10 frames (~0.116 s); min interval at tempo 1.0 is 0.3 s
        let mut times = Vec::new();
        for i in 0..45 {
            let e = if i % 10 == 0 && i > 0 { 0.5 } else { QUIET };
            if let Some(b) = d.process(&energy(e), i as f64 * FRAME, 1.0) {
                times.push(b.timestamp);
            }
        }
        assert_eq!(times.len(), 2);
        assert!(times[1] - times[0] > 0.3);
    }

    #[test]
    fn min_interval_scales_with_tempo() {
        let d = detector();
        assert!((d.min_interval(1.0) - 0.3).abs() < 1e-9);
        assert!((d.min_interval(2.0) - 0.15).abs() < 1e-9);
        assert!((d.min_interval(0.5) - 0.6).abs() < 1e-6);
    }

    #[test]
    fn faster_tempo_admits_closer_beats() {
        let run = |tempo: f32| {
            let mut d = detector();
            let mut count = 0;
            // Spikes every 0.2 s of audio-clock time
            for i in 0..100 {
                let t = i as f64 * 0.02;
                let e = if i % 10 == 5 { 0.5 } else { QUIET };
                if d.process(&energy(e), t, tempo).is_some() {
                    count += 1;
                }
            }
            count
        };
        assert_eq!(run(2.0), 10);
        assert_eq!(run(1.0), 5);
    }

    #[test]
    fn below_noise_floor_never_detects() {
        let mut d = detector();
        for i in 0..200 {
            let e = if i % 7 == 0 { 0.0009 } else { 0.000_001 };
            assert!(d.process(&energy(e), i as f64 * FRAME, 1.0).is_none());
        }
    }

    #[test]
    fn sequence_strictly_increments_and_time_never_decreases() {
        let mut d = detector();
        let mut rng = Lcg(42);
        let mut last: Option<BeatEvent> = None;
        let mut total = 0;
        for i in 0..5000 {
            let e = rng.next_f32().powi(4);
            if let Some(b) = d.process(&energy(e), i as f64 * FRAME, 1.0) {
                match last {
                    Some(prev) => {
                        assert_eq!(b.sequence, prev.sequence + 1);
                        assert!(b.timestamp >= prev.timestamp);
                    }
                    None => assert_eq!(b.sequence, 1),
                }
                last = Some(b);
                total += 1;
            }
        }
        assert!(total > 10, "expected some beats, got {total}");
    }

    #[test]
    fn reset_restarts_sequence_and_clears_history() {
        let mut d = detector();
        for i in 0..10 {
            d.process(&energy(QUIET), i as f64 * FRAME, 1.0);
        }
        assert!(d.process(&energy(0.5), 10.0 * FRAME, 1.0).is_some());
        d.reset();
        assert_eq!(d.last_sequence(), 0);
        assert!(d.history().values().iter().all(|v| *v == 0.0));

        let beat = d.process(&energy(0.5), 0.0, 1.0).expect("beat after reset");
        assert_eq!(beat.sequence, 1);
    }

    #[test]
    fn simulated_emits_every_half_second() {
        let mut clock = SimulatedBeatClock::new(SIMULATED_BPM);
        clock.resume();
        let mut beats = Vec::new();
        for _ in 0..300 {
            beats.extend(clock.advance(1.0 / 60.0));
        }
        // 5 seconds of transport time
        assert_eq!(beats.len(), 10);
        for (i, b) in beats.iter().enumerate() {
            assert_eq!(b.sequence, i as u64 + 1);
            assert!((b.timestamp - 0.5 * (i + 1) as f64).abs() < 1e-9);
        }
    }

    #[test]
    fn simulated_is_silent_until_started() {
        let mut clock = SimulatedBeatClock::new(SIMULATED_BPM);
        assert!(clock.advance(5.0).is_empty());
        assert_eq!(clock.position(), 0.0);
    }

    #[test]
    fn simulated_pause_resume_keeps_cadence() {
        let mut clock = SimulatedBeatClock::new(SIMULATED_BPM);
        clock.resume();
        assert!(clock.advance(0.3).is_empty());

        clock.pause();
        assert!(clock.advance(10.0).is_empty());

        clock.resume();
        // 0.2 s more of active time completes the first interval
        let beats = clock.advance(0.2);
        assert_eq!(beats.len(), 1);
        assert_eq!(beats[0].sequence, 1);
        assert!((beats[0].timestamp - 0.5).abs() < 1e-9);

        let beats = clock.advance(0.5);
        assert_eq!(beats.len(), 1);
        assert_eq!(beats[0].sequence, 2);
    }

    #[test]
    fn simulated_large_step_emits_each_boundary() {
        let mut clock = SimulatedBeatClock::new(SIMULATED_BPM);
        clock.resume();
        let beats = clock.advance(1.6);
        let stamps: Vec<f64> = beats.iter().map(|b| b.timestamp).collect();
        assert_eq!(stamps, vec![0.5, 1.0, 1.5]);
    }

    #[test]
    fn runaway_step_is_capped_and_stays_on_grid() {
        let mut clock = SimulatedBeatClock::new(SIMULATED_BPM);
        clock.resume();
        let beats = clock.advance(100.0);
        assert_eq!(beats.len(), MAX_BEATS_PER_ADVANCE);
        assert_eq!(beats.last().map(|b| b.sequence), Some(64));

        // Sequence stays contiguous, timing resumes on the 0.5 s grid
        let beats = clock.advance(0.5);
        assert_eq!(beats.len(), 1);
        assert_eq!(beats[0].sequence, 65);
        assert!((beats[0].timestamp - 100.5).abs() < 1e-9);

        clock.reset();
        clock.resume();
        let beats = clock.advance(0.5);
        assert_eq!(beats[0].sequence, 1);
        assert!((beats[0].timestamp - 0.5).abs() < 1e-9);
    }

    #[test]
    fn simulated_source_stamps_beats_on_audio_clock() {
        let cfg = DetectorConfig::default();
        let mut sim = BeatSource::for_signal(SignalAvailability::Unavailable, &cfg);
        sim.resume();

        // 0.4 s of transport at 2x covers audio 10.0..10.8: no boundary yet
        assert!(sim.advance(0.4, 10.0, 0.8).is_empty());
        // Boundary at transport 0.5 lies a quarter into this frame
        let beats = sim.advance(0.4, 10.8, 0.8);
        assert_eq!(beats.len(), 1);
        assert_eq!(beats[0].sequence, 1);
        assert!((beats[0].timestamp - 11.0).abs() < 1e-9);
    }

    #[test]
    fn simulated_ignores_non_positive_steps() {
        let mut clock = SimulatedBeatClock::new(SIMULATED_BPM);
        clock.resume();
        assert!(clock.advance(-1.0).is_empty());
        assert!(clock.advance(f64::NAN).is_empty());
        assert_eq!(clock.position(), 0.0);
    }

    #[test]
    fn source_selection_follows_availability() {
        let cfg = DetectorConfig::default();
        let live = BeatSource::for_signal(SignalAvailability::Available, &cfg);
        let sim = BeatSource::for_signal(SignalAvailability::Unavailable, &cfg);
        assert_eq!(live.mode(), BeatMode::LiveSignal);
        assert_eq!(sim.mode(), BeatMode::Simulated);
    }

    #[test]
    fn sources_ignore_the_other_input() {
        let cfg = DetectorConfig::default();
        let mut live = BeatSource::for_signal(SignalAvailability::Available, &cfg);
        live.resume();
        assert!(live.advance(10.0, 0.0, 10.0).is_empty());

        let mut sim = BeatSource::for_signal(SignalAvailability::Unavailable, &cfg);
        sim.resume();
        assert!(sim.on_features(&energy(0.9), 1.0, 1.0).is_none());
    }

    #[test]
    fn bpm_estimate_from_regular_beats() {
        let mut est = BpmEstimator::new();
        assert_eq!(est.bpm(), 0.0);
        for i in 1..=6 {
            est.observe(&BeatEvent {
                sequence: i,
                timestamp: i as f64 * 0.5,
            });
        }
        assert!((est.bpm() - 120.0).abs() < 1e-6);
    }

    #[test]
    fn bpm_estimate_rejects_implausible_gaps() {
        let mut est = BpmEstimator::new();
        est.observe(&BeatEvent { sequence: 1, timestamp: 0.0 });
        est.observe(&BeatEvent { sequence: 2, timestamp: 5.0 });
        assert_eq!(est.bpm(), 0.0);
    }
}
