//! Frame-driven sync core: owns the beat source, tempo, energy, obstacles and
//! both clocks, and delivers events to subscribers.

use crate::audio::{
    AudioFrame, FeatureExtractor, FeatureVector, Lane, REFERENCE_SAMPLE_RATE, SignalMonitor,
};
use crate::beat::{BeatEvent, BeatMode, BeatSource, BpmEstimator, SignalAvailability};
use crate::config::SyncConfig;
use crate::energy::EnergyBudget;
use crate::events::EventBus;
use crate::judge::{self, Judgment, ObstacleTiming};
use crate::schedule::{Obstacle, ObstacleScheduler, SpawnPattern};
use crate::tempo::{TempoChange, TempoController, TempoDirection};

/// Analysis time further than this from transport time is pulled back in line.
const DRIFT_RESYNC_SECS: f64 = 0.25;
/// Active transport time a live track gets to show a frame above the noise
/// floor before it is treated as silent.
const SILENCE_PROBE_SECS: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
}

/// Transport position of the playing track. Advances at `tempo × frame time`
/// while playing.
#[derive(Debug, Clone, Default)]
pub struct AudioClock {
    position: f64,
}

impl AudioClock {
    /// Returns the audio-clock delta applied.
    pub fn advance(&mut self, dt: f64, tempo: f32) -> f64 {
        if !(dt.is_finite() && dt > 0.0) {
            return 0.0;
        }
        let delta = dt * f64::from(tempo);
        self.position += delta;
        delta
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn reset(&mut self) {
        self.position = 0.0;
    }
}

/// Maps capture-time stamps from the analysis thread onto the audio clock.
/// Output never goes backward.
#[derive(Debug, Default)]
struct AnalysisClock {
    last_captured: Option<f64>,
    position: f64,
}

impl AnalysisClock {
    fn map(&mut self, captured_secs: f64, tempo: f32, transport_now: f64) -> f64 {
        let candidate = match self.last_captured {
            None => transport_now.max(self.position),
            Some(prev) => self.position + (captured_secs - prev).max(0.0) * f64::from(tempo),
        };
        self.last_captured = Some(captured_secs);

        if candidate < transport_now - DRIFT_RESYNC_SECS {
            log::debug!(
                "Analysis clock {candidate:.3}s behind transport {transport_now:.3}s, resyncing"
            );
            self.position = transport_now;
        } else if candidate <= transport_now + DRIFT_RESYNC_SECS {
            self.position = candidate;
        }
        // Too far ahead: hold until the transport catches up
        self.position
    }

    /// Consume a stamp without advancing (track paused).
    fn hold(&mut self, captured_secs: f64) {
        self.last_captured = Some(captured_secs);
    }

    fn reset(&mut self) {
        self.last_captured = None;
        self.position = 0.0;
    }
}

/// Payload of `on_judgment`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JudgmentEvent {
    pub judgment: Judgment,
    /// Audio-clock time of the action, or of expiry for misses.
    pub timestamp: f64,
    pub obstacle: Option<Obstacle>,
}

/// Everything that happened during one `tick`.
#[derive(Debug, Clone, Default)]
pub struct FrameReport {
    pub beats: Vec<BeatEvent>,
    pub tempo_changes: Vec<TempoChange>,
    pub spawned: Vec<Obstacle>,
    pub missed: Vec<Obstacle>,
    pub audio_time: f64,
    pub tempo: f32,
    pub energy_fraction: f32,
}

pub struct SyncEngine {
    config: SyncConfig,
    source: BeatSource,
    extractor: FeatureExtractor,
    tempo: TempoController,
    energy: EnergyBudget,
    scheduler: ObstacleScheduler,
    bpm: BpmEstimator,

    clock: AudioClock,
    analysis_clock: AnalysisClock,
    state: PlaybackState,

    latest_features: Option<FeatureVector>,
    /// Active transport time spent waiting for a non-silent frame. `None` once
    /// the beat source for this track is settled.
    silence_probe: Option<f64>,
    /// Live beats detected since the last tick, delivered on the next one.
    pending_beats: Vec<BeatEvent>,

    beat_bus: EventBus<BeatEvent>,
    tempo_bus: EventBus<TempoChange>,
    judgment_bus: EventBus<JudgmentEvent>,
}

impl SyncEngine {
    pub fn new(config: SyncConfig, pattern: SpawnPattern) -> Self {
        let config = config.sanitized();
        Self {
            source: BeatSource::for_signal(SignalAvailability::Unavailable, &config.detector),
            extractor: FeatureExtractor::new(REFERENCE_SAMPLE_RATE),
            tempo: TempoController::new(&config.tempo),
            energy: EnergyBudget::with_default_tempo(&config.energy, config.tempo.default_tempo),
            scheduler: ObstacleScheduler::new(pattern, &config.timing),
            bpm: BpmEstimator::new(),
            clock: AudioClock::default(),
            analysis_clock: AnalysisClock::default(),
            state: PlaybackState::Stopped,
            latest_features: None,
            silence_probe: None,
            pending_beats: Vec::new(),
            beat_bus: EventBus::new(),
            tempo_bus: EventBus::new(),
            judgment_bus: EventBus::new(),
            config,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Track lifecycle
    // -----------------------------------------------------------------------

    /// Pick the beat strategy for a new track and reset all per-track state.
    /// A live track that stays below the noise floor for its first second of
    /// playback switches to simulated beats, once.
    pub fn load_track(&mut self, availability: SignalAvailability) {
        self.source = BeatSource::for_signal(availability, &self.config.detector);
        self.tempo.reset();
        self.energy.reset();
        self.scheduler.clear();
        self.bpm.reset();
        self.clock.reset();
        self.analysis_clock.reset();
        self.latest_features = None;
        self.silence_probe = (availability == SignalAvailability::Available).then_some(0.0);
        self.pending_beats.clear();
        self.state = PlaybackState::Stopped;

        if availability == SignalAvailability::Unavailable {
            log::warn!("No audio signal for this track, using simulated beats");
        }
        log::info!("Track loaded, beat source: {}", self.source.mode().display_name());
    }

    pub fn play(&mut self) {
        if self.state == PlaybackState::Playing {
            return;
        }
        self.state = PlaybackState::Playing;
        self.source.resume();
        log::debug!("Playback started at {:.3}s", self.clock.position());
    }

    pub fn pause(&mut self) {
        if self.state != PlaybackState::Playing {
            return;
        }
        self.state = PlaybackState::Paused;
        self.source.pause();
        log::debug!("Paused at {:.3}s", self.clock.position());
    }

    pub fn resume(&mut self) {
        if self.state == PlaybackState::Paused {
            self.play();
        }
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    // -----------------------------------------------------------------------
    // Live analysis path
    // -----------------------------------------------------------------------

    /// Analyse a block stamped in audio-clock time.
    pub fn ingest_block(&mut self, frame: &AudioFrame<'_>) -> Option<BeatEvent> {
        if !self.is_playing() {
            return None;
        }
        let features = self.extractor.extract(frame);
        self.ingest_features(features, frame.timestamp)
    }

    /// Feed features for audio-clock time `timestamp`. A detected beat is
    /// returned now and delivered to subscribers on the next `tick`.
    pub fn ingest_features(
        &mut self,
        features: FeatureVector,
        timestamp: f64,
    ) -> Option<BeatEvent> {
        if !self.is_playing() {
            return None;
        }
        if self.silence_probe.is_some() && features.energy > self.config.detector.noise_floor {
            log::debug!("Live signal confirmed at {timestamp:.3}s");
            self.silence_probe = None;
        }
        self.latest_features = Some(features);
        let beat = self
            .source
            .on_features(&features, timestamp, self.tempo.current())?;
        self.pending_beats.push(beat);
        Some(beat)
    }

    /// Drain the monitor without blocking. Returns the number of snapshots consumed.
    pub fn poll_signal(&mut self, monitor: &SignalMonitor) -> usize {
        let snapshots = monitor.drain();
        let count = snapshots.len();
        for snapshot in snapshots {
            if !self.is_playing() {
                self.analysis_clock.hold(snapshot.captured_secs);
                continue;
            }
            let timestamp = self.analysis_clock.map(
                snapshot.captured_secs,
                self.tempo.current(),
                self.clock.position(),
            );
            self.ingest_features(snapshot.features, timestamp);
        }
        count
    }

    // -----------------------------------------------------------------------
    // Frame
    // -----------------------------------------------------------------------

    /// Advance one game-loop frame of `dt` seconds.
    pub fn tick(&mut self, dt: f64) -> FrameReport {
        let mut report = FrameReport::default();

        if self.is_playing() {
            report.tempo_changes.extend(self.tempo.tick(dt));
            let tempo = self.tempo.current();
            let audio_start = self.clock.position();
            let audio_dt = self.clock.advance(dt, tempo);

            self.energy.tick(dt, tempo);
            if self.energy.is_exhausted() && self.tempo.target() != self.tempo.default_tempo() {
                log::info!("Harmony energy exhausted, returning to default tempo");
                report
                    .tempo_changes
                    .extend(self.tempo.request_direction(TempoDirection::Default, &self.energy));
            }

            let mut beats = std::mem::take(&mut self.pending_beats);
            beats.extend(self.source.advance(dt, audio_start, audio_dt));
            self.probe_silence(dt);
            for beat in &beats {
                self.bpm.observe(beat);
                log::debug!("Beat #{} at {:.3}s", beat.sequence, beat.timestamp);
                report
                    .spawned
                    .extend(self.scheduler.on_beat(beat, self.latest_features.as_ref()));
            }
            report.beats = beats;

            let now = self.clock.position();
            report.missed = self.scheduler.expire(now);

            for change in &report.tempo_changes {
                self.tempo_bus.emit(change);
            }
            for beat in &report.beats {
                self.beat_bus.emit(beat);
            }
            for obstacle in &report.missed {
                self.judgment_bus.emit(&JudgmentEvent {
                    judgment: Judgment::Miss,
                    timestamp: now,
                    obstacle: Some(*obstacle),
                });
            }
        }

        report.audio_time = self.clock.position();
        report.tempo = self.tempo.current();
        report.energy_fraction = self.energy.fraction();
        report
    }

    fn probe_silence(&mut self, dt: f64) {
        let Some(elapsed) = self.silence_probe.as_mut() else {
            return;
        };
        if dt.is_finite() && dt > 0.0 {
            *elapsed += dt;
        }
        if *elapsed >= SILENCE_PROBE_SECS {
            log::warn!("Track silent for {SILENCE_PROBE_SECS:.1}s, using simulated beats");
            self.silence_probe = None;
            self.source =
                BeatSource::for_signal(SignalAvailability::Unavailable, &self.config.detector);
            self.source.resume();
        }
    }

    // -----------------------------------------------------------------------
    // Player input
    // -----------------------------------------------------------------------

    pub fn request_tempo_direction(&mut self, direction: TempoDirection) -> Option<TempoChange> {
        let change = self.tempo.request_direction(direction, &self.energy)?;
        self.tempo_bus.emit(&change);
        Some(change)
    }

    pub fn request_tempo(&mut self, target: f32) -> Option<TempoChange> {
        let change = self.tempo.request_tempo(target, &self.energy)?;
        self.tempo_bus.emit(&change);
        Some(change)
    }

    /// Pure judgment of an arbitrary obstacle. Does not change any state.
    pub fn judge(&self, obstacle: &ObstacleTiming, action_timestamp: f64) -> Judgment {
        judge::judge(obstacle, action_timestamp)
    }

    /// Judge a player action at audio-clock `timestamp` against the scheduled
    /// obstacles, award energy on hits and notify subscribers.
    pub fn register_action(&mut self, lane: Option<Lane>, timestamp: f64) -> Judgment {
        let outcome = self.scheduler.take_action(lane, timestamp);
        self.energy.on_judgment(outcome.judgment);
        log::debug!("Action at {timestamp:.3}s: {}", outcome.judgment);
        self.judgment_bus.emit(&JudgmentEvent {
            judgment: outcome.judgment,
            timestamp,
            obstacle: outcome.obstacle,
        });
        outcome.judgment
    }

    // -----------------------------------------------------------------------
    // Subscriptions
    // -----------------------------------------------------------------------

    pub fn on_beat(&mut self, handler: impl FnMut(&BeatEvent) + 'static) {
        self.beat_bus.subscribe(handler);
    }

    pub fn on_tempo_changed(&mut self, handler: impl FnMut(&TempoChange) + 'static) {
        self.tempo_bus.subscribe(handler);
    }

    pub fn on_judgment(&mut self, handler: impl FnMut(&JudgmentEvent) + 'static) {
        self.judgment_bus.subscribe(handler);
    }

    // -----------------------------------------------------------------------
    // Read-only state
    // -----------------------------------------------------------------------

    pub fn now(&self) -> f64 {
        self.clock.position()
    }

    pub fn current_tempo(&self) -> f32 {
        self.tempo.current()
    }

    pub fn target_tempo(&self) -> f32 {
        self.tempo.target()
    }

    pub fn playback_rate(&self) -> f32 {
        self.tempo.playback_rate()
    }

    pub fn semitone_shift(&self) -> f32 {
        self.tempo.semitone_shift()
    }

    pub fn energy_fraction(&self) -> f32 {
        self.energy.fraction()
    }

    pub fn beat_mode(&self) -> BeatMode {
        self.source.mode()
    }

    pub fn last_beat_sequence(&self) -> u64 {
        self.source.last_sequence()
    }

    /// Rolling estimate for display; 0 until two beats have been seen.
    pub fn estimated_bpm(&self) -> f64 {
        self.bpm.bpm()
    }

    pub fn pending_obstacles(&self) -> impl Iterator<Item = &Obstacle> {
        self.scheduler.pending()
    }

    /// True while a transition toward a new tempo is in flight.
    pub fn tempo_in_transition(&self) -> bool {
        self.tempo.is_transitioning()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::judge::ObstacleState;
    use crate::tempo::{DEFAULT_TEMPO, TransitionPhase};

    const DT: f64 = 1.0 / 60.0;

    fn engine(availability: SignalAvailability) -> SyncEngine {
        let mut e = SyncEngine::new(SyncConfig::default(), SpawnPattern::default());
        e.load_track(availability);
        e
    }

    fn run(e: &mut SyncEngine, seconds: f64) -> Vec<FrameReport> {
        let frames = (seconds / DT).round() as usize;
        (0..frames).map(|_| e.tick(DT)).collect()
    }

    fn recorder<T: Copy + 'static>() -> (Rc<RefCell<Vec<T>>>, impl FnMut(&T) + 'static) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        (log, move |e: &T| sink.borrow_mut().push(*e))
    }

    #[test]
    fn simulated_track_beats_every_half_second() {
        let mut e = engine(SignalAvailability::Unavailable);
        let (beats, handler) = recorder::<BeatEvent>();
        e.on_beat(handler);
        e.play();
        run(&mut e, 5.0);

        let beats = beats.borrow();
        assert_eq!(beats.len(), 10);
        for (i, b) in beats.iter().enumerate() {
            assert_eq!(b.sequence, i as u64 + 1);
        }
        assert!((e.estimated_bpm() - 120.0).abs() < 0.5);
    }

    #[test]
    fn nothing_moves_before_play_or_while_paused() {
        let mut e = engine(SignalAvailability::Unavailable);
        run(&mut e, 2.0);
        assert_eq!(e.now(), 0.0);
        assert_eq!(e.last_beat_sequence(), 0);

        e.play();
        run(&mut e, 0.75);
        assert_eq!(e.last_beat_sequence(), 1);
        e.pause();
        let frozen = e.now();
        run(&mut e, 3.0);
        assert_eq!(e.now(), frozen);
        assert_eq!(e.last_beat_sequence(), 1);

        e.resume();
        run(&mut e, 0.25);
        assert_eq!(e.last_beat_sequence(), 2);
    }

    #[test]
    fn simulated_cadence_follows_transport_not_tempo() {
        let mut e = engine(SignalAvailability::Unavailable);
        e.play();
        e.request_tempo_direction(TempoDirection::Faster);
        run(&mut e, 1.0);
        let before = e.last_beat_sequence();
        let reports = run(&mut e, 2.0);

        // Two seconds of active transport is four beats at any tempo
        let beats: Vec<BeatEvent> = reports.iter().flat_map(|r| r.beats.clone()).collect();
        assert_eq!(e.last_beat_sequence() - before, 4);
        assert_eq!(beats.len(), 4);
        // At 2x each half second of transport spans one second of audio
        for pair in beats.windows(2) {
            assert!((pair[1].timestamp - pair[0].timestamp - 1.0).abs() < 1e-6);
        }
        assert!(beats.iter().all(|b| b.timestamp <= e.now() + 1e-9));
        assert!((e.semitone_shift() - 12.0).abs() < 1e-4);
    }

    #[test]
    fn exhausted_energy_forces_default_tempo() {
        let mut e = engine(SignalAvailability::Unavailable);
        let (changes, handler) = recorder::<TempoChange>();
        e.on_tempo_changed(handler);
        e.play();

        assert!(e.request_tempo_direction(TempoDirection::Slower).is_some());
        let reports = run(&mut e, 15.0);

        assert_eq!(e.target_tempo(), DEFAULT_TEMPO);
        assert!(reports.iter().any(|r| r.energy_fraction == 0.0));
        let changes = changes.borrow();
        assert_eq!(changes[0].value, 0.5);
        assert!(
            changes
                .iter()
                .any(|c| c.value == DEFAULT_TEMPO && c.phase == TransitionPhase::Started)
        );
        assert_eq!(changes.last().map(|c| c.phase), Some(TransitionPhase::Completed));
    }

    #[test]
    fn slow_request_refused_without_energy() {
        let mut e = engine(SignalAvailability::Unavailable);
        e.play();
        e.request_tempo_direction(TempoDirection::Slower);
        // Drain to empty; the forced default request lands on the same tick
        let mut ticks = 0;
        while e.energy_fraction() > 0.0 {
            e.tick(DT);
            ticks += 1;
            assert!(ticks < 2000);
        }
        assert!(e.request_tempo_direction(TempoDirection::Slower).is_none());
        assert_eq!(e.target_tempo(), DEFAULT_TEMPO);
    }

    #[test]
    fn on_time_actions_hit_and_restore_energy() {
        let mut e = engine(SignalAvailability::Unavailable);
        let (judgments, handler) = recorder::<JudgmentEvent>();
        e.on_judgment(handler);
        e.play();

        // Spend a little energy so the bonus is visible
        e.request_tempo(0.9);
        run(&mut e, 1.0);
        e.request_tempo(DEFAULT_TEMPO);

        let mut hits = 0;
        for _ in 0..300 {
            e.tick(DT);
            let due = e
                .pending_obstacles()
                .find(|o| o.timing.arrival_estimate <= e.now())
                .map(|o| o.timing.arrival_estimate);
            if let Some(arrival) = due {
                if e.register_action(None, arrival) == Judgment::Perfect {
                    hits += 1;
                }
            }
        }
        assert!(hits >= 5, "hits = {hits}");
        assert!(judgments.borrow().iter().all(|j| j.judgment == Judgment::Perfect));
        assert_eq!(e.energy_fraction(), 1.0);
    }

    #[test]
    fn unanswered_obstacles_are_missed() {
        let mut e = engine(SignalAvailability::Unavailable);
        let (judgments, handler) = recorder::<JudgmentEvent>();
        e.on_judgment(handler);
        e.play();
        let reports = run(&mut e, 3.0);

        let missed: usize = reports.iter().map(|r| r.missed.len()).sum();
        let judgments = judgments.borrow();
        assert!(missed >= 3);
        assert_eq!(judgments.len(), missed);
        for j in judgments.iter() {
            assert_eq!(j.judgment, Judgment::Miss);
            let obstacle = j.obstacle.expect("obstacle");
            assert_eq!(obstacle.timing.state, ObstacleState::Missed);
            assert!(j.timestamp > obstacle.timing.hit_window_end);
        }
    }

    #[test]
    fn live_beats_spawn_obstacles_on_next_tick() {
        let mut e = engine(SignalAvailability::Available);
        assert_eq!(e.beat_mode(), BeatMode::LiveSignal);
        e.play();

        let quiet = FeatureVector::new(0.0005, 500.0, [0.0, 0.0, 0.0]);
        let kick = FeatureVector::new(0.5, 120.0, [0.9, 0.2, 0.05]);
        for i in 0..10 {
            assert!(e.ingest_features(quiet, i as f64 * 0.01).is_none());
        }
        let beat = e.ingest_features(kick, 0.1).expect("beat");
        assert_eq!(beat.sequence, 1);

        let report = e.tick(DT);
        assert_eq!(report.beats, vec![beat]);
        assert_eq!(report.spawned.len(), 1);
        assert_eq!(report.spawned[0].lane, Lane::Low);
        assert!((report.spawned[0].timing.arrival_estimate - 1.1).abs() < 1e-9);

        // Already delivered
        assert!(e.tick(DT).beats.is_empty());
    }

    #[test]
    fn silent_live_track_falls_back_to_simulated() {
        let mut e = engine(SignalAvailability::Available);
        let (beats, handler) = recorder::<BeatEvent>();
        e.on_beat(handler);
        e.play();

        let silence = vec![0.0f32; 512];
        let block_secs = 512.0 / 44100.0;
        let mut fed = 0.0;
        for _ in 0..600 {
            while fed < e.now() {
                assert!(e.ingest_block(&AudioFrame::new(&silence, fed)).is_none());
                fed += block_secs;
            }
            e.tick(DT);
        }

        assert_eq!(e.beat_mode(), BeatMode::Simulated);
        let beats = beats.borrow();
        // Probe ends at 1 s, then a beat every 0.5 s of the remaining 9 s
        assert_eq!(beats.len(), 18);
        assert_eq!(beats[0].sequence, 1);
        assert!((beats[0].timestamp - 1.5).abs() < 1e-6);
    }

    #[test]
    fn audible_live_track_stays_live() {
        let mut e = engine(SignalAvailability::Available);
        e.play();
        let tone: Vec<f32> = (0..512).map(|i| (i as f32 * 0.05).sin() * 0.3).collect();
        e.ingest_block(&AudioFrame::new(&tone, 0.0));

        let reports = run(&mut e, 5.0);
        assert_eq!(e.beat_mode(), BeatMode::LiveSignal);
        // Only the onset in the block itself; transport adds nothing
        let beats: usize = reports.iter().map(|r| r.beats.len()).sum();
        assert_eq!(beats, 1);
        assert!(e.now() > 4.9);
    }

    #[test]
    fn silence_probe_waits_while_paused() {
        let mut e = engine(SignalAvailability::Available);
        e.play();
        run(&mut e, 0.5);
        e.pause();
        run(&mut e, 5.0);
        assert_eq!(e.beat_mode(), BeatMode::LiveSignal);
        e.resume();
        run(&mut e, 0.6);
        assert_eq!(e.beat_mode(), BeatMode::Simulated);
    }

    #[test]
    fn paused_engine_ignores_features() {
        let mut e = engine(SignalAvailability::Available);
        let kick = FeatureVector::new(0.5, 120.0, [0.9, 0.2, 0.05]);
        assert!(e.ingest_features(kick, 0.0).is_none());
        e.play();
        e.pause();
        assert!(e.ingest_features(kick, 0.0).is_none());
    }

    #[test]
    fn reloading_restarts_sequence() {
        let mut e = engine(SignalAvailability::Unavailable);
        e.play();
        run(&mut e, 2.0);
        assert_eq!(e.last_beat_sequence(), 4);

        e.load_track(SignalAvailability::Unavailable);
        assert_eq!(e.playback_state(), PlaybackState::Stopped);
        assert_eq!(e.now(), 0.0);
        assert_eq!(e.pending_obstacles().count(), 0);
        e.play();
        let reports = run(&mut e, 0.5);
        let first = reports.iter().flat_map(|r| r.beats.iter()).next().expect("beat");
        assert_eq!(first.sequence, 1);
    }

    #[test]
    fn judge_is_a_pure_passthrough() {
        let e = engine(SignalAvailability::Unavailable);
        let w = ObstacleTiming::new(1.1, 1.0, 1.2);
        assert_eq!(e.judge(&w, 1.1), Judgment::Perfect);
        assert_eq!(e.judge(&w, 1.02), Judgment::Good);
        assert_eq!(e.judge(&w, 1.25), Judgment::Miss);
        assert_eq!(w.state, ObstacleState::Pending);
    }

    #[test]
    fn audio_clock_scales_with_tempo() {
        let mut clock = AudioClock::default();
        assert_eq!(clock.advance(1.0, 0.5), 0.5);
        assert_eq!(clock.advance(1.0, 2.0), 2.0);
        assert_eq!(clock.advance(-1.0, 2.0), 0.0);
        assert_eq!(clock.position(), 2.5);
    }

    #[test]
    fn analysis_clock_tracks_transport_and_never_rewinds() {
        let mut clock = AnalysisClock::default();
        // First stamp anchors to transport
        assert_eq!(clock.map(10.0, 1.0, 2.0), 2.0);
        // Captured delta scaled by tempo
        assert!((clock.map(10.1, 2.0, 2.2) - 2.2).abs() < 1e-9);
        // Far behind transport: snap forward
        assert_eq!(clock.map(10.11, 1.0, 5.0), 5.0);
        // Far ahead: hold
        let held = clock.map(20.0, 1.0, 5.0);
        assert_eq!(held, 5.0);

        clock.hold(30.0);
        assert!((clock.map(30.05, 1.0, 5.05) - 5.05).abs() < 1e-9);
    }
}
