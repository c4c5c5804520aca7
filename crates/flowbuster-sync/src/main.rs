use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;

use flowbuster_sync::audio::capture::AudioCapture;
use flowbuster_sync::{
    Judgment, Lane, SignalAvailability, SignalMonitor, SpawnPattern, SyncConfig, SyncEngine,
    TempoDirection, TransitionPhase,
};

const FRAME_RATE: f64 = 60.0;

/// Gesture script for the demo run: (seconds into the run, intent).
const TEMPO_SCRIPT: &[(f64, TempoDirection)] = &[
    (4.0, TempoDirection::Slower),
    (7.0, TempoDirection::Default),
    (10.0, TempoDirection::Faster),
    (13.0, TempoDirection::Default),
];

#[derive(Parser)]
#[command(name = "flowbuster-sync")]
#[command(about = "Headless run of the Flow Buster sync core")]
struct Args {
    /// Detect beats from the configured input device instead of simulating them
    #[arg(long)]
    live: bool,

    /// Length of the run in seconds
    #[arg(long, default_value_t = 16.0)]
    seconds: f64,

    /// Spawn pattern JSON file
    #[arg(long, value_name = "FILE")]
    pattern: Option<PathBuf>,

    /// Press every obstacle at its arrival time
    #[arg(long)]
    autoplay: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse();
    let config = SyncConfig::load();
    let pattern = match &args.pattern {
        Some(path) => SpawnPattern::load(path)?,
        None => SpawnPattern::default(),
    };

    let monitor = if args.live {
        match SignalMonitor::start(config.audio_device.as_deref()) {
            Ok(monitor) => {
                log::info!(
                    "Live signal from {} at {}Hz",
                    monitor.device_name,
                    monitor.sample_rate
                );
                Some(monitor)
            }
            Err(e) => {
                log::warn!("Live signal unavailable ({e}), falling back to simulated beats");
                log::info!("Input devices: {:?}", AudioCapture::list_devices());
                None
            }
        }
    } else {
        None
    };

    let mut engine = SyncEngine::new(config, pattern);
    engine.load_track(if monitor.is_some() {
        SignalAvailability::Available
    } else {
        SignalAvailability::Unavailable
    });

    engine.on_beat(|beat| log::info!("Beat #{} at {:.3}s", beat.sequence, beat.timestamp));
    engine.on_tempo_changed(|change| match change.phase {
        TransitionPhase::Started => log::info!("Tempo -> {:.2}x", change.value),
        TransitionPhase::Completed => log::info!("Tempo settled at {:.2}x", change.value),
    });
    let tally: Rc<RefCell<HashMap<Judgment, u32>>> = Rc::new(RefCell::new(HashMap::new()));
    let sink = tally.clone();
    engine.on_judgment(move |event| {
        *sink.borrow_mut().entry(event.judgment).or_default() += 1;
        let lane = event.obstacle.map_or("-", |o| o.lane.display_name());
        log::info!("{} [{lane}] at {:.3}s", event.judgment, event.timestamp);
    });

    let dt = 1.0 / FRAME_RATE;
    let frame = Duration::from_secs_f64(dt);
    let total_frames = (args.seconds.max(0.0) * FRAME_RATE) as u64;
    let mut script = TEMPO_SCRIPT.iter().peekable();

    engine.play();
    for n in 0..total_frames {
        let frame_start = Instant::now();
        let elapsed = n as f64 * dt;

        if let Some(monitor) = &monitor {
            engine.poll_signal(monitor);
        }

        while let Some((at, direction)) = script.next_if(|(at, _)| *at <= elapsed) {
            log::debug!("Scripted gesture at {at:.1}s: {direction:?}");
            engine.request_tempo_direction(*direction);
        }

        let report = engine.tick(dt);

        if args.autoplay {
            let now = engine.now();
            let due: Vec<(Lane, f64)> = engine
                .pending_obstacles()
                .filter(|o| o.timing.arrival_estimate <= now)
                .map(|o| (o.lane, o.timing.arrival_estimate))
                .collect();
            for (lane, arrival) in due {
                engine.register_action(Some(lane), arrival);
            }
        }

        if n % (FRAME_RATE as u64) == 0 {
            log::debug!(
                "t={elapsed:.1}s audio={:.3}s tempo={:.2}x pitch={:+.2}st energy={:.0}% bpm={:.1}",
                report.audio_time,
                report.tempo,
                engine.semitone_shift(),
                report.energy_fraction * 100.0,
                engine.estimated_bpm()
            );
        }

        if let Some(rest) = frame.checked_sub(frame_start.elapsed()) {
            std::thread::sleep(rest);
        }
    }

    let tally = tally.borrow();
    let count = |j: Judgment| tally.get(&j).copied().unwrap_or(0);
    log::info!(
        "Done: {} beats ({}), {} perfect, {} good, {} miss",
        engine.last_beat_sequence(),
        engine.beat_mode().display_name(),
        count(Judgment::Perfect),
        count(Judgment::Good),
        count(Judgment::Miss)
    );
    Ok(())
}
