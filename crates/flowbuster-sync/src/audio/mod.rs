pub mod analyzer;
pub mod capture;
pub mod features;

pub use analyzer::{AudioFrame, FeatureExtractor};
pub use features::{FeatureVector, Lane};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};

use self::capture::AudioCapture;
use crate::error::SignalError;

/// Samples per analysis block (one audio callback at the reference rate).
pub const BLOCK_SIZE: usize = 512;
/// Rate assumed for blocks pushed in directly rather than captured.
pub const REFERENCE_SAMPLE_RATE: f32 = 44100.0;

/// Features of one analysed block, stamped with the capture position in seconds
/// of captured audio (wall time of the input stream, not the audio clock).
#[derive(Debug, Clone, Copy)]
pub struct FeatureSnapshot {
    pub features: FeatureVector,
    pub captured_secs: f64,
}

/// Live signal path: capture -> fixed-size blocks -> features -> channel.
///
/// The game loop polls [`SignalMonitor::drain`] every frame; the analysis thread
/// never waits on it and drops snapshots when the channel is full.
pub struct SignalMonitor {
    receiver: Receiver<FeatureSnapshot>,
    shutdown: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
    _capture: AudioCapture,
    pub device_name: String,
    pub sample_rate: u32,
}

impl SignalMonitor {
    pub fn start(preferred_device: Option<&str>) -> Result<Self, SignalError> {
        let capture = AudioCapture::open(preferred_device)?;
        let (tx, rx): (Sender<FeatureSnapshot>, Receiver<FeatureSnapshot>) =
            crossbeam_channel::bounded(64);

        let shutdown = Arc::new(AtomicBool::new(false));
        let ring = capture.ring.clone();
        let sample_rate = capture.sample_rate;
        let flag = shutdown.clone();

        let handle = thread::Builder::new()
            .name("flowbuster-analysis".into())
            .spawn(move || analysis_thread(&ring, sample_rate, &tx, &flag))?;

        Ok(Self {
            receiver: rx,
            shutdown,
            thread_handle: Some(handle),
            device_name: capture.device_name.clone(),
            sample_rate,
            _capture: capture,
        })
    }

    /// Take every snapshot produced since the last call, oldest first.
    pub fn drain(&self) -> Vec<FeatureSnapshot> {
        self.receiver.try_iter().collect()
    }
}

impl Drop for SignalMonitor {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

fn analysis_thread(
    ring: &capture::RingBuffer,
    sample_rate: u32,
    tx: &Sender<FeatureSnapshot>,
    shutdown: &AtomicBool,
) {
    let mut extractor = FeatureExtractor::new(sample_rate as f32);
    let mut block = vec![0.0f32; BLOCK_SIZE];
    let mut samples_seen: u64 = 0;
    let mut dropped: u64 = 0;

    while !shutdown.load(Ordering::Relaxed) {
        if ring.available() < BLOCK_SIZE {
            thread::sleep(Duration::from_millis(2));
            continue;
        }

        let read = ring.read(&mut block);
        let captured_secs = samples_seen as f64 / f64::from(sample_rate);
        samples_seen += read as u64;

        let features = extractor.extract(&AudioFrame::new(&block[..read], captured_secs));
        if tx
            .try_send(FeatureSnapshot {
                features,
                captured_secs,
            })
            .is_err()
        {
            dropped += 1;
            if dropped % 100 == 1 {
                log::warn!("Game loop is behind; dropped {dropped} feature snapshots");
            }
        }
    }

    log::debug!("Analysis thread stopped after {samples_seen} samples");
}
