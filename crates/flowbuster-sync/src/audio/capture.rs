use std::cell::UnsafeCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use cpal::Stream;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::error::SignalError;

/// Capacity in samples; a power of two so positions wrap with a mask.
const CAPACITY: usize = 1 << 16;

/// Single-producer single-consumer sample queue between the cpal callback and
/// the analysis thread. Positions only grow; slots are addressed modulo capacity.
/// When the reader falls a full lap behind, the oldest samples are overwritten.
pub struct RingBuffer {
    slots: Box<[UnsafeCell<f32>]>,
    head: AtomicUsize,
    tail: AtomicUsize,
}

// SAFETY: slots are only written by the single producer and read by the single
// consumer; publication goes through `head` with release/acquire ordering.
unsafe impl Sync for RingBuffer {}
// SAFETY: f32 slots and atomics carry no thread affinity.
unsafe impl Send for RingBuffer {}

impl RingBuffer {
    pub fn new() -> Self {
        Self {
            slots: (0..CAPACITY).map(|_| UnsafeCell::new(0.0)).collect(),
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        }
    }

    /// Producer side. Only the capture callback calls this.
    pub fn push(&self, samples: &[f32]) {
        let head = self.head.load(Ordering::Relaxed);
        for (offset, &sample) in samples.iter().enumerate() {
            let slot = &self.slots[head.wrapping_add(offset) & (CAPACITY - 1)];
            // SAFETY: one producer; the consumer never reads past the published head.
            unsafe { *slot.get() = sample };
        }
        self.head.store(head.wrapping_add(samples.len()), Ordering::Release);
    }

    /// Consumer side. Copies up to `dst.len()` of the oldest unread samples.
    pub fn read(&self, dst: &mut [f32]) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let mut tail = self.tail.load(Ordering::Relaxed);
        if head.wrapping_sub(tail) > CAPACITY {
            // Lapped by the producer: skip to the oldest slot still intact
            tail = head.wrapping_sub(CAPACITY);
        }

        let count = head.wrapping_sub(tail).min(dst.len());
        for (offset, out) in dst[..count].iter_mut().enumerate() {
            let slot = &self.slots[tail.wrapping_add(offset) & (CAPACITY - 1)];
            // SAFETY: slots below head were published by the producer.
            *out = unsafe { *slot.get() };
        }
        self.tail.store(tail.wrapping_add(count), Ordering::Release);
        count
    }

    pub fn available(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Relaxed);
        head.wrapping_sub(tail).min(CAPACITY)
    }
}

impl Default for RingBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Average interleaved frames down to mono, reusing `out`.
fn downmix(data: &[f32], channels: usize, out: &mut Vec<f32>) {
    out.clear();
    out.extend(
        data.chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32),
    );
}

/// Live input stream feeding mono samples into a [`RingBuffer`].
pub struct AudioCapture {
    _stream: Stream,
    pub ring: Arc<RingBuffer>,
    pub sample_rate: u32,
    pub device_name: String,
}

impl AudioCapture {
    /// Open the named input device, or the default one when `preferred` is
    /// `None` or no device by that name exists.
    pub fn open(preferred: Option<&str>) -> Result<Self, SignalError> {
        let host = cpal::default_host();
        let named = preferred.and_then(|name| {
            let found = find_input_device(&host, name);
            if found.is_none() {
                log::warn!("Input device '{name}' not found, using default");
            }
            found
        });
        let device = named
            .or_else(|| host.default_input_device())
            .ok_or(SignalError::NoInputDevice)?;

        let device_name = device
            .description()
            .map(|d| d.name().to_string())
            .unwrap_or_else(|_| "Unknown".into());

        let config = device.default_input_config()?;
        let sample_rate = config.sample_rate();
        let channels = usize::from(config.channels()).max(1);
        log::info!(
            "Opening input '{device_name}': {sample_rate}Hz, {channels}ch, {:?}",
            config.sample_format()
        );

        let ring = Arc::new(RingBuffer::new());
        let producer = ring.clone();
        let mut mono = Vec::new();

        let stream = device.build_input_stream(
            &config.into(),
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if channels == 1 {
                    producer.push(data);
                } else {
                    downmix(data, channels, &mut mono);
                    producer.push(&mono);
                }
            },
            |err| log::error!("Input stream error: {err}"),
            None,
        )?;
        stream.play()?;

        Ok(Self {
            _stream: stream,
            ring,
            sample_rate,
            device_name,
        })
    }

    pub fn list_devices() -> Vec<String> {
        let host = cpal::default_host();
        host.input_devices()
            .map(|devices| {
                devices
                    .filter_map(|d| d.description().ok().map(|desc| desc.name().to_string()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn find_input_device(host: &cpal::Host, name: &str) -> Option<cpal::Device> {
    host.input_devices()
        .ok()?
        .find(|d| d.description().is_ok_and(|desc| desc.name() == name))
}
