use rustfft::FftPlanner;
use rustfft::num_complex::Complex;

use super::features::FeatureVector;

/// Default FFT size. One reference block (512 samples) is zero-padded up to this.
pub const FFT_SIZE: usize = 1024;

/// Upper edges of the low and mid bands. High runs to Nyquist.
const LOW_BAND_HI_HZ: f32 = 250.0;
const MID_BAND_HI_HZ: f32 = 4000.0;

/// One block of mono samples and the audio-clock time at which it was captured.
/// Borrowed for the duration of a single analysis call.
#[derive(Debug, Clone, Copy)]
pub struct AudioFrame<'a> {
    pub samples: &'a [f32],
    pub timestamp: f64,
}

impl<'a> AudioFrame<'a> {
    pub fn new(samples: &'a [f32], timestamp: f64) -> Self {
        Self { samples, timestamp }
    }
}

/// FFT-based feature extractor.
///
/// The scratch buffers are reused between calls but carry nothing from one block
/// to the next: the result depends only on the samples passed in.
pub struct FeatureExtractor {
    fft: std::sync::Arc<dyn rustfft::Fft<f32>>,
    fft_size: usize,
    window: Vec<f32>,
    fft_buffer: Vec<Complex<f32>>,
    magnitude: Vec<f32>,
    num_bins: usize,
    bin_hz: f32,
}

impl FeatureExtractor {
    pub fn new(sample_rate: f32) -> Self {
        Self::with_fft_size(sample_rate, FFT_SIZE)
    }

    pub fn with_fft_size(sample_rate: f32, fft_size: usize) -> Self {
        let fft_size = fft_size.max(2);
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);

        let num_bins = fft_size / 2 + 1;
        let bin_hz = sample_rate / fft_size as f32;

        log::debug!("Feature extractor: {fft_size}-point, {bin_hz:.1} Hz/bin, {num_bins} bins");

        Self {
            fft,
            fft_size,
            window: Vec::new(),
            fft_buffer: vec![Complex::new(0.0, 0.0); fft_size],
            magnitude: vec![0.0; num_bins],
            num_bins,
            bin_hz,
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Compute the feature vector for one block. Never fails; empty blocks give zeros.
    pub fn extract(&mut self, frame: &AudioFrame<'_>) -> FeatureVector {
        let samples = frame.samples;
        if samples.is_empty() {
            return FeatureVector::default();
        }

        let energy = rms(samples);

        // Most recent fft_size samples, Hann-windowed, zero-padded
        let used = samples.len().min(self.fft_size);
        let tail = &samples[samples.len() - used..];
        self.ensure_window(used);
        for (i, slot) in self.fft_buffer.iter_mut().enumerate() {
            let s = if i < used {
                let x = tail[i];
                if x.is_finite() { x * self.window[i] } else { 0.0 }
            } else {
                0.0
            };
            *slot = Complex::new(s, 0.0);
        }

        self.fft.process(&mut self.fft_buffer);

        let scale = 2.0 / used as f32;
        for i in 0..self.num_bins {
            self.magnitude[i] = self.fft_buffer[i].norm() * scale;
        }

        let low_hi = self.hz_to_bin(LOW_BAND_HI_HZ);
        let mid_hi = self.hz_to_bin(MID_BAND_HI_HZ).max(low_hi);

        FeatureVector::new(
            energy,
            self.spectral_centroid(),
            [
                self.band_loudness(0, low_hi),
                self.band_loudness(low_hi, mid_hi),
                self.band_loudness(mid_hi, self.num_bins),
            ],
        )
    }

    fn ensure_window(&mut self, len: usize) {
        if self.window.len() == len {
            return;
        }
        self.window = if len < 2 {
            vec![1.0; len]
        } else {
            (0..len)
                .map(|i| {
                    0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (len - 1) as f32).cos())
                })
                .collect()
        };
    }

    fn hz_to_bin(&self, hz: f32) -> usize {
        ((hz / self.bin_hz) as usize).min(self.num_bins)
    }

    fn band_loudness(&self, bin_low: usize, bin_high: usize) -> f32 {
        let bin_high = bin_high.min(self.num_bins);
        if bin_high <= bin_low {
            return 0.0;
        }
        let count = bin_high - bin_low;
        let sum: f32 = self.magnitude[bin_low..bin_high]
            .iter()
            .map(|m| m * m)
            .sum();
        (sum / count as f32).sqrt()
    }

    fn spectral_centroid(&self) -> f32 {
        let mut weighted_sum = 0.0f32;
        let mut mag_sum = 0.0f32;
        for i in 0..self.num_bins {
            let freq = i as f32 * self.bin_hz;
            weighted_sum += freq * self.magnitude[i];
            mag_sum += self.magnitude[i];
        }
        if mag_sum > 1e-10 {
            weighted_sum / mag_sum
        } else {
            0.0
        }
    }
}

fn rms(samples: &[f32]) -> f32 {
    let sum_sq: f32 = samples
        .iter()
        .filter(|s| s.is_finite())
        .map(|s| s * s)
        .sum();
    (sum_sq / samples.len() as f32).sqrt()
}
