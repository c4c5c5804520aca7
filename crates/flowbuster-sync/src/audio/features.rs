use std::fmt;

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// Number of f32 slots in a packed [`FeatureVector`].
pub const NUM_FEATURES: usize = 5;

/// Per-frame signal summary: energy, spectral centroid and three band loudness values.
/// All fields are >= 0.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct FeatureVector {
    pub energy: f32,               // RMS of the block
    pub spectral_centroid_hz: f32, // Magnitude-weighted mean frequency
    pub band_loudness: [f32; 3],   // low / mid / high
}

impl FeatureVector {
    pub fn new(energy: f32, spectral_centroid_hz: f32, band_loudness: [f32; 3]) -> Self {
        let mut v = Self {
            energy,
            spectral_centroid_hz,
            band_loudness,
        };
        v.clamp_non_negative();
        v
    }

    pub fn as_slice(&self) -> &[f32; NUM_FEATURES] {
        bytemuck::cast_ref(self)
    }

    pub fn as_slice_mut(&mut self) -> &mut [f32; NUM_FEATURES] {
        bytemuck::cast_mut(self)
    }

    /// Force every field into `[0, inf)`. NaN becomes 0.
    pub fn clamp_non_negative(&mut self) {
        for v in self.as_slice_mut() {
            *v = if v.is_nan() { 0.0 } else { v.max(0.0) };
        }
    }

    pub fn loudness(&self, lane: Lane) -> f32 {
        self.band_loudness[lane.index()]
    }

    /// Lane whose band is loudest, or `None` when all bands are silent.
    pub fn loudest_lane(&self) -> Option<Lane> {
        let mut best: Option<(Lane, f32)> = None;
        for lane in Lane::ALL {
            let value = self.loudness(*lane);
            if value <= 0.0 {
                continue;
            }
            if best.is_none_or(|(_, b)| value > b) {
                best = Some((*lane, value));
            }
        }
        best.map(|(lane, _)| lane)
    }
}

impl Default for FeatureVector {
    fn default() -> Self {
        bytemuck::Zeroable::zeroed()
    }
}

/// Gameplay lane. Each lane is fed by one contiguous frequency band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Lane {
    Low,
    Mid,
    High,
}

impl Lane {
    pub const ALL: &[Lane] = &[Lane::Low, Lane::Mid, Lane::High];

    pub fn index(self) -> usize {
        match self {
            Lane::Low => 0,
            Lane::Mid => 1,
            Lane::High => 2,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Lane::Low => "Low",
            Lane::Mid => "Mid",
            Lane::High => "High",
        }
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}
