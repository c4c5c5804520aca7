use crate::config::EnergyConfig;
use crate::judge::Judgment;
use crate::tempo::{DEFAULT_TEMPO, TempoGate};

pub const MAX_ENERGY: f32 = 100.0;
/// Per second, per unit of tempo below default.
pub const DRAIN_RATE: f32 = 20.0;
/// Per second, only while tempo is exactly default.
pub const RESTORE_RATE: f32 = 10.0;
pub const PERFECT_BONUS: f32 = 5.0;
pub const GOOD_BONUS: f32 = 2.0;

/// Harmony energy. Slowing the music down spends it, playing at the default
/// tempo and landing hits earn it back.
pub struct EnergyBudget {
    value: f32,
    config: EnergyConfig,
    default_tempo: f32,
}

impl EnergyBudget {
    pub fn new(config: &EnergyConfig) -> Self {
        Self::with_default_tempo(config, DEFAULT_TEMPO)
    }

    pub fn with_default_tempo(config: &EnergyConfig, default_tempo: f32) -> Self {
        Self {
            value: config.max_energy,
            config: *config,
            default_tempo,
        }
    }

    /// Drain below the default tempo, restore at it, hold above it.
    pub fn tick(&mut self, dt: f64, current_tempo: f32) {
        if !(dt.is_finite() && dt > 0.0) {
            return;
        }
        let dt = dt as f32;
        if current_tempo < self.default_tempo {
            self.value -= self.config.drain_rate * (self.default_tempo - current_tempo) * dt;
        } else if current_tempo == self.default_tempo {
            self.value += self.config.restore_rate * dt;
        }
        self.clamp();
    }

    pub fn on_perfect_hit(&mut self) {
        self.value += self.config.perfect_bonus;
        self.clamp();
    }

    pub fn on_good_hit(&mut self) {
        self.value += self.config.good_bonus;
        self.clamp();
    }

    pub fn on_judgment(&mut self, judgment: Judgment) {
        match judgment {
            Judgment::Perfect => self.on_perfect_hit(),
            Judgment::Good => self.on_good_hit(),
            Judgment::Miss => {}
        }
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    /// 0.0 to 1.0, for the gauge.
    pub fn fraction(&self) -> f32 {
        self.value / self.config.max_energy
    }

    pub fn is_exhausted(&self) -> bool {
        self.value <= 0.0
    }

    pub fn reset(&mut self) {
        self.value = self.config.max_energy;
    }

    fn clamp(&mut self) {
        self.value = if self.value.is_nan() {
            0.0
        } else {
            self.value.clamp(0.0, self.config.max_energy)
        };
    }
}

impl TempoGate for EnergyBudget {
    fn has_energy(&self) -> bool {
        self.value > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn budget() -> EnergyBudget {
        EnergyBudget::new(&EnergyConfig::default())
    }

    #[test]
    fn starts_full() {
        let b = budget();
        assert_eq!(b.value(), MAX_ENERGY);
        assert_eq!(b.fraction(), 1.0);
        assert!(b.has_energy());
    }

    #[test]
    fn half_tempo_drains_to_zero_in_ten_seconds() {
        let mut b = budget();
        for _ in 0..9 {
            b.tick(1.0, 0.5);
        }
        assert_eq!(b.value(), 10.0);
        b.tick(1.0, 0.5);
        assert_eq!(b.value(), 0.0);
        assert!(!b.has_energy());
        assert!(b.is_exhausted());
    }

    #[test]
    fn default_tempo_restores_to_full_in_five_seconds() {
        let mut b = budget();
        for _ in 0..5 {
            b.tick(1.0, 0.5);
        }
        assert_eq!(b.value(), 50.0);
        for _ in 0..5 {
            b.tick(1.0, DEFAULT_TEMPO);
        }
        assert_eq!(b.value(), MAX_ENERGY);
    }

    #[test]
    fn fast_tempo_neither_drains_nor_restores() {
        let mut b = budget();
        b.tick(2.0, 0.5);
        let before = b.value();
        b.tick(10.0, 1.5);
        assert_eq!(b.value(), before);
    }

    #[test]
    fn pathological_drain_clamps_at_zero() {
        let mut b = budget();
        b.tick(1_000_000.0, 0.5);
        assert_eq!(b.value(), 0.0);
        b.tick(1.0, 0.5);
        assert_eq!(b.value(), 0.0);
    }

    #[test]
    fn bonuses_clamp_at_max() {
        let mut b = budget();
        b.on_perfect_hit();
        assert_eq!(b.value(), MAX_ENERGY);

        b.tick(1.0, 0.5);
        assert_eq!(b.value(), 90.0);
        b.on_judgment(Judgment::Perfect);
        assert_eq!(b.value(), 95.0);
        b.on_judgment(Judgment::Good);
        assert_eq!(b.value(), 97.0);
        b.on_judgment(Judgment::Miss);
        assert_eq!(b.value(), 97.0);
    }

    #[test]
    fn invalid_dt_is_ignored() {
        let mut b = budget();
        b.tick(f64::NAN, 0.5);
        b.tick(-3.0, 0.5);
        b.tick(f64::INFINITY, 0.5);
        assert_eq!(b.value(), MAX_ENERGY);
    }

    #[test]
    fn value_always_in_range_under_mixed_ticks() {
        let mut b = budget();
        let tempos = [0.5, 0.75, 1.0, 2.0, 0.5, 1.0];
        for i in 0..600 {
            b.tick(0.37, tempos[i % tempos.len()]);
            if i % 11 == 0 {
                b.on_perfect_hit();
            }
            assert!((0.0..=MAX_ENERGY).contains(&b.value()));
            assert!((0.0..=1.0).contains(&b.fraction()));
        }
    }

    #[test]
    fn reset_refills() {
        let mut b = budget();
        b.tick(100.0, 0.5);
        b.reset();
        assert_eq!(b.value(), MAX_ENERGY);
    }
}
