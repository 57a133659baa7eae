// Level estimation: intensity <-> VU-level conversion and the sliding level
//
// Intensity here means the variance of a packet of PCM samples. The displayed
// level compresses intensity with a fourth root, which tracks perceived
// loudness far better than the raw variance.

/// Convert a packet intensity (variance) to a VU level
///
/// The result is not clamped; callers display `clamp_level` of it.
pub fn intensity_to_level(intensity: f64, gain: f64) -> f64 {
    (intensity * gain * gain).powf(0.25)
}

/// Convert a VU level back to the corresponding intensity
///
/// Inverse of [`intensity_to_level`] for the same gain.
pub fn level_to_intensity(level: f64, gain: f64) -> f64 {
    level.powi(4) / (gain * gain)
}

/// Restrict a level to the displayable range [0, 1]
pub fn clamp_level(level: f64) -> f64 {
    level.clamp(0.0, 1.0)
}

/// Smoothed VU level with fast attack and slow decay
///
/// Rising input pulls the level up almost instantly; falling input lets it
/// sink gradually, which keeps the meter readable and gives the onset
/// detector a stable quantity to apply hysteresis to.
#[derive(Debug, Clone)]
pub struct SlidingLevel {
    value: f64,
    attack_rate: f64,
    decay_rate: f64,
}

impl SlidingLevel {
    pub fn new(attack_rate: f64, decay_rate: f64) -> Self {
        Self {
            value: 0.0,
            attack_rate,
            decay_rate,
        }
    }

    /// Fold one packet level into the sliding value and return it
    pub fn update(&mut self, level: f64) -> f64 {
        if level > self.value {
            self.value += (level - self.value) * self.attack_rate;
        } else {
            self.value -= (self.value - level) * self.decay_rate;
        }
        self.value
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn reset(&mut self) {
        self.value = 0.0;
    }
}
