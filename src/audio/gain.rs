// Automatic gain control
//
// Builds a histogram of packet intensities in decibel buckets. In a quiet
// room the histogram shows a pronounced peak at its left edge (the microphone
// noise floor) and a spread toward the right while keys are played. The
// controller locates both edges with weighted moments and slowly eases the
// gain and the recording stop level toward values derived from them, so the
// pipeline adapts itself to the room, the instrument, and the microphone.

use std::collections::BTreeMap;

use tracing::debug;

use crate::audio::level::intensity_to_level;
use crate::config::RecorderConfig;

/// Conversion factor between natural-log intensity and decibels (10/ln 10)
pub const DECIBEL_SCALE: f64 = 4.34294;

/// Handle to the platform input volume, injected by the embedding application
///
/// The fast peak limiter cuts the external volume when the raw signal comes
/// close to the representable maximum; everything else is handled by the
/// internal gain factor.
pub trait InputVolumeControl: Send + Sync {
    fn volume(&self) -> f64;
    fn set_volume(&self, volume: f64);
}

/// Volume control for platforms without an accessible input volume
pub struct NullVolumeControl;

impl InputVolumeControl for NullVolumeControl {
    fn volume(&self) -> f64 {
        1.0
    }

    fn set_volume(&self, _volume: f64) {}
}

/// Slow gain / stop-level adaptation driven by the intensity histogram
#[derive(Debug)]
pub struct AutoGainController {
    gain: f64,
    stop_level: f64,
    histogram: BTreeMap<i32, f64>,
    packet_counter: u64,
    cfg: RecorderConfig,
}

impl AutoGainController {
    pub fn new(cfg: RecorderConfig) -> Self {
        Self {
            gain: 1.0,
            stop_level: cfg.initial_stop_level,
            histogram: BTreeMap::new(),
            packet_counter: 0,
            cfg,
        }
    }

    /// Gain factor applied to the PCM signal before level conversion
    pub fn gain(&self) -> f64 {
        self.gain
    }

    /// Level below which recording stops
    pub fn stop_level(&self) -> f64 {
        self.stop_level
    }

    /// Forget everything learned about the noise level
    ///
    /// Used for user-initiated recalibration; restores unit gain and volume.
    pub fn reset(&mut self, volume: &dyn InputVolumeControl) {
        volume.set_volume(1.0);
        self.gain = 1.0;
        self.histogram.clear();
        self.packet_counter = 0;
    }

    /// Fold one packet into the histogram and adapt gain and stop level
    ///
    /// Returns the new stop level when it changed, so the recorder can
    /// reposition the "off" marker on the meter.
    pub fn observe(
        &mut self,
        intensity: f64,
        level: f64,
        volume: &dyn InputVolumeControl,
    ) -> Option<f64> {
        if intensity == 0.0 {
            return None;
        }

        // Fast peak limiter: the raw signal is close to the representable
        // maximum, cut the external input volume right away.
        if intensity > self.cfg.peak_intensity_limit {
            volume.set_volume(volume.volume() * 0.9);
        }

        // The displayed level overshoots the meter: shrink the internal gain.
        if level > self.cfg.cutoff_level {
            self.gain *= 0.9;
        }

        let db = DECIBEL_SCALE * intensity.ln();
        *self.histogram.entry(db.round() as i32).or_insert(0.0) += 1.0;
        self.packet_counter += 1;

        if self.packet_counter % self.cfg.histogram_eval_interval != 0 || self.histogram.len() <= 5
        {
            return None;
        }

        // Locate the left and right edge of the histogram in a soft way.
        let mut norm = 0.0;
        let mut lower_moment = 0.0;
        let mut upper_moment = 0.0;
        for (&bucket, &count) in &self.histogram {
            norm += count;
            lower_moment += (bucket.abs() as f64).powi(10) * count;
            upper_moment += (bucket as f64).exp() * count;
        }
        if norm == 0.0 {
            return None;
        }
        let db_floor = -(lower_moment / norm).powf(0.1) + 4.0;
        let db_ceiling = (upper_moment / norm).ln();

        // Ease the gain toward the value that maps the upper edge to full scale.
        let gain_target = (-db_ceiling / 2.0 / DECIBEL_SCALE).exp();
        self.gain += self.cfg.gain_adapt_rate * (gain_target - self.gain);

        // Ease the stop level toward the noise floor, but keep it below the
        // retrigger threshold and skip insignificant changes.
        let mut changed = None;
        let floor_level = intensity_to_level((db_floor / DECIBEL_SCALE).exp(), self.gain);
        if floor_level < self.cfg.retrigger_level && (floor_level - self.stop_level).abs() > 0.01 {
            self.stop_level += self.cfg.stop_adapt_rate * (floor_level - self.stop_level);
            changed = Some(self.stop_level);
        }

        debug!(
            gain = self.gain,
            gain_target,
            stop_level = self.stop_level,
            db_floor,
            db_ceiling,
            "gain adaptation"
        );

        // Let new data gradually overwrite older data.
        for count in self.histogram.values_mut() {
            *count /= self.cfg.histogram_decay;
        }

        changed
    }
}
