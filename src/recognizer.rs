//! Key recognition boundary
//!
//! The peak-matching logic that turns a spectrum into a key candidate belongs
//! to the surrounding application (it knows about inharmonicity and recorded
//! reference spectra). The pipeline only depends on the [`KeyRecognizer`]
//! trait and records whatever candidates the implementation reports.
//!
//! [`PeakRecognizer`] is a deliberately simple implementation used by the CLI
//! and the integration tests: dominant spectral peak, parabolic interpolation,
//! nearest equal-temperament key.

use crate::analysis::fft::PowerSpectrum;
use crate::analysis::polygon::{POLYGON_MAX_HZ, POLYGON_MIN_HZ};
use crate::keys::Piano;

/// One key candidate produced from a single spectrum
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Recognition {
    pub key: usize,
    pub frequency: f64,
}

/// Callback that matches a power spectrum against the keyboard
pub trait KeyRecognizer: Send + Sync {
    fn recognize(&self, spectrum: &PowerSpectrum, piano: &Piano) -> Option<Recognition>;
}

/// Dominant-peak recognizer
pub struct PeakRecognizer;

impl KeyRecognizer for PeakRecognizer {
    fn recognize(&self, spectrum: &PowerSpectrum, piano: &Piano) -> Option<Recognition> {
        let power = &spectrum.data;
        if power.len() < 3 {
            return None;
        }

        let q_min = (spectrum.frequency_bin(POLYGON_MIN_HZ).ceil() as usize).max(1);
        let q_max = (spectrum.frequency_bin(POLYGON_MAX_HZ).floor() as usize)
            .min(power.len().saturating_sub(2));
        if q_min > q_max {
            return None;
        }

        let mut peak = q_min;
        for q in q_min..=q_max {
            if power[q] > power[peak] {
                peak = q;
            }
        }
        if power[peak] <= 0.0 {
            return None;
        }

        // Refine the peak position by fitting a parabola through the three
        // bins around the maximum.
        let (left, center, right) = (power[peak - 1], power[peak], power[peak + 1]);
        let denominator = left - 2.0 * center + right;
        let delta = if denominator.abs() > f64::EPSILON {
            (0.5 * (left - right) / denominator).clamp(-0.5, 0.5)
        } else {
            0.0
        };

        let bin_width = spectrum.bin_frequency(1);
        let frequency = spectrum.bin_frequency(peak) + delta * bin_width;
        let key = piano.nearest_key(frequency)?;
        Some(Recognition { key, frequency })
    }
}
