// Display polygon - log-spaced downsampling of the power spectrum
//
// A full spectrum has far too many bins to plot. The polygon samples it on a
// logarithmic frequency grid in 10-cent steps and integrates the bin area
// between successive grid points, with trapezoidal partial-bin corrections at
// both edges, so narrow peaks keep their weight no matter where they fall on
// the grid.

use crate::analysis::fft::PowerSpectrum;

/// Lowest frequency of the display polygon in Hz
pub const POLYGON_MIN_HZ: f64 = 25.0;

/// Highest frequency of the display polygon in Hz
pub const POLYGON_MAX_HZ: f64 = 6000.0;

/// Frequency step of the polygon in cents
pub const POLYGON_STEP_CENTS: f64 = 10.0;

/// Downsampled spectrum for display: (frequency Hz, normalized intensity)
///
/// Derived from a power spectrum and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumPolygon {
    pub points: Vec<(f64, f64)>,
}

impl SpectrumPolygon {
    /// Frequency of the strongest polygon point
    pub fn peak_frequency(&self) -> Option<f64> {
        self.points
            .iter()
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|p| p.0)
    }
}

/// Build the display polygon from a power spectrum
///
/// Returns `None` for an empty or all-zero spectrum, where normalization is
/// undefined.
pub fn create_polygon(spectrum: &PowerSpectrum) -> Option<SpectrumPolygon> {
    let power = &spectrum.data;
    if power.is_empty() {
        return None;
    }
    let len = power.len();
    let rate = spectrum.sample_rate as f64;
    let factor = 2.0f64.powf(POLYGON_STEP_CENTS / 2400.0);
    let q = |f: f64| 2.0 * len as f64 * f / rate;

    let clamp_bin = |qs: f64| (qs.round() as i64).clamp(0, len as i64 - 1) as usize;

    let qs1 = q(POLYGON_MIN_HZ / factor);
    let mut q1 = clamp_bin(qs1);
    let mut left_area = (q1 as f64 - qs1 + 0.5) * power[q1];

    let df = rate / 2.0 / len as f64;
    let mut ymax = 0.0f64;
    let mut points = Vec::new();
    let mut f = POLYGON_MIN_HZ;
    while f <= POLYGON_MAX_HZ {
        let qs2 = q(f * factor);
        let q2 = clamp_bin(qs2);
        let mut sum = 0.0;
        for bin in (q1 + 1)..=q2 {
            sum += power[bin];
        }
        let right_area = (q2 as f64 - qs2 + 0.5) * power[q2];
        let y = sum + left_area - right_area;
        ymax = ymax.max(y);
        points.push((f, y));
        q1 = q2;
        left_area = right_area;
        // Advance by one grid step, but never by less than one bin width.
        f = (f * factor * factor).max(f + df);
    }

    if ymax <= 0.0 {
        return None;
    }
    for point in &mut points {
        point.1 /= ymax;
    }
    Some(SpectrumPolygon { points })
}
