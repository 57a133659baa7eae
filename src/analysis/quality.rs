// Signal quality detector
//
// The signature of an overdriven signal is clipping at certain maximal
// amplitudes, recognized by counting PCM values close to the running
// amplitude extremes. Some devices also transmit intermittent data with
// random strings of zeros in between, recognized by counting vanishing
// amplitudes. Neither condition aborts the analysis.

use tracing::warn;

use crate::error::AnalysisFault;

/// Scan a signal for clipping and intermittency
///
/// A sample counts as clipped when it lies within 1% of the running maximum
/// or minimum amplitude, and as a dropout when it is exactly zero. Either
/// count exceeding `len/50` flags the signal.
pub fn detect_defects(signal: &[f64]) -> Option<AnalysisFault> {
    let mut zero_count = 0usize;
    let mut max_count = 0usize;
    let mut min_count = 0usize;
    let mut max_amp = 0.0f64;
    let mut min_amp = 0.0f64;

    for &y in signal {
        if y > max_amp {
            max_amp = y;
        } else if y >= max_amp * 0.99 && max_amp > 0.0 {
            max_count += 1;
        }
        if y < min_amp {
            min_amp = y;
        } else if y <= min_amp * 0.99 && min_amp < 0.0 {
            min_count += 1;
        }
        if y == 0.0 {
            zero_count += 1;
        }
    }

    let threshold = signal.len() / 50;
    if max_count + min_count > threshold {
        warn!("high-amplitude clipping detected");
        return Some(AnalysisFault::Clipping {
            clipped: max_count + min_count,
            total: signal.len(),
        });
    }
    if zero_count > threshold {
        warn!("highly intermittent signal detected (lot of zero amplitudes)");
        return Some(AnalysisFault::IntermittentSignal {
            zeros: zero_count,
            total: signal.len(),
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::TAU;

    fn sine(n: usize) -> Vec<f64> {
        (0..n).map(|i| 0.7 * (TAU * i as f64 / 64.0).sin()).collect()
    }

    /// A keystroke-like tone: the envelope decays, so only the first cycles
    /// come close to the amplitude extremes.
    fn decaying_sine(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| {
                let t = i as f64 / n as f64;
                0.7 * (-3.0 * t).exp() * (TAU * i as f64 / 64.0).sin()
            })
            .collect()
    }

    #[test]
    fn test_clean_keystroke_raises_no_flag() {
        assert_eq!(detect_defects(&decaying_sine(8000)), None);
    }

    #[test]
    fn test_clipped_square_wave_is_flagged() {
        // A sine clipped at +-1 for 5% of its samples: 5% of N exceeds N/50.
        let n = 8000;
        let mut signal = sine(n);
        for (i, s) in signal.iter_mut().enumerate() {
            if i % 20 == 0 {
                *s = if i % 40 == 0 { 1.0 } else { -1.0 };
            }
        }
        match detect_defects(&signal) {
            Some(AnalysisFault::Clipping { clipped, total }) => {
                assert_eq!(total, n);
                assert!(clipped > n / 50, "clipped {} below threshold", clipped);
            }
            other => panic!("expected a clipping flag, got {:?}", other),
        }
    }

    #[test]
    fn test_intermittent_zeros_are_flagged() {
        // 10% of the samples replaced by exact zeros.
        let n = 8000;
        let mut signal = sine(n);
        for (i, s) in signal.iter_mut().enumerate() {
            if i % 10 == 0 {
                *s = 0.0;
            }
        }
        match detect_defects(&signal) {
            Some(AnalysisFault::IntermittentSignal { zeros, total }) => {
                assert_eq!(total, n);
                assert!(zeros >= n / 10);
            }
            other => panic!("expected an intermittency flag, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_signal_raises_no_flag() {
        assert_eq!(detect_defects(&[]), None);
    }
}
