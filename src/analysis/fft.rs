// FFT module - power spectrum computation
//
// Transforms the real-valued, already preprocessed signal into a power
// spectrum. The planner is cached behind a mutex so repeated transforms of
// the same length reuse the plan.

use rustfft::{num_complex::Complex, FftPlanner};
use std::sync::Mutex;

/// Power spectrum of a real-valued signal
///
/// `data[q]` is the squared magnitude of bin `q`; the length is N/2+1 for an
/// N-sample input. Shared read-only (via `Arc`) once created.
#[derive(Debug, Clone, PartialEq)]
pub struct PowerSpectrum {
    pub sample_rate: u32,
    pub data: Vec<f64>,
}

impl PowerSpectrum {
    /// Frequency in Hz corresponding to a bin index
    pub fn bin_frequency(&self, bin: usize) -> f64 {
        bin as f64 * self.sample_rate as f64 / (2.0 * self.data.len() as f64)
    }

    /// Bin coordinate (fractional) corresponding to a frequency in Hz
    pub fn frequency_bin(&self, frequency: f64) -> f64 {
        2.0 * self.data.len() as f64 * frequency / self.sample_rate as f64
    }
}

/// FFT processor with a cached planner
pub struct FftProcessor {
    planner: Mutex<FftPlanner<f64>>,
}

impl FftProcessor {
    pub fn new() -> Self {
        Self {
            planner: Mutex::new(FftPlanner::new()),
        }
    }

    /// Compute the power spectrum of a real-valued signal
    ///
    /// The real-to-complex transform of length N yields N/2+1 independent
    /// bins; the power is `re^2 + im^2` per bin. An empty signal yields an
    /// empty spectrum.
    pub fn power_spectrum(&self, signal: &[f64], sample_rate: u32) -> PowerSpectrum {
        if signal.is_empty() {
            return PowerSpectrum {
                sample_rate,
                data: Vec::new(),
            };
        }

        let mut buffer: Vec<Complex<f64>> = signal
            .iter()
            .map(|&sample| Complex::new(sample, 0.0))
            .collect();

        {
            let Ok(mut planner) = self.planner.lock() else {
                return PowerSpectrum {
                    sample_rate,
                    data: Vec::new(),
                };
            };
            let fft = planner.plan_fft_forward(signal.len());
            fft.process(&mut buffer);
        }

        let data = buffer[..signal.len() / 2 + 1]
            .iter()
            .map(|c| c.re * c.re + c.im * c.im)
            .collect();

        PowerSpectrum { sample_rate, data }
    }
}

impl Default for FftProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::TAU;

    #[test]
    fn test_spectrum_length_is_half_plus_one() {
        let fft = FftProcessor::new();
        let spectrum = fft.power_spectrum(&vec![0.5; 1024], 44100);
        assert_eq!(spectrum.data.len(), 513);
    }

    #[test]
    fn test_sine_peaks_at_expected_bin() {
        let fft = FftProcessor::new();
        let n = 4096;
        let rate = 8192;
        let bin = 440; // exact bin frequency: 440 * rate / n = 880 Hz
        let signal: Vec<f64> = (0..n)
            .map(|i| (TAU * bin as f64 * i as f64 / n as f64).sin())
            .collect();

        let spectrum = fft.power_spectrum(&signal, rate);
        let peak = spectrum
            .data
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, bin, "peak should land on the sine's bin");
    }

    #[test]
    fn test_dc_signal_concentrates_in_bin_zero() {
        let fft = FftProcessor::new();
        let spectrum = fft.power_spectrum(&vec![1.0; 256], 44100);
        let total: f64 = spectrum.data.iter().sum();
        assert!(
            spectrum.data[0] / total > 0.999,
            "constant input should be pure DC"
        );
    }

    #[test]
    fn test_empty_signal_yields_empty_spectrum() {
        let fft = FftProcessor::new();
        let spectrum = fft.power_spectrum(&[], 44100);
        assert!(spectrum.data.is_empty());
    }

    #[test]
    fn test_bin_frequency_mapping_roundtrip() {
        let spectrum = PowerSpectrum {
            sample_rate: 44100,
            data: vec![0.0; 2049],
        };
        let f = spectrum.bin_frequency(100);
        assert!((spectrum.frequency_bin(f) - 100.0).abs() < 1e-9);
    }
}
