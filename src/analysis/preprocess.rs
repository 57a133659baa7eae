// Signal preprocessing ahead of the Fourier transform
//
// Several steps make the raw capture suitable for analysis: the DC bias and
// subsonic content are filtered out, leading silence before the keystroke is
// trimmed, and (for keystroke recordings) the loudness envelope is flattened
// and the edges faded so the transform does not see the capture window's
// discontinuities.

use crate::config::AnalyzerConfig;

/// Damping coefficient for a one-pole high-pass that suppresses the given
/// corner frequency by 50%
fn subsonic_damping(cutoff_hz: f64, sample_rate: u32) -> f64 {
    10.8828 * cutoff_hz / sample_rate as f64
}

/// Remove the DC bias and subsonic waves in one pass
pub fn remove_dc_and_subsonic(signal: &mut [f64], sample_rate: u32, cutoff_hz: f64) {
    if signal.is_empty() {
        return;
    }
    let dc_bias = signal.iter().sum::<f64>() / signal.len() as f64;
    let a = subsonic_damping(cutoff_hz, sample_rate);
    let mut follow = 0.0;
    for s in signal.iter_mut() {
        *s -= dc_bias;
        follow += a * (*s - follow);
        *s -= follow;
    }
}

/// Cut away silence at the beginning of the buffer
///
/// The capture buffer contains a stretch of near-silence from before the key
/// was hit. Fixed-width energy windows are scanned from the start and deleted
/// until the first non-silent window.
pub fn trim_leading_silence(signal: &mut Vec<f64>, sample_rate: u32, window_ms: u64) {
    let mut max_amplitude = 0.0f64;
    for &y in signal.iter() {
        max_amplitude = max_amplitude.max(y.abs());
    }
    let trigger = (max_amplitude * max_amplitude / 100.0).min(0.2);

    let w = ((sample_rate as u64 * window_ms) / 1000).max(1) as usize;
    let sections = signal.len() / w;
    if sections < 2 {
        return;
    }
    let mut to_delete = 0;
    for sec in 0..sections {
        let window = &signal[sec * w..(sec + 1) * w];
        let energy: f64 = window.iter().map(|y| y * y).sum();
        if energy / (w as f64) < trigger {
            to_delete += w;
        } else {
            break;
        }
    }
    if to_delete > 0 {
        signal.drain(..to_delete);
    }
}

/// Flatten the loudness envelope with a triple cascaded exponential follower
///
/// Returns the initial energy and the final envelope value, from which the
/// decay time of the keystroke is derived.
fn normalize_loudness(signal: &mut [f64], sample_rate: u32) -> (f64, f64) {
    let n = signal.len();
    let blocksize = n.min((sample_rate / 5) as usize).max(1); // 0.2 sec
    let mut e0 = 0.0;
    for &s in signal.iter().take(blocksize) {
        e0 += s * s;
    }
    e0 *= 2.0 / blocksize as f64;

    let gamma = 50.0 / sample_rate as f64;
    let (mut e1, mut e2, mut e3) = (e0, e0, e0);
    for s in signal.iter_mut() {
        e1 += gamma * (*s * *s - e1);
        e2 += gamma * (e1 - e2);
        e3 += gamma * (e2 - e3);
        *s /= e3.abs().sqrt() + 0.001;
    }
    (e0, e3)
}

/// Linearly fade the first and last fraction of the buffer in/out
pub fn fade_edges(signal: &mut [f64], fraction: f64) {
    let n = signal.len();
    let blocksize = (n as f64 * fraction) as usize;
    if blocksize == 0 {
        return;
    }
    for i in 0..blocksize {
        let scale = i as f64 / blocksize as f64;
        signal[i] *= scale;
        signal[n - i - 1] *= scale;
    }
}

/// Full preprocessing pass
///
/// `normalize` selects the keystroke-recording behavior (envelope
/// normalization and edge fades); rolling FFTs only need the filters and the
/// silence trim. Returns the logarithmic decay time of the envelope in
/// seconds, a rough hint whether a low or a high key was hit, or 0 when it is
/// not defined.
pub fn preprocess(
    signal: &mut Vec<f64>,
    sample_rate: u32,
    cfg: &AnalyzerConfig,
    normalize: bool,
) -> f64 {
    if signal.is_empty() {
        return 0.0;
    }

    remove_dc_and_subsonic(signal, sample_rate, cfg.subsonic_cutoff_hz);
    trim_leading_silence(signal, sample_rate, cfg.silence_window_ms);

    if signal.is_empty() || !normalize {
        return 0.0;
    }

    let (e0, e3) = normalize_loudness(signal, sample_rate);
    fade_edges(signal, cfg.fade_fraction);

    let ratio = e0 / e3;
    if ratio.is_finite() && ratio > 1.0 {
        signal.len() as f64 / ratio.ln() / sample_rate as f64
    } else {
        0.0
    }
}
