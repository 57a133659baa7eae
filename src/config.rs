//! Configuration management for the capture and analysis pipeline
//!
//! This module provides runtime configuration loading from JSON files,
//! enabling parameter tuning without recompilation. Trigger thresholds,
//! adaptation rates, and buffer sizes can all be adjusted via the config
//! file for experimentation with different rooms and microphones.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub recorder: RecorderConfig,
    pub analyzer: AnalyzerConfig,
}

/// Recorder parameters: packet sizing, level thresholds, gain adaptation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// Packet duration in milliseconds (one level/statistics update per packet)
    pub packet_ms: u32,
    /// Capacity of the capture ring buffer in seconds
    pub buffer_seconds: f64,
    /// Level above which recording starts
    pub trigger_level: f64,
    /// Level below which the recorder becomes retriggerable again
    pub retrigger_level: f64,
    /// Initial level below which recording stops (adapted by the AGC)
    pub initial_stop_level: f64,
    /// Displayed level above which the internal gain is reduced
    pub cutoff_level: f64,
    /// Raw packet intensity above which the input volume is cut immediately
    pub peak_intensity_limit: f64,
    /// Attack rate of the sliding VU level (1 = instantly)
    pub attack_rate: f64,
    /// Decay rate of the sliding VU level
    pub decay_rate: f64,
    /// Easing rate of the gain toward its histogram-derived target
    pub gain_adapt_rate: f64,
    /// Easing rate of the stop level toward its histogram-derived target
    pub stop_adapt_rate: f64,
    /// Evaluate the intensity histogram every N packets
    pub histogram_eval_interval: u64,
    /// Divisor applied to every histogram bucket after each evaluation
    pub histogram_decay: f64,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            packet_ms: 50,
            buffer_seconds: 2.0,
            trigger_level: 0.45,
            retrigger_level: 0.3,
            initial_stop_level: 0.1,
            cutoff_level: 0.9,
            peak_intensity_limit: 0.9,
            attack_rate: 0.97,
            decay_rate: 0.7,
            gain_adapt_rate: 0.02,
            stop_adapt_rate: 0.1,
            histogram_eval_interval: 10,
            histogram_decay: 1.1,
        }
    }
}

/// Analyzer parameters: buffer sizing, FFT cadence, preprocessing shape
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Buffer capacity while recording a keystroke, in seconds
    pub keystroke_buffer_seconds: f64,
    /// Rolling-FFT window for the highest key, in seconds
    pub rolling_min_seconds: f64,
    /// Rolling-FFT window for the lowest key, in seconds
    pub rolling_max_seconds: f64,
    /// Minimum audio duration (and pacing interval) between FFTs, in milliseconds
    pub min_fft_interval_ms: u64,
    /// Width of the energy windows scanned when trimming leading silence
    pub silence_window_ms: u64,
    /// Fraction of the signal faded in/out at each end before the FFT
    pub fade_fraction: f64,
    /// Corner frequency of the subsonic high-pass filter in Hz
    pub subsonic_cutoff_hz: f64,
    /// Wait after keystroke analysis before releasing the recorder, in
    /// milliseconds (lets audible confirmation feedback ring out)
    pub post_analysis_grace_ms: u64,
    /// Idle poll granularity of the worker loop in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            keystroke_buffer_seconds: 60.0,
            rolling_min_seconds: 0.5,
            rolling_max_seconds: 3.0,
            min_fft_interval_ms: 50,
            silence_window_ms: 25,
            fade_fraction: 0.02,
            subsonic_cutoff_hz: 5.0,
            post_analysis_grace_ms: 1500,
            poll_interval_ms: 20,
        }
    }
}

impl Default for AppConfig {
    /// Default configuration values (fallback if config file not found)
    fn default() -> Self {
        Self {
            recorder: RecorderConfig::default(),
            analyzer: AnalyzerConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file
    ///
    /// Falls back to the default configuration (with a logged warning) if the
    /// file cannot be read or parsed, so a broken config never prevents
    /// startup.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }
}
