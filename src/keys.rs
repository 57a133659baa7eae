//! Keyboard description consumed by the identification pipeline
//!
//! Only the properties the core actually needs cross this boundary: how many
//! keys the instrument has and how key indices map to equal-temperament
//! frequencies. Everything else about a piano (string data, tuning curves,
//! names) belongs to the surrounding application.

use serde::{Deserialize, Serialize};

/// Number of keys on a standard concert grand
pub const STANDARD_KEY_COUNT: usize = 88;

/// Index of the concert-pitch key (A4) on a standard 88-key board
pub const STANDARD_A4_INDEX: usize = 48;

/// Minimal piano description shared with the analyzer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Piano {
    key_count: usize,
    concert_pitch: f64,
    a4_index: usize,
}

impl Piano {
    /// Create a piano description
    ///
    /// `a4_index` is clamped into the keyboard range so a malformed project
    /// file cannot produce out-of-range frequencies.
    pub fn new(key_count: usize, concert_pitch: f64, a4_index: usize) -> Self {
        Self {
            key_count,
            concert_pitch,
            a4_index: a4_index.min(key_count.saturating_sub(1)),
        }
    }

    pub fn key_count(&self) -> usize {
        self.key_count
    }

    pub fn concert_pitch(&self) -> f64 {
        self.concert_pitch
    }

    /// Equal-temperament frequency of a key index
    pub fn key_frequency(&self, key: usize) -> f64 {
        let semitones = key as f64 - self.a4_index as f64;
        self.concert_pitch * (semitones / 12.0).exp2()
    }

    /// Nearest key index for a frequency, if it falls on the keyboard
    pub fn nearest_key(&self, frequency: f64) -> Option<usize> {
        if frequency <= 0.0 || self.concert_pitch <= 0.0 {
            return None;
        }
        let semitones = 12.0 * (frequency / self.concert_pitch).log2();
        let index = semitones.round() + self.a4_index as f64;
        if index >= 0.0 && (index as usize) < self.key_count {
            Some(index as usize)
        } else {
            None
        }
    }
}

impl Default for Piano {
    fn default() -> Self {
        Self::new(STANDARD_KEY_COUNT, 440.0, STANDARD_A4_INDEX)
    }
}
