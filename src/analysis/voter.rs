// KeyVoter - majority vote over per-FFT key guesses
//
// Every FFT yields one guess from the peak-matching recognizer. Guesses are
// accumulated in a histogram and a key counts as identified once it holds a
// strict majority of all votes cast. In rolling-FFT mode the analyzer tracks
// an already-known key, so each new vote replaces the histogram instead of
// accumulating.

use std::collections::HashMap;

/// Vote histogram with strict-majority identification
#[derive(Debug, Clone)]
pub struct KeyVoter {
    counts: HashMap<usize, usize>,
    total: usize,
    keyboard_size: usize,
    /// Replace instead of accumulate (rolling-FFT semantics)
    replace: bool,
}

impl KeyVoter {
    pub fn new(keyboard_size: usize) -> Self {
        Self {
            counts: HashMap::new(),
            total: 0,
            keyboard_size,
            replace: false,
        }
    }

    /// Adopt a new keyboard size (project change); clears all votes
    pub fn set_keyboard_size(&mut self, keyboard_size: usize) {
        self.keyboard_size = keyboard_size;
        self.reset();
    }

    /// Switch between accumulating and replacing semantics; clears all votes
    pub fn set_replace_mode(&mut self, replace: bool) {
        self.replace = replace;
        self.reset();
    }

    pub fn reset(&mut self) {
        self.counts.clear();
        self.total = 0;
    }

    pub fn total_votes(&self) -> usize {
        self.total
    }

    /// Count one vote; out-of-range keys are ignored
    pub fn register_vote(&mut self, key: usize) {
        if key >= self.keyboard_size {
            return;
        }
        if self.replace {
            self.counts.clear();
            self.total = 0;
        }
        *self.counts.entry(key).or_insert(0) += 1;
        self.total += 1;
    }

    /// The key holding a strict majority of all votes, if any
    pub fn identify(&self) -> Option<usize> {
        let (&key, &count) = self.counts.iter().max_by_key(|(_, &count)| count)?;
        if 2 * count > self.total {
            Some(key)
        } else {
            None
        }
    }
}
