// Signal-quality faults reported by the analyzer
//
// None of these abort the analysis; they are broadcast so a UI can warn the
// user about an overdriven microphone, a flaky device, or a stray detection.

use crate::error::ErrorCode;
use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fault code constants
///
/// Error code range: 2001-2003
pub struct AnalysisFaultCodes {}

impl AnalysisFaultCodes {
    /// High-amplitude clipping detected in the recorded signal
    pub const CLIPPING: i32 = 2001;

    /// Intermittent signal with long runs of zero amplitudes
    pub const INTERMITTENT_SIGNAL: i32 = 2002;

    /// Detected key does not match the selected key
    pub const KEY_MISMATCH: i32 = 2003;
}

/// Log a fault with structured context
pub fn log_analysis_fault(fault: &AnalysisFault, context: &str) {
    warn!(
        "Analysis fault in {}: code={}, message={}",
        context,
        fault.code(),
        fault.message()
    );
}

/// Non-fatal signal-quality conditions surfaced as events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AnalysisFault {
    /// The signal clipped at its amplitude extremes
    Clipping { clipped: usize, total: usize },

    /// The signal contains an unusual number of exactly-zero samples
    IntermittentSignal { zeros: usize, total: usize },

    /// The majority-voted key differs from the selected key
    KeyMismatch { detected: usize, expected: usize },
}

impl ErrorCode for AnalysisFault {
    fn code(&self) -> i32 {
        match self {
            AnalysisFault::Clipping { .. } => AnalysisFaultCodes::CLIPPING,
            AnalysisFault::IntermittentSignal { .. } => AnalysisFaultCodes::INTERMITTENT_SIGNAL,
            AnalysisFault::KeyMismatch { .. } => AnalysisFaultCodes::KEY_MISMATCH,
        }
    }

    fn message(&self) -> String {
        match self {
            AnalysisFault::Clipping { clipped, total } => {
                format!(
                    "High-amplitude clipping detected ({} of {} samples)",
                    clipped, total
                )
            }
            AnalysisFault::IntermittentSignal { zeros, total } => {
                format!(
                    "Highly intermittent signal ({} of {} samples are zero)",
                    zeros, total
                )
            }
            AnalysisFault::KeyMismatch { detected, expected } => {
                format!(
                    "Detected key {} does not match selected key {}",
                    detected, expected
                )
            }
        }
    }
}

impl fmt::Display for AnalysisFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AnalysisFault (code {}): {}", self.code(), self.message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_codes() {
        assert_eq!(
            AnalysisFault::Clipping {
                clipped: 10,
                total: 100
            }
            .code(),
            AnalysisFaultCodes::CLIPPING
        );
        assert_eq!(
            AnalysisFault::IntermittentSignal {
                zeros: 50,
                total: 100
            }
            .code(),
            AnalysisFaultCodes::INTERMITTENT_SIGNAL
        );
        assert_eq!(
            AnalysisFault::KeyMismatch {
                detected: 40,
                expected: 41
            }
            .code(),
            AnalysisFaultCodes::KEY_MISMATCH
        );
    }

    #[test]
    fn test_fault_messages() {
        let fault = AnalysisFault::KeyMismatch {
            detected: 40,
            expected: 41,
        };
        assert!(fault.message().contains("40"));
        assert!(fault.message().contains("41"));
    }

    #[test]
    fn test_fault_serde_roundtrip() {
        let fault = AnalysisFault::Clipping {
            clipped: 7,
            total: 350,
        };
        let json = serde_json::to_string(&fault).unwrap();
        let parsed: AnalysisFault = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, fault);
    }
}
