// keytune - real-time audio capture and spectral key identification
// for piano tuning
//
// Pipeline: hardware packets -> AudioRecorder (level, gain, onset detection,
// capture buffer) -> SpectralAnalyzer worker thread (preprocess, FFT, display
// polygon, key voting) -> majority-accepted key identification, fanned out as
// typed broadcast events.

pub mod analysis;
pub mod audio;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod keys;
pub mod recognizer;

pub use config::AppConfig;
pub use context::{AppContext, OperationMode};

#[cfg(test)]
mod tests {
    #[test]
    fn test_module_structure() {
        // Verify all modules are accessible
        // This ensures the crate compiles with proper module hierarchy
    }
}
