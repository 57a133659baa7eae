// AppContext: explicitly constructed application context
//
// Owns the recorder, the analyzer, and the event bus; created at startup and
// torn down at shutdown, with no process-wide state. Collaborators receive
// handles from here instead of reaching for globals. Inbound control events
// (project load, mode change, key selection) are methods; outbound events are
// typed broadcast channels with optional stream adapters.

use std::sync::Arc;

use futures::stream::BoxStream;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::analysis::{AnalyzerRole, SpectralAnalyzer};
use crate::audio::gain::{InputVolumeControl, NullVolumeControl};
use crate::audio::recorder::AudioRecorder;
use crate::config::AppConfig;
use crate::error::{AnalysisFault, AudioError};
use crate::events::{EventBus, FinalKey, KeyGuess, LevelUpdate, RecordingEvent, SpectrumUpdate};
use crate::keys::Piano;
use crate::recognizer::{KeyRecognizer, PeakRecognizer};

/// Operation mode of the surrounding application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationMode {
    /// Neither recording nor tuning; the recorder is deactivated
    Idle,
    /// Recording keystrokes for key identification
    Recording,
    /// Tuning a known key against a rolling FFT
    Tuning,
}

pub struct AppContext {
    events: Arc<EventBus>,
    recorder: Arc<AudioRecorder>,
    analyzer: SpectralAnalyzer,
}

impl AppContext {
    /// Build a context with the default volume control and recognizer
    pub fn new(config: AppConfig) -> Self {
        Self::with_components(
            config,
            Box::new(NullVolumeControl),
            Arc::new(PeakRecognizer),
        )
    }

    /// Build a context with injected collaborators
    ///
    /// The volume control reaches the platform mixer (for the fast peak
    /// limiter); the recognizer is the external peak-matching callback.
    pub fn with_components(
        config: AppConfig,
        volume: Box<dyn InputVolumeControl>,
        recognizer: Arc<dyn KeyRecognizer>,
    ) -> Self {
        let events = Arc::new(EventBus::new());
        let recorder = Arc::new(AudioRecorder::new(
            config.recorder.clone(),
            crate::audio::capture::PREFERRED_SAMPLE_RATE,
            Arc::clone(&events),
            volume,
        ));
        let analyzer = SpectralAnalyzer::new(
            config.analyzer.clone(),
            Arc::clone(&recorder),
            Arc::clone(&events),
            recognizer,
        );
        // Until a mode is selected nothing should record.
        recorder.set_mode_standby(true);
        Self {
            events,
            recorder,
            analyzer,
        }
    }

    pub fn events(&self) -> Arc<EventBus> {
        Arc::clone(&self.events)
    }

    pub fn recorder(&self) -> Arc<AudioRecorder> {
        Arc::clone(&self.recorder)
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Start the analysis worker
    pub fn start(&self) -> Result<(), AudioError> {
        self.analyzer.start()
    }

    /// Stop the analysis worker, cancelling any in-flight analysis
    pub fn stop(&self) -> Result<(), AudioError> {
        self.analyzer.stop()
    }

    // ========================================================================
    // INBOUND CONTROL EVENTS
    // ========================================================================

    /// A project was loaded: adopt the piano and reset identification state
    pub fn load_project(&self, piano: Piano) {
        self.analyzer.load_project(piano);
    }

    /// The operation mode changed: map it onto the analyzer role and the
    /// recorder's mode standby bit
    pub fn set_operation_mode(&self, mode: OperationMode) {
        match mode {
            OperationMode::Recording => {
                self.analyzer.set_role(AnalyzerRole::RecordKeystroke);
                self.recorder.set_mode_standby(false);
            }
            OperationMode::Tuning => {
                self.analyzer.set_role(AnalyzerRole::RollingFft);
                self.recorder.set_mode_standby(false);
            }
            OperationMode::Idle => {
                // Block new triggers before tearing the role down so no
                // keystroke can slip into the gap.
                self.recorder.set_mode_standby(true);
                self.analyzer.set_role(AnalyzerRole::Idle);
            }
        }
    }

    /// The selected key changed
    pub fn select_key(&self, key: Option<usize>, forced: bool) {
        self.analyzer.select_key(key, forced);
    }

    /// Mute or unmute the input device
    pub fn set_muted(&self, muted: bool) {
        self.recorder.set_muted(muted);
    }

    /// Forget the learned noise level (user-initiated recalibration)
    pub fn reset_noise_level(&self) {
        self.recorder.reset_noise_level();
    }

    // ========================================================================
    // STREAM ADAPTERS
    // ========================================================================

    /// Stream of VU-meter updates
    pub fn level_stream(&self) -> BoxStream<'static, LevelUpdate> {
        Box::pin(BroadcastStream::new(self.events.subscribe_levels()).filter_map(Result::ok))
    }

    /// Stream of onset/offset notifications
    pub fn recording_stream(&self) -> BoxStream<'static, RecordingEvent> {
        Box::pin(BroadcastStream::new(self.events.subscribe_recording()).filter_map(Result::ok))
    }

    /// Stream of computed spectra with display polygons
    pub fn spectrum_stream(&self) -> BoxStream<'static, SpectrumUpdate> {
        Box::pin(BroadcastStream::new(self.events.subscribe_spectra()).filter_map(Result::ok))
    }

    /// Stream of per-FFT preliminary key guesses
    pub fn guess_stream(&self) -> BoxStream<'static, KeyGuess> {
        Box::pin(BroadcastStream::new(self.events.subscribe_guesses()).filter_map(Result::ok))
    }

    /// Stream of majority-accepted key identifications
    pub fn final_key_stream(&self) -> BoxStream<'static, FinalKey> {
        Box::pin(BroadcastStream::new(self.events.subscribe_final_keys()).filter_map(Result::ok))
    }

    /// Stream of signal-quality and mismatch faults
    pub fn fault_stream(&self) -> BoxStream<'static, AnalysisFault> {
        Box::pin(BroadcastStream::new(self.events.subscribe_faults()).filter_map(Result::ok))
    }
}

impl Drop for AppContext {
    fn drop(&mut self) {
        // Stopping an already-stopped analyzer is fine.
        let _ = self.analyzer.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::recorder::STANDBY_DEACTIVATED_BY_MODE;

    #[test]
    fn test_context_starts_deactivated() {
        let ctx = AppContext::new(AppConfig::default());
        assert_eq!(
            ctx.recorder().standby_flags() & STANDBY_DEACTIVATED_BY_MODE,
            STANDBY_DEACTIVATED_BY_MODE,
            "no recording before a mode is selected"
        );
    }

    #[test]
    fn test_mode_maps_to_role_and_standby() {
        let ctx = AppContext::new(AppConfig::default());

        ctx.set_operation_mode(OperationMode::Recording);
        assert_eq!(ctx.analyzer.role(), AnalyzerRole::RecordKeystroke);
        assert_eq!(
            ctx.recorder().standby_flags() & STANDBY_DEACTIVATED_BY_MODE,
            0
        );

        ctx.set_operation_mode(OperationMode::Tuning);
        assert_eq!(ctx.analyzer.role(), AnalyzerRole::RollingFft);

        ctx.set_operation_mode(OperationMode::Idle);
        assert_eq!(ctx.analyzer.role(), AnalyzerRole::Idle);
        assert_eq!(
            ctx.recorder().standby_flags() & STANDBY_DEACTIVATED_BY_MODE,
            STANDBY_DEACTIVATED_BY_MODE
        );
    }

    #[test]
    fn test_lifecycle_guards() {
        let ctx = AppContext::new(AppConfig::default());
        assert!(ctx.start().is_ok());
        assert_eq!(ctx.start(), Err(AudioError::AlreadyRunning));
        assert!(ctx.stop().is_ok());
        assert_eq!(ctx.stop(), Err(AudioError::NotRunning));
    }

    #[tokio::test]
    async fn test_final_key_stream_yields_published_events() {
        let ctx = AppContext::new(AppConfig::default());
        let mut stream = ctx.final_key_stream();

        ctx.events().publish_final_key(FinalKey {
            key: 48,
            frequency: 440.0,
        });

        let received = tokio::time::timeout(std::time::Duration::from_secs(1), stream.next())
            .await
            .expect("stream should yield in time")
            .expect("stream should not end");
        assert_eq!(received.key, 48);
    }

    #[test]
    fn test_drop_stops_a_running_context() {
        let ctx = AppContext::new(AppConfig::default());
        ctx.start().unwrap();
        drop(ctx); // must not hang or panic
    }
}
