// EventBus: typed broadcast channels for pipeline output
//
// Replaces message-bus fan-out with explicit typed channels: every component
// declares exactly the event types it produces, and consumers subscribe to
// the channels they care about. Senders never block; events published with no
// live subscriber are dropped.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::analysis::fft::PowerSpectrum;
use crate::analysis::polygon::SpectrumPolygon;
use crate::error::AnalysisFault;

/// Which meter a level update refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LevelKind {
    /// The live VU level of the input signal
    Input,
    /// The adapted stop level (the "off" marker on the meter)
    Off,
}

/// VU-meter update emitted once per packet
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelUpdate {
    pub kind: LevelKind,
    pub value: f64,
}

/// Onset/offset notifications from the recorder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordingEvent {
    Started,
    Ended,
}

/// Whether a spectrum was computed mid-recording or after the final drain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpectrumKind {
    Intermediate,
    Final,
}

/// A freshly computed power spectrum with its display polygon
#[derive(Debug, Clone)]
pub struct SpectrumUpdate {
    pub kind: SpectrumKind,
    pub spectrum: Arc<PowerSpectrum>,
    pub polygon: Arc<SpectrumPolygon>,
}

/// Per-FFT preliminary key vote, for live UI feedback
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KeyGuess {
    /// Current majority candidate, if any
    pub key: Option<usize>,
    /// Peak frequency reported by the recognizer for this FFT
    pub frequency: f64,
}

/// Majority-accepted identification of the struck key
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FinalKey {
    pub key: usize,
    pub frequency: f64,
}

/// Suggestion to follow the player to an adjacent key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySuggestion {
    pub key: usize,
}

/// Typed broadcast channels connecting the pipeline to its consumers
///
/// All channels are created eagerly; subscribing is always possible and a
/// subscriber only sees events published after it subscribed. Buffer sizes
/// are generous enough that a UI thread polling at frame rate never lags.
pub struct EventBus {
    levels: broadcast::Sender<LevelUpdate>,
    recording: broadcast::Sender<RecordingEvent>,
    spectra: broadcast::Sender<SpectrumUpdate>,
    guesses: broadcast::Sender<KeyGuess>,
    final_keys: broadcast::Sender<FinalKey>,
    suggestions: broadcast::Sender<KeySuggestion>,
    faults: broadcast::Sender<AnalysisFault>,
}

impl EventBus {
    pub fn new() -> Self {
        let (levels, _) = broadcast::channel(64);
        let (recording, _) = broadcast::channel(16);
        let (spectra, _) = broadcast::channel(16);
        let (guesses, _) = broadcast::channel(64);
        let (final_keys, _) = broadcast::channel(16);
        let (suggestions, _) = broadcast::channel(16);
        let (faults, _) = broadcast::channel(16);
        Self {
            levels,
            recording,
            spectra,
            guesses,
            final_keys,
            suggestions,
            faults,
        }
    }

    // Publishing; a closed or empty channel is not an error.

    pub fn publish_level(&self, update: LevelUpdate) {
        let _ = self.levels.send(update);
    }

    pub fn publish_recording(&self, event: RecordingEvent) {
        let _ = self.recording.send(event);
    }

    pub fn publish_spectrum(&self, update: SpectrumUpdate) {
        let _ = self.spectra.send(update);
    }

    pub fn publish_guess(&self, guess: KeyGuess) {
        let _ = self.guesses.send(guess);
    }

    pub fn publish_final_key(&self, key: FinalKey) {
        let _ = self.final_keys.send(key);
    }

    pub fn publish_suggestion(&self, suggestion: KeySuggestion) {
        let _ = self.suggestions.send(suggestion);
    }

    pub fn publish_fault(&self, fault: AnalysisFault) {
        let _ = self.faults.send(fault);
    }

    // Subscriptions; each subscriber gets an independent receiver.

    pub fn subscribe_levels(&self) -> broadcast::Receiver<LevelUpdate> {
        self.levels.subscribe()
    }

    pub fn subscribe_recording(&self) -> broadcast::Receiver<RecordingEvent> {
        self.recording.subscribe()
    }

    pub fn subscribe_spectra(&self) -> broadcast::Receiver<SpectrumUpdate> {
        self.spectra.subscribe()
    }

    pub fn subscribe_guesses(&self) -> broadcast::Receiver<KeyGuess> {
        self.guesses.subscribe()
    }

    pub fn subscribe_final_keys(&self) -> broadcast::Receiver<FinalKey> {
        self.final_keys.subscribe()
    }

    pub fn subscribe_suggestions(&self) -> broadcast::Receiver<KeySuggestion> {
        self.suggestions.subscribe()
    }

    pub fn subscribe_faults(&self) -> broadcast::Receiver<AnalysisFault> {
        self.faults.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let bus = EventBus::new();
        // Must not panic or block
        bus.publish_level(LevelUpdate {
            kind: LevelKind::Input,
            value: 0.5,
        });
        bus.publish_recording(RecordingEvent::Started);
    }

    #[test]
    fn test_multiple_subscribers_receive_events() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe_final_keys();
        let mut rx2 = bus.subscribe_final_keys();

        bus.publish_final_key(FinalKey {
            key: 48,
            frequency: 440.0,
        });

        assert_eq!(rx1.try_recv().unwrap().key, 48);
        assert_eq!(rx2.try_recv().unwrap().key, 48);
    }

    #[test]
    fn test_subscriber_only_sees_later_events() {
        let bus = EventBus::new();
        bus.publish_recording(RecordingEvent::Started);

        let mut rx = bus.subscribe_recording();
        assert!(rx.try_recv().is_err(), "event before subscribe is invisible");

        bus.publish_recording(RecordingEvent::Ended);
        assert_eq!(rx.try_recv().unwrap(), RecordingEvent::Ended);
    }
}
