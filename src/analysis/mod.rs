// Analysis module - spectral pipeline from captured audio to key votes
//
// The SpectralAnalyzer owns a role-dependent ring buffer and a single
// long-lived worker thread. While a recording runs, the worker drains the
// recorder, preprocesses the buffered signal, computes FFTs at a bounded
// rate, and feeds each spectrum to the key recognizer; when the recording
// ends it identifies the struck key by majority vote and releases the
// recorder from standby.
//
// Concurrency:
// - role / cancel / shutdown / session_active: atomics
// - analysis buffer, voter, piano, key selection: mutexes scoped to the
//   individual operation, never held across preprocessing or an FFT

pub mod fft;
pub mod polygon;
pub mod preprocess;
pub mod quality;
pub mod voter;

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::audio::recorder::{AudioRecorder, Sample};
use crate::audio::ring_buffer::RingBuffer;
use crate::config::AnalyzerConfig;
use crate::error::{log_analysis_fault, AnalysisFault, AudioError};
use crate::events::{EventBus, FinalKey, KeyGuess, KeySuggestion, SpectrumKind, SpectrumUpdate};
use crate::keys::Piano;
use crate::recognizer::{KeyRecognizer, Recognition};

use fft::FftProcessor;
use polygon::create_polygon;
use quality::detect_defects;
use voter::KeyVoter;

/// Operating role of the analyzer, switched by the operation mode
///
/// Changing the role always stops any in-flight analysis and destructively
/// resizes the analysis buffer before the next processing cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AnalyzerRole {
    /// Not analyzing; the buffer is empty with capacity zero
    Idle = 0,
    /// Open-ended keystroke capture for key identification
    RecordKeystroke = 1,
    /// Short rolling window tracking an already-known key while tuning
    RollingFft = 2,
}

impl AnalyzerRole {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => AnalyzerRole::RecordKeystroke,
            2 => AnalyzerRole::RollingFft,
            _ => AnalyzerRole::Idle,
        }
    }
}

/// Externally selected key and whether the user forced it
#[derive(Debug, Clone, Copy, Default)]
struct KeySelection {
    key: Option<usize>,
    forced: bool,
}

/// State shared between the public handle and the worker thread
struct AnalyzerShared {
    cfg: AnalyzerConfig,
    recorder: Arc<AudioRecorder>,
    events: Arc<EventBus>,
    recognizer: Arc<dyn KeyRecognizer>,
    fft: FftProcessor,
    piano: Mutex<Piano>,
    selection: Mutex<KeySelection>,
    buffer: Mutex<RingBuffer<Sample>>,
    voter: Mutex<KeyVoter>,
    role: AtomicU8,
    cancel: AtomicBool,
    shutdown: AtomicBool,
    session_active: AtomicBool,
}

pub struct SpectralAnalyzer {
    shared: Arc<AnalyzerShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SpectralAnalyzer {
    pub fn new(
        cfg: AnalyzerConfig,
        recorder: Arc<AudioRecorder>,
        events: Arc<EventBus>,
        recognizer: Arc<dyn KeyRecognizer>,
    ) -> Self {
        let piano = Piano::default();
        let voter = KeyVoter::new(piano.key_count());
        Self {
            shared: Arc::new(AnalyzerShared {
                cfg,
                recorder,
                events,
                recognizer,
                fft: FftProcessor::new(),
                piano: Mutex::new(piano),
                selection: Mutex::new(KeySelection::default()),
                buffer: Mutex::new(RingBuffer::new(0)),
                voter: Mutex::new(voter),
                role: AtomicU8::new(AnalyzerRole::Idle as u8),
                cancel: AtomicBool::new(false),
                shutdown: AtomicBool::new(false),
                session_active: AtomicBool::new(false),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Spawn the worker thread
    pub fn start(&self) -> Result<(), AudioError> {
        let mut worker = self.worker.lock().map_err(|_| AudioError::LockPoisoned {
            component: "analyzer worker".to_string(),
        })?;
        if worker.is_some() {
            return Err(AudioError::AlreadyRunning);
        }
        self.shared.shutdown.store(false, Ordering::SeqCst);
        let shared = Arc::clone(&self.shared);
        *worker = Some(thread::spawn(move || shared.run_worker()));
        Ok(())
    }

    /// Stop the worker thread, cancelling any in-flight analysis
    pub fn stop(&self) -> Result<(), AudioError> {
        let handle = {
            let mut worker = self.worker.lock().map_err(|_| AudioError::LockPoisoned {
                component: "analyzer worker".to_string(),
            })?;
            worker.take().ok_or(AudioError::NotRunning)?
        };
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared.cancel.store(true, Ordering::SeqCst);
        if handle.join().is_err() {
            return Err(AudioError::HardwareError {
                details: "analysis worker panicked".to_string(),
            });
        }
        self.shared.cancel.store(false, Ordering::SeqCst);
        Ok(())
    }

    pub fn role(&self) -> AnalyzerRole {
        AnalyzerRole::from_u8(self.shared.role.load(Ordering::Relaxed))
    }

    /// Switch the analyzer role
    ///
    /// Stops any running analysis first, then resizes and clears the buffer
    /// and the vote histogram under the guard, so no stale-role data crosses
    /// the boundary.
    pub fn set_role(&self, role: AnalyzerRole) {
        self.shared.cancel_active_session();
        self.shared.role.store(role as u8, Ordering::Relaxed);
        self.shared.resize_buffer();
        if let Ok(mut voter) = self.shared.voter.lock() {
            voter.set_replace_mode(role == AnalyzerRole::RollingFft);
        }
        self.shared.cancel.store(false, Ordering::SeqCst);
        debug!(?role, "analyzer role changed");
    }

    /// Update the externally selected key
    ///
    /// In the rolling role the buffer duration depends on the key, so the
    /// buffer is re-derived (destructively) as well.
    pub fn select_key(&self, key: Option<usize>, forced: bool) {
        if let Ok(mut selection) = self.shared.selection.lock() {
            *selection = KeySelection { key, forced };
        }
        if self.role() == AnalyzerRole::RollingFft {
            self.shared.cancel_active_session();
            self.shared.resize_buffer();
            self.shared.cancel.store(false, Ordering::SeqCst);
        }
    }

    /// Adopt a new piano (project load); resets votes and buffer sizing
    pub fn load_project(&self, piano: Piano) {
        self.shared.cancel_active_session();
        let key_count = piano.key_count();
        if let Ok(mut guard) = self.shared.piano.lock() {
            *guard = piano;
        }
        if let Ok(mut voter) = self.shared.voter.lock() {
            voter.set_keyboard_size(key_count);
        }
        self.shared.resize_buffer();
        self.shared.cancel.store(false, Ordering::SeqCst);
    }

    #[cfg(test)]
    fn buffer_capacity(&self) -> usize {
        self.shared.buffer.lock().map(|b| b.capacity()).unwrap_or(0)
    }
}

/// What a recording session leaves behind for post-processing
#[derive(Default)]
struct SessionOutcome {
    /// Most recent recognizer result, used to tag the final key with a
    /// measured frequency
    last_recognition: Option<Recognition>,
}

impl AnalyzerShared {
    fn role(&self) -> AnalyzerRole {
        AnalyzerRole::from_u8(self.role.load(Ordering::Relaxed))
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Ask a running session to unwind and wait until it has
    ///
    /// The wait is bounded by the coarsest sleep in the worker loop; the
    /// worker checks the flag at every stage.
    fn cancel_active_session(&self) {
        self.cancel.store(true, Ordering::SeqCst);
        while self.session_active.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(1));
        }
    }

    /// Re-derive the buffer capacity for the current role (destructive)
    fn resize_buffer(&self) {
        let rate = self.recorder.sample_rate() as f64;
        let capacity = match self.role() {
            AnalyzerRole::Idle => 0,
            AnalyzerRole::RecordKeystroke => (rate * self.cfg.keystroke_buffer_seconds) as usize,
            AnalyzerRole::RollingFft => {
                // Lower keys need a longer window for adequate frequency
                // resolution: interpolate linearly across the keyboard.
                let (key, key_count) = {
                    let key = self
                        .selection
                        .lock()
                        .ok()
                        .and_then(|s| s.key)
                        .unwrap_or_default();
                    let key_count = self.piano.lock().map(|p| p.key_count()).unwrap_or(88);
                    (key, key_count)
                };
                let seconds = (self.cfg.rolling_min_seconds - self.cfg.rolling_max_seconds)
                    * key as f64
                    / key_count as f64
                    + self.cfg.rolling_max_seconds;
                (rate * seconds) as usize
            }
        };
        if let Ok(mut buffer) = self.buffer.lock() {
            buffer.resize(capacity);
        }
    }

    /// Worker thread main loop
    fn run_worker(self: Arc<Self>) {
        info!("analysis worker started");
        let poll = Duration::from_millis(self.cfg.poll_interval_ms.max(1));
        while !self.shutdown.load(Ordering::SeqCst) {
            let role = self.role();
            if role != AnalyzerRole::Idle && self.recorder.is_recording() && !self.cancelled() {
                self.session_active.store(true, Ordering::SeqCst);
                let outcome = self.record_session(role);
                if !self.cancelled() {
                    self.postprocess(role, outcome);
                }
                // Release the recorder even after a cancellation, otherwise
                // it would wait for an analysis that never finishes.
                self.recorder.analysis_finished();
                self.session_active.store(false, Ordering::SeqCst);
            } else {
                if role == AnalyzerRole::Idle && self.recorder.is_recording() {
                    // A trigger slipped through while idle; no analysis will
                    // run for it, so release the recorder right away.
                    self.recorder.analysis_finished();
                }
                thread::sleep(poll);
            }
        }
        info!("analysis worker stopped");
    }

    /// Drain, preprocess, and transform until the recording ends
    fn record_session(&self, role: AnalyzerRole) -> SessionOutcome {
        if let Ok(mut voter) = self.voter.lock() {
            voter.reset();
        }
        if let Ok(mut buffer) = self.buffer.lock() {
            buffer.clear();
        }
        // Discard anything captured before the trigger fired.
        let _ = self.recorder.read_all();

        let rate = self.recorder.sample_rate();
        let min_samples = ((rate as u64 * self.cfg.min_fft_interval_ms) / 1000) as usize;
        let min_interval = Duration::from_millis(self.cfg.min_fft_interval_ms);
        let poll = Duration::from_millis(self.cfg.poll_interval_ms.max(1));

        let mut outcome = SessionOutcome::default();
        let mut warned_full = false;

        while self.recorder.is_recording() && !self.cancelled() {
            let iteration_start = Instant::now();
            let packet = self.recorder.read_all();
            if !packet.is_empty() {
                let (buffered, full) = match self.buffer.lock() {
                    Ok(mut buffer) => {
                        buffer.push_slice(&packet);
                        (buffer.len(), buffer.is_full())
                    }
                    Err(_) => (0, false),
                };
                if role == AnalyzerRole::RecordKeystroke && full && !warned_full {
                    warn!("keystroke buffer saturated, oldest audio is being replaced");
                    warned_full = true;
                }

                if buffered > min_samples {
                    let mut signal = match self.buffer.lock() {
                        Ok(buffer) => buffer.snapshot_ordered(),
                        Err(_) => Vec::new(),
                    };
                    // An all-zero snapshot means device silence or a glitch;
                    // skip it without raising anything.
                    if signal.iter().any(|&s| s * s > 0.0) {
                        self.analyze_snapshot(role, &mut signal, rate, &mut outcome);
                        // Pace the FFT rate: bounded CPU usage and a stable
                        // refresh cadence for consumers.
                        while iteration_start.elapsed() < min_interval && !self.cancelled() {
                            thread::sleep(Duration::from_millis(1));
                        }
                        continue;
                    }
                }
            }
            thread::sleep(poll);
        }
        outcome
    }

    /// Preprocess one snapshot, transform it, publish, and vote
    fn analyze_snapshot(
        &self,
        role: AnalyzerRole,
        signal: &mut Vec<Sample>,
        rate: u32,
        outcome: &mut SessionOutcome,
    ) {
        let normalize = role == AnalyzerRole::RecordKeystroke;
        let decay_time = preprocess::preprocess(signal, rate, &self.cfg, normalize);
        if decay_time > 0.0 {
            debug!(decay_time, "envelope decay estimated");
        }
        if self.cancelled() || signal.is_empty() {
            return;
        }

        let spectrum = Arc::new(self.fft.power_spectrum(signal, rate));
        if self.cancelled() {
            return;
        }

        if let Some(polygon) = create_polygon(&spectrum) {
            let kind = if self.recorder.is_recording() {
                SpectrumKind::Intermediate
            } else {
                SpectrumKind::Final
            };
            self.events.publish_spectrum(SpectrumUpdate {
                kind,
                spectrum: Arc::clone(&spectrum),
                polygon: Arc::new(polygon),
            });
        }

        let piano = match self.piano.lock() {
            Ok(piano) => piano.clone(),
            Err(_) => return,
        };
        let Some(recognition) = self.recognizer.recognize(&spectrum, &piano) else {
            return;
        };
        outcome.last_recognition = Some(recognition);

        let running = match self.voter.lock() {
            Ok(mut voter) => {
                voter.register_vote(recognition.key);
                voter.identify()
            }
            Err(_) => return,
        };

        match role {
            AnalyzerRole::RecordKeystroke => {
                self.events.publish_guess(KeyGuess {
                    key: running,
                    frequency: recognition.frequency,
                });
                // Follow the player: a stable majority on a directly adjacent
                // key suggests the selection is off by one.
                if let Ok(selection) = self.selection.lock() {
                    if !selection.forced {
                        if let (Some(found), Some(selected)) = (running, selection.key) {
                            if found.abs_diff(selected) == 1 {
                                self.events.publish_suggestion(KeySuggestion { key: found });
                            }
                        }
                    }
                }
            }
            AnalyzerRole::RollingFft => {
                self.events.publish_guess(KeyGuess {
                    key: Some(recognition.key),
                    frequency: recognition.frequency,
                });
            }
            AnalyzerRole::Idle => {}
        }
    }

    /// Post-processing after the recording ended: final vote, quality scan,
    /// grace wait for confirmation feedback
    fn postprocess(&self, role: AnalyzerRole, outcome: SessionOutcome) {
        if self.cancelled() {
            return;
        }

        let detected = self.voter.lock().ok().and_then(|voter| voter.identify());

        // Scan the full captured signal for clipping and dropouts; this only
        // warns, the identification below still counts.
        let captured = self
            .buffer
            .lock()
            .map(|buffer| buffer.snapshot_ordered())
            .unwrap_or_default();
        if !captured.is_empty() {
            if let Some(fault) = detect_defects(&captured) {
                log_analysis_fault(&fault, "postprocessing");
                self.events.publish_fault(fault);
            }
        }
        if self.cancelled() {
            return;
        }

        let (selected, forced) = self
            .selection
            .lock()
            .map(|s| (s.key, s.forced))
            .unwrap_or((None, false));
        let final_key = if forced { selected } else { detected };

        match final_key {
            None => info!("no key identified this cycle"),
            Some(key) if !forced && selected.is_some() && Some(key) != selected => {
                debug!(
                    detected = key,
                    expected = selected.unwrap_or_default(),
                    "detected key does not match the selection, discarding"
                );
                self.events.publish_fault(AnalysisFault::KeyMismatch {
                    detected: key,
                    expected: selected.unwrap_or_default(),
                });
            }
            Some(key) => {
                let frequency = match outcome.last_recognition {
                    Some(recognition) if recognition.key == key => recognition.frequency,
                    _ => self
                        .piano
                        .lock()
                        .map(|p| p.key_frequency(key))
                        .unwrap_or(0.0),
                };
                info!(key, frequency, "final key identified");
                self.events.publish_final_key(FinalKey { key, frequency });
            }
        }

        if role == AnalyzerRole::RecordKeystroke {
            // Let any audible confirmation feedback ring out before the
            // recorder may trigger again.
            let deadline = Instant::now() + Duration::from_millis(self.cfg.post_analysis_grace_ms);
            while Instant::now() < deadline && !self.cancelled() {
                thread::sleep(Duration::from_millis(10));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::gain::NullVolumeControl;
    use crate::config::RecorderConfig;
    use crate::recognizer::PeakRecognizer;

    const RATE: u32 = 8000;

    fn make_analyzer() -> SpectralAnalyzer {
        let events = Arc::new(EventBus::new());
        let recorder = Arc::new(AudioRecorder::new(
            RecorderConfig::default(),
            RATE,
            Arc::clone(&events),
            Box::new(NullVolumeControl),
        ));
        SpectralAnalyzer::new(
            AnalyzerConfig::default(),
            recorder,
            events,
            Arc::new(PeakRecognizer),
        )
    }

    #[test]
    fn test_idle_role_has_empty_buffer() {
        let analyzer = make_analyzer();
        assert_eq!(analyzer.role(), AnalyzerRole::Idle);
        assert_eq!(analyzer.buffer_capacity(), 0);
    }

    #[test]
    fn test_keystroke_role_sizes_buffer_for_a_minute() {
        let analyzer = make_analyzer();
        analyzer.set_role(AnalyzerRole::RecordKeystroke);
        assert_eq!(analyzer.buffer_capacity(), (RATE as f64 * 60.0) as usize);
    }

    #[test]
    fn test_rolling_role_interpolates_by_key() {
        let analyzer = make_analyzer();

        analyzer.select_key(Some(0), false);
        analyzer.set_role(AnalyzerRole::RollingFft);
        assert_eq!(
            analyzer.buffer_capacity(),
            (RATE as f64 * 3.0) as usize,
            "the lowest key needs the longest window"
        );

        analyzer.select_key(Some(44), false);
        let mid = analyzer.buffer_capacity();
        assert!(
            mid < (RATE as f64 * 3.0) as usize && mid > (RATE as f64 * 0.5) as usize,
            "a middle key sits between the extremes: {}",
            mid
        );

        analyzer.select_key(Some(87), false);
        let top = analyzer.buffer_capacity();
        assert!(top < mid, "higher keys get shorter windows");
    }

    #[test]
    fn test_role_change_clears_buffered_data() {
        let analyzer = make_analyzer();
        analyzer.set_role(AnalyzerRole::RecordKeystroke);
        if let Ok(mut buffer) = analyzer.shared.buffer.lock() {
            buffer.push_slice(&[0.1, 0.2, 0.3]);
        }
        analyzer.set_role(AnalyzerRole::RollingFft);
        let len = analyzer.shared.buffer.lock().map(|b| b.len()).unwrap_or(99);
        assert_eq!(len, 0, "no stale-role data may cross a role boundary");
    }

    #[test]
    fn test_worker_lifecycle_guards() {
        let analyzer = make_analyzer();
        assert!(analyzer.start().is_ok());
        assert_eq!(analyzer.start(), Err(AudioError::AlreadyRunning));
        assert!(analyzer.stop().is_ok());
        assert_eq!(analyzer.stop(), Err(AudioError::NotRunning));
    }

    #[test]
    fn test_load_project_adopts_keyboard_size() {
        let analyzer = make_analyzer();
        analyzer.load_project(Piano::new(49, 442.0, 29));
        let count = analyzer
            .shared
            .piano
            .lock()
            .map(|p| p.key_count())
            .unwrap_or(0);
        assert_eq!(count, 49);
    }
}
