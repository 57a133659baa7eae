// AudioRecorder - the audio-ingestion context
//
// The audio backend calls push_packet synchronously whenever new samples are
// available, so everything on this path is short and allocation-free: samples
// go into the capture ring buffer, per-packet statistics accumulate, and once
// a packet completes the level meter, the gain controller, and the onset
// state machine each get one update.
//
// Thread safety:
// - muted / recording / standby: atomics, readable from any thread
// - ingest statistics and the capture buffer: mutexes scoped to the
//   individual operation, never held across analysis work

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::audio::gain::{AutoGainController, InputVolumeControl};
use crate::audio::level::{clamp_level, intensity_to_level, SlidingLevel};
use crate::audio::ring_buffer::RingBuffer;
use crate::config::RecorderConfig;
use crate::events::{EventBus, LevelKind, LevelUpdate, RecordingEvent};

/// Internal sample representation; backends convert at the hardware boundary
pub type Sample = f64;

/// Standby bit: the analyzer is still post-processing the previous keystroke.
/// Blocks re-triggering so confirmation feedback is not captured as an echo.
pub const STANDBY_WAITING_FOR_ANALYSIS: u8 = 1 << 0;

/// Standby bit: the current operation mode does not record at all
pub const STANDBY_DEACTIVATED_BY_MODE: u8 = 1 << 1;

/// Onset hysteresis states
///
/// `RetriggerLocked` means a recording just ended (or is still running); the
/// sliding level must fall below the retrigger threshold before a new
/// keystroke may start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnsetState {
    Idle,
    Recording,
    RetriggerLocked,
}

/// Per-packet statistics owned by the ingestion context
struct IngestState {
    /// Running sum of sample values within the current packet
    sum: f64,
    /// Running sum of squared sample values within the current packet
    sum_sq: f64,
    /// Samples accumulated in the current packet
    count: usize,
    /// Samples per packet at the current sampling rate
    packet_len: usize,
    sliding: SlidingLevel,
    agc: AutoGainController,
    onset: OnsetState,
}

pub struct AudioRecorder {
    cfg: RecorderConfig,
    events: Arc<EventBus>,
    volume: Box<dyn InputVolumeControl>,
    sample_rate: AtomicU32,
    muted: AtomicBool,
    recording: AtomicBool,
    standby: AtomicU8,
    state: Mutex<IngestState>,
    buffer: Mutex<RingBuffer<Sample>>,
}

impl AudioRecorder {
    pub fn new(
        cfg: RecorderConfig,
        sample_rate: u32,
        events: Arc<EventBus>,
        volume: Box<dyn InputVolumeControl>,
    ) -> Self {
        let state = IngestState {
            sum: 0.0,
            sum_sq: 0.0,
            count: 0,
            packet_len: Self::packet_len_for(&cfg, sample_rate),
            sliding: SlidingLevel::new(cfg.attack_rate, cfg.decay_rate),
            agc: AutoGainController::new(cfg.clone()),
            onset: OnsetState::Idle,
        };
        let buffer = RingBuffer::new(Self::buffer_capacity_for(&cfg, sample_rate));
        Self {
            cfg,
            events,
            volume,
            sample_rate: AtomicU32::new(sample_rate),
            muted: AtomicBool::new(false),
            recording: AtomicBool::new(false),
            standby: AtomicU8::new(0),
            state: Mutex::new(state),
            buffer: Mutex::new(buffer),
        }
    }

    fn packet_len_for(cfg: &RecorderConfig, sample_rate: u32) -> usize {
        ((sample_rate as u64 * cfg.packet_ms as u64) / 1000).max(1) as usize
    }

    fn buffer_capacity_for(cfg: &RecorderConfig, sample_rate: u32) -> usize {
        (sample_rate as f64 * cfg.buffer_seconds) as usize
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::Relaxed)
    }

    /// Adopt a new sampling rate chosen by the audio backend
    ///
    /// Recomputes the packet size and the buffer capacity so the maximal
    /// buffered duration stays constant; the buffer reset is destructive.
    pub fn set_sample_rate(&self, sample_rate: u32) {
        self.sample_rate.store(sample_rate, Ordering::Relaxed);
        if let Ok(mut state) = self.state.lock() {
            state.packet_len = Self::packet_len_for(&self.cfg, sample_rate);
            state.sum = 0.0;
            state.sum_sq = 0.0;
            state.count = 0;
        }
        if let Ok(mut buffer) = self.buffer.lock() {
            buffer.resize(Self::buffer_capacity_for(&self.cfg, sample_rate));
        }
    }

    /// Mute the input: levels report zero and gain adaptation pauses
    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Relaxed)
    }

    pub fn standby_flags(&self) -> u8 {
        self.standby.load(Ordering::Relaxed)
    }

    /// Current (AGC-adapted) level below which recording stops
    pub fn stop_level(&self) -> f64 {
        self.state
            .lock()
            .map(|s| s.agc.stop_level())
            .unwrap_or(self.cfg.initial_stop_level)
    }

    /// The analyzer finished post-processing the previous keystroke
    pub fn analysis_finished(&self) {
        self.standby
            .fetch_and(!STANDBY_WAITING_FOR_ANALYSIS, Ordering::Relaxed);
        debug!("analysis finished, recorder released from standby");
    }

    /// Block or allow recording depending on the operation mode
    pub fn set_mode_standby(&self, deactivated: bool) {
        if deactivated {
            self.standby
                .fetch_or(STANDBY_DEACTIVATED_BY_MODE, Ordering::Relaxed);
        } else {
            self.standby
                .fetch_and(!STANDBY_DEACTIVATED_BY_MODE, Ordering::Relaxed);
        }
    }

    /// Forget the learned noise level (user-initiated recalibration)
    pub fn reset_noise_level(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.agc.reset(self.volume.as_ref());
        }
    }

    /// Drain all captured samples in chronological order
    ///
    /// Called by the analysis worker; the guard is released before any
    /// processing happens.
    pub fn read_all(&self) -> Vec<Sample> {
        match self.buffer.lock() {
            Ok(mut buffer) => buffer.drain_ordered(),
            Err(_) => Vec::new(),
        }
    }

    /// Ingest a packet of raw samples in [-1, 1]
    ///
    /// Called synchronously by the audio backend. Never blocks beyond the
    /// short per-operation guards and never allocates proportionally to the
    /// session length.
    pub fn push_packet(&self, samples: &[Sample]) {
        {
            let Ok(mut buffer) = self.buffer.lock() else {
                return;
            };
            buffer.push_slice(samples);
        }

        let Ok(mut state) = self.state.lock() else {
            return;
        };
        for &sample in samples {
            state.sum += sample;
            state.sum_sq += sample * sample;
            state.count += 1;
            if state.count >= state.packet_len {
                self.finish_packet(&mut state);
            }
        }
    }

    /// One packet is complete: update level, gain, and the onset state machine
    fn finish_packet(&self, state: &mut IngestState) {
        let n = state.count as f64;
        let intensity = (state.sum_sq - state.sum * state.sum / n) / n;
        state.sum = 0.0;
        state.sum_sq = 0.0;
        state.count = 0;

        let level = clamp_level(intensity_to_level(intensity, state.agc.gain()));
        let sliding = state.sliding.update(level);

        if self.muted.load(Ordering::Relaxed) {
            self.events.publish_level(LevelUpdate {
                kind: LevelKind::Input,
                value: 0.0,
            });
            self.control_recording_state(0.0, sliding, state);
            return;
        }

        self.events.publish_level(LevelUpdate {
            kind: LevelKind::Input,
            value: sliding,
        });

        self.control_recording_state(level, sliding, state);

        if let Some(stop_level) = state.agc.observe(intensity, level, self.volume.as_ref()) {
            self.events.publish_level(LevelUpdate {
                kind: LevelKind::Off,
                value: stop_level,
            });
        }
    }

    /// Onset/offset hysteresis
    ///
    /// Order matters and is deliberate: the stop check runs first, the standby
    /// mask gates all starts, the retrigger unlock uses the sliding level, and
    /// only an idle, unlocked recorder may trigger.
    fn control_recording_state(&self, level: f64, sliding: f64, state: &mut IngestState) {
        if state.onset == OnsetState::Recording && level < state.agc.stop_level() {
            state.onset = OnsetState::RetriggerLocked;
            self.recording.store(false, Ordering::Relaxed);
            info!("recording stopped");
            self.events.publish_recording(RecordingEvent::Ended);
        }

        if self.standby.load(Ordering::Relaxed) != 0 {
            // The analyzer is still working or the mode forbids recording.
            return;
        }

        if state.onset == OnsetState::RetriggerLocked && sliding < self.cfg.retrigger_level {
            state.onset = OnsetState::Idle;
        }

        if state.onset == OnsetState::Idle && level > self.cfg.trigger_level {
            state.onset = OnsetState::Recording;
            self.recording.store(true, Ordering::Relaxed);
            self.standby
                .fetch_or(STANDBY_WAITING_FOR_ANALYSIS, Ordering::Relaxed);
            info!("recording started");
            self.events.publish_recording(RecordingEvent::Started);
        }
    }
}
