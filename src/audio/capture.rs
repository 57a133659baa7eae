// Audio capture via cpal
//
// Sets up the input stream and forwards every hardware packet to the
// recorder. The device format is converted to the internal f64 representation
// right here at the boundary; multi-channel input is reduced to its first
// channel. The callback reuses one scratch buffer, so after warm-up it does
// not allocate.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SupportedStreamConfigRange;
use tracing::{error, info};

use crate::audio::recorder::AudioRecorder;
use crate::error::AudioError;

/// Sample rate requested from the device (the device may impose another)
pub const PREFERRED_SAMPLE_RATE: u32 = 44100;

/// Running input stream
///
/// Capturing stops when this is dropped. Not `Send`: keep it on the thread
/// that created it, as cpal requires.
pub struct AudioCapture {
    _stream: cpal::Stream,
    sample_rate: u32,
}

impl AudioCapture {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Open the default input device and start feeding the recorder
pub fn start_input_capture(recorder: Arc<AudioRecorder>) -> Result<AudioCapture, AudioError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or(AudioError::NoInputDevice)?;
    let device_name = device.name().unwrap_or_else(|_| "<unnamed>".to_string());
    info!(device = %device_name, "using audio input device");

    let configs = device
        .supported_input_configs()
        .map_err(|e| AudioError::UnsupportedFormat {
            details: e.to_string(),
        })?
        .collect::<Vec<_>>();
    let supported = find_supported_config(configs, PREFERRED_SAMPLE_RATE).ok_or_else(|| {
        AudioError::UnsupportedFormat {
            details: "no f32 input configuration offered".to_string(),
        }
    })?;

    let rate = PREFERRED_SAMPLE_RATE.clamp(
        supported.min_sample_rate().0,
        supported.max_sample_rate().0,
    );
    let config = supported.with_sample_rate(cpal::SampleRate(rate));
    let channels = config.channels() as usize;
    let sample_rate = config.sample_rate().0;
    let config: cpal::StreamConfig = config.into();
    info!(sample_rate, channels, "input stream configured");

    recorder.set_sample_rate(sample_rate);

    let mut scratch: Vec<f64> = Vec::new();
    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                scratch.clear();
                scratch.extend(data.iter().step_by(channels).map(|&s| s as f64));
                recorder.push_packet(&scratch);
            },
            |err| error!("audio stream error: {}", err),
            None,
        )
        .map_err(|e| AudioError::StreamOpenFailed {
            reason: e.to_string(),
        })?;

    stream.play().map_err(|e| AudioError::HardwareError {
        details: e.to_string(),
    })?;

    Ok(AudioCapture {
        _stream: stream,
        sample_rate,
    })
}

/// Pick the f32 configuration closest to the target rate, preferring mono
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    let distance = |c: &SupportedStreamConfigRange| {
        let min_diff = (c.min_sample_rate().0 as i64 - target_rate as i64).abs();
        let max_diff = (c.max_sample_rate().0 as i64 - target_rate as i64).abs();
        min_diff.min(max_diff)
    };
    let f32_configs: Vec<_> = configs
        .into_iter()
        .filter(|c| c.sample_format() == cpal::SampleFormat::F32)
        .collect();
    f32_configs
        .iter()
        .filter(|c| c.channels() == 1)
        .min_by_key(|c| distance(c))
        .cloned()
        .or_else(|| f32_configs.into_iter().min_by_key(|c| distance(c)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpal::{SampleFormat, SampleRate, SupportedBufferSize, SupportedStreamConfigRange};

    fn range(channels: u16, min: u32, max: u32, format: SampleFormat) -> SupportedStreamConfigRange {
        SupportedStreamConfigRange::new(
            channels,
            SampleRate(min),
            SampleRate(max),
            SupportedBufferSize::Unknown,
            format,
        )
    }

    #[test]
    fn test_mono_f32_is_preferred() {
        let configs = vec![
            range(2, 44100, 48000, SampleFormat::F32),
            range(1, 44100, 48000, SampleFormat::F32),
        ];
        let chosen = find_supported_config(configs, 44100).unwrap();
        assert_eq!(chosen.channels(), 1);
    }

    #[test]
    fn test_stereo_f32_is_a_fallback() {
        let configs = vec![
            range(2, 48000, 48000, SampleFormat::F32),
            range(2, 44100, 44100, SampleFormat::I16),
        ];
        let chosen = find_supported_config(configs, 44100).unwrap();
        assert_eq!(chosen.channels(), 2);
        assert_eq!(chosen.sample_format(), SampleFormat::F32);
    }

    #[test]
    fn test_no_f32_config_yields_none() {
        let configs = vec![range(1, 44100, 48000, SampleFormat::I16)];
        assert!(find_supported_config(configs, 44100).is_none());
    }

    #[test]
    fn test_closest_rate_wins() {
        let configs = vec![
            range(1, 8000, 8000, SampleFormat::F32),
            range(1, 44100, 44100, SampleFormat::F32),
        ];
        let chosen = find_supported_config(configs, 44100).unwrap();
        assert_eq!(chosen.min_sample_rate().0, 44100);
    }
}
