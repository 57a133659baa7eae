//! Integration tests for the full capture -> analysis -> identification
//! pipeline, driven with synthetic signals instead of a live device.
//!
//! These tests exercise:
//! - onset detection from pushed packets
//! - the analysis worker (drain, preprocess, FFT, voting)
//! - majority identification and the acceptance policy
//! - the broadcast event fan-out

use std::f64::consts::TAU;
use std::time::Duration;

use tokio_stream::StreamExt;

use keytune::config::AppConfig;
use keytune::context::{AppContext, OperationMode};
use keytune::error::AnalysisFault;
use keytune::events::RecordingEvent;
use keytune::keys::STANDARD_A4_INDEX;

const RATE: u32 = 8000;
const PACKET: usize = (RATE / 20) as usize; // 50 ms

fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    // No audible confirmation feedback to wait for in tests.
    config.analyzer.post_analysis_grace_ms = 0;
    config.analyzer.poll_interval_ms = 5;
    config
}

/// Phase-continuous sine packet with a per-packet amplitude
fn sine_packet(frequency: f64, amplitude: f64, start: usize) -> Vec<f64> {
    (0..PACKET)
        .map(|i| amplitude * (TAU * frequency * (start + i) as f64 / RATE as f64).sin())
        .collect()
}

/// Feed a decaying keystroke-like tone followed by silence
async fn feed_keystroke(ctx: &AppContext, frequency: f64) {
    let recorder = ctx.recorder();
    let mut position = 0;
    for packet_index in 0..30 {
        let amplitude = 0.7 * 0.97f64.powi(packet_index);
        recorder.push_packet(&sine_packet(frequency, amplitude, position));
        position += PACKET;
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let silence = vec![0.0f64; PACKET];
    for _ in 0..10 {
        recorder.push_packet(&silence);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn start_context() -> AppContext {
    let ctx = AppContext::new(test_config());
    ctx.recorder().set_sample_rate(RATE);
    ctx.start().expect("pipeline should start");
    ctx
}

#[tokio::test]
async fn test_keystroke_is_identified_as_a4() {
    let ctx = start_context();
    ctx.set_operation_mode(OperationMode::Recording);
    ctx.select_key(Some(STANDARD_A4_INDEX), false);

    let mut finals = ctx.final_key_stream();
    let mut guesses = ctx.guess_stream();

    feed_keystroke(&ctx, 440.0).await;

    let final_key = tokio::time::timeout(Duration::from_secs(10), finals.next())
        .await
        .expect("identification should arrive in time")
        .expect("stream should not end");
    assert_eq!(final_key.key, STANDARD_A4_INDEX);
    assert!(
        (final_key.frequency / 440.0 - 1.0).abs() < 0.05,
        "frequency estimate {} too far from 440 Hz",
        final_key.frequency
    );

    // At least one preliminary guess must have been broadcast along the way.
    let guess = tokio::time::timeout(Duration::from_secs(1), guesses.next())
        .await
        .expect("a preliminary guess should have been broadcast")
        .expect("stream should not end");
    assert!(guess.frequency > 0.0);

    ctx.stop().expect("pipeline should stop");
}

#[tokio::test]
async fn test_recording_events_bracket_the_keystroke() {
    let ctx = start_context();
    ctx.set_operation_mode(OperationMode::Recording);
    ctx.select_key(Some(STANDARD_A4_INDEX), true);

    let mut recording = ctx.recording_stream();

    feed_keystroke(&ctx, 440.0).await;

    let started = tokio::time::timeout(Duration::from_secs(5), recording.next())
        .await
        .expect("start event expected")
        .unwrap();
    assert_eq!(started, RecordingEvent::Started);

    let ended = tokio::time::timeout(Duration::from_secs(5), recording.next())
        .await
        .expect("end event expected")
        .unwrap();
    assert_eq!(ended, RecordingEvent::Ended);

    ctx.stop().unwrap();
}

#[tokio::test]
async fn test_mismatching_key_is_discarded() {
    let ctx = start_context();
    ctx.set_operation_mode(OperationMode::Recording);
    // Expect a different key than the one actually played.
    ctx.select_key(Some(STANDARD_A4_INDEX + 7), false);

    let mut finals = ctx.final_key_stream();
    let mut faults = ctx.fault_stream();

    feed_keystroke(&ctx, 440.0).await;

    // The mismatch is reported as a fault...
    let fault = loop {
        let fault = tokio::time::timeout(Duration::from_secs(10), faults.next())
            .await
            .expect("a mismatch fault should arrive")
            .expect("stream should not end");
        if let AnalysisFault::KeyMismatch { .. } = fault {
            break fault;
        }
        // Quality warnings may precede the mismatch.
    };
    match fault {
        AnalysisFault::KeyMismatch { detected, expected } => {
            assert_eq!(detected, STANDARD_A4_INDEX);
            assert_eq!(expected, STANDARD_A4_INDEX + 7);
        }
        other => panic!("expected a key mismatch, got {:?}", other),
    }

    // ...and no final key is broadcast.
    let outcome = tokio::time::timeout(Duration::from_millis(500), finals.next()).await;
    assert!(outcome.is_err(), "mismatching keys must be discarded");

    ctx.stop().unwrap();
}

#[tokio::test]
async fn test_forced_key_overrides_the_vote() {
    let ctx = start_context();
    ctx.set_operation_mode(OperationMode::Recording);
    let forced_key = STANDARD_A4_INDEX + 7;
    ctx.select_key(Some(forced_key), true);

    let mut finals = ctx.final_key_stream();

    feed_keystroke(&ctx, 440.0).await;

    let final_key = tokio::time::timeout(Duration::from_secs(10), finals.next())
        .await
        .expect("forced identification should arrive")
        .unwrap();
    assert_eq!(
        final_key.key, forced_key,
        "forcing accepts the selected key regardless of the vote"
    );

    ctx.stop().unwrap();
}

#[tokio::test]
async fn test_mode_change_cancels_cleanly_mid_recording() {
    let ctx = start_context();
    ctx.set_operation_mode(OperationMode::Recording);
    ctx.select_key(Some(STANDARD_A4_INDEX), false);

    // Start a keystroke but switch to idle while it is still sounding.
    let recorder = ctx.recorder();
    let mut position = 0;
    for _ in 0..5 {
        recorder.push_packet(&sine_packet(440.0, 0.7, position));
        position += PACKET;
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    ctx.set_operation_mode(OperationMode::Idle);

    // The recorder must have been released: switching back to recording and
    // playing a full keystroke identifies normally.
    ctx.set_operation_mode(OperationMode::Recording);
    let silence = vec![0.0f64; PACKET];
    for _ in 0..10 {
        recorder.push_packet(&silence);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let mut finals = ctx.final_key_stream();
    feed_keystroke(&ctx, 440.0).await;

    let final_key = tokio::time::timeout(Duration::from_secs(10), finals.next())
        .await
        .expect("pipeline should recover after a role change")
        .unwrap();
    assert_eq!(final_key.key, STANDARD_A4_INDEX);

    ctx.stop().unwrap();
}
