// keytune CLI - drive the identification pipeline from a WAV file or the
// default input device and print what comes out of the event bus.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_stream::StreamExt;

use keytune::analysis::polygon::SpectrumPolygon;
use keytune::{AppConfig, AppContext, OperationMode};

#[derive(Parser)]
#[command(name = "keytune-cli")]
#[command(about = "Identify struck piano keys from audio", long_about = None)]
struct Cli {
    /// Path to a JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Identify the key struck in a WAV recording
    Wav {
        /// Path to the WAV file
        path: PathBuf,
        /// Expected key index (0-87); omit to accept whatever is detected
        #[arg(long)]
        key: Option<usize>,
        /// Force acceptance of the expected key
        #[arg(long)]
        forced: bool,
    },
    /// Listen on the default input device and print identifications
    Listen {
        /// Track a known key with a rolling FFT instead of recording keystrokes
        #[arg(long)]
        tuning: bool,
        /// Expected key index (0-87)
        #[arg(long)]
        key: Option<usize>,
        /// Force acceptance of the expected key
        #[arg(long)]
        forced: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::load_from_file(path),
        None => AppConfig::default(),
    };

    match cli.command {
        Command::Wav { path, key, forced } => run_wav(config, path, key, forced).await,
        Command::Listen { tuning, key, forced } => run_listen(config, tuning, key, forced).await,
    }
}

/// Feed a WAV file through the pipeline in paced chunks and wait for the
/// majority-voted identification.
async fn run_wav(config: AppConfig, path: PathBuf, key: Option<usize>, forced: bool) -> Result<()> {
    let (samples, sample_rate) = read_wav(&path)?;
    if samples.is_empty() {
        bail!("{} contains no samples", path.display());
    }
    println!(
        "Read {} samples at {} Hz from {}",
        samples.len(),
        sample_rate,
        path.display()
    );

    let ctx = AppContext::new(config);
    let recorder = ctx.recorder();
    recorder.set_sample_rate(sample_rate);
    ctx.start().context("failed to start the pipeline")?;
    ctx.set_operation_mode(OperationMode::Recording);
    ctx.select_key(key, forced);

    spawn_event_printers(&ctx);
    let mut final_keys = ctx.final_key_stream();

    // Feed in packet-sized chunks with short pauses so the analysis worker
    // interleaves with ingestion the way it does with a live device.
    let chunk = (sample_rate as usize / 20).max(1);
    for packet in samples.chunks(chunk) {
        recorder.push_packet(packet);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    // A second of silence ends the recording.
    let silence = vec![0.0f64; chunk];
    for _ in 0..20 {
        recorder.push_packet(&silence);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    match tokio::time::timeout(Duration::from_secs(10), final_keys.next()).await {
        Ok(Some(final_key)) => {
            println!(
                "Identified key {} at {:.2} Hz",
                final_key.key, final_key.frequency
            );
        }
        _ => println!("No key identified"),
    }

    ctx.stop().ok();
    Ok(())
}

/// Live capture until Ctrl-C.
async fn run_listen(config: AppConfig, tuning: bool, key: Option<usize>, forced: bool) -> Result<()> {
    let ctx = AppContext::new(config);
    ctx.start().context("failed to start the pipeline")?;

    // The cpal stream must stay on this thread; keep the handle alive.
    let capture = keytune::audio::capture::start_input_capture(ctx.recorder())
        .context("failed to open the input device")?;
    println!("Listening at {} Hz, Ctrl-C to quit", capture.sample_rate());

    ctx.set_operation_mode(if tuning {
        OperationMode::Tuning
    } else {
        OperationMode::Recording
    });
    ctx.select_key(key, forced);

    spawn_event_printers(&ctx);
    let mut final_keys = ctx.final_key_stream();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Some(final_key) = final_keys.next() => {
                println!(
                    "Identified key {} at {:.2} Hz",
                    final_key.key, final_key.frequency
                );
            }
        }
    }

    ctx.stop().ok();
    Ok(())
}

/// Print recording, guess, spectrum, and fault events as they arrive
fn spawn_event_printers(ctx: &AppContext) {
    let mut recording = ctx.recording_stream();
    tokio::spawn(async move {
        while let Some(event) = recording.next().await {
            println!("Recording: {:?}", event);
        }
    });

    let mut guesses = ctx.guess_stream();
    tokio::spawn(async move {
        while let Some(guess) = guesses.next().await {
            match guess.key {
                Some(key) => println!("Guess: key {} ({:.2} Hz)", key, guess.frequency),
                None => println!("Guess: undecided ({:.2} Hz)", guess.frequency),
            }
        }
    });

    let mut spectra = ctx.spectrum_stream();
    tokio::spawn(async move {
        while let Some(update) = spectra.next().await {
            println!(
                "Spectrum ({:?}): {} bins, polygon peak {:.2} Hz",
                update.kind,
                update.spectrum.data.len(),
                polygon_peak(&update.polygon)
            );
        }
    });

    let mut faults = ctx.fault_stream();
    tokio::spawn(async move {
        while let Some(fault) = faults.next().await {
            eprintln!("Fault: {}", fault);
        }
    });
}

fn polygon_peak(polygon: &SpectrumPolygon) -> f64 {
    polygon.peak_frequency().unwrap_or(0.0)
}

/// Load a WAV file as mono f64 samples in [-1, 1]
fn read_wav(path: &PathBuf) -> Result<(Vec<f64>, u32)> {
    let mut reader =
        hound::WavReader::open(path).with_context(|| format!("cannot open {}", path.display()))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let samples: Vec<f64> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .step_by(channels)
            .map(|s| s.map(|v| v as f64))
            .collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f64;
            reader
                .samples::<i32>()
                .step_by(channels)
                .map(|s| s.map(|v| v as f64 / scale))
                .collect::<Result<_, _>>()?
        }
    };

    Ok((samples, spec.sample_rate))
}
