//! Application entry points.
//!
//! Wires configuration, the synthesis client and the sound card together:
//! request → stream → play → (optionally) save

use crate::audio::wav::decode_wav_mono;
use crate::cli::SayArgs;
use crate::client::TtsClient;
use crate::config::{Config, PlaybackStrategy, SynthesisConfig};
use crate::error::Result;
use crate::playback::cpal_output::{CpalOutputDevice, list_output_devices};
use crate::playback::device::OutputDevice;
use crate::playback::scheduler::PlaybackScheduler;
use crate::request::TtsRequest;
use crate::session::{GenerateOutcome, Streamer};
use crate::stream::chunk::AudioChunk;
use owo_colors::OwoColorize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

const PLAYBACK_POLL: Duration = Duration::from_millis(50);

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise the level follows `-q` / `-v` / `-vv`.
pub fn init_logging(quiet: bool, verbosity: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match (quiet, verbosity) {
            (true, _) => "error",
            (false, 0) => "warn",
            (false, 1) => "pcmcast=info,warn",
            (false, _) => "pcmcast=debug,info",
        })
    });
    // A second init (tests, embedding) keeps the first subscriber.
    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .is_err()
    {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Build the synthesis request from CLI flags on top of configured defaults.
pub fn build_request(args: &SayArgs, defaults: &SynthesisConfig) -> TtsRequest {
    TtsRequest {
        text: args.text.clone(),
        mode: args.mode.unwrap_or(defaults.mode),
        speaker: args.speaker.clone().or_else(|| defaults.speaker.clone()),
        voice_id: args.voice_id.clone().or_else(|| defaults.voice_id.clone()),
        prompt_text: args.prompt_text.clone(),
        prompt_wav_path: args.prompt_wav.clone(),
        instruct_text: args.instruct.clone(),
        source_wav_path: args.source_wav.clone(),
        stream: defaults.stream && !args.no_stream,
        speed: args.speed.unwrap_or(defaults.speed),
        seed: args.seed,
    }
}

/// Run `pcmcast say`: synthesize, play while streaming, save on request.
///
/// The first Ctrl-C stops the stream (audio already queued finishes playing,
/// and `--output` still receives what arrived). A second Ctrl-C exits
/// without waiting for playback.
pub async fn run_say(mut config: Config, args: SayArgs, quiet: bool) -> Result<()> {
    if let Some(device) = &args.device {
        config.audio.device = Some(device.clone());
    }
    if args.buffered {
        config.audio.strategy = PlaybackStrategy::Buffered;
    }

    let request = build_request(&args, &config.synthesis);
    request.validate()?;

    let device = Arc::new(CpalOutputDevice::new(
        config.audio.device.as_deref(),
        config.audio.sample_rate,
    )?);
    if device.device_rate() != config.audio.sample_rate {
        tracing::debug!(
            device_rate = device.device_rate(),
            sample_rate = config.audio.sample_rate,
            "output device runs at a different rate, resampling"
        );
    }
    let streamer = Arc::new(Streamer::new(
        TtsClient::from_config(&config.server),
        Arc::clone(&device),
        &config.audio,
    ));

    let interrupted = CancellationToken::new();
    let watcher = spawn_interrupt_watcher(Arc::clone(&streamer), interrupted.clone(), quiet);

    if !quiet {
        eprintln!("Synthesizing ({} mode)...", request.mode);
    }
    let outcome = match streamer.generate(&request).await {
        Ok(outcome) => outcome,
        Err(e) => {
            watcher.abort();
            return Err(e);
        }
    };

    let (wav, playback_end) = match outcome {
        GenerateOutcome::Completed(generated) if generated.streamed => {
            if !quiet {
                eprintln!("Received {:.2}s of audio", generated.duration_secs());
            }
            (generated.wav, generated.playback_end)
        }
        GenerateOutcome::Completed(generated) => {
            let end = play_encoded(&device, &generated.wav)?;
            (generated.wav, end)
        }
        GenerateOutcome::Cancelled(partial) => {
            if !quiet {
                eprintln!(
                    "Stopped after {:.2}s of audio",
                    partial.signal.duration_secs(partial.sample_rate)
                );
            }
            let end = partial.playback_end;
            (partial.export()?, end)
        }
    };

    if let Some(path) = &args.output {
        std::fs::write(path, &wav)?;
        if !quiet {
            eprintln!("Saved {}", path.display());
        }
    }

    if let Some(end) = playback_end {
        wait_for_playback(device.as_ref(), end, &interrupted).await;
    }
    watcher.abort();
    Ok(())
}

/// First Ctrl-C stops the stream, the second one abandons playback.
fn spawn_interrupt_watcher<D>(
    streamer: Arc<Streamer<D>>,
    interrupted: CancellationToken,
    quiet: bool,
) -> JoinHandle<()>
where
    D: OutputDevice + ?Sized + 'static,
{
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        streamer.stop();
        if !quiet {
            eprintln!("\nStopping... (Ctrl-C again to exit now)");
        }
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupted.cancel();
        }
    })
}

/// Play a complete WAV file from the non-streaming endpoint.
///
/// Returns the device time at which it ends.
fn play_encoded<D: OutputDevice + ?Sized>(device: &Arc<D>, wav: &[u8]) -> Result<Option<f64>> {
    let (samples, summary) = decode_wav_mono(wav)?;
    tracing::debug!(
        rate = summary.sample_rate,
        channels = summary.channels,
        frames = summary.frames,
        "playing encoded response"
    );
    let mut scheduler = PlaybackScheduler::new(Arc::clone(device), summary.sample_rate);
    scheduler.schedule(&AudioChunk::new(0, samples))?;
    Ok(scheduler.cursor())
}

/// Poll the device clock until `end`, or until interrupted.
pub async fn wait_for_playback<D: OutputDevice + ?Sized>(
    device: &D,
    end: f64,
    interrupted: &CancellationToken,
) {
    while device.now() < end {
        tokio::select! {
            _ = interrupted.cancelled() => return,
            _ = tokio::time::sleep(PLAYBACK_POLL) => {}
        }
    }
}

/// Run `pcmcast health`.
pub async fn run_health(config: &Config) -> Result<()> {
    let client = TtsClient::from_config(&config.server);
    let health = client.health().await?;

    let status = if health.is_ok() {
        health.status.green().to_string()
    } else {
        health.status.yellow().to_string()
    };
    println!("{}    {}", "Server:".dimmed(), client.base_url());
    println!("{}    {}", "Status:".dimmed(), status);
    if let Some(model) = &health.model {
        println!("{}     {}", "Model:".dimmed(), model);
    }
    if let Some(rate) = health.output_sample_rate.or(health.sample_rate) {
        let note = if rate != config.audio.sample_rate {
            format!(" (configured: {})", config.audio.sample_rate)
                .yellow()
                .to_string()
        } else {
            String::new()
        };
        println!("{}      {} Hz{}", "Rate:".dimmed(), rate, note);
    }
    if let Some(count) = health.voice_count {
        println!("{}    {}", "Voices:".dimmed(), count);
    }
    if let Some(gpu) = health.gpu {
        println!("{}       {}", "GPU:".dimmed(), if gpu { "yes" } else { "no" });
    }
    Ok(())
}

/// Run `pcmcast voices`.
pub async fn run_voices(config: &Config) -> Result<()> {
    let list = TtsClient::from_config(&config.server).voices().await?;
    if list.voices.is_empty() {
        println!("No cached voices");
        return Ok(());
    }

    println!("Voices ({}):", list.total);
    for voice in &list.voices {
        let id = voice.id.as_deref().unwrap_or("?");
        let marker = if list.default_voice_id.as_deref() == Some(id) {
            "●".green().to_string()
        } else {
            " ".to_string()
        };
        println!("  {} {}", marker, voice_label(id, voice.name.as_deref()));
    }
    Ok(())
}

/// `id - name`, or just the id when the name adds nothing.
fn voice_label(id: &str, name: Option<&str>) -> String {
    match name {
        Some(name) if name != id => format!("{} - {}", id, name),
        _ => id.to_string(),
    }
}

/// Run `pcmcast speakers`.
pub async fn run_speakers(config: &Config) -> Result<()> {
    let speakers = TtsClient::from_config(&config.server).speakers().await?;
    if speakers.is_empty() {
        println!("No built-in speakers");
        return Ok(());
    }
    println!("Speakers:");
    for speaker in speakers {
        println!("  {}", speaker);
    }
    Ok(())
}

/// Run `pcmcast devices`.
pub fn run_devices() -> Result<()> {
    let devices = list_output_devices()?;
    if devices.is_empty() {
        eprintln!("No audio output devices found");
        return Ok(());
    }
    println!("Available audio output devices:");
    for (idx, device) in devices.iter().enumerate() {
        println!("  [{}] {}", idx, device);
    }
    Ok(())
}
