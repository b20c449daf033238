//! Generation sessions: one request, one read loop, one exported signal.
//!
//! ```text
//! ┌─────────────┐    ┌─────────────┐    ┌───────────┐    ┌──────────────┐
//! │ ChunkSource │───▶│SampleAligner│───▶│ Scheduler │───▶│ OutputDevice │
//! └─────────────┘    └─────────────┘    └───────────┘    └──────────────┘
//!        ▲                  │
//!        │                  └──────────▶ SignalBuffer ───▶ encode_wav (on end)
//!   CancellationToken
//! ```
//!
//! A session runs on a single task; its only suspension point is waiting for
//! the next network chunk, so the aligner, cursor and signal buffer need no
//! locking.

use crate::audio::accumulator::SignalBuffer;
use crate::audio::wav::encode_wav;
use crate::client::TtsClient;
use crate::config::{AudioConfig, PlaybackStrategy};
use crate::error::{PcmcastError, Result};
use crate::playback::device::OutputDevice;
use crate::playback::scheduler::PlaybackScheduler;
use crate::request::TtsRequest;
use crate::stream::aligner::SampleAligner;
use crate::stream::chunk::AudioChunk;
use crate::stream::reader::ChunkSource;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// A finished utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct Generated {
    /// Encoded RIFF/WAVE file.
    pub wav: Vec<u8>,
    pub sample_rate: u32,
    /// Samples in the exported signal.
    pub sample_count: usize,
    /// Device time at which the last scheduled chunk ends, if anything played.
    pub playback_end: Option<f64>,
    /// Incomplete trailing bytes discarded at end of stream (0-3).
    pub dropped_bytes: usize,
    /// False when the service returned a pre-encoded file instead of a stream.
    pub streamed: bool,
}

impl Generated {
    pub fn duration_secs(&self) -> f64 {
        self.sample_count as f64 / self.sample_rate as f64
    }
}

/// Signal collected before `stop()` took effect.
#[derive(Debug, Clone, Default)]
pub struct PartialSignal {
    pub signal: SignalBuffer,
    pub sample_rate: u32,
    pub playback_end: Option<f64>,
}

impl PartialSignal {
    /// Encode whatever arrived before cancellation.
    pub fn export(self) -> Result<Vec<u8>> {
        encode_wav(&self.signal.into_samples(), self.sample_rate)
    }
}

/// Result of a generation that did not fail.
#[derive(Debug, Clone)]
pub enum GenerateOutcome {
    Completed(Generated),
    /// Stopped by the caller. Not an error.
    Cancelled(PartialSignal),
}

impl GenerateOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, GenerateOutcome::Cancelled(_))
    }

    /// Device time at which scheduled audio runs out.
    pub fn playback_end(&self) -> Option<f64> {
        match self {
            GenerateOutcome::Completed(generated) => generated.playback_end,
            GenerateOutcome::Cancelled(partial) => partial.playback_end,
        }
    }
}

/// State of one streaming generation.
pub struct StreamSession<S: ChunkSource, D: OutputDevice + ?Sized> {
    source: S,
    aligner: SampleAligner,
    scheduler: PlaybackScheduler<D>,
    signal: SignalBuffer,
    cancel: CancellationToken,
    sample_rate: u32,
}

impl<S: ChunkSource, D: OutputDevice + ?Sized> StreamSession<S, D> {
    pub fn new(source: S, device: Arc<D>, sample_rate: u32, cancel: CancellationToken) -> Self {
        Self {
            source,
            aligner: SampleAligner::new(),
            scheduler: PlaybackScheduler::new(device, sample_rate),
            signal: SignalBuffer::new(),
            cancel,
            sample_rate,
        }
    }

    /// Drive the session to completion, cancellation or failure.
    pub async fn run(self, strategy: PlaybackStrategy) -> Result<GenerateOutcome> {
        match strategy {
            PlaybackStrategy::Gapless => self.run_gapless().await,
            PlaybackStrategy::Buffered => self.run_buffered().await,
        }
    }

    /// Wait for the next chunk unless cancelled first.
    ///
    /// `Err(Cancelled)` when `stop()` won; an in-flight read is abandoned.
    async fn next_chunk(&mut self) -> Result<Option<bytes::Bytes>> {
        if self.cancel.is_cancelled() {
            return Err(PcmcastError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(PcmcastError::Cancelled),
            next = self.source.next_chunk() => next,
        }
    }

    fn play(&mut self, chunk: AudioChunk) -> Result<()> {
        self.scheduler.schedule(&chunk)?;
        self.signal.push(chunk);
        Ok(())
    }

    async fn run_gapless(mut self) -> Result<GenerateOutcome> {
        loop {
            let bytes = match self.next_chunk().await {
                Ok(Some(bytes)) => bytes,
                Ok(None) => break,
                Err(e) if e.is_cancellation() => return Ok(self.into_cancelled()),
                Err(e) => return Err(e),
            };
            if let Some(chunk) = self.aligner.push(&bytes) {
                self.play(chunk)?;
            }
        }
        self.into_completed()
    }

    async fn run_buffered(mut self) -> Result<GenerateOutcome> {
        let mut body = Vec::new();
        loop {
            match self.next_chunk().await {
                Ok(Some(bytes)) => body.extend_from_slice(&bytes),
                Ok(None) => break,
                Err(e) if e.is_cancellation() => return Ok(self.into_cancelled()),
                Err(e) => return Err(e),
            }
        }
        tracing::debug!(bytes = body.len(), "buffered response complete");
        if let Some(chunk) = self.aligner.push(&body) {
            self.play(chunk)?;
        }
        self.into_completed()
    }

    fn into_cancelled(mut self) -> GenerateOutcome {
        self.scheduler.halt();
        tracing::info!(
            samples = self.signal.sample_count(),
            "stream stopped by caller"
        );
        GenerateOutcome::Cancelled(PartialSignal {
            playback_end: self.scheduler.cursor(),
            signal: self.signal,
            sample_rate: self.sample_rate,
        })
    }

    fn into_completed(self) -> Result<GenerateOutcome> {
        let total_bytes = self.aligner.total_bytes();
        let dropped_bytes = self.aligner.finish();
        if dropped_bytes > 0 {
            tracing::debug!(dropped_bytes, "discarding incomplete trailing sample");
        }

        let playback_end = self.scheduler.cursor();
        let samples = self.signal.into_samples();
        let wav = encode_wav(&samples, self.sample_rate)?;
        tracing::info!(
            total_bytes,
            samples = samples.len(),
            chunks = self.scheduler.scheduled_count(),
            "stream complete"
        );

        Ok(GenerateOutcome::Completed(Generated {
            wav,
            sample_rate: self.sample_rate,
            sample_count: samples.len(),
            playback_end,
            dropped_bytes,
            streamed: true,
        }))
    }
}

/// Entry point for playback and generation against one service.
///
/// At most one session is active at a time; `generate` cancels any session
/// still running before starting its own.
pub struct Streamer<D: OutputDevice + ?Sized> {
    client: TtsClient,
    device: Arc<D>,
    sample_rate: u32,
    strategy: PlaybackStrategy,
    active: Mutex<Option<(u64, CancellationToken)>>,
    next_id: AtomicU64,
}

impl<D: OutputDevice + ?Sized> Streamer<D> {
    pub fn new(client: TtsClient, device: Arc<D>, audio: &AudioConfig) -> Self {
        Self {
            client,
            device,
            sample_rate: audio.sample_rate,
            strategy: audio.strategy,
            active: Mutex::new(None),
            next_id: AtomicU64::new(0),
        }
    }

    /// Whether a session is currently running.
    pub fn is_active(&self) -> bool {
        self.active.lock().map(|a| a.is_some()).unwrap_or(false)
    }

    /// Synthesize `request`, playing it as it streams in.
    ///
    /// With `request.stream == false` the service returns one encoded file
    /// and nothing is scheduled here.
    pub async fn generate(&self, request: &TtsRequest) -> Result<GenerateOutcome> {
        request.validate()?;
        let (id, cancel) = self.begin_session();
        let _session = SessionGuard { streamer: self, id };
        self.generate_with(request, cancel).await
    }

    async fn generate_with(
        &self,
        request: &TtsRequest,
        cancel: CancellationToken,
    ) -> Result<GenerateOutcome> {
        tracing::info!(mode = %request.mode, stream = request.stream, "generation started");

        if !request.stream {
            let audio = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(self.cancelled_before_audio()),
                audio = self.client.synthesize(request) => audio?,
            };
            let summary = crate::audio::wav::inspect_wav(&audio.wav)?;
            return Ok(GenerateOutcome::Completed(Generated {
                sample_rate: audio.sample_rate,
                sample_count: summary.frames as usize,
                wav: audio.wav,
                playback_end: None,
                dropped_bytes: 0,
                streamed: false,
            }));
        }

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(self.cancelled_before_audio()),
            response = self.client.open_stream(request) => response?,
        };

        if let Some(advertised) = response.advertised_rate
            && advertised != self.sample_rate
        {
            tracing::warn!(
                advertised,
                configured = self.sample_rate,
                "service advertises a different sample rate; using configured rate"
            );
        }

        StreamSession::new(
            response.source,
            Arc::clone(&self.device),
            self.sample_rate,
            cancel,
        )
        .run(self.strategy)
        .await
    }

    fn cancelled_before_audio(&self) -> GenerateOutcome {
        GenerateOutcome::Cancelled(PartialSignal {
            signal: SignalBuffer::new(),
            sample_rate: self.sample_rate,
            playback_end: None,
        })
    }

    /// Stop the active session, if any. Idempotent.
    ///
    /// Chunks already scheduled keep playing; nothing new is read or queued.
    pub fn stop(&self) {
        if let Ok(mut active) = self.active.lock()
            && let Some((id, cancel)) = active.take()
        {
            tracing::debug!(session = id, "stop requested");
            cancel.cancel();
        }
    }

    fn begin_session(&self) -> (u64, CancellationToken) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        if let Ok(mut active) = self.active.lock() {
            if let Some((previous, token)) = active.take() {
                tracing::debug!(session = previous, "cancelling previous session");
                token.cancel();
            }
            *active = Some((id, cancel.clone()));
        }
        (id, cancel)
    }

    fn end_session(&self, id: u64) {
        if let Ok(mut active) = self.active.lock()
            && active.as_ref().is_some_and(|(current, _)| *current == id)
        {
            *active = None;
        }
    }
}

/// Clears the active session when `generate` returns or its future is dropped.
struct SessionGuard<'a, D: OutputDevice + ?Sized> {
    streamer: &'a Streamer<D>,
    id: u64,
}

impl<D: OutputDevice + ?Sized> Drop for SessionGuard<'_, D> {
    fn drop(&mut self) {
        self.streamer.end_session(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::device::MockOutputDevice;
    use crate::stream::reader::MockChunkSource;
    use std::time::Duration;

    fn encode(samples: &[f32]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    fn completed(outcome: GenerateOutcome) -> Generated {
        match outcome {
            GenerateOutcome::Completed(generated) => generated,
            GenerateOutcome::Cancelled(_) => panic!("expected completed outcome"),
        }
    }

    #[tokio::test]
    async fn six_then_four_bytes_exports_two_samples() {
        let bytes = encode(&[0.5, -0.5, 0.25]);
        let source = MockChunkSource::from_chunks([bytes[0..6].to_vec(), bytes[6..10].to_vec()]);
        let device = Arc::new(MockOutputDevice::new());

        let session = StreamSession::new(source, Arc::clone(&device), 22050, CancellationToken::new());
        let generated = completed(session.run(PlaybackStrategy::Gapless).await.unwrap());

        assert_eq!(generated.sample_count, 2);
        assert_eq!(generated.dropped_bytes, 2);
        assert_eq!(generated.wav.len(), 44 + 4);
        assert_eq!(&generated.wav[40..44], &4u32.to_le_bytes());
        assert_eq!(device.scheduled().len(), 2);
        assert_eq!(generated.playback_end, Some(2.0 / 22050.0));
    }

    #[tokio::test]
    async fn gapless_schedules_each_chunk_back_to_back() {
        let source = MockChunkSource::from_chunks([
            encode(&[0.1; 100]),
            encode(&[0.2; 50]),
            encode(&[0.3; 25]),
        ]);
        let device = Arc::new(MockOutputDevice::starting_at(3.0));

        let session = StreamSession::new(source, Arc::clone(&device), 100, CancellationToken::new());
        let generated = completed(session.run(PlaybackStrategy::Gapless).await.unwrap());

        let starts: Vec<f64> = device.scheduled().iter().map(|s| s.start_secs).collect();
        assert_eq!(starts, vec![3.0, 4.0, 4.5]);
        assert_eq!(generated.playback_end, Some(4.75));
        assert_eq!(generated.sample_count, 175);
    }

    #[tokio::test]
    async fn buffered_schedules_a_single_chunk() {
        let bytes = encode(&[0.1, 0.2, 0.3, 0.4]);
        let source = MockChunkSource::from_chunks([bytes[0..3].to_vec(), bytes[3..].to_vec()]);
        let device = Arc::new(MockOutputDevice::new());

        let session = StreamSession::new(source, Arc::clone(&device), 4, CancellationToken::new());
        let generated = completed(session.run(PlaybackStrategy::Buffered).await.unwrap());

        let scheduled = device.scheduled();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].sample_count, 4);
        assert_eq!(generated.sample_count, 4);
        assert_eq!(generated.playback_end, Some(1.0));
    }

    #[tokio::test]
    async fn both_strategies_export_identical_files() {
        let bytes = encode(&(0..300).map(|i| (i as f32 / 50.0).sin()).collect::<Vec<_>>());
        let pieces: Vec<Vec<u8>> = bytes.chunks(7).map(|c| c.to_vec()).collect();

        let gapless = StreamSession::new(
            MockChunkSource::from_chunks(pieces.clone()),
            Arc::new(MockOutputDevice::new()),
            22050,
            CancellationToken::new(),
        )
        .run(PlaybackStrategy::Gapless)
        .await
        .unwrap();
        let buffered = StreamSession::new(
            MockChunkSource::from_chunks(pieces),
            Arc::new(MockOutputDevice::new()),
            22050,
            CancellationToken::new(),
        )
        .run(PlaybackStrategy::Buffered)
        .await
        .unwrap();

        assert_eq!(completed(gapless).wav, completed(buffered).wav);
    }

    #[tokio::test]
    async fn empty_stream_exports_header_only() {
        let device = Arc::new(MockOutputDevice::new());
        let session = StreamSession::new(
            MockChunkSource::new(),
            Arc::clone(&device),
            22050,
            CancellationToken::new(),
        );
        let generated = completed(session.run(PlaybackStrategy::Gapless).await.unwrap());

        assert_eq!(generated.wav.len(), 44);
        assert_eq!(generated.playback_end, None);
        assert!(device.scheduled().is_empty());
    }

    #[tokio::test]
    async fn transport_error_fails_session() {
        let source = MockChunkSource::new()
            .with_chunk(encode(&[0.5; 10]))
            .with_failure("connection reset by peer");
        let device = Arc::new(MockOutputDevice::new());

        let session = StreamSession::new(source, Arc::clone(&device), 100, CancellationToken::new());
        let err = session.run(PlaybackStrategy::Gapless).await.unwrap_err();

        assert_eq!(err.to_string(), "connection reset by peer");
        assert_eq!(device.scheduled().len(), 1, "scheduled audio is not retracted");
    }

    #[tokio::test]
    async fn device_error_fails_session() {
        let source = MockChunkSource::from_chunks([encode(&[0.5; 10])]);
        let device = Arc::new(MockOutputDevice::new().with_schedule_failure());

        let session = StreamSession::new(source, device, 100, CancellationToken::new());
        let err = session.run(PlaybackStrategy::Gapless).await.unwrap_err();
        assert!(matches!(err, PcmcastError::AudioPlayback { .. }));
    }

    #[tokio::test]
    async fn cancel_before_first_chunk_schedules_nothing() {
        let source = MockChunkSource::from_chunks([encode(&[0.5; 10])]);
        let device = Arc::new(MockOutputDevice::new());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = StreamSession::new(source, Arc::clone(&device), 100, cancel)
            .run(PlaybackStrategy::Gapless)
            .await
            .unwrap();

        match outcome {
            GenerateOutcome::Cancelled(partial) => {
                assert!(partial.signal.is_empty());
                assert_eq!(partial.playback_end, None);
            }
            GenerateOutcome::Completed(_) => panic!("expected cancellation"),
        }
        assert!(device.scheduled().is_empty());
    }

    #[tokio::test]
    async fn cancel_mid_stream_keeps_accumulated_samples() {
        let source = MockChunkSource::new()
            .with_chunk(encode(&[0.5; 10]))
            .with_chunk(encode(&[-0.5; 5]))
            .with_stall();
        let device = Arc::new(MockOutputDevice::new());
        let cancel = CancellationToken::new();

        let session = StreamSession::new(source, Arc::clone(&device), 10, cancel.clone());
        let handle = tokio::spawn(session.run(PlaybackStrategy::Gapless));

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        let outcome = handle.await.unwrap().unwrap();

        let GenerateOutcome::Cancelled(partial) = outcome else {
            panic!("expected cancellation");
        };
        assert_eq!(partial.signal.sample_count(), 15);
        assert_eq!(partial.playback_end, Some(1.5));
        assert_eq!(device.scheduled().len(), 2);

        let wav = partial.export().unwrap();
        assert_eq!(wav.len(), 44 + 30);
    }

    #[tokio::test]
    async fn cancel_during_buffered_read_plays_nothing() {
        let source = MockChunkSource::new()
            .with_chunk(encode(&[0.5; 10]))
            .with_stall();
        let device = Arc::new(MockOutputDevice::new());
        let cancel = CancellationToken::new();

        let session = StreamSession::new(source, Arc::clone(&device), 10, cancel.clone());
        let handle = tokio::spawn(session.run(PlaybackStrategy::Buffered));

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        let outcome = handle.await.unwrap().unwrap();

        assert!(outcome.is_cancelled());
        assert!(device.scheduled().is_empty(), "buffered mode plays nothing before the end");
    }

    #[test]
    fn stop_without_session_is_noop() {
        let streamer = Streamer::new(
            TtsClient::new("http://127.0.0.1:9", Duration::from_secs(1)),
            Arc::new(MockOutputDevice::new()),
            &AudioConfig::default(),
        );
        assert!(!streamer.is_active());
        streamer.stop();
        streamer.stop();
        assert!(!streamer.is_active());
    }

    #[test]
    fn begin_session_cancels_previous() {
        let streamer = Streamer::new(
            TtsClient::new("http://127.0.0.1:9", Duration::from_secs(1)),
            Arc::new(MockOutputDevice::new()),
            &AudioConfig::default(),
        );
        let (first_id, first) = streamer.begin_session();
        let (second_id, second) = streamer.begin_session();

        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());

        // a stale session ending must not clear the newer one
        streamer.end_session(first_id);
        assert!(streamer.is_active());
        streamer.end_session(second_id);
        assert!(!streamer.is_active());
    }

    #[test]
    fn session_guard_clears_only_its_own_session() {
        let streamer = Streamer::new(
            TtsClient::new("http://127.0.0.1:9", Duration::from_secs(1)),
            Arc::new(MockOutputDevice::new()),
            &AudioConfig::default(),
        );
        let (first_id, _) = streamer.begin_session();
        let stale = SessionGuard {
            streamer: &streamer,
            id: first_id,
        };
        let (second_id, _) = streamer.begin_session();
        drop(stale);
        assert!(streamer.is_active());

        drop(SessionGuard {
            streamer: &streamer,
            id: second_id,
        });
        assert!(!streamer.is_active());
    }

    #[tokio::test]
    async fn dropping_generate_future_releases_the_session() {
        // Accepts connections but never answers, so the request hangs.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let streamer = Streamer::new(
            TtsClient::new(&url, Duration::from_secs(30)),
            Arc::new(MockOutputDevice::new()),
            &AudioConfig::default(),
        );

        let request = TtsRequest::new("hello");
        let mut generate = Box::pin(streamer.generate(&request));
        tokio::select! {
            _ = generate.as_mut() => panic!("generate finished against a silent service"),
            _ = tokio::time::sleep(Duration::from_millis(100)) => {}
        }
        assert!(streamer.is_active());

        drop(generate);
        assert!(!streamer.is_active());
        streamer.stop();
    }

    #[tokio::test]
    async fn invalid_request_is_rejected_before_any_io() {
        let streamer = Streamer::new(
            TtsClient::new("http://127.0.0.1:9", Duration::from_secs(1)),
            Arc::new(MockOutputDevice::new()),
            &AudioConfig::default(),
        );
        let err = streamer.generate(&TtsRequest::new("")).await.unwrap_err();
        assert!(matches!(err, PcmcastError::InvalidRequest { .. }));
        assert!(!streamer.is_active());
    }
}
