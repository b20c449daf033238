use crate::error::{PcmcastError, Result};
use crate::stream::chunk::AudioChunk;
use std::sync::Mutex;

/// Trait for audio output devices that play samples at absolute times.
///
/// The device owns a monotonically advancing clock. Callers only read that
/// clock and ask for chunks to start at a given time on it; mixing and the
/// real-time thread stay inside the device.
pub trait OutputDevice: Send + Sync {
    /// Current position of the device clock, in seconds.
    fn now(&self) -> f64;

    /// Queue `chunk` to start playing at `start_secs` on the device clock.
    ///
    /// Must not block. A start time already in the past is still played,
    /// never dropped or reordered: it starts at the current clock position.
    /// Callers keep their own cursor, so after an underrun several late
    /// chunks can be moved to the same instant and play mixed together
    /// rather than one after another.
    fn schedule(&self, chunk: &AudioChunk, sample_rate: u32, start_secs: f64) -> Result<()>;
}

/// One schedule request as seen by [`MockOutputDevice`].
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledChunk {
    pub sequence: u64,
    pub start_secs: f64,
    pub sample_count: usize,
    pub sample_rate: u32,
}

impl ScheduledChunk {
    pub fn end_secs(&self) -> f64 {
        self.start_secs + self.sample_count as f64 / self.sample_rate as f64
    }
}

/// Output device with a manually driven clock, for testing.
#[derive(Debug, Default)]
pub struct MockOutputDevice {
    clock: Mutex<f64>,
    scheduled: Mutex<Vec<ScheduledChunk>>,
    should_fail: bool,
}

impl MockOutputDevice {
    /// Create a mock device whose clock reads 0.0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock device whose clock starts at `now`.
    pub fn starting_at(now: f64) -> Self {
        Self {
            clock: Mutex::new(now),
            ..Self::default()
        }
    }

    /// Configure the mock to reject every schedule request.
    pub fn with_schedule_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Move the clock forward.
    pub fn advance(&self, secs: f64) {
        if let Ok(mut clock) = self.clock.lock() {
            *clock += secs;
        }
    }

    /// Every schedule request received so far, in call order.
    pub fn scheduled(&self) -> Vec<ScheduledChunk> {
        self.scheduled
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}

impl OutputDevice for MockOutputDevice {
    fn now(&self) -> f64 {
        self.clock.lock().map(|c| *c).unwrap_or(0.0)
    }

    fn schedule(&self, chunk: &AudioChunk, sample_rate: u32, start_secs: f64) -> Result<()> {
        if self.should_fail {
            return Err(PcmcastError::AudioPlayback {
                message: "mock device rejected chunk".to_string(),
            });
        }
        let mut scheduled = self.scheduled.lock().map_err(|e| PcmcastError::AudioPlayback {
            message: format!("Failed to lock schedule: {e}"),
        })?;
        scheduled.push(ScheduledChunk {
            sequence: chunk.sequence,
            start_secs,
            sample_count: chunk.len(),
            sample_rate,
        });
        Ok(())
    }
}
