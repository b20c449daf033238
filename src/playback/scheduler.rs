//! Gapless scheduling of decoded chunks against a device clock.
//!
//! The first chunk of a session starts at `device.now()`. Every later chunk
//! starts exactly where the previous one ends:
//!
//! ```text
//! cursor:  t0          t0+d1            t0+d1+d2
//!          ├── chunk 0 ──┼──── chunk 1 ────┼── chunk 2 ──┤
//! ```
//!
//! Start times are fixed when the chunk is scheduled, so an underrun just
//! leaves silence until the next start; it never shifts later chunks.

use crate::error::Result;
use crate::playback::device::OutputDevice;
use crate::stream::chunk::AudioChunk;
use std::sync::Arc;

pub struct PlaybackScheduler<D: OutputDevice + ?Sized> {
    device: Arc<D>,
    sample_rate: u32,
    cursor: Option<f64>,
    scheduled: u64,
    halted: bool,
}

impl<D: OutputDevice + ?Sized> PlaybackScheduler<D> {
    pub fn new(device: Arc<D>, sample_rate: u32) -> Self {
        Self {
            device,
            sample_rate,
            cursor: None,
            scheduled: 0,
            halted: false,
        }
    }

    /// Schedule the next chunk in arrival order.
    ///
    /// # Returns
    /// The start time given to the device, or `None` if the chunk was empty or
    /// the scheduler has been halted.
    pub fn schedule(&mut self, chunk: &AudioChunk) -> Result<Option<f64>> {
        if self.halted || chunk.is_empty() {
            return Ok(None);
        }

        let start = match self.cursor {
            Some(cursor) => cursor,
            None => {
                let now = self.device.now();
                tracing::debug!(start = now, "first chunk, starting playback");
                now
            }
        };

        let now = self.device.now();
        if start < now {
            tracing::debug!(
                sequence = chunk.sequence,
                late_by = now - start,
                "chunk arrived after its start time"
            );
        }

        self.device.schedule(chunk, self.sample_rate, start)?;
        self.cursor = Some(start + chunk.duration_secs(self.sample_rate));
        self.scheduled += 1;
        Ok(Some(start))
    }

    /// Stop accepting chunks. Chunks already handed to the device keep playing.
    pub fn halt(&mut self) {
        self.halted = true;
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Start time of the next chunk, or `None` before the first one.
    pub fn cursor(&self) -> Option<f64> {
        self.cursor
    }

    /// Number of chunks handed to the device.
    pub fn scheduled_count(&self) -> u64 {
        self.scheduled
    }
}
