//! Decoded audio chunk shared by the scheduler and the accumulator.

use std::sync::Arc;

/// A run of decoded f32 samples, in arrival order.
///
/// Cloning is cheap: the samples live behind an `Arc` so the playback device
/// and the signal buffer can both hold the same chunk without copying it.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    /// Arrival sequence number within the session, starting at 0.
    pub sequence: u64,
    samples: Arc<[f32]>,
}

impl AudioChunk {
    /// Creates a new chunk.
    pub fn new(sequence: u64, samples: Vec<f32>) -> Self {
        Self {
            sequence,
            samples: samples.into(),
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Shared handle to the samples.
    pub fn shared_samples(&self) -> Arc<[f32]> {
        Arc::clone(&self.samples)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Playback duration of this chunk in seconds.
    pub fn duration_secs(&self, sample_rate: u32) -> f64 {
        self.samples.len() as f64 / sample_rate as f64
    }
}
