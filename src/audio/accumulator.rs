//! Whole-session signal retention for export after the stream ends.

use crate::stream::chunk::AudioChunk;

/// Append-only list of decoded chunks in arrival order.
#[derive(Debug, Clone, Default)]
pub struct SignalBuffer {
    chunks: Vec<AudioChunk>,
    sample_count: usize,
}

impl SignalBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk. Empty chunks are ignored.
    pub fn push(&mut self, chunk: AudioChunk) {
        if chunk.is_empty() {
            return;
        }
        self.sample_count += chunk.len();
        self.chunks.push(chunk);
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    pub fn is_empty(&self) -> bool {
        self.sample_count == 0
    }

    pub fn duration_secs(&self, sample_rate: u32) -> f64 {
        self.sample_count as f64 / sample_rate as f64
    }

    /// Freeze the buffer and flatten it into one contiguous signal.
    pub fn into_samples(self) -> Vec<f32> {
        let mut samples = Vec::with_capacity(self.sample_count);
        for chunk in &self.chunks {
            samples.extend_from_slice(chunk.samples());
        }
        samples
    }
}
