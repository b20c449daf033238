//! Reassembly of 4-byte f32 samples from arbitrarily split network chunks.
//!
//! Network chunk boundaries have nothing to do with sample boundaries. The
//! aligner carries the 0-3 bytes of an incomplete trailing sample over to the
//! next chunk, so the decoded sample sequence is identical no matter how the
//! byte stream was cut.

use crate::defaults::BYTES_PER_SAMPLE;
use crate::stream::chunk::AudioChunk;

/// Decode a 4-byte aligned run of little-endian f32 samples.
///
/// Any trailing bytes that do not form a whole sample are ignored.
pub fn decode_f32_le(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(BYTES_PER_SAMPLE)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Stateful byte-to-sample reassembler for one stream session.
#[derive(Debug, Default)]
pub struct SampleAligner {
    pending: Vec<u8>,
    next_sequence: u64,
    total_bytes: u64,
}

impl SampleAligner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one network chunk.
    ///
    /// Returns the decoded chunk, or `None` when the combined bytes do not
    /// yet hold a whole sample. Empty chunks never get a sequence number.
    pub fn push(&mut self, bytes: &[u8]) -> Option<AudioChunk> {
        self.total_bytes += bytes.len() as u64;

        let mut combined = std::mem::take(&mut self.pending);
        combined.extend_from_slice(bytes);

        let aligned_len = combined.len() / BYTES_PER_SAMPLE * BYTES_PER_SAMPLE;
        self.pending = combined.split_off(aligned_len);
        debug_assert!(self.pending.len() < BYTES_PER_SAMPLE);

        if aligned_len == 0 {
            return None;
        }

        let chunk = AudioChunk::new(self.next_sequence, decode_f32_le(&combined));
        self.next_sequence += 1;
        Some(chunk)
    }

    /// Bytes currently held back waiting for the rest of their sample.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Total bytes fed so far.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// End of stream: discard the incomplete tail and report its length.
    pub fn finish(self) -> usize {
        self.pending.len()
    }
}
