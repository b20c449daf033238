//! Network-facing half of the pipeline.
//!
//! ```text
//! ┌─────────────┐    ┌─────────────┐    ┌────────────┐
//! │ ChunkSource │───▶│SampleAligner│───▶│ AudioChunk │───▶ scheduler + accumulator
//! │ (HTTP body) │    │ (0-3 B tail)│    │  (f32 LE)  │
//! └─────────────┘    └─────────────┘    └────────────┘
//! ```

pub mod aligner;
pub mod chunk;
pub mod reader;

pub use aligner::{SampleAligner, decode_f32_le};
pub use chunk::AudioChunk;
pub use reader::{ChunkSource, HttpChunkSource, MockChunkSource};
