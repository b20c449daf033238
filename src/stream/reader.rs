//! Chunk sources: the network side of the streaming pipeline.

use crate::error::{PcmcastError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use std::collections::VecDeque;

/// A lazy, finite, non-restartable sequence of binary chunks.
///
/// This trait allows swapping the HTTP body for a scripted source in tests.
#[async_trait]
pub trait ChunkSource: Send {
    /// Wait for the next chunk.
    ///
    /// # Returns
    /// `Ok(Some(bytes))` for a chunk, `Ok(None)` once the stream has ended
    /// (and on every call after that), or a `Transport` error.
    async fn next_chunk(&mut self) -> Result<Option<Bytes>>;
}

/// Chunk source over an HTTP response body.
///
/// The response status must already have been checked; see
/// [`TtsClient::open_stream`](crate::client::TtsClient::open_stream).
pub struct HttpChunkSource {
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    finished: bool,
}

impl HttpChunkSource {
    pub fn new(response: reqwest::Response) -> Self {
        Self {
            body: response.bytes_stream().boxed(),
            finished: false,
        }
    }
}

#[async_trait]
impl ChunkSource for HttpChunkSource {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        if self.finished {
            return Ok(None);
        }
        match self.body.next().await {
            Some(Ok(bytes)) => Ok(Some(bytes)),
            Some(Err(e)) => {
                self.finished = true;
                Err(PcmcastError::transport(format!(
                    "Failed to read audio stream: {e}"
                )))
            }
            None => {
                self.finished = true;
                Ok(None)
            }
        }
    }
}

/// Scripted chunk source for testing.
#[derive(Debug, Default)]
pub struct MockChunkSource {
    script: VecDeque<MockStep>,
    reads: usize,
}

#[derive(Debug)]
enum MockStep {
    Chunk(Bytes),
    Fail(String),
    Stall,
}

impl MockChunkSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Source that yields each of `chunks` once, then ends.
    pub fn from_chunks<I, B>(chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        let mut source = Self::new();
        for chunk in chunks {
            source = source.with_chunk(chunk);
        }
        source
    }

    pub fn with_chunk(mut self, chunk: impl Into<Bytes>) -> Self {
        self.script.push_back(MockStep::Chunk(chunk.into()));
        self
    }

    /// Configure the next read to fail with a transport error.
    pub fn with_failure(mut self, message: &str) -> Self {
        self.script.push_back(MockStep::Fail(message.to_string()));
        self
    }

    /// Configure the next read to never complete.
    pub fn with_stall(mut self) -> Self {
        self.script.push_back(MockStep::Stall);
        self
    }

    /// Number of `next_chunk` calls made so far.
    pub fn reads(&self) -> usize {
        self.reads
    }
}

#[async_trait]
impl ChunkSource for MockChunkSource {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        self.reads += 1;
        match self.script.pop_front() {
            Some(MockStep::Chunk(bytes)) => Ok(Some(bytes)),
            Some(MockStep::Fail(message)) => Err(PcmcastError::Transport { message }),
            Some(MockStep::Stall) => std::future::pending().await,
            None => Ok(None),
        }
    }
}
