use std::collections::VecDeque;
use tracing::warn;

use crate::audio::AudioChunk;

/// FIFO of audio chunks held while no usable connection exists
///
/// Chunks leave strictly oldest-first. With a capacity limit set, a push
/// into a full buffer evicts the oldest chunk; retained chunks keep their
/// relative order.
#[derive(Debug, Default)]
pub struct ChunkBuffer {
    chunks: VecDeque<AudioChunk>,
    max_chunks: Option<usize>,
    dropped: u64,
}

impl ChunkBuffer {
    /// Unbounded buffer
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity_limit(max_chunks: Option<usize>) -> Self {
        Self {
            chunks: VecDeque::new(),
            max_chunks,
            dropped: 0,
        }
    }

    pub fn push(&mut self, chunk: AudioChunk) {
        if let Some(max) = self.max_chunks {
            if max == 0 {
                self.dropped += 1;
                return;
            }
            while self.chunks.len() >= max {
                self.chunks.pop_front();
                self.dropped += 1;
                if self.dropped == 1 || self.dropped % 100 == 0 {
                    warn!(
                        "Chunk buffer full ({} chunks), dropped {} oldest so far",
                        max, self.dropped
                    );
                }
            }
        }
        self.chunks.push_back(chunk);
    }

    /// Hand chunks to `sink` oldest-first until empty or the sink refuses
    ///
    /// A refusing sink gives the chunk back; it returns to the front of the
    /// queue. Returns the number of chunks the sink accepted.
    pub fn drain_into<F>(&mut self, mut sink: F) -> usize
    where
        F: FnMut(AudioChunk) -> Result<(), AudioChunk>,
    {
        let mut sent = 0;
        while let Some(chunk) = self.chunks.pop_front() {
            match sink(chunk) {
                Ok(()) => sent += 1,
                Err(chunk) => {
                    self.chunks.push_front(chunk);
                    break;
                }
            }
        }
        sent
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Chunks evicted by the capacity limit since creation
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
