//! Raw frames read from the image endpoint.
//!
//! Reassembling packets into an image is the image-processing layer's job;
//! this type only carries the bytes and exposes the fixed packetization.

use crate::protocol::constants::{FRAME_PACKET_SIZE, LINE_LEN};
use crate::state::phases::Phase;

/// Bytes read from the image endpoint by one phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    phase: Phase,
    data: Vec<u8>,
}

impl RawFrame {
    pub fn new(phase: Phase, data: Vec<u8>) -> Self {
        Self { phase, data }
    }

    /// Phase that produced the frame.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Fixed-size packets; the last one may be shorter.
    pub fn packets(&self) -> std::slice::Chunks<'_, u8> {
        self.data.chunks(FRAME_PACKET_SIZE)
    }

    pub fn packet_count(&self) -> usize {
        self.data.len().div_ceil(FRAME_PACKET_SIZE)
    }

    /// Complete sensor lines in the frame.
    pub fn lines(&self) -> std::slice::ChunksExact<'_, u8> {
        self.data.chunks_exact(LINE_LEN)
    }
}
