//! ETX-delimited framing for the controller stream.
//!
//! The relay treats one read as one message unless framing is switched to
//! ETX mode. In that mode bytes are accumulated here and every span ending
//! in ETX is yielded as a frame, delimiter included, exactly as received.

use crate::wire::ETX;

/// Streaming frame decoder: accumulates bytes and yields complete frames.
#[derive(Debug)]
pub struct EtxFrameDecoder {
    buffer: Vec<u8>,
    max_frame_len: usize,
}

impl EtxFrameDecoder {
    /// `max_frame_len` bounds how much undelimited data is held back; past
    /// that, [`feed`](Self::feed) releases the buffer as one frame.
    pub fn new(max_frame_len: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_frame_len: max_frame_len.max(1),
        }
    }

    /// Feed bytes and return all complete frames, in order.
    pub fn feed(&mut self, data: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(data);
        let mut frames = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == ETX) {
            frames.push(self.buffer.drain(..=pos).collect());
        }

        if self.buffer.len() > self.max_frame_len {
            frames.push(std::mem::take(&mut self.buffer));
        }

        frames
    }

    /// Take whatever is left without a closing ETX (used at EOF).
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buffer))
        }
    }

    /// Number of bytes waiting for an ETX.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}
