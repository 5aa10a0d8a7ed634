use std::io::Write;

use tracing::trace;

use crate::block::{split_tag, write_frame, FRAME_PREFIX_LEN, SEQ_TAG_LEN};
use crate::error::{Error, Result};
use crate::io_stream::{Direction, ReassemblyBuffer};

/// Persists finished blocks to the destination stream.
///
/// In [`Direction::Compress`] every block becomes one frame, appended in
/// arrival order.  In [`Direction::Decompress`] blocks are parked in a
/// [`ReassemblyBuffer`] and their payloads written strictly in sequence
/// order, whatever order the workers finished them in.
pub struct BlockWriter<W: Write> {
    inner:          W,
    direction:      Direction,
    reorder:        ReassemblyBuffer<Vec<u8>>,
    blocks_written: u64,
    bytes_written:  u64,
}

impl<W: Write> BlockWriter<W> {
    pub fn new(inner: W, direction: Direction) -> Self {
        Self {
            inner,
            direction,
            reorder:        ReassemblyBuffer::new(),
            blocks_written: 0,
            bytes_written:  0,
        }
    }

    /// Writer producing a framed compressed stream.
    pub fn for_compression(inner: W) -> Self {
        Self::new(inner, Direction::Compress)
    }

    /// Writer restoring the original byte stream.
    pub fn for_decompression(inner: W) -> Self {
        Self::new(inner, Direction::Decompress)
    }

    pub fn write_block(&mut self, block: Vec<u8>) -> Result<()> {
        if block.is_empty() {
            return Err(Error::InvalidArgument("cannot write an empty block".into()));
        }
        match self.direction {
            Direction::Compress => {
                write_frame(&mut self.inner, &block)?;
                self.blocks_written += 1;
                self.bytes_written += (FRAME_PREFIX_LEN + block.len()) as u64;
                trace!(len = block.len(), "frame written");
            }
            Direction::Decompress => {
                let (_, sequence) = split_tag(&block)?;
                self.reorder.insert(sequence, block)?;
                self.drain_ready()?;
            }
        }
        Ok(())
    }

    /// Blocks held back waiting for an earlier sequence number.
    pub fn pending_blocks(&self) -> usize {
        self.reorder.pending_len()
    }

    pub fn blocks_written(&self) -> u64 {
        self.blocks_written
    }

    /// Destination bytes emitted, including frame prefixes.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Flush the destination and hand it back.
    ///
    /// # Errors
    /// `CorruptData` if blocks are still held back, meaning the stream ended
    /// with a gap in its sequence numbers.
    pub fn finish(mut self) -> Result<W> {
        if !self.reorder.is_empty() {
            let missing = self.reorder.next_expected().unwrap_or(i32::MAX);
            return Err(Error::CorruptData(format!(
                "stream ended without block {missing} ({} later block(s) never written)",
                self.reorder.pending_len()
            )));
        }
        self.inner.flush()?;
        Ok(self.inner)
    }

    fn drain_ready(&mut self) -> Result<()> {
        while let Some(block) = self.reorder.pop_ready() {
            let payload = &block[..block.len() - SEQ_TAG_LEN];
            self.inner.write_all(payload)?;
            self.blocks_written += 1;
            self.bytes_written += payload.len() as u64;
            trace!(block = self.blocks_written, len = payload.len(), "block written");
        }
        Ok(())
    }
}
