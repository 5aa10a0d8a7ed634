use std::io::Read;

use tracing::trace;

use crate::block::{append_tag, read_frame_len, read_full, FRAME_PREFIX_LEN, SEQ_TAG_LEN};
use crate::error::{Error, Result};
use crate::io_stream::Direction;

/// Splits a source stream into pipeline blocks.
///
/// In [`Direction::Compress`] each block is up to `block_size` raw bytes
/// followed by a 4-byte sequence tag starting at 1.  In
/// [`Direction::Decompress`] each block is the body of one frame, returned
/// untouched; its tag is only recoverable after the inverse transform.
pub struct BlockReader<R: Read> {
    inner:       R,
    direction:   Direction,
    block_size:  usize,
    blocks_read: u64,
    bytes_read:  u64,
}

impl<R: Read> BlockReader<R> {
    /// A `block_size` of 0 is raised to 1 so every call makes progress.
    pub fn new(inner: R, direction: Direction, block_size: usize) -> Self {
        Self {
            inner,
            direction,
            block_size: block_size.max(1),
            blocks_read: 0,
            bytes_read: 0,
        }
    }

    /// Reader for a raw source that is about to be compressed.
    pub fn for_compression(inner: R, block_size: usize) -> Self {
        Self::new(inner, Direction::Compress, block_size)
    }

    /// Reader for a framed source that is about to be decompressed.
    pub fn for_decompression(inner: R, block_size: usize) -> Self {
        Self::new(inner, Direction::Decompress, block_size)
    }

    /// Next block, or `None` once the source is exhausted.  Never returns an
    /// empty block.
    pub fn next_block(&mut self) -> Result<Option<Vec<u8>>> {
        let block = match self.direction {
            Direction::Compress   => self.next_raw_block()?,
            Direction::Decompress => self.next_frame()?,
        };
        if let Some(b) = &block {
            self.blocks_read += 1;
            trace!(block = self.blocks_read, len = b.len(), "block read");
        }
        Ok(block)
    }

    pub fn blocks_read(&self) -> u64 {
        self.blocks_read
    }

    /// Source bytes consumed, including frame prefixes.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    fn next_raw_block(&mut self) -> Result<Option<Vec<u8>>> {
        let mut block = vec![0u8; self.block_size];
        let got = read_full(&mut self.inner, &mut block)?;
        if got == 0 {
            return Ok(None);
        }
        self.bytes_read += got as u64;

        let sequence = i32::try_from(self.blocks_read + 1).map_err(|_| {
            Error::InvalidArgument(format!(
                "source needs more than {} blocks; use a larger block size",
                i32::MAX
            ))
        })?;
        block.truncate(got);
        block.reserve_exact(SEQ_TAG_LEN);
        append_tag(&mut block, sequence);
        Ok(Some(block))
    }

    fn next_frame(&mut self) -> Result<Option<Vec<u8>>> {
        let length = match read_frame_len(&mut self.inner)? {
            Some(n) => n,
            None    => return Ok(None),
        };

        // Grow with the data actually present so a corrupt length cannot
        // force a huge allocation up front.
        let mut frame = Vec::with_capacity(length.min(self.block_size));
        (&mut self.inner).take(length as u64).read_to_end(&mut frame)?;
        if frame.len() < length {
            return Err(Error::CorruptFraming(format!(
                "frame declares {length} bytes but only {} remain",
                frame.len()
            )));
        }
        self.bytes_read += (length + FRAME_PREFIX_LEN) as u64;
        Ok(Some(frame))
    }
}
