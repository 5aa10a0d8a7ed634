//! Block and frame layout.
//!
//! ```text
//! compressed stream := frame*
//! frame             := length:i32 LE (> 0)  transformed[length]
//! inverse(transformed) = payload  sequence:i32 LE (>= 1)
//! ```
//!
//! The sequence tag is appended to the raw payload before the forward
//! transform, so it travels through the codec as ordinary data and is only
//! visible again after the inverse transform.  There is no terminator frame;
//! end of stream is end of frames.

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use std::io::{self, Read, Write};

use crate::error::{Error, Result};

/// Width of the trailing sequence tag.
pub const SEQ_TAG_LEN: usize = 4;
/// Width of a frame's length prefix.
pub const FRAME_PREFIX_LEN: usize = 4;
/// Sequence number carried by the first block of a stream.
pub const FIRST_SEQUENCE: i32 = 1;
/// Largest payload a single block may carry, leaving room for its tag.
pub const MAX_BLOCK_SIZE: usize = i32::MAX as usize - SEQ_TAG_LEN;

// ── Sequence tag ─────────────────────────────────────────────────────────────

/// Append `sequence` as the block's trailing tag.
pub fn append_tag(payload: &mut Vec<u8>, sequence: i32) {
    payload.extend_from_slice(&sequence.to_le_bytes());
}

/// Split a tagged block into `(payload, sequence)`.
///
/// Fails with `CorruptData` when the block is too short to hold a tag or the
/// tag is not a positive sequence number.
pub fn split_tag(block: &[u8]) -> Result<(&[u8], i32)> {
    if block.len() < SEQ_TAG_LEN {
        return Err(Error::CorruptData(format!(
            "block of {} byte(s) is too short for a sequence tag",
            block.len()
        )));
    }
    let (payload, tag) = block.split_at(block.len() - SEQ_TAG_LEN);
    let sequence = LittleEndian::read_i32(tag);
    if sequence < FIRST_SEQUENCE {
        return Err(Error::CorruptData(format!("invalid sequence number {sequence}")));
    }
    Ok((payload, sequence))
}

// ── Frames ───────────────────────────────────────────────────────────────────

/// Write one `[length][bytes]` frame.
pub fn write_frame<W: Write>(mut writer: W, transformed: &[u8]) -> Result<()> {
    if transformed.is_empty() {
        return Err(Error::InvalidArgument("cannot frame an empty block".into()));
    }
    let length = i32::try_from(transformed.len()).map_err(|_| {
        Error::InvalidArgument(format!(
            "transformed block of {} bytes exceeds the frame limit",
            transformed.len()
        ))
    })?;
    writer.write_i32::<LittleEndian>(length)?;
    writer.write_all(transformed)?;
    Ok(())
}

/// Read the next frame's length prefix.
///
/// Returns `Ok(None)` at a clean end of stream.  A partial prefix or a
/// non-positive length is `CorruptFraming`.
pub fn read_frame_len<R: Read>(reader: R) -> Result<Option<usize>> {
    let mut prefix = [0u8; FRAME_PREFIX_LEN];
    let got = read_full(reader, &mut prefix)?;
    if got == 0 {
        return Ok(None);
    }
    if got < FRAME_PREFIX_LEN {
        return Err(Error::CorruptFraming(format!(
            "truncated length prefix: {got} of {FRAME_PREFIX_LEN} bytes"
        )));
    }
    let length = LittleEndian::read_i32(&prefix);
    if length <= 0 {
        return Err(Error::CorruptFraming(format!("invalid frame length {length}")));
    }
    Ok(Some(length as usize))
}

/// Fill `buf` from `reader`, stopping early only at end of stream.
/// Returns the number of bytes read.
pub(crate) fn read_full<R: Read>(mut reader: R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
