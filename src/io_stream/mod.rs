//! Stream endpoints of the pipeline.
//!
//! [`BlockReader`] turns a source stream into pipeline blocks and
//! [`BlockWriter`] persists finished blocks.  Both run in a mode chosen by
//! the direction of the conversion:
//!
//! | direction  | reader yields                 | writer emits                   |
//! |------------|-------------------------------|--------------------------------|
//! | compress   | raw chunk + sequence tag      | `[length][bytes]` frames       |
//! | decompress | frame bytes, verbatim         | payloads, in sequence order    |
//!
//! Compressed output is written in worker completion order.  Only the
//! decompressing writer reorders, using the tag recovered from each block.

pub mod reader;
pub mod reorder;
pub mod writer;

pub use reader::BlockReader;
pub use reorder::ReassemblyBuffer;
pub use writer::BlockWriter;

/// Default block size: 1 MiB.
pub const DEFAULT_BLOCK_SIZE: usize = 1024 * 1024;

/// Conversion direction.  Selects reader and writer behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Compress,
    Decompress,
}

impl Direction {
    pub fn name(self) -> &'static str {
        match self {
            Direction::Compress   => "compress",
            Direction::Decompress => "decompress",
        }
    }
}
