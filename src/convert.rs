//! High-level conversion API, the primary embedding surface.
//!
//! ```no_run
//! use blockflow::convert::{compress_file, decompress_file};
//! use blockflow::options::ConvertOptions;
//!
//! let opts = ConvertOptions::with_block_size(1 << 20);
//! compress_file("data.bin", "data.bin.bf", &opts)?;
//! decompress_file("data.bin.bf", "data.copy", &opts)?;
//! # Ok::<(), blockflow::Error>(())
//! ```
//!
//! Nothing is rolled back on failure: bytes written before the error stay
//! in the destination, and removing a partial file is the caller's call.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::error::{Error, Result};
use crate::io_stream::Direction;
use crate::options::ConvertOptions;
use crate::pipeline::{Pipeline, RunReport};

/// Stream buffers hold this many blocks.
const BUFFERED_BLOCKS: usize = 10;

// ── Streams ──────────────────────────────────────────────────────────────────

/// Compress `source` onto `dest` with default options and the given block
/// size.
pub fn compress<R, W>(source: R, dest: W, block_size: usize) -> Result<RunReport>
where
    R: Read + Send,
    W: Write + Send,
{
    Pipeline::new(ConvertOptions::with_block_size(block_size))?.compress(source, dest)
}

/// Decompress a stream produced by [`compress`].  `block_size` only sizes
/// read buffers; it need not match the value used to compress.
pub fn decompress<R, W>(source: R, dest: W, block_size: usize) -> Result<RunReport>
where
    R: Read + Send,
    W: Write + Send,
{
    Pipeline::new(ConvertOptions::with_block_size(block_size))?.decompress(source, dest)
}

// ── Files ────────────────────────────────────────────────────────────────────

/// Compress the file at `src` into `dst`, creating or truncating `dst`.
pub fn compress_file<P: AsRef<Path>, Q: AsRef<Path>>(
    src:     P,
    dst:     Q,
    options: &ConvertOptions,
) -> Result<RunReport> {
    convert_file(Direction::Compress, src.as_ref(), dst.as_ref(), options)
}

/// Decompress the file at `src` into `dst`, creating or truncating `dst`.
pub fn decompress_file<P: AsRef<Path>, Q: AsRef<Path>>(
    src:     P,
    dst:     Q,
    options: &ConvertOptions,
) -> Result<RunReport> {
    convert_file(Direction::Decompress, src.as_ref(), dst.as_ref(), options)
}

fn convert_file(
    direction: Direction,
    src:       &Path,
    dst:       &Path,
    options:   &ConvertOptions,
) -> Result<RunReport> {
    // Validate everything before the destination is touched.
    let mut pipeline = Pipeline::new(options.clone())?;
    if same_file(src, dst) {
        return Err(Error::InvalidArgument(format!(
            "source and destination are the same file: {}",
            src.display()
        )));
    }

    let capacity = options.block_size.saturating_mul(BUFFERED_BLOCKS);
    let source = BufReader::with_capacity(capacity, File::open(src)?);
    let dest = BufWriter::with_capacity(capacity, File::create(dst)?);

    match direction {
        Direction::Compress   => pipeline.compress(source, dest),
        Direction::Decompress => pipeline.decompress(source, dest),
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _              => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn refuses_to_overwrite_its_own_source() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("in.bin");
        std::fs::write(&path, b"precious").unwrap();

        let err = compress_file(&path, &path, &ConvertOptions::with_block_size(4)).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(std::fs::read(&path).unwrap(), b"precious");
    }

    #[test]
    fn invalid_options_leave_destination_untouched() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("in.bin");
        let dst = dir.path().join("out.bf");
        std::fs::write(&src, b"data").unwrap();

        let err = compress_file(&src, &dst, &ConvertOptions::with_block_size(0)).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(!dst.exists());
    }

    #[test]
    fn missing_source_is_an_io_error() {
        let dir = tempdir().unwrap();
        let err = compress_file(
            dir.path().join("nope"),
            dir.path().join("out"),
            &ConvertOptions::with_block_size(4),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
