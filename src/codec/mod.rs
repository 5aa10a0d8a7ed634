//! Whole-block codecs.
//!
//! A codec is a pure byte transform applied to one block at a time:
//! `forward` on the way into a compressed stream, `inverse` on the way out.
//! The pipeline calls the same codec instance from every worker thread at
//! once, so implementations MUST be stateless per call (`Send + Sync`, no
//! interior mutability).
//!
//! Codec identity is never written to disk.  A compressed stream carries
//! only frames; the caller is responsible for decoding with the codec that
//! produced it.

use std::io::{Read, Write};
use std::sync::Arc;
use thiserror::Error;

/// Default compression level.  Interpreted per codec; ignored by lz4/lzma/none.
pub const DEFAULT_LEVEL: i32 = 6;

// ── CodecId enum ─────────────────────────────────────────────────────────────

/// Built-in codec discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecId {
    None,
    Gzip,
    Zstd,
    Lz4,
    Brotli,
    Lzma,
}

impl CodecId {
    pub const ALL: [CodecId; 6] = [
        CodecId::None,
        CodecId::Gzip,
        CodecId::Zstd,
        CodecId::Lz4,
        CodecId::Brotli,
        CodecId::Lzma,
    ];

    /// Human-readable name, also the config/CLI spelling.
    pub fn name(self) -> &'static str {
        match self {
            CodecId::None   => "none",
            CodecId::Gzip   => "gzip",
            CodecId::Zstd   => "zstd",
            CodecId::Lz4    => "lz4",
            CodecId::Brotli => "brotli",
            CodecId::Lzma   => "lzma",
        }
    }

    /// Parse from a config or CLI string (case-insensitive).
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "none"        => Some(CodecId::None),
            "gzip" | "gz" => Some(CodecId::Gzip),
            "zstd"        => Some(CodecId::Zstd),
            "lz4"         => Some(CodecId::Lz4),
            "brotli"      => Some(CodecId::Brotli),
            "lzma"        => Some(CodecId::Lzma),
            _             => None,
        }
    }
}

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum CodecError {
    /// Null or empty input; a block is never empty.
    #[error("Invalid codec input: {0}")]
    InvalidInput(&'static str),
    #[error("Compression error: {0}")]
    Compression(String),
    #[error("Decompression error: {0}")]
    Decompression(String),
}

impl CodecError {
    pub fn kind(&self) -> &'static str {
        match self {
            CodecError::InvalidInput(_)  => "codec-invalid-input",
            CodecError::Compression(_)   => "codec-compression",
            CodecError::Decompression(_) => "codec-decompression",
        }
    }
}

// ── Codec trait ──────────────────────────────────────────────────────────────

pub trait Codec: Send + Sync {
    fn codec_id(&self) -> CodecId;
    fn forward(&self, block: &[u8]) -> Result<Vec<u8>, CodecError>;
    fn inverse(&self, transformed: &[u8]) -> Result<Vec<u8>, CodecError>;
}

fn reject_empty(data: &[u8], what: &'static str) -> Result<(), CodecError> {
    if data.is_empty() {
        return Err(CodecError::InvalidInput(what));
    }
    Ok(())
}

// ── Built-in codec implementations ──────────────────────────────────────────

pub struct NoneCodec;
impl Codec for NoneCodec {
    fn codec_id(&self) -> CodecId { CodecId::None }
    fn forward(&self, block: &[u8]) -> Result<Vec<u8>, CodecError> {
        reject_empty(block, "cannot compress an empty block")?;
        Ok(block.to_vec())
    }
    fn inverse(&self, transformed: &[u8]) -> Result<Vec<u8>, CodecError> {
        reject_empty(transformed, "cannot decompress an empty block")?;
        Ok(transformed.to_vec())
    }
}

pub struct GzipCodec {
    pub level: u32,
}
impl Codec for GzipCodec {
    fn codec_id(&self) -> CodecId { CodecId::Gzip }
    fn forward(&self, block: &[u8]) -> Result<Vec<u8>, CodecError> {
        use flate2::write::GzEncoder;
        use flate2::Compression;

        reject_empty(block, "cannot compress an empty block")?;
        let mut encoder = GzEncoder::new(Vec::with_capacity(block.len() / 2), Compression::new(self.level));
        encoder.write_all(block).map_err(|e| CodecError::Compression(e.to_string()))?;
        encoder.finish().map_err(|e| CodecError::Compression(e.to_string()))
    }
    fn inverse(&self, transformed: &[u8]) -> Result<Vec<u8>, CodecError> {
        reject_empty(transformed, "cannot decompress an empty block")?;
        let mut out = Vec::with_capacity(transformed.len() * 2);
        flate2::read::GzDecoder::new(transformed)
            .read_to_end(&mut out)
            .map_err(|e| CodecError::Decompression(e.to_string()))?;
        Ok(out)
    }
}

pub struct ZstdCodec {
    pub level: i32,
}
impl Codec for ZstdCodec {
    fn codec_id(&self) -> CodecId { CodecId::Zstd }
    fn forward(&self, block: &[u8]) -> Result<Vec<u8>, CodecError> {
        reject_empty(block, "cannot compress an empty block")?;
        zstd::encode_all(block, self.level).map_err(|e| CodecError::Compression(e.to_string()))
    }
    fn inverse(&self, transformed: &[u8]) -> Result<Vec<u8>, CodecError> {
        reject_empty(transformed, "cannot decompress an empty block")?;
        zstd::decode_all(transformed).map_err(|e| CodecError::Decompression(e.to_string()))
    }
}

pub struct Lz4Codec;
impl Codec for Lz4Codec {
    fn codec_id(&self) -> CodecId { CodecId::Lz4 }
    fn forward(&self, block: &[u8]) -> Result<Vec<u8>, CodecError> {
        reject_empty(block, "cannot compress an empty block")?;
        Ok(lz4_flex::compress_prepend_size(block))
    }
    fn inverse(&self, transformed: &[u8]) -> Result<Vec<u8>, CodecError> {
        reject_empty(transformed, "cannot decompress an empty block")?;
        lz4_flex::decompress_size_prepended(transformed)
            .map_err(|e| CodecError::Decompression(e.to_string()))
    }
}

pub struct BrotliCodec {
    pub quality: u32,
}
impl Codec for BrotliCodec {
    fn codec_id(&self) -> CodecId { CodecId::Brotli }
    fn forward(&self, block: &[u8]) -> Result<Vec<u8>, CodecError> {
        reject_empty(block, "cannot compress an empty block")?;
        let mut out = Vec::new();
        {
            let mut w = brotli::CompressorWriter::new(&mut out, 4096, self.quality, 22);
            w.write_all(block).map_err(|e| CodecError::Compression(e.to_string()))?;
        }
        Ok(out)
    }
    fn inverse(&self, transformed: &[u8]) -> Result<Vec<u8>, CodecError> {
        reject_empty(transformed, "cannot decompress an empty block")?;
        let mut out = Vec::new();
        brotli::Decompressor::new(transformed, 4096)
            .read_to_end(&mut out)
            .map_err(|e| CodecError::Decompression(e.to_string()))?;
        Ok(out)
    }
}

pub struct LzmaCodec;
impl Codec for LzmaCodec {
    fn codec_id(&self) -> CodecId { CodecId::Lzma }
    fn forward(&self, block: &[u8]) -> Result<Vec<u8>, CodecError> {
        reject_empty(block, "cannot compress an empty block")?;
        let mut out = Vec::new();
        lzma_rs::lzma_compress(&mut std::io::Cursor::new(block), &mut out)
            .map_err(|e| CodecError::Compression(e.to_string()))?;
        Ok(out)
    }
    fn inverse(&self, transformed: &[u8]) -> Result<Vec<u8>, CodecError> {
        reject_empty(transformed, "cannot decompress an empty block")?;
        let mut out = Vec::new();
        lzma_rs::lzma_decompress(&mut std::io::Cursor::new(transformed), &mut out)
            .map_err(|e| CodecError::Decompression(e.to_string()))?;
        Ok(out)
    }
}

// ── Factory ──────────────────────────────────────────────────────────────────

/// Build a shareable codec instance.  `level` is clamped into each codec's
/// valid range.
pub fn get_codec(id: CodecId, level: i32) -> Arc<dyn Codec> {
    match id {
        CodecId::None   => Arc::new(NoneCodec),
        CodecId::Gzip   => Arc::new(GzipCodec { level: level.clamp(0, 9) as u32 }),
        CodecId::Zstd   => Arc::new(ZstdCodec { level: level.clamp(1, 22) }),
        CodecId::Lz4    => Arc::new(Lz4Codec),
        CodecId::Brotli => Arc::new(BrotliCodec { quality: level.clamp(0, 11) as u32 }),
        CodecId::Lzma   => Arc::new(LzmaCodec),
    }
}
