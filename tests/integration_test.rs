use blockflow::codec::{Codec, CodecError, CodecId};
use blockflow::convert::{compress, compress_file, decompress, decompress_file};
use blockflow::error::{Error, StageKind};
use blockflow::options::ConvertOptions;
use blockflow::pipeline::{Pipeline, PipelineState};
use proptest::prelude::*;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::tempdir;

fn opts(block_size: usize, workers: usize) -> ConvertOptions {
    ConvertOptions {
        block_size,
        workers: Some(workers),
        queue_timeout_ms: 50,
        ..ConvertOptions::default()
    }
}

fn sample(len: usize) -> Vec<u8> {
    // Mix of compressible runs and noise.
    let mut state = 0x2545_f491u32;
    (0..len)
        .map(|i| {
            if (i / 64) % 2 == 0 {
                b'a' + (i % 7) as u8
            } else {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state as u8
            }
        })
        .collect()
}

fn round_trip_with(data: &[u8], options: &ConvertOptions) -> Vec<u8> {
    let mut packed = Vec::new();
    Pipeline::new(options.clone()).unwrap().compress(data, &mut packed).unwrap();
    let mut restored = Vec::new();
    Pipeline::new(options.clone())
        .unwrap()
        .decompress(packed.as_slice(), &mut restored)
        .unwrap();
    restored
}

#[test]
fn test_round_trip_boundary_sizes() {
    let block = 64;
    for len in [0, 1, block - 1, block, block + 1, block * 5, block * 5 + 3] {
        let data = sample(len);
        assert_eq!(round_trip_with(&data, &opts(block, 4)), data, "len {len}");
    }
}

#[test]
fn test_twenty_five_bytes_block_ten() {
    let data: Vec<u8> = (1..=25).collect();
    let mut packed = Vec::new();
    let report = compress(data.as_slice(), &mut packed, 10).unwrap();
    assert_eq!(report.blocks_read, 3);

    let mut restored = Vec::new();
    decompress(packed.as_slice(), &mut restored, 10).unwrap();
    assert_eq!(restored, data);
}

#[test]
fn test_every_codec_round_trips() {
    let data = sample(10_000);
    for id in CodecId::ALL {
        let options = ConvertOptions { codec: id.name().to_string(), ..opts(1000, 3) };
        assert_eq!(round_trip_with(&data, &options), data, "codec {}", id.name());
    }
}

#[test]
fn test_decompress_block_size_is_independent() {
    let data = sample(4000);
    let mut packed = Vec::new();
    compress(data.as_slice(), &mut packed, 100).unwrap();
    let mut restored = Vec::new();
    decompress(packed.as_slice(), &mut restored, 7).unwrap();
    assert_eq!(restored, data);
}

#[test]
fn test_file_round_trip() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("input.bin");
    let packed = dir.path().join("input.bin.bf");
    let restored = dir.path().join("restored.bin");
    let data = sample(256 * 1024 + 17);
    std::fs::write(&src, &data).unwrap();

    let options = opts(16 * 1024, 4);
    let report = compress_file(&src, &packed, &options).unwrap();
    assert_eq!(report.bytes_in, data.len() as u64);
    assert_eq!(report.bytes_out, std::fs::metadata(&packed).unwrap().len());

    decompress_file(&packed, &restored, &options).unwrap();
    assert_eq!(std::fs::read(&restored).unwrap(), data);
}

#[test]
fn test_file_round_trip_overwrites_existing_destination() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("input.bin");
    let packed = dir.path().join("packed.bf");
    let restored = dir.path().join("restored.bin");
    std::fs::write(&src, b"short").unwrap();
    std::fs::write(&restored, vec![0xFFu8; 4096]).unwrap();

    compress_file(&src, &packed, &opts(2, 2)).unwrap();
    decompress_file(&packed, &restored, &opts(2, 2)).unwrap();
    assert_eq!(std::fs::read(&restored).unwrap(), b"short");
}

#[test]
fn test_truncated_final_frame_fails_with_corrupt_framing() {
    let data = sample(3000);
    let mut packed = Vec::new();
    Pipeline::new(opts(500, 2)).unwrap().compress(data.as_slice(), &mut packed).unwrap();
    packed.truncate(packed.len() - 3);

    let started = Instant::now();
    let err = Pipeline::new(opts(500, 2))
        .unwrap()
        .decompress(packed.as_slice(), Vec::new())
        .unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(10));

    let failures = err.failures();
    assert_eq!(failures.len(), 1, "{err}");
    assert_eq!(failures[0].origin.stage, StageKind::Reader);
    assert!(matches!(failures[0].error, Error::CorruptFraming(_)));
}

#[test]
fn test_garbage_input_fails_instead_of_hanging() {
    let mut garbage = 12i32.to_le_bytes().to_vec();
    garbage.extend_from_slice(b"not gzip....");

    let started = Instant::now();
    let err = Pipeline::new(opts(16, 2))
        .unwrap()
        .decompress(garbage.as_slice(), Vec::new())
        .unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(err
        .failures()
        .iter()
        .any(|f| matches!(f.error, Error::Codec(CodecError::Decompression(_)))));
}

/// Fails on exactly one block; every other block passes through.
struct FailOnce {
    calls: AtomicUsize,
}

impl Codec for FailOnce {
    fn codec_id(&self) -> CodecId { CodecId::None }
    fn forward(&self, block: &[u8]) -> Result<Vec<u8>, CodecError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 2 {
            return Err(CodecError::Compression("injected".into()));
        }
        Ok(block.to_vec())
    }
    fn inverse(&self, block: &[u8]) -> Result<Vec<u8>, CodecError> {
        Ok(block.to_vec())
    }
}

#[test]
fn test_single_failing_worker_surfaces_one_error() {
    let codec = Arc::new(FailOnce { calls: AtomicUsize::new(0) });
    // Default timeout: prompt shutdown must not depend on waits expiring.
    let options = ConvertOptions { workers: Some(4), ..ConvertOptions::with_block_size(8) };
    let mut pipeline = Pipeline::with_codec(options, codec).unwrap();

    let started = Instant::now();
    let err = pipeline.compress(sample(64 * 1024).as_slice(), Vec::new()).unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(4), "took {:?}", started.elapsed());
    assert_eq!(pipeline.state(), PipelineState::Failed);

    let failures = err.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].origin.stage, StageKind::Worker);
    assert!(matches!(failures[0].error, Error::Codec(CodecError::Compression(_))));
}

/// Fails on every block.
struct AlwaysFail;

impl Codec for AlwaysFail {
    fn codec_id(&self) -> CodecId { CodecId::None }
    fn forward(&self, _: &[u8]) -> Result<Vec<u8>, CodecError> {
        Err(CodecError::Compression("always".into()))
    }
    fn inverse(&self, _: &[u8]) -> Result<Vec<u8>, CodecError> {
        Err(CodecError::Decompression("always".into()))
    }
}

#[test]
fn test_identical_failures_collapse() {
    let mut pipeline = Pipeline::with_codec(opts(4, 8), Arc::new(AlwaysFail)).unwrap();
    let err = pipeline.compress(sample(4096).as_slice(), Vec::new()).unwrap_err();
    assert_eq!(err.failures().len(), 1);
    assert!(err.to_string().contains("1 error(s)"));
}

#[test]
fn test_successful_run_finishes_without_waiting_out_timeouts() {
    let options = ConvertOptions { workers: Some(4), ..ConvertOptions::with_block_size(1024) };
    assert_eq!(options.queue_timeout(), Duration::from_secs(5));

    let started = Instant::now();
    let data = sample(100 * 1024);
    assert_eq!(round_trip_with(&data, &options), data);
    assert!(started.elapsed() < Duration::from_secs(4), "took {:?}", started.elapsed());
}

/// Destination whose every write fails.
struct FullDisk;

impl Write for FullDisk {
    fn write(&mut self, _: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::Other, "disk full"))
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Source that yields `remaining` bytes, then fails.
struct BrokenSource {
    remaining: usize,
}

impl Read for BrokenSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            return Err(io::Error::new(io::ErrorKind::Other, "device removed"));
        }
        let n = buf.len().min(self.remaining);
        buf[..n].fill(b'x');
        self.remaining -= n;
        Ok(n)
    }
}

#[test]
fn test_failing_destination_surfaces_one_writer_io_error() {
    let options = ConvertOptions { workers: Some(4), ..ConvertOptions::with_block_size(64) };
    let mut pipeline = Pipeline::new(options).unwrap();

    let started = Instant::now();
    let err = pipeline.compress(sample(64 * 1024).as_slice(), FullDisk).unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(4), "took {:?}", started.elapsed());
    assert_eq!(pipeline.state(), PipelineState::Failed);

    let failures = err.failures();
    assert_eq!(failures.len(), 1, "{err}");
    assert_eq!(failures[0].origin.stage, StageKind::Writer);
    assert!(matches!(failures[0].error, Error::Io(_)));
    assert!(err.to_string().contains("disk full"));
}

#[test]
fn test_failing_source_surfaces_one_reader_io_error() {
    let options = ConvertOptions { workers: Some(4), ..ConvertOptions::with_block_size(64) };
    let mut pipeline = Pipeline::new(options).unwrap();

    let started = Instant::now();
    let err = pipeline
        .compress(BrokenSource { remaining: 10_000 }, Vec::new())
        .unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(4), "took {:?}", started.elapsed());

    let failures = err.failures();
    assert_eq!(failures.len(), 1, "{err}");
    assert_eq!(failures[0].origin.stage, StageKind::Reader);
    assert!(matches!(failures[0].error, Error::Io(_)));
}

#[test]
fn test_pipeline_is_single_use() {
    let mut pipeline = Pipeline::new(opts(8, 1)).unwrap();
    pipeline.compress(&b"once"[..], Vec::new()).unwrap();
    assert!(matches!(pipeline.decompress(&b""[..], Vec::new()), Err(Error::AlreadyStarted)));
}

#[test]
fn test_zero_block_size_is_rejected_up_front() {
    assert!(matches!(
        compress(&b"data"[..], Vec::new(), 0),
        Err(Error::InvalidArgument(_))
    ));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_round_trip(
        data in proptest::collection::vec(any::<u8>(), 0..2048),
        block_size in 1usize..300,
        workers in 1usize..5,
    ) {
        let options = ConvertOptions { codec: "lz4".into(), ..opts(block_size, workers) };
        prop_assert_eq!(round_trip_with(&data, &options), data);
    }
}
