//! Run configuration.
//!
//! ```json
//! { "block_size": 1048576, "codec": "gzip", "level": 6 }
//! ```
//!
//! Every field is optional in a config file; missing fields take the
//! defaults below.  Values are read once, before the pipeline starts, and
//! stay fixed for the run.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::block::MAX_BLOCK_SIZE;
use crate::codec::{get_codec, Codec, CodecId, DEFAULT_LEVEL};
use crate::error::{Error, Result};
use crate::io_stream::DEFAULT_BLOCK_SIZE;

/// Queue slots per worker thread.
pub const QUEUE_SLOTS_PER_WORKER: usize = 10;
/// Most worker threads one run may spawn.
pub const MAX_WORKERS: usize = 4096;
/// Most slots a stage queue may hold.
pub const MAX_QUEUE_CAPACITY: usize = 1 << 20;
/// Default bounded wait for queue operations: 5 s.
pub const DEFAULT_QUEUE_TIMEOUT_MS: u64 = 5_000;

/// Hardware parallelism, falling back to one thread when unknown.
pub fn hardware_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

// ── ConvertOptions ───────────────────────────────────────────────────────────

/// Configuration for one compress or decompress run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConvertOptions {
    /// Raw bytes per block.  On decompression, sizes the read buffers only.
    pub block_size:       usize,
    /// Codec name, see [`CodecId::from_name`].
    pub codec:            String,
    pub level:            i32,
    /// Worker threads.  `None` means hardware parallelism.
    pub workers:          Option<usize>,
    /// Slots in each stage queue.  `None` means `workers × 10`.
    pub queue_capacity:   Option<usize>,
    /// Bounded wait for each enqueue/dequeue attempt before stages
    /// re-check whether they should keep running.
    pub queue_timeout_ms: u64,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            block_size:       DEFAULT_BLOCK_SIZE,
            codec:            CodecId::Gzip.name().to_string(),
            level:            DEFAULT_LEVEL,
            workers:          None,
            queue_capacity:   None,
            queue_timeout_ms: DEFAULT_QUEUE_TIMEOUT_MS,
        }
    }
}

impl ConvertOptions {
    /// Default options with the given block size.
    pub fn with_block_size(block_size: usize) -> Self {
        Self { block_size, ..Self::default() }
    }

    /// Load options from a JSON config file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text).map_err(|e| match e {
            Error::InvalidArgument(msg) => {
                Error::InvalidArgument(format!("{}: {msg}", path.display()))
            }
            other => other,
        })
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| Error::InvalidArgument(format!("could not parse config: {e}")))
    }

    /// Reject values the pipeline cannot run with.  Called before any
    /// thread is spawned.
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(Error::InvalidArgument("block size must be positive".into()));
        }
        if self.block_size > MAX_BLOCK_SIZE {
            return Err(Error::InvalidArgument(format!(
                "block size {} exceeds the maximum of {MAX_BLOCK_SIZE}",
                self.block_size
            )));
        }
        let workers = self.worker_count();
        if workers == 0 || workers > MAX_WORKERS {
            return Err(Error::InvalidArgument(format!(
                "worker count must be between 1 and {MAX_WORKERS}, got {workers}"
            )));
        }
        let capacity = match self.queue_capacity {
            Some(n) => Some(n),
            None    => workers.checked_mul(QUEUE_SLOTS_PER_WORKER),
        };
        match capacity {
            Some(n) if (1..=MAX_QUEUE_CAPACITY).contains(&n) => {}
            Some(n) => {
                return Err(Error::InvalidArgument(format!(
                    "queue capacity must be between 1 and {MAX_QUEUE_CAPACITY}, got {n}"
                )))
            }
            None => return Err(Error::InvalidArgument("queue capacity overflows".into())),
        }
        if self.queue_timeout_ms == 0 {
            return Err(Error::InvalidArgument("queue timeout must be positive".into()));
        }
        self.codec_id()?;
        Ok(())
    }

    pub fn codec_id(&self) -> Result<CodecId> {
        CodecId::from_name(&self.codec)
            .ok_or_else(|| Error::InvalidArgument(format!("unknown codec '{}'", self.codec)))
    }

    /// Build the configured codec.
    pub fn build_codec(&self) -> Result<Arc<dyn Codec>> {
        Ok(get_codec(self.codec_id()?, self.level))
    }

    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(hardware_parallelism)
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
            .unwrap_or_else(|| self.worker_count().saturating_mul(QUEUE_SLOTS_PER_WORKER))
    }

    pub fn queue_timeout(&self) -> Duration {
        Duration::from_millis(self.queue_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let opts = ConvertOptions::default();
        opts.validate().unwrap();
        assert_eq!(opts.codec_id().unwrap(), CodecId::Gzip);
        assert_eq!(opts.queue_timeout(), Duration::from_secs(5));
        assert_eq!(opts.queue_capacity(), opts.worker_count() * QUEUE_SLOTS_PER_WORKER);
    }

    #[test]
    fn rejects_unusable_values() {
        for bad in [
            ConvertOptions::with_block_size(0),
            ConvertOptions::with_block_size(MAX_BLOCK_SIZE + 1),
            ConvertOptions { workers: Some(0), ..Default::default() },
            ConvertOptions { queue_capacity: Some(0), ..Default::default() },
            ConvertOptions { codec: "rar".into(), ..Default::default() },
            ConvertOptions { queue_timeout_ms: 0, ..Default::default() },
        ] {
            assert!(matches!(bad.validate(), Err(Error::InvalidArgument(_))), "{bad:?}");
        }
    }

    #[test]
    fn rejects_oversized_workers_and_queues() {
        for bad in [
            ConvertOptions { workers: Some(MAX_WORKERS + 1), ..Default::default() },
            ConvertOptions { workers: Some(usize::MAX / 4), ..Default::default() },
            ConvertOptions { queue_capacity: Some(MAX_QUEUE_CAPACITY + 1), ..Default::default() },
            ConvertOptions { queue_capacity: Some(usize::MAX / 2), ..Default::default() },
        ] {
            assert!(matches!(bad.validate(), Err(Error::InvalidArgument(_))), "{bad:?}");
        }

        let edge = ConvertOptions {
            workers:        Some(MAX_WORKERS),
            queue_capacity: Some(MAX_QUEUE_CAPACITY),
            ..Default::default()
        };
        edge.validate().unwrap();
        assert_eq!(
            ConvertOptions { workers: Some(usize::MAX), ..Default::default() }.queue_capacity(),
            usize::MAX
        );
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let opts = ConvertOptions::from_json(r#"{ "block_size": 4096, "codec": "zstd" }"#).unwrap();
        assert_eq!(opts.block_size, 4096);
        assert_eq!(opts.codec_id().unwrap(), CodecId::Zstd);
        assert_eq!(opts.level, DEFAULT_LEVEL);
        assert_eq!(opts.queue_timeout_ms, DEFAULT_QUEUE_TIMEOUT_MS);
    }

    #[test]
    fn unknown_json_fields_are_rejected() {
        assert!(matches!(
            ConvertOptions::from_json(r#"{ "blocksize": 4096 }"#),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "block_size": 10, "workers": 3 }}"#).unwrap();
        let opts = ConvertOptions::from_json_file(file.path()).unwrap();
        assert_eq!(opts.block_size, 10);
        assert_eq!(opts.worker_count(), 3);
        assert_eq!(opts.queue_capacity(), 30);
    }
}
