pub mod error;
pub mod codec;
pub mod queue;
pub mod block;
pub mod io_stream;
pub mod options;
pub mod pipeline;
pub mod convert;

pub use error::{AggregateFailure, Error, Result, StageKind};
pub use codec::{Codec, CodecId, get_codec};
pub use queue::BoundedQueue;
pub use io_stream::{BlockReader, BlockWriter, ReassemblyBuffer};
pub use options::ConvertOptions;
pub use pipeline::{Pipeline, PipelineState, RunReport};
pub use convert::{compress, decompress, compress_file, decompress_file};
