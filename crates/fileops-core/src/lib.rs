//! fileops-core — shared types, wire format, codecs and transfer bookkeeping.
//! All other fileops crates depend on this one.

pub mod codec;
pub mod config;
pub mod error;
pub mod latency;
pub mod message;
pub mod observe;
pub mod partition;
pub mod wire;

pub use codec::{codec_for, BinaryCodec, Codec, JsonCodec};
pub use error::{ErrorKind, FileOpsError};
pub use latency::{LatencyRecorder, LatencyStats, TransferReport};
pub use message::{Chunk, ErrorBody, Request, Response};
pub use observe::{NoopObserver, TracingObserver, TransferMode, TransferObserver};
pub use partition::{partition, Block, Blocks, ReadRange};
