//! fileops-services — server-side sessions, block reads, framing, and the
//! request handler shared by every transport.

pub mod block_reader;
pub mod frame;
pub mod fs;
pub mod registry;
pub mod service;

pub use fs::{FileSystem, LocalFileSystem, OpenFile};
pub use registry::{SessionInfo, SessionRegistry, SessionStatus};
pub use service::{ChunkSink, FileOpsService, StreamSummary};
