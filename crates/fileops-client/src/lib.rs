//! fileops-client — talks to a fileopsd server and drives block transfers.

pub mod client;
pub mod transfer;

pub use client::{ChunkStream, FileOpsClient};
pub use transfer::{run_transfer, TransferFailure, TransferOutcome, TransferRequest};
