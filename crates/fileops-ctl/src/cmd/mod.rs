//! CLI command modules.

pub mod http;
pub mod read;
pub mod status;
