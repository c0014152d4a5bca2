//! rkv-common — shared error types, RESP2 wire protocol, and configuration
//! for the keyspace engine, server, and client crates.

pub mod config;
pub mod error;
pub mod resp;

pub use config::Config;
pub use error::{HkvError, HkvResult};
pub use resp::{encode_command, encode_reply, Reply, RequestParser, RespError};
