//! Hive Wire - Cluster-frame codec for the mesh radio side of the gateway
//!
//! This crate owns the binary frame format spoken on the radio:
//!
//! - **stream**: little-endian typed reads/writes with sticky underflow status
//! - **frame**: frame-control header encode/decode
//! - **attribute**: typed attribute records and the record iterator
//! - **commands**: profile-wide command identifiers
//! - **install_code**: AES-MMO link key derivation from printed install codes
//!
//! Everything here is pure and synchronous; the async host I/O lives in the
//! gateway binary.

pub mod attribute;
pub mod commands;
pub mod error;
pub mod frame;
pub mod install_code;
pub mod stream;

// Re-exports for convenience
pub use attribute::{AttrRecord, AttrRecordIter, AttrValue, DataType, RecordLayout};
pub use commands::ProfileCommand;
pub use error::{Result, WireError};
pub use frame::{Direction, Frame, FrameBuilder};
pub use install_code::{aes_mmo_hash, derive_link_key, install_code_crc};
pub use stream::{WireReader, WireWriter, UTC_EPOCH_OFFSET};
