//! Hive DDF - Device-description bundles
//!
//! This crate implements the tagged-chunk bundle container, the
//! content-addressed on-disk store with its two search paths, and the
//! per-device policy that selects which bundle drives parsing.
//!
//! # Modules
//!
//! - [`chunk`] - The `RIFF`/`DDFB`/`DESC`/`EXTF` container format
//! - [`descriptor`] - The JSON descriptor and its validation
//! - [`hash`] - Bundle and file hashes (SHA-256)
//! - [`store`] - Two-path content-addressed store
//! - [`policy`] - Bundle selection per device policy
//! - [`error`] - Error types

pub mod chunk;
pub mod descriptor;
pub mod error;
pub mod hash;
pub mod policy;
pub mod store;

pub use chunk::{Bundle, ExternalFile};
pub use descriptor::{BundleDescriptor, BundleStatus};
pub use error::{DdfError, Result};
pub use hash::{bundle_hash, file_hash, BundleHash};
pub use policy::{select_bundle, Selection};
pub use store::{BundleEntry, BundlePage, BundleStore};
