//! Hive State - Persistence and save scheduling
//!
//! This crate keeps the gateway's resources on disk and decides when disk
//! gets touched at all.
//!
//! ## Components
//!
//! - **store**: SQLite-based persistence with sqlx
//! - **saver**: Per-category coalescing save scheduler with a no-save latch
//! - **error**: Persistence-specific error types
//!
//! ## Example
//!
//! ```ignore
//! use hive_state::{DelayClass, SaveCategory, SaveScheduler, SqliteStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = SqliteStore::new("gateway.db").await?;
//!     let mut scheduler = SaveScheduler::new();
//!
//!     scheduler.request(SaveCategory::Lights, DelayClass::Short);
//!     for category in scheduler.tick() {
//!         // marshal the dirty resources of `category` into the store
//!         let _ = (&store, category);
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod saver;
pub mod store;

// Re-exports for convenience
pub use error::{Result, StateError};
pub use saver::{DelayClass, SaveCategory, SaveScheduler};
pub use store::{AuthRecord, DeviceRecord, ItemRecord, SqliteStore, SubDeviceRecord};
