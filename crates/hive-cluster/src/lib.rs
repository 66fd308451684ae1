//! Hive Cluster - Frame dispatch and outbound requests
//!
//! The dispatcher routes inbound cluster frames to per-cluster handlers
//! that write resource items; the outbound side builds request records for
//! the host send primitive and tracks request-response entries until
//! confirm or timeout.
//!
//! # Modules
//!
//! - [`dispatch`] - Inbound dispatch table and handler context
//! - [`handlers`] - Built-in per-cluster handlers
//! - [`scaling`] - Model-specific value transforms
//! - [`outbound`] - Request builders and the host link trait
//! - [`pending`] - In-flight request-response table
//! - [`error`] - Error types

pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod outbound;
pub mod pending;
pub mod scaling;

pub use dispatch::{ApsDataIndication, ClusterHandler, Dispatcher, HandlerCtx};
pub use error::{ClusterError, Result};
pub use outbound::{ApsRequest, Destination, HostLink, RequestFactory};
pub use pending::{PendingEntry, PendingKind, PendingTable, PENDING_TIMEOUT};
