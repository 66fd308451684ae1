//! Hive Net - Network-lifecycle state machines
//!
//! Three concurrently-active sub-machines share the gateway's periodic
//! ticks: the channel-change protocol, the permit-join broadcaster and the
//! coordinator firmware-update supervisor. All are explicit state enums
//! stepped by events; none talks to the host directly.
//!
//! # Modules
//!
//! - [`channel_change`] - Channel-change protocol with retry budgets
//! - [`permit_join`] - Permit-join countdown and re-broadcaster
//! - [`firmware`] - Coordinator firmware-update supervisor
//! - [`watchdog`] - Host watchdog and degraded-mode latch
//! - [`error`] - Error types

pub mod channel_change;
pub mod error;
pub mod firmware;
pub mod permit_join;
pub mod watchdog;

pub use channel_change::{ChannelAction, ChannelChange, ChannelEvent, ChannelState};
pub use error::{NetError, Result};
pub use firmware::{FirmwareAction, FirmwareState, FirmwareUpdate, Flasher, FlasherStatus, PortInfo, PortScanner};
pub use permit_join::{PermitJoin, PermitJoinAction};
pub use watchdog::{DegradedReason, Watchdog};
