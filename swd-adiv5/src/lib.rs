//! SWD/DP/AP Engine (ADIv5 over CMSIS-DAP, SWD transport only).
//!
//! Built on [`dap_transport`]'s blocking `transact` primitive. Provides
//! Debug Port and Access Port register access with SELECT-shadow
//! suppression of redundant writes, MEM-AP block transfers that respect
//! the 1 KiB TAR auto-increment boundary, and ROM-table/CoreSight
//! component discovery. JTAG transport and non-MEM-AP access port kinds
//! are out of scope.

pub mod ap;
pub mod component;
pub mod dp;
mod engine;
mod error;
pub mod romtable;
mod transport;

pub use component::{ComponentClass, ComponentId, KnownPart, PeripheralId};
pub use engine::ArmDebugInterface;
pub use error::{ArmError, Result};
pub use romtable::{walk_rom_table, DiscoveredComponent};
pub use transport::TransferTransport;
