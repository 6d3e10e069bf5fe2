//! CMSIS-DAP HID command layer (Probe Transport).
//!
//! Owns the USB HID handle to exactly one probe, negotiates its packet
//! size and capabilities, and exposes a single blocking `transact`
//! primitive that the SWD/DP/AP engine builds on. JTAG transport, the
//! CMSIS-DAP v2 WinUSB/bulk variant, and SWO trace streaming are not
//! implemented here: this bridge only ever talks SWD over HID.

pub mod commands;
mod error;
mod probe;

pub use commands::{Capabilities, TransferAddress};
pub use error::{CmsisDapError, Result};
pub use probe::{HidBackend, ProbeSession};
