//! RSP packet framing, checksummed ack/retransmit, and dispatch onto
//! `target-core` operations. No subscriber is installed here; the
//! binary that embeds this crate owns logging configuration.

mod error;
pub mod handlers;
#[cfg(test)]
mod mock;
pub mod packet;
mod session;

pub use error::{Result, RspError};
pub use handlers::{dispatch, DispatchOutcome, SessionState};
pub use packet::{build_packet, checksum, ParseEvent, Parser};
pub use session::Session;
