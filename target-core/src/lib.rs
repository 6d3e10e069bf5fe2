//! Target Interface: a capability-oriented view of one Cortex-M core,
//! built on the `swd-adiv5` engine. Provides attach/detach/halt/resume/
//! step/interrupt, register and memory access; breakpoints, watchpoints
//! and memory writes are accepted but report `Unsupported`. Multi-core
//! routing and flash-programming algorithms are out of scope.

mod error;
mod scs;
mod target;

pub use error::{Result, TargetError};
pub use scs::regsel_for_rsp_register;
pub use target::{Adiv5Target, CoreState, ProbeOnlyTarget, Target, TargetOps, SIGTRAP};
