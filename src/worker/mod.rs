//! Isolated execution units.
//!
//! [`protocol`] defines the messages crossing the unit boundary and
//! [`runtime`] is the code running on the far side of it.

pub mod protocol;
pub mod runtime;

pub use protocol::{WorkerRequest, WorkerResponse, WorkerStartPayload};
pub use runtime::{UnitHandle, UnitRuntime};
