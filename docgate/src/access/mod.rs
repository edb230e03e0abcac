//! Email gate and signed-link lifecycle for a single viewer.
//!
//! The [`AccessSessionController`] is the core state machine; everything it
//! touches outside itself goes through the traits in [`backend`].

pub mod backend;
pub mod controller;
pub mod error;
pub mod model;

pub use backend::{AccessBackend, GateTokenStore, IpLookup, KnownIp, MemoryGateTokenStore};
pub use controller::{
    AccessSessionController, AccessSnapshot, ControllerConfig, DocumentView, GateState, Notice,
    RenewalOutcome,
};
pub use error::{AccessError, Result};
pub use model::{AccessRecord, DocumentRef, LocalGateToken, SignedLink};
