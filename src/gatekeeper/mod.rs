//! Admission control for the local inference host.
//!
//! The local host is resource constrained, so every chat request decides
//! afresh whether it may use it:
//! - 1-minute load average above the threshold → external backend
//! - local backlog at or above the maximum → external backend
//! - otherwise → local backend
//!
//! ## Design
//! - `QueueState` is the single shared record of local backlog plus the
//!   mutual-exclusion slot that serializes local generation
//! - Decisions read state only; they never mutate it, so the health endpoint
//!   can call them freely

pub mod queue;
pub mod router;

pub use queue::{GenerationSlot, QueueState, QueueTicket};
pub use router::{
    AdmissionController, FixedLoad, LoadProbe, RouteDecision, RouteReason, RoutingTarget,
    SystemLoad,
};
