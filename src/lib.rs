//! Support-chat request gateway.
//!
//! Answers helpdesk questions by combining a static knowledge table and web
//! search results with a generation backend, while keeping a
//! resource-constrained local inference host from being overloaded.

#![warn(clippy::all)]

pub mod cache;
pub mod config;
pub mod gatekeeper;
pub mod gateway;
pub mod orchestrator;
pub mod providers;
pub mod rag;

pub use config::Config;
pub use orchestrator::{ChatOutcome, Orchestrator};
