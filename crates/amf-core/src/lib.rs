//! # amf-core
//!
//! Shared vocabulary for the amf crates:
//!
//! - **Session ids**: [`SessionId`] newtype plus the random id generator
//! - **Session tiers**: [`SessionKind`] (`GLOBAL` and `TAB` records)
//! - **Call tracing**: [`TraceLevel`] controlling request/response tracing
//! - **Logging**: [`logging::init`] and the call trace target

#![deny(unsafe_code)]

pub mod ids;
pub mod logging;
pub mod trace;

pub use ids::{SessionId, SessionKind};
pub use trace::TraceLevel;
