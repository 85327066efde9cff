//! # amf-server
//!
//! HTTP transport in front of the [`Dispatcher`](amf_runtime::Dispatcher).
//!
//! - `?cmd=exec`: JSON call batch in the body
//! - `?cmd=upload&params=..`: raw body exposed to modules, batch in the query
//! - `?cmd=<name>`: handlers from the application's [`CommandRegistry`]
//! - no `cmd`: static assets from the configured root
//! - `/health` for liveness probes
//! - TCP or unix socket listener with graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod commands;
pub mod config;
pub mod health;
pub mod remote;
pub mod server;
pub mod shutdown;

pub use commands::{CommandContext, CommandHandler, CommandRegistry};
pub use config::ServerConfig;
pub use server::AmfServer;
pub use shutdown::ShutdownCoordinator;
