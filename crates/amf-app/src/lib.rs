//! # amf-app
//!
//! The `amf` server binary.
//!
//! - [`cli`]: command line flags layered over the settings file
//! - [`commands`]: extra `?cmd=` handlers
//! - [`app`]: boot sequence (store, registry, singletons, dispatcher, listener)
//!   and orderly shutdown
//! - [`modules`]: the bundled sample modules

#![deny(unsafe_code)]

pub mod app;
pub mod cli;
pub mod commands;
pub mod modules;
