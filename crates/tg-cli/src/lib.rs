//! Native messaging host for the tabguard browser extension.
//!
//! This crate provides the `tabguard` binary: the event loop that drives
//! `tg-core`, its stdin/stdout framing, and the inspection commands.

mod cli;
pub mod commands;
mod config;
pub mod protocol;

pub use cli::{Cli, Commands};
pub use config::Config;
