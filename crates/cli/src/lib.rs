//! # SQRL Command Line Tool
//!
//! Library half of the `sqrl` binary. The binary parses arguments and
//! prints; everything it does is reachable from here.
//!
//! - [`config`]: TOML configuration with environment overrides
//! - [`commands`]: Subcommand implementations on top of `sqrl-protocol`

pub mod commands;
pub mod config;
