//! savegame CLI library.
//!
//! Argument definitions and command handlers for the `savegame` binary.

pub mod cli;
pub mod commands;
