//! Subcommands of the worker binary

pub mod run;
pub mod status;
