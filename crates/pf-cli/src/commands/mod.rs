//! `pspfeed` subcommands.

pub mod classify;
pub mod export;
pub mod watch;
