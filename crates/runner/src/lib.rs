//! Command-line front end for mcrun.
//!
//! Loads a TOML run file (or a rendezvous archive for restarts), builds one
//! simulation manager per rank and runs it to completion.

pub mod config;
pub mod session;

pub use config::{RunFile, RunFileError};
pub use session::{restart_policy, Session, SessionOutcome, Start};
