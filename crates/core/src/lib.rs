//! Domain model and port contracts for the challenge orchestrator.
//!
//! Everything here is free of I/O against the store or the external
//! executor. The only side-effecting code is the subprocess runner in
//! [`command`], used by direct (non-pipeline) validation.

pub mod challenge;
pub mod command;
pub mod deployment;
pub mod error;
pub mod manifest;
pub mod pipeline;
pub mod ports;
pub mod status;
pub mod types;
pub mod validation;
