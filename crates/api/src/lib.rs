//! HTTP surface of the challenge orchestrator.
//!
//! Exposes config, state, error handling, authentication, and routes so
//! integration tests and the binary entrypoint build the same router.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod routes;
pub mod state;
