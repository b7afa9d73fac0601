//! Jenkins as the external executor: REST client and [`JobDispatcher`]
//! implementation.
//!
//! [`JobDispatcher`]: chalops_core::ports::JobDispatcher

pub mod api;
pub mod config;
pub mod dispatcher;

pub use api::{JenkinsApi, JenkinsApiError};
pub use config::JenkinsConfig;
pub use dispatcher::JenkinsDispatcher;
