//! Row models for the Postgres store and their mapping to domain types.

pub mod challenge;
pub mod completion;
pub mod deployment;
pub mod validation_result;
