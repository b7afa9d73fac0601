pub mod challenges;
pub mod deployments;
pub mod docs;
pub mod jobs;
pub mod webhook;
