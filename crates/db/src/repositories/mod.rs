//! Zero-sized repository structs, one per table. Each method takes the pool
//! explicitly and returns raw rows.

pub mod challenge_repo;
pub mod completion_repo;
pub mod deployment_repo;
pub mod validation_result_repo;

pub use challenge_repo::ChallengeRepo;
pub use completion_repo::CompletionRepo;
pub use deployment_repo::DeploymentRepo;
pub use validation_result_repo::ValidationResultRepo;
