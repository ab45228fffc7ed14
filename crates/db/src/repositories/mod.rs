//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods. Single
//! statement operations accept `&SqlitePool`; operations that must compose
//! into a caller's transaction accept `&mut SqliteConnection`.

pub mod job_repo;
pub mod task_repo;

pub use job_repo::{JobRepo, TransitionError};
pub use task_repo::TaskRepo;
