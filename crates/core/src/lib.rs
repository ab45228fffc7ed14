//! Shared domain types for the TRACE job orchestration services.
//!
//! Pure logic only: no database, process or network access lives here so
//! the state machine and payload schema can be tested in isolation.

pub mod error;
pub mod payload;
pub mod status;
pub mod types;
