//! TRACE job orchestration.
//!
//! Connects submission, the task queue, the worker state machine and the
//! status projection. The HTTP server and the worker binary both build on
//! this crate; neither holds a process-wide broker client. Configuration is
//! loaded once and passed into [`queue::TaskQueue`], [`submit::Submitter`]
//! and [`worker::Worker`] explicitly.

pub mod config;
pub mod error;
pub mod queue;
pub mod retention;
pub mod status;
pub mod submit;
pub mod worker;
