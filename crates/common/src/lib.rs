//! Shared helpers used across all replywatch crates: the `Context` macro for
//! crate-local error types and wall-clock utilities.

pub mod error;
pub mod time;

pub use error::FromMessage;
