//! Telegram delivery of replywatch digests.
//!
//! Sends through the Bot API with teloxide: HTML first, plain text when the
//! markup is rejected, waiting out rate limits.

pub mod chunk;
pub mod error;
pub mod notifier;

pub use {
    error::{Error, Result},
    notifier::TelegramNotifier,
};
