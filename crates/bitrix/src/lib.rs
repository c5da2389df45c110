//! Bitrix24 REST client.
//!
//! Talks to an incoming webhook (`https://<portal>/rest/<user>/<token>/`):
//! method calls with retry, `start`/`next` pagination over list methods, the
//! call-log fallback chain, and open-line dialog history.

pub mod calls;
pub mod client;
pub mod error;
pub mod lenient;
pub mod query;
pub mod source;
pub mod types;

pub use {
    client::BitrixClient,
    error::{Error, Result},
    query::{ActivityQuery, CallQuery, SortOrder},
    source::CrmSource,
    types::{Activity, CallRecord, CallSource, Communication, DialogHistory, DialogMessage, DialogUser},
};
