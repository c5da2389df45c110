//! Detection of customer conversations left without a reply.
//!
//! A scan lists recent inbound correspondence from the CRM, keeps the latest
//! message per record, and drops records that were answered by an outbound
//! message, by an operator in the open-lines chat, or by a call. What remains
//! is rendered into a digest and handed to a [`DigestSink`].

pub mod classify;
pub mod detector;
pub mod digest;
pub mod error;
pub mod inspect;
pub mod scan;
pub mod sender;
pub mod sink;

#[cfg(test)]
mod testing;

pub use {
    classify::{ChannelFilter, extract_dialog_id, first_phone, is_openlines_session},
    detector::{Alert, DetectionSettings, Detector},
    digest::{DigestOptions, escape_html, format_digest, format_scan_error},
    error::{Error, Result},
    inspect::{Inspector, ProvidersSummary},
    scan::{ScanReport, ScanService},
    sender::{LastSender, classify_last_sender},
    sink::{DigestSink, NoopSink},
};
