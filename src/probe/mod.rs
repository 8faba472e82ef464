// src/probe/mod.rs
// =============================================================================
// This module checks one code against the remote host.
//
// Submodules:
// - http: the real prober (HEAD fast path, then GET, then extraction)
// - extract: pulls title/duration/listens/downloads out of a page
//
// Every probe returns a `ProbeResult`. Nothing in here returns an error:
// not-found and transport failures are outcomes, recorded like any other.
// =============================================================================

mod extract;
mod http;

use crate::codes::Code;
use async_trait::async_trait;

pub use extract::{MetadataExtractor, PageExtractor};
pub use http::{HttpProber, ProbeSettings};

/// Marker written when a duration could not be read.
pub const UNKNOWN_DURATION: &str = "?:??";

/// What we learned from a page that exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub title: String,
    /// "MM:SS", "H:MM:SS" or "?:??"
    pub duration: String,
    pub duration_seconds: u64,
    pub listens: String,
    pub downloads: String,
}

/// How a single probe ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// HTTP 200 and the page was parsed
    Found(Metadata),
    /// Any other HTTP status (usually 404, the common case)
    Missing { status: u16 },
    /// Timeout, connection failure, or a page we could not parse
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub code: Code,
    pub url: String,
    pub outcome: Outcome,
}

impl ProbeResult {
    /// Text for the status column: "200", the HTTP code, or "ERROR".
    pub fn status_text(&self) -> String {
        match &self.outcome {
            Outcome::Found(_) => "200".to_string(),
            Outcome::Missing { status } => status.to_string(),
            Outcome::Failed { .. } => "ERROR".to_string(),
        }
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        match &self.outcome {
            Outcome::Found(meta) => Some(meta),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Failed { error } => Some(error),
            _ => None,
        }
    }
}

/// Something that can check one code.
///
/// Implementations must not fail: every problem becomes `Outcome::Failed`.
/// The scheduler holds the prober behind an `Arc` and calls it from many
/// concurrent futures.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, code: Code) -> ProbeResult;
}

/// Cuts an error message down to at most `max_chars` characters.
pub fn truncate_cause(cause: &str, max_chars: usize) -> String {
    cause.chars().take(max_chars).collect()
}
