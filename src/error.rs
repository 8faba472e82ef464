// src/error.rs
// =============================================================================
// Typed errors for the parts of a run that are allowed to fail loudly.
//
// Probe failures are NOT in here on purpose: a timeout or a 404 for one code
// is an ordinary outcome and travels as data (see probe::Outcome). Only
// things that should stop the run or reject its configuration live here:
// - CodeError: text that is not a valid base-36 code
// - ConfigError: option values that cannot describe a run
// - SinkError: the results file could not be read or written
// - HarvestError: what the run controller hands back to main
// =============================================================================

use std::path::PathBuf;
use thiserror::Error;

/// A string could not be turned into a `Code`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodeError {
    #[error("code is empty")]
    Empty,

    #[error("code length {len} is outside 1..={max}")]
    BadLength { len: usize, max: usize },

    #[error("invalid character {ch:?} in code (expected 0-9 or a-z)")]
    InvalidChar { ch: char },

    #[error("value {value} does not fit in a code of length {len}")]
    OutOfRange { len: usize, value: u64 },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid base URL '{url}': {reason}")]
    BaseUrl { url: String, reason: String },

    #[error("{name} must be greater than zero")]
    Zero { name: &'static str },

    #[error("at least one code length is required")]
    NoLengths,

    #[error("invalid code length: {0}")]
    Length(#[source] CodeError),

    #[error("invalid code '{text}': {source}")]
    Code {
        text: String,
        #[source]
        source: CodeError,
    },

    #[error("start code '{code}' has length {len}, which is not a scanned length")]
    StartLength { code: String, len: usize },
}

/// The results file could not be read or written.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error on {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("results sink failed: {0}")]
    Sink(#[from] SinkError),

    #[error("HTTP client setup failed: {0}")]
    Client(#[from] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_error_names_the_file() {
        let err = SinkError::Io {
            path: PathBuf::from("/tmp/out.csv"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let text = err.to_string();
        assert!(text.contains("/tmp/out.csv"));
        assert!(text.contains("denied"));
    }

    #[test]
    fn test_config_error_wraps_code_error() {
        let err = ConfigError::Code {
            text: "AB!".to_string(),
            source: CodeError::InvalidChar { ch: '!' },
        };
        assert!(err.to_string().contains("AB!"));
    }
}
