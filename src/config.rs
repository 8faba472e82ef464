// src/config.rs
// =============================================================================
// The immutable description of one scan.
//
// `ScanConfig::from_args` validates the raw CLI values once. After that the
// config is only read: the run controller, prober and sink get the pieces
// they need from it and nothing changes mid-run.
// =============================================================================

use crate::cli::ScanArgs;
use crate::codes::{Code, CodeSpace};
use crate::error::ConfigError;
use crate::probe::ProbeSettings;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// What to do with an existing output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumePolicy {
    /// Append, and skip codes that already have a row
    Resume,
    /// Truncate and probe everything again
    Fresh,
}

#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub base_url: String,
    pub output: PathBuf,
    pub concurrency: usize,
    pub batch_size: usize,
    pub lengths: Vec<usize>,
    pub head_timeout: Duration,
    pub fetch_timeout: Duration,
    pub delay: Duration,
    pub reserved: Vec<Code>,
    pub start_at: Option<Code>,
    pub use_head: bool,
    pub title_suffix: String,
    pub max_error_len: usize,
    pub resume: ResumePolicy,
    pub json: bool,
}

impl ScanConfig {
    pub fn from_args(args: ScanArgs) -> Result<Self, ConfigError> {
        validate_base_url(&args.base_url)?;

        for (name, value) in [
            ("concurrency", args.concurrency as u64),
            ("batch size", args.batch_size as u64),
            ("head timeout", args.head_timeout_secs),
            ("fetch timeout", args.fetch_timeout_secs),
            ("max error length", args.max_error_len as u64),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero { name });
            }
        }

        if args.lengths.is_empty() {
            return Err(ConfigError::NoLengths);
        }
        let mut lengths = args.lengths;
        lengths.sort_unstable();
        lengths.dedup();
        // Surfaces out-of-range lengths now rather than at scan time
        CodeSpace::new(lengths.iter().copied()).map_err(ConfigError::Length)?;

        let reserved = if args.no_reserve {
            Vec::new()
        } else {
            args.reserve
                .iter()
                .map(|text| parse_code(text))
                .collect::<Result<Vec<_>, _>>()?
        };

        let start_at = match args.start_at.as_deref() {
            Some(text) => {
                let code = parse_code(text)?;
                if !lengths.contains(&code.len()) {
                    return Err(ConfigError::StartLength {
                        code: text.to_string(),
                        len: code.len(),
                    });
                }
                Some(code)
            }
            None => None,
        };

        Ok(ScanConfig {
            base_url: args.base_url,
            output: args.output,
            concurrency: args.concurrency,
            batch_size: args.batch_size,
            lengths,
            head_timeout: Duration::from_secs(args.head_timeout_secs),
            fetch_timeout: Duration::from_secs(args.fetch_timeout_secs),
            delay: Duration::from_millis(args.delay_ms),
            reserved,
            start_at,
            use_head: !args.no_head,
            title_suffix: args.title_suffix,
            max_error_len: args.max_error_len,
            resume: if args.fresh {
                ResumePolicy::Fresh
            } else {
                ResumePolicy::Resume
            },
            json: args.json,
        })
    }

    /// The generator for this scan.
    pub fn code_space(&self) -> Result<CodeSpace, ConfigError> {
        let space = CodeSpace::new(self.lengths.iter().copied())
            .map_err(ConfigError::Length)?
            .with_reserved(self.reserved.iter().copied());
        Ok(match self.start_at {
            Some(code) => space.starting_at(code),
            None => space,
        })
    }

    pub fn probe_settings(&self) -> ProbeSettings {
        ProbeSettings {
            head_timeout: self.head_timeout,
            fetch_timeout: self.fetch_timeout,
            use_head: self.use_head,
            max_error_len: self.max_error_len,
            // One idle connection per possible in-flight probe
            pool_size: self.concurrency,
        }
    }
}

fn validate_base_url(base_url: &str) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::BaseUrl {
        url: base_url.to_string(),
        reason,
    };

    let url = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    Ok(())
}

fn parse_code(text: &str) -> Result<Code, ConfigError> {
    text.parse().map_err(|source| ConfigError::Code {
        text: text.to_string(),
        source,
    })
}
