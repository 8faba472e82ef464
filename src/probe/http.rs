// src/probe/http.rs
// =============================================================================
// The real prober: checks whether {base_url}{code} exists and, if it does,
// reads its metadata.
//
// Flow for one code:
// 1. HEAD (optional fast path). Anything but 200 -> Missing, done. Most
//    codes end here, so this is the cheap path.
// 2. GET the page. Anything but 200 -> Missing.
// 3. Hand the body to the MetadataExtractor -> Found.
// Any reqwest error along the way (timeout, refused connection, bad body)
// becomes Failed with a short, truncated cause.
//
// One `Client` is shared by every concurrent probe. reqwest's Client is a
// handle around a connection pool, so probes reuse connections.
// =============================================================================

use super::{truncate_cause, MetadataExtractor, Outcome, ProbeResult, Prober};
use crate::codes::Code;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Knobs for a single probe.
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    pub head_timeout: Duration,
    pub fetch_timeout: Duration,
    /// Send a HEAD before the GET
    pub use_head: bool,
    pub max_error_len: usize,
    /// Idle connections kept per host; tracks the concurrency limit
    pub pool_size: usize,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        ProbeSettings {
            head_timeout: Duration::from_secs(10),
            fetch_timeout: Duration::from_secs(15),
            use_head: true,
            max_error_len: 100,
            pool_size: 15,
        }
    }
}

pub struct HttpProber {
    client: Client,
    base_url: String,
    settings: ProbeSettings,
    extractor: Arc<dyn MetadataExtractor>,
}

impl HttpProber {
    pub fn new(
        base_url: impl Into<String>,
        settings: ProbeSettings,
        extractor: Arc<dyn MetadataExtractor>,
    ) -> Result<Self, reqwest::Error> {
        // Built once here; every concurrent request shares its pool
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .pool_max_idle_per_host(settings.pool_size)
            // A redirect chain longer than this is reported as a failure
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;

        Ok(HttpProber {
            client,
            base_url: base_url.into(),
            settings,
            extractor,
        })
    }

    /// The resource address for a code: plain concatenation, the alphabet
    /// needs no escaping.
    pub fn url_for(&self, code: Code) -> String {
        format!("{}{}", self.base_url, code)
    }

    async fn check(&self, url: &str) -> Result<Outcome, reqwest::Error> {
        if self.settings.use_head {
            // HEAD has no body, so a 404 costs one small round trip
            let head = self
                .client
                .head(url)
                .timeout(self.settings.head_timeout)
                .send()
                .await?;
            if head.status() != StatusCode::OK {
                return Ok(Outcome::Missing {
                    status: head.status().as_u16(),
                });
            }
        }

        // The per-request timeout also covers reading the body
        let response = self
            .client
            .get(url)
            .timeout(self.settings.fetch_timeout)
            .send()
            .await?;
        if response.status() != StatusCode::OK {
            return Ok(Outcome::Missing {
                status: response.status().as_u16(),
            });
        }

        // text() decodes using the charset in Content-Type (UTF-8 by default)
        let body = response.text().await?;
        // The extractor returns None only when there is nothing to read
        Ok(match self.extractor.extract(&body) {
            Some(meta) => Outcome::Found(meta),
            None => Outcome::Failed {
                error: truncate_cause("empty or unreadable page", self.settings.max_error_len),
            },
        })
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, code: Code) -> ProbeResult {
        let url = self.url_for(code);

        // `?` inside check() stops at the first reqwest error; here that
        // error becomes an ordinary outcome
        let outcome = match self.check(&url).await {
            Ok(outcome) => outcome,
            Err(e) => Outcome::Failed {
                error: truncate_cause(&describe_error(&e), self.settings.max_error_len),
            },
        };
        debug!(%code, ?outcome, "probed");

        ProbeResult { code, url, outcome }
    }
}

// Short, human-readable cause for a transport failure. Never empty.
fn describe_error(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        "Request timed out".to_string()
    } else if error.is_redirect() {
        "Too many redirects".to_string()
    } else if error.is_connect() {
        format!("Connection failed: {}", error)
    } else {
        let text = error.to_string();
        if text.is_empty() {
            "Request failed".to_string()
        } else {
            text
        }
    }
}

// -----------------------------------------------------------------------------
// BEGINNER NOTES:
//
// 1. Why two timeouts instead of one on the Client?
//    - .timeout() on a request builder overrides the client default for
//      that request only
//    - HEAD should fail fast; a full page download gets longer
//
// 2. Why does check() return Result while probe() does not?
//    - Inside check(), `?` keeps the happy path flat
//    - probe() is the boundary: callers get a ProbeResult no matter what,
//      so one bad code never stops the scan
//
// 3. Why Arc<dyn MetadataExtractor>?
//    - The extractor is picked at start-up and shared by every request
//    - dyn lets tests or other sites plug in a different page parser without
//      making HttpProber generic
//
// 4. What does error.is_timeout() catch?
//    - Both the connect phase and a slow body; reqwest reports either as a
//      timeout once the per-request deadline passes
// -----------------------------------------------------------------------------
