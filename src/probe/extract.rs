// src/probe/extract.rs
// =============================================================================
// This module turns a fetched page into `Metadata`.
//
// We use the `scraper` crate for the structured bits:
// - <title>: display title, with the site-name suffix removed
// - <time>: the inline duration marker ("2:05" or "1:02:03")
//
// and `regex` over the page's text for the counters:
// - "1,234 listens" -> "1234"
// - "56 downloads"  -> "56"
//
// The extraction rules sit behind the `MetadataExtractor` trait so the
// prober, scheduler and sink do not care what markup is being read.
// =============================================================================

use super::{Metadata, UNKNOWN_DURATION};
use regex::Regex;
use scraper::{Html, Selector};

/// Reads metadata from a page body. `None` means the body was unusable.
pub trait MetadataExtractor: Send + Sync {
    fn extract(&self, html: &str) -> Option<Metadata>;
}

/// Extractor for the audio pages we scan.
#[derive(Debug, Clone)]
pub struct PageExtractor {
    title_suffix: String,
    title: Selector,
    time: Selector,
    listens: Regex,
    downloads: Regex,
}

impl PageExtractor {
    /// `title_suffix` is stripped from the end of the page title
    /// (e.g. " - Instaudio").
    pub fn new(title_suffix: impl Into<String>) -> Self {
        PageExtractor {
            title_suffix: title_suffix.into(),
            // Constant selectors and patterns, known to be valid
            title: Selector::parse("title").unwrap(),
            time: Selector::parse("time").unwrap(),
            listens: Regex::new(r"(?i)(\d+(?:,\d+)*)\s*listen").unwrap(),
            downloads: Regex::new(r"(?i)(\d+(?:,\d+)*)\s*download").unwrap(),
        }
    }

    fn title_of(&self, document: &Html) -> String {
        let raw = document
            .select(&self.title)
            .next()
            .map(|el| el.text().collect::<String>())
            .unwrap_or_default();

        let raw = raw.trim_end();
        let title = raw
            .strip_suffix(self.title_suffix.as_str())
            .unwrap_or(raw)
            .trim();

        if title.is_empty() {
            "Unknown".to_string()
        } else {
            title.to_string()
        }
    }

    fn counter(pattern: &Regex, text: &str) -> String {
        pattern
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().replace(',', ""))
            .unwrap_or_else(|| "0".to_string())
    }
}

impl MetadataExtractor for PageExtractor {
    fn extract(&self, html: &str) -> Option<Metadata> {
        if html.trim().is_empty() {
            return None;
        }

        let document = Html::parse_document(html);

        let duration_raw = document
            .select(&self.time)
            .next()
            .map(|el| el.text().collect::<String>())
            .unwrap_or_default();
        let duration_seconds = parse_duration(&duration_raw);

        // Text nodes are concatenated as-is, so "1,234<b> listens</b>" still matches
        let page_text: String = document.root_element().text().collect();

        Some(Metadata {
            title: self.title_of(&document),
            duration: format_duration(duration_seconds),
            duration_seconds,
            listens: Self::counter(&self.listens, &page_text),
            downloads: Self::counter(&self.downloads, &page_text),
        })
    }
}

/// Parses "H:MM:SS" or "MM:SS" into whole seconds.
///
/// Components may be fractional ("2:05.7" is 125). Anything else, including
/// an empty string, gives 0.
pub fn parse_duration(text: &str) -> u64 {
    let text = text.trim();
    if !text.contains(':') {
        return 0;
    }

    let parts: Option<Vec<f64>> = text
        .split(':')
        .map(|part| {
            part.trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite() && *v >= 0.0)
        })
        .collect();

    let total = match parts.as_deref() {
        Some([h, m, s]) => h * 3600.0 + m * 60.0 + s,
        Some([m, s]) => m * 60.0 + s,
        _ => return 0,
    };
    total as u64
}

/// Renders seconds as "MM:SS", or "H:MM:SS" from one hour up.
/// Zero renders as the unknown marker.
pub fn format_duration(seconds: u64) -> String {
    if seconds == 0 {
        return UNKNOWN_DURATION.to_string();
    }
    let (hours, minutes, secs) = (seconds / 3600, (seconds % 3600) / 60, seconds % 60);
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}", minutes, secs)
    }
}
