// src/report.rs
// =============================================================================
// Summary of a results file, for the `stats` subcommand.
//
// A file appended to by older runs that did not skip recorded codes can hold
// more than one row per code, so duplicates are counted.
// =============================================================================

use crate::sink::ResultRow;
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopEntry {
    pub code: String,
    pub title: String,
    pub listens: u64,
    pub downloads: u64,
    pub duration: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultsReport {
    pub rows: usize,
    pub unique_codes: usize,
    pub duplicates: usize,
    pub found: usize,
    pub missing: usize,
    pub errors: usize,
    pub total_found_seconds: u64,
    pub top: Vec<TopEntry>,
}

/// Builds the report; `top` is how many found entries to rank by listens.
pub fn summarize(rows: &[ResultRow], top: usize) -> ResultsReport {
    let unique: HashSet<&str> = rows.iter().map(|row| row.code.as_str()).collect();

    let found: Vec<&ResultRow> = rows.iter().filter(|row| row.is_found()).collect();
    let errors = rows.iter().filter(|row| row.is_error()).count();

    let mut ranked: Vec<TopEntry> = found
        .iter()
        .map(|row| TopEntry {
            code: row.code.clone(),
            title: row.title.clone(),
            listens: row.listens.parse().unwrap_or(0),
            downloads: row.downloads.parse().unwrap_or(0),
            duration: row.duration.clone(),
        })
        .collect();
    ranked.sort_by(|a, b| b.listens.cmp(&a.listens).then_with(|| a.code.cmp(&b.code)));
    ranked.truncate(top);

    ResultsReport {
        rows: rows.len(),
        unique_codes: unique.len(),
        duplicates: rows.len() - unique.len(),
        found: found.len(),
        missing: rows.len() - found.len() - errors,
        errors,
        total_found_seconds: found.iter().filter_map(|row| row.duration_seconds).sum(),
        top: ranked,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(code: &str, status: &str, listens: &str, seconds: Option<u64>) -> ResultRow {
        ResultRow {
            code: code.to_string(),
            url: format!("https://example.com/{}", code),
            status: status.to_string(),
            title: format!("title {}", code),
            duration: String::new(),
            duration_seconds: seconds,
            listens: listens.to_string(),
            downloads: String::new(),
            error: String::new(),
        }
    }

    #[test]
    fn test_counts_and_ranking() {
        let rows = vec![
            row("001", "200", "5", Some(60)),
            row("002", "404", "", None),
            row("003", "200", "50", Some(125)),
            row("004", "ERROR", "", None),
            row("002", "404", "", None),
            row("005", "200", "50", None),
        ];

        let report = summarize(&rows, 2);

        assert_eq!(report.rows, 6);
        assert_eq!(report.unique_codes, 5);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.found, 3);
        assert_eq!(report.errors, 1);
        assert_eq!(report.missing, 2);
        assert_eq!(report.total_found_seconds, 185);

        let top: Vec<&str> = report.top.iter().map(|e| e.code.as_str()).collect();
        assert_eq!(top, vec!["003", "005"]);
    }

    #[test]
    fn test_empty_file() {
        let report = summarize(&[], 10);
        assert_eq!(report.rows, 0);
        assert!(report.top.is_empty());
    }
}
