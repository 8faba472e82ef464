// src/cli.rs
// =============================================================================
// Command-line interface, built with clap's derive API.
//
// Two subcommands:
// - scan: enumerate codes against the host and append results to a CSV
// - stats: summarize an existing results CSV
//
// Every option a scan understands is listed here, in one place. The parsed
// arguments are turned into an immutable ScanConfig (see config.rs) before
// anything runs.
// =============================================================================

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "code-harvester",
    version = "0.1.0",
    about = "Enumerate short base-36 codes on a host and harvest metadata from the ones that exist",
    long_about = "code-harvester probes {base-url}{code} for every code of the configured lengths, \
                  records which ones exist along with their title, duration, listens and downloads, \
                  and saves progress in batches so an interrupted scan can be resumed."
)]
pub struct Cli {
    /// Show debug logs (RUST_LOG overrides this)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Probe every code and append results to the output file
    ///
    /// Example: code-harvester scan --lengths 3 --concurrency 10
    Scan(ScanArgs),

    /// Summarize a results file
    ///
    /// Example: code-harvester stats --output instaudio_results.csv --top 20
    Stats {
        /// Results file to read
        #[arg(long, default_value = "instaudio_results.csv")]
        output: PathBuf,

        /// Output the summary as JSON instead of a table
        #[arg(long)]
        json: bool,

        /// How many of the most-listened entries to list
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ScanArgs {
    /// Address prefix; the code is appended as-is
    #[arg(long, default_value = "https://instaud.io/")]
    pub base_url: String,

    /// Results file (created with a header, appended to afterwards)
    #[arg(long, default_value = "instaudio_results.csv")]
    pub output: PathBuf,

    /// Maximum number of probes in flight
    #[arg(long, default_value_t = 15)]
    pub concurrency: usize,

    /// Results per write to the output file
    #[arg(long, default_value_t = 500)]
    pub batch_size: usize,

    /// Code lengths to scan, shortest first (e.g. --lengths 3,4)
    #[arg(long, value_delimiter = ',', default_values_t = [3, 4])]
    pub lengths: Vec<usize>,

    /// Timeout for the HEAD existence check
    #[arg(long, default_value_t = 10)]
    pub head_timeout_secs: u64,

    /// Timeout for fetching a page
    #[arg(long, default_value_t = 15)]
    pub fetch_timeout_secs: u64,

    /// Pause after each saved batch, in milliseconds (0 = no pause)
    #[arg(long, default_value_t = 500)]
    pub delay_ms: u64,

    /// Code that is never probed; repeat for more
    #[arg(long = "reserve", value_name = "CODE", default_value = "000")]
    pub reserve: Vec<String>,

    /// Do not exclude any codes (overrides --reserve)
    #[arg(long)]
    pub no_reserve: bool,

    /// First code to probe; shorter lengths and smaller codes are skipped
    #[arg(long, value_name = "CODE")]
    pub start_at: Option<String>,

    /// Skip the HEAD check and always GET
    #[arg(long)]
    pub no_head: bool,

    /// Suffix removed from page titles
    #[arg(long, default_value = " - Instaudio", allow_hyphen_values = true)]
    pub title_suffix: String,

    /// Longest error message kept in the error column
    #[arg(long, default_value_t = 100)]
    pub max_error_len: usize,

    /// Truncate the output file instead of resuming from it
    #[arg(long)]
    pub fresh: bool,

    /// Print the run summary as JSON
    #[arg(long)]
    pub json: bool,
}
