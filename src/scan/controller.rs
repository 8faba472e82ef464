// src/scan/controller.rs
// =============================================================================
// The run controller.
//
// For each configured length, shortest first:
//   Idle -> Scanning(L) -> Draining(L) -> next L ... -> Done
//
// - Scanning: codes of length L (minus the ones already recorded) go through
//   the scheduler; each finished result is counted and pushed into the
//   batch buffer, which writes a batch whenever it fills up.
// - Draining: the stream for L has ended; the partial batch is written.
//
// On Ctrl-C the scheduler stops admitting codes, in-flight probes finish,
// the buffer is drained and the run ends with `interrupted = true`.
//
// After each full batch the scheduler is told to hold new admissions for
// the configured delay; results of requests already sent keep flowing in.
//
// A sink failure ends the run: we try one more flush of what is still
// buffered, then return the original error.
// =============================================================================

use super::{Scheduler, ShutdownSignal};
use crate::codes::{Code, CodeSpace};
use crate::error::{HarvestError, SinkError};
use crate::probe::{Outcome, ProbeResult, Prober};
use crate::sink::{BatchBuffer, ResultSink};
use futures::StreamExt;
use serde::Serialize;
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunPhase {
    Idle,
    Scanning { length: usize },
    Draining { length: usize },
    Done,
}

/// Running totals for a scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    pub probed: u64,
    pub found: u64,
    pub missing: u64,
    pub failed: u64,
    /// Codes not probed because they were already recorded
    pub skipped: u64,
}

impl ScanStats {
    fn record(&mut self, result: &ProbeResult) {
        self.probed += 1;
        match result.outcome {
            Outcome::Found(_) => self.found += 1,
            Outcome::Missing { .. } => self.missing += 1,
            Outcome::Failed { .. } => self.failed += 1,
        }
    }
}

/// What a finished (or stopped) run reports back.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    #[serde(flatten)]
    pub stats: ScanStats,
    pub flushes: usize,
    pub written: u64,
    pub completed_lengths: Vec<usize>,
    /// True when the operator stopped the run before every length finished
    pub interrupted: bool,
    pub elapsed: Duration,
}

pub struct Harvester<P: Prober + ?Sized, S: ResultSink> {
    space: CodeSpace,
    scheduler: Scheduler<P>,
    batch: BatchBuffer<S>,
    recorded: HashSet<Code>,
    delay: Duration,
    shutdown: ShutdownSignal,
    phase: RunPhase,
}

impl<P: Prober + ?Sized, S: ResultSink> Harvester<P, S> {
    pub fn new(
        space: CodeSpace,
        scheduler: Scheduler<P>,
        batch: BatchBuffer<S>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Harvester {
            space,
            scheduler,
            batch,
            recorded: HashSet::new(),
            delay: Duration::ZERO,
            shutdown,
            phase: RunPhase::Idle,
        }
    }

    /// Codes that already have a row and must not be probed again.
    pub fn with_recorded(mut self, recorded: HashSet<Code>) -> Self {
        self.recorded = recorded;
        self
    }

    /// Stop admitting new codes for `delay` after each batch is written.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn sink(&self) -> &S {
        self.batch.sink()
    }

    pub async fn run(&mut self) -> Result<RunSummary, HarvestError> {
        let started = Instant::now();
        let mut stats = ScanStats::default();
        let mut completed_lengths = Vec::new();
        let mut interrupted = false;

        let lengths = self.space.lengths().to_vec();
        for length in lengths {
            if self.shutdown.is_triggered() {
                interrupted = true;
                break;
            }

            // Recorded codes of this length that the space would produce
            let already = self
                .recorded
                .iter()
                .filter(|code| code.len() == length && self.space.contains(**code))
                .count() as u64;
            let expected = self.space.count_of_length(length) - already;
            stats.skipped += already;

            self.enter(RunPhase::Scanning { length });
            info!(
                length,
                expected,
                skipped = already,
                concurrency = self.scheduler.limit(),
                batch_size = self.batch.capacity(),
                "scanning codes"
            );

            let mut probed_here = 0u64;
            {
                let recorded = &self.recorded;
                let codes = self
                    .space
                    .codes_of_length(length)
                    .filter(move |code| !recorded.contains(code));
                let results = self.scheduler.run(codes);
                futures::pin_mut!(results);

                while let Some(result) = results.next().await {
                    probed_here += 1;
                    stats.record(&result);

                    // `true` means this result filled the buffer and a
                    // batch went to disk
                    if accumulate(&mut self.batch, result)? {
                        info!(
                            flushes = self.batch.flushes(),
                            probed = stats.probed,
                            found = stats.found,
                            "batch saved"
                        );
                        // Only admissions wait. We go straight back to
                        // polling so answers already on the way are read.
                        self.scheduler.pause_for(self.delay);
                    }
                }
            }

            self.enter(RunPhase::Draining { length });
            let tail = drain(&mut self.batch)?;
            debug!(length, rows = tail, "final batch for length saved");

            // Fewer results than codes means the stream was cut short
            if probed_here < expected {
                warn!(
                    length,
                    probed = probed_here,
                    expected,
                    "scan stopped early; rerun to resume"
                );
                interrupted = true;
                break;
            }
            completed_lengths.push(length);
            self.enter(RunPhase::Idle);
        }

        // Covers the break paths above; a no-op when nothing is buffered
        drain(&mut self.batch)?;
        self.enter(RunPhase::Done);

        Ok(RunSummary {
            stats,
            flushes: self.batch.flushes(),
            written: self.batch.written(),
            completed_lengths,
            interrupted,
            elapsed: started.elapsed(),
        })
    }

    // Phases only drive logging; nothing branches on them.
    fn enter(&mut self, phase: RunPhase) {
        debug!(from = ?self.phase, to = ?phase, "run phase");
        self.phase = phase;
    }
}

// Pushes one result into the buffer. If the resulting flush fails, one more
// attempt is made before the original error is returned.
fn accumulate<S: ResultSink>(
    batch: &mut BatchBuffer<S>,
    result: ProbeResult,
) -> Result<bool, HarvestError> {
    batch
        .accumulate(result)
        .or_else(|e| salvage(batch, e).map(|_| true))
}

fn drain<S: ResultSink>(batch: &mut BatchBuffer<S>) -> Result<usize, HarvestError> {
    batch.flush().or_else(|e| salvage(batch, e))
}

fn salvage<S: ResultSink>(batch: &mut BatchBuffer<S>, cause: SinkError) -> Result<usize, HarvestError> {
    error!(error = %cause, pending = batch.pending(), "writing results failed, retrying once");
    match batch.flush() {
        Ok(count) => {
            warn!(rows = count, "retry succeeded, stopping anyway");
        }
        Err(retry) => {
            error!(error = %retry, pending = batch.pending(), "retry failed, buffered results not saved");
        }
    }
    Err(cause.into())
}

// -----------------------------------------------------------------------------
// BEGINNER NOTES:
//
// 1. Why is the stream created inside its own { } block?
//    - `codes` borrows self.recorded and self.space
//    - `self.enter(..)` needs &mut self
//    - Ending the block drops the stream and its borrows first
//
// 2. What does futures::pin_mut! do?
//    - The stream built by the scheduler is not Unpin
//    - .next() needs a pinned stream, so we pin it on the stack
//
// 3. Why count probed_here against expected?
//    - The scheduler just ends the stream after a Ctrl-C
//    - Comparing the count is how we learn the length was not finished
//
// 4. Why are accumulate/drain/salvage free functions?
//    - They only need the BatchBuffer, not the whole Harvester
//    - Borrowing one field keeps the borrow checker happy while the stream
//      still holds other fields
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{HttpProber, Metadata, PageExtractor, ProbeSettings};
    use crate::sink::testing::{BrokenSink, MemorySink};
    use httpmock::Method::HEAD;
    use httpmock::MockServer;
    use crate::sink::{load_rows, CsvSink};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;

    /// Every seventh code exists. Optionally trips the shutdown signal once
    /// a number of probes have completed.
    struct FakeProber {
        completed: AtomicU64,
        stop_after: Option<(u64, ShutdownSignal)>,
    }

    impl FakeProber {
        fn new() -> Self {
            FakeProber {
                completed: AtomicU64::new(0),
                stop_after: None,
            }
        }

        fn stopping_after(count: u64, signal: ShutdownSignal) -> Self {
            FakeProber {
                completed: AtomicU64::new(0),
                stop_after: Some((count, signal)),
            }
        }
    }

    #[async_trait]
    impl Prober for FakeProber {
        async fn probe(&self, code: Code) -> ProbeResult {
            tokio::task::yield_now().await;

            let outcome = if code.value() % 7 == 0 {
                Outcome::Found(Metadata {
                    title: format!("clip {}", code),
                    duration: "01:00".to_string(),
                    duration_seconds: 60,
                    listens: "1".to_string(),
                    downloads: "0".to_string(),
                })
            } else {
                Outcome::Missing { status: 404 }
            };

            let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some((limit, signal)) = &self.stop_after {
                if done >= *limit {
                    signal.trigger();
                }
            }

            ProbeResult {
                code,
                url: format!("http://test/{}", code),
                outcome,
            }
        }
    }

    fn harvester<S: ResultSink>(
        lengths: &[usize],
        prober: FakeProber,
        sink: S,
        batch_size: usize,
        shutdown: ShutdownSignal,
    ) -> Harvester<FakeProber, S> {
        let space = CodeSpace::new(lengths.iter().copied()).unwrap();
        let scheduler = Scheduler::new(Arc::new(prober), 16, shutdown.clone());
        Harvester::new(space, scheduler, BatchBuffer::new(sink, batch_size), shutdown)
    }

    fn unique_codes<'a>(rows: impl Iterator<Item = &'a ProbeResult>) -> (usize, usize) {
        let codes: Vec<Code> = rows.map(|r| r.code).collect();
        let unique: HashSet<Code> = codes.iter().copied().collect();
        (codes.len(), unique.len())
    }

    #[tokio::test]
    async fn test_full_run_records_every_code() {
        let mut run = harvester(
            &[1, 2],
            FakeProber::new(),
            MemorySink::default(),
            100,
            ShutdownSignal::new(),
        );
        let summary = run.run().await.unwrap();

        let total = 36 + 36 * 36;
        assert!(!summary.interrupted);
        assert_eq!(summary.completed_lengths, vec![1, 2]);
        assert_eq!(summary.stats.probed, total);
        assert_eq!(summary.written, total);
        // 0, 7, ... 35 for length 1 and 0, 7, ... 1295 for length 2
        assert_eq!(summary.stats.found, 6 + 186);
        assert_eq!(summary.stats.missing, total - 192);

        let (rows, unique) = unique_codes(run.sink().rows());
        assert_eq!(rows as u64, total);
        assert_eq!(unique, rows);
    }

    #[tokio::test]
    async fn test_exact_batch_flushes_once() {
        let mut run = harvester(
            &[1],
            FakeProber::new(),
            MemorySink::default(),
            36,
            ShutdownSignal::new(),
        );
        let summary = run.run().await.unwrap();

        assert_eq!(summary.flushes, 1);
        assert_eq!(run.sink().batches.len(), 1);
        assert_eq!(run.sink().batches[0].len(), 36);
    }

    #[tokio::test]
    async fn test_partial_batch_flushed_at_end() {
        let mut run = harvester(
            &[1],
            FakeProber::new(),
            MemorySink::default(),
            37,
            ShutdownSignal::new(),
        );
        let summary = run.run().await.unwrap();

        assert_eq!(summary.flushes, 1);
        assert_eq!(run.sink().batches[0].len(), 36);
    }

    #[tokio::test]
    async fn test_interrupt_keeps_every_completed_probe() {
        let shutdown = ShutdownSignal::new();
        let prober = FakeProber::stopping_after(2500, shutdown.clone());
        let mut run = harvester(&[3, 4], prober, MemorySink::default(), 2000, shutdown);

        let summary = run.run().await.unwrap();

        assert!(summary.interrupted);
        assert!(summary.completed_lengths.is_empty());
        assert!(summary.stats.probed >= 2500);
        assert!(summary.stats.probed < 2500 + 16);

        let batches = &run.sink().batches;
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 2000);
        assert!(batches[1].len() <= 2000);

        let (rows, unique) = unique_codes(run.sink().rows());
        assert_eq!(rows as u64, summary.stats.probed);
        assert_eq!(unique, rows);
    }

    #[tokio::test]
    async fn test_shutdown_before_start_probes_nothing() {
        let shutdown = ShutdownSignal::new();
        shutdown.trigger();
        let mut run = harvester(&[2], FakeProber::new(), MemorySink::default(), 10, shutdown);

        let summary = run.run().await.unwrap();

        assert!(summary.interrupted);
        assert_eq!(summary.stats.probed, 0);
        assert!(run.sink().batches.is_empty());
    }

    #[tokio::test]
    async fn test_recorded_codes_are_skipped() {
        let recorded: HashSet<Code> = (0..10).map(|v| Code::new(2, v).unwrap()).collect();
        let mut run = harvester(
            &[2],
            FakeProber::new(),
            MemorySink::default(),
            500,
            ShutdownSignal::new(),
        )
        .with_recorded(recorded.clone());

        let summary = run.run().await.unwrap();

        assert!(!summary.interrupted);
        assert_eq!(summary.stats.skipped, 10);
        assert_eq!(summary.stats.probed, 36 * 36 - 10);
        assert!(run.sink().rows().all(|r| !recorded.contains(&r.code)));
    }

    #[tokio::test]
    async fn test_sink_failure_stops_the_run() {
        let mut run = harvester(
            &[2],
            FakeProber::new(),
            BrokenSink::default(),
            50,
            ShutdownSignal::new(),
        );

        let err = run.run().await.unwrap_err();

        assert!(matches!(err, HarvestError::Sink(_)));
        // The failed flush plus one retry
        assert_eq!(run.sink().attempts, 2);
    }

    #[tokio::test]
    async fn test_resumed_run_adds_no_duplicates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("results.csv");

        // First run is stopped part way through
        let shutdown = ShutdownSignal::new();
        let prober = FakeProber::stopping_after(300, shutdown.clone());
        let mut first = harvester(&[2], prober, CsvSink::new(&path), 100, shutdown);
        let stopped = first.run().await.unwrap();
        assert!(stopped.interrupted);

        // Second run picks up what is on disk
        let recorded = CsvSink::new(&path).recorded_codes().unwrap();
        assert_eq!(recorded.len() as u64, stopped.stats.probed);
        let mut second = harvester(
            &[2],
            FakeProber::new(),
            CsvSink::new(&path),
            100,
            ShutdownSignal::new(),
        )
        .with_recorded(recorded);
        let finished = second.run().await.unwrap();
        assert!(!finished.interrupted);

        let rows = load_rows(&path).unwrap();
        let unique: HashSet<&str> = rows.iter().map(|r| r.code.as_str()).collect();
        assert_eq!(rows.len(), 36 * 36);
        assert_eq!(unique.len(), rows.len());
    }

    #[tokio::test]
    async fn test_pause_between_batches_keeps_requests_alive() {
        // Every answer arrives well inside the timeout, but the pause after
        // each batch is longer than the timeout
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(HEAD);
            then.status(404).delay(Duration::from_millis(30));
        });

        let settings = ProbeSettings {
            head_timeout: Duration::from_millis(200),
            fetch_timeout: Duration::from_millis(200),
            pool_size: 4,
            ..ProbeSettings::default()
        };
        let http = HttpProber::new(
            format!("{}/", server.base_url()),
            settings,
            Arc::new(PageExtractor::new("")),
        )
        .unwrap();

        let shutdown = ShutdownSignal::new();
        let scheduler = Scheduler::new(Arc::new(http), 4, shutdown.clone());
        let mut run = Harvester::new(
            CodeSpace::new([1]).unwrap(),
            scheduler,
            BatchBuffer::new(MemorySink::default(), 1),
            shutdown,
        )
        .with_delay(Duration::from_millis(300));

        let summary = run.run().await.unwrap();

        assert!(!summary.interrupted);
        assert_eq!(summary.stats.failed, 0, "answers were recorded as errors");
        assert_eq!(summary.stats.missing, 36);
        assert_eq!(summary.flushes, 36);
    }
}
