// src/scan/scheduler.rs
// =============================================================================
// Bounded-concurrency fan-out.
//
// Given an iterator of codes, returns a stream of finished ProbeResults in
// completion order (not submission order). At most `limit` probes are in
// flight at once:
//
//   stream::iter(codes)       codes are pulled lazily, in ascending order
//     .then(gate)             hold the next code while a pause is active
//     .take_while(!shutdown)  stop admitting once the operator asks
//     .map(probe)             one future per code
//     .buffer_unordered(N)    run up to N, yield as they finish
//
// buffer_unordered only pulls the next code when a slot is free, so a full
// window waits for a completion before admitting more work (backpressure).
// After a shutdown, probes already in the window still run to completion
// (or to their own timeout) and are yielded before the stream ends.
//
// A pause (see `pause_for`) only blocks the pull of the next code. The
// window keeps being polled while the gate waits, so requests already sent
// are read as their answers arrive and their timers never see the pause.
//
// A failed probe is just another result here; nothing is retried.
// =============================================================================

use super::ShutdownSignal;
use crate::codes::Code;
use crate::probe::{ProbeResult, Prober};
use futures::future;
use futures::stream::{self, Stream, StreamExt};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Holds back admissions until a deadline passes.
///
/// Cloned into the stream returned by `Scheduler::run`, so a pause set
/// while a scan is running applies to the very next admission.
#[derive(Debug, Clone, Default)]
struct AdmissionGate {
    until: Arc<Mutex<Option<Instant>>>,
}

impl AdmissionGate {
    fn close_for(&self, pause: Duration) {
        let deadline = Instant::now() + pause;
        let mut until = self.until.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // A shorter pause never cuts a longer one short
        if until.map_or(true, |current| current < deadline) {
            *until = Some(deadline);
        }
    }

    async fn wait(&self) {
        // Copy the deadline out so the lock is not held across the sleep
        let deadline = *self.until.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(deadline) = deadline {
            tokio::time::sleep_until(deadline).await;
        }
    }
}

pub struct Scheduler<P: Prober + ?Sized> {
    prober: Arc<P>,
    limit: usize,
    shutdown: ShutdownSignal,
    gate: AdmissionGate,
}

impl<P: Prober + ?Sized> Scheduler<P> {
    /// A limit of 0 is treated as 1.
    pub fn new(prober: Arc<P>, limit: usize, shutdown: ShutdownSignal) -> Self {
        Scheduler {
            prober,
            limit: limit.max(1),
            shutdown,
            gate: AdmissionGate::default(),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Admit no new codes for `pause`. Requests already in the window carry
    /// on and their results keep streaming out.
    pub fn pause_for(&self, pause: Duration) {
        if !pause.is_zero() {
            self.gate.close_for(pause);
        }
    }

    /// Probes every code from `codes` and streams the results back.
    pub fn run<'a, I>(&self, codes: I) -> impl Stream<Item = ProbeResult> + 'a
    where
        I: IntoIterator<Item = Code>,
        I::IntoIter: 'a,
        P: 'a,
    {
        let prober = Arc::clone(&self.prober);
        let shutdown = self.shutdown.clone();
        let gate = self.gate.clone();

        stream::iter(codes)
            .then(move |code| {
                let gate = gate.clone();
                async move {
                    gate.wait().await;
                    code
                }
            })
            .take_while(move |_| future::ready(!shutdown.is_triggered()))
            .map(move |code| {
                let prober = Arc::clone(&prober);
                async move { prober.probe(code).await }
            })
            .buffer_unordered(self.limit)
    }
}

// -----------------------------------------------------------------------------
// BEGINNER NOTES:
//
// 1. Why a stream and not a Vec of results?
//    - A 4-character scan is 1.6 million codes
//    - A stream hands each result to the controller as soon as it is ready,
//      so memory stays at "one window of probes + one batch"
//
// 2. Why is the prober behind an Arc?
//    - Each future needs its own handle to the prober
//    - Arc::clone only bumps a reference count
//    - P: ?Sized lets the same code hold an Arc<dyn Prober> too
//
// 3. Why take_while and not a check inside the probe?
//    - take_while sits before map, so once the flag is set no new future is
//      ever created
//    - Futures already in the window are not cancelled; dropping them halfway
//      would lose a finished HTTP exchange
//
// 4. Why does the pause live here and not in the controller?
//    - A sleeping controller stops polling the stream, and with it every
//      request in the window
//    - Those requests carry their own reqwest timeouts, which keep running
//    - A server that answered in 100 ms would then be recorded as a timeout
//    - The gate sits before take_while so a Ctrl-C during a pause is still
//      seen before the held code is admitted
// -----------------------------------------------------------------------------
