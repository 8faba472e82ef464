// src/scan/mod.rs
// =============================================================================
// This module runs a scan: codes in, saved results out.
//
// Submodules:
// - scheduler: fans codes out to the prober, at most N in flight
// - controller: walks the lengths, feeds the batch buffer, tracks totals
// - shutdown: the flag Ctrl-C trips to stop a run cleanly
//
// Data flow:
//   CodeSpace -> Scheduler -> (ProbeResult stream) -> Harvester -> BatchBuffer
// =============================================================================

mod controller;
mod scheduler;
mod shutdown;

pub use controller::{Harvester, RunSummary};
pub use scheduler::Scheduler;
pub use shutdown::ShutdownSignal;
