// src/sink/mod.rs
// =============================================================================
// This module persists probe results.
//
// Submodules:
// - csv_file: the results file (header on create, append afterwards)
//
// `BatchBuffer` sits in front of any `ResultSink`: results accumulate in
// memory and are written in one go when the buffer reaches its capacity,
// plus once more at the end of a run for whatever is left.
//
// Only the run controller owns a BatchBuffer. Probe futures never touch it;
// they hand their result back and the controller pushes it in.
// =============================================================================

mod csv_file;

use crate::error::SinkError;
use crate::probe::ProbeResult;

pub use csv_file::{load_rows, CsvSink, ResultRow};

/// Durable destination for results.
pub trait ResultSink {
    /// Writes every result in `batch`. On error nothing may be assumed
    /// about how much of the batch reached storage.
    fn write_batch(&mut self, batch: &[ProbeResult]) -> Result<(), SinkError>;
}

pub struct BatchBuffer<S: ResultSink> {
    sink: S,
    capacity: usize,
    pending: Vec<ProbeResult>,
    flushes: usize,
    written: u64,
}

impl<S: ResultSink> BatchBuffer<S> {
    pub fn new(sink: S, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        BatchBuffer {
            sink,
            capacity,
            pending: Vec::with_capacity(capacity),
            flushes: 0,
            written: 0,
        }
    }

    /// Adds a result, flushing if the buffer is now full.
    ///
    /// Returns `true` when this call flushed.
    pub fn accumulate(&mut self, result: ProbeResult) -> Result<bool, SinkError> {
        self.pending.push(result);
        if self.pending.len() >= self.capacity {
            self.flush()?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Writes and clears whatever is buffered. An empty buffer is a no-op.
    ///
    /// The buffer is kept intact if the write fails, so the caller may try
    /// again.
    pub fn flush(&mut self) -> Result<usize, SinkError> {
        if self.pending.is_empty() {
            return Ok(0);
        }
        self.sink.write_batch(&self.pending)?;

        let count = self.pending.len();
        self.pending.clear();
        self.flushes += 1;
        self.written += count as u64;
        Ok(count)
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of successful non-empty flushes so far.
    pub fn flushes(&self) -> usize {
        self.flushes
    }

    /// Results durably written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Keeps every batch in memory, in write order.
    #[derive(Default)]
    pub struct MemorySink {
        pub batches: Vec<Vec<ProbeResult>>,
    }

    impl MemorySink {
        pub fn rows(&self) -> impl Iterator<Item = &ProbeResult> {
            self.batches.iter().flatten()
        }
    }

    impl ResultSink for MemorySink {
        fn write_batch(&mut self, batch: &[ProbeResult]) -> Result<(), SinkError> {
            self.batches.push(batch.to_vec());
            Ok(())
        }
    }

    /// Fails every write and counts the attempts.
    #[derive(Default)]
    pub struct BrokenSink {
        pub attempts: usize,
    }

    impl ResultSink for BrokenSink {
        fn write_batch(&mut self, _batch: &[ProbeResult]) -> Result<(), SinkError> {
            self.attempts += 1;
            Err(SinkError::Io {
                path: "broken.csv".into(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{BrokenSink, MemorySink};
    use super::*;
    use crate::codes::Code;
    use crate::probe::Outcome;

    fn result(value: u64) -> ProbeResult {
        let code = Code::new(3, value).unwrap();
        ProbeResult {
            code,
            url: format!("https://example.com/{}", code),
            outcome: Outcome::Missing { status: 404 },
        }
    }

    #[test]
    fn test_full_buffer_flushes_once() {
        let mut buffer = BatchBuffer::new(MemorySink::default(), 5);
        let mut flushed = 0;
        for value in 0..5 {
            if buffer.accumulate(result(value)).unwrap() {
                flushed += 1;
            }
        }

        assert_eq!(flushed, 1);
        assert_eq!(buffer.pending(), 0);
        assert_eq!(buffer.flushes(), 1);
        assert_eq!(buffer.sink().batches.len(), 1);
        assert_eq!(buffer.sink().batches[0].len(), 5);
    }

    #[test]
    fn test_partial_batch_flushes_at_end() {
        let mut buffer = BatchBuffer::new(MemorySink::default(), 5);
        for value in 0..4 {
            assert!(!buffer.accumulate(result(value)).unwrap());
        }
        assert!(buffer.sink().batches.is_empty());

        assert_eq!(buffer.flush().unwrap(), 4);
        assert_eq!(buffer.sink().batches.len(), 1);
        assert_eq!(buffer.sink().batches[0].len(), 4);
        assert_eq!(buffer.written(), 4);
    }

    #[test]
    fn test_empty_flush_writes_nothing() {
        let mut buffer = BatchBuffer::new(MemorySink::default(), 5);
        assert_eq!(buffer.flush().unwrap(), 0);
        assert!(buffer.sink().batches.is_empty());
        assert_eq!(buffer.flushes(), 0);
    }

    #[test]
    fn test_failed_flush_keeps_the_rows() {
        let mut buffer = BatchBuffer::new(BrokenSink::default(), 2);
        buffer.accumulate(result(0)).unwrap();
        assert!(buffer.accumulate(result(1)).is_err());

        assert_eq!(buffer.pending(), 2);
        assert_eq!(buffer.written(), 0);
        assert!(buffer.flush().is_err());
        assert_eq!(buffer.sink().attempts, 2);
    }

    #[test]
    fn test_zero_capacity_is_treated_as_one() {
        let mut buffer = BatchBuffer::new(MemorySink::default(), 0);
        assert_eq!(buffer.capacity(), 1);
        assert!(buffer.accumulate(result(7)).unwrap());
    }
}
