// src/codes/space.rs
// =============================================================================
// The code generator.
//
// For each configured length L (ascending), yields every code of that length
// in increasing numeric order: 36^L codes, minus reserved ones, minus
// anything before the optional start code.
//
// The generator is restartable: calling `codes()` again starts over. It does
// not remember how far a previous run got; the run controller filters out
// codes that are already recorded.
// =============================================================================

use super::code::{Code, MAX_LEN};
use crate::error::CodeError;
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct CodeSpace {
    // Sorted ascending, no duplicates
    lengths: Vec<usize>,
    reserved: HashSet<Code>,
    start_at: Option<Code>,
}

impl CodeSpace {
    /// Creates a space over the given lengths. Order and duplicates in the
    /// input do not matter.
    pub fn new(lengths: impl IntoIterator<Item = usize>) -> Result<Self, CodeError> {
        let mut lengths: Vec<usize> = lengths.into_iter().collect();
        if let Some(&len) = lengths.iter().find(|&&len| len == 0 || len > MAX_LEN) {
            return Err(CodeError::BadLength { len, max: MAX_LEN });
        }
        lengths.sort_unstable();
        lengths.dedup();

        Ok(CodeSpace {
            lengths,
            reserved: HashSet::new(),
            start_at: None,
        })
    }

    /// Codes that are never emitted (e.g. the "000" placeholder).
    pub fn with_reserved(mut self, reserved: impl IntoIterator<Item = Code>) -> Self {
        self.reserved.extend(reserved);
        self
    }

    /// Skip every code that sorts before `code`.
    pub fn starting_at(mut self, code: Code) -> Self {
        self.start_at = Some(code);
        self
    }

    pub fn lengths(&self) -> &[usize] {
        &self.lengths
    }

    /// Every code of every configured length, shortest first.
    pub fn codes(&self) -> impl Iterator<Item = Code> + '_ {
        self.lengths
            .iter()
            .flat_map(move |&len| self.codes_of_length(len))
    }

    /// Every code of one length, ascending.
    pub fn codes_of_length(&self, len: usize) -> impl Iterator<Item = Code> + '_ {
        let (first, end) = self.bounds(len);
        (first..end)
            .map(move |value| Code::from_parts(len, value))
            .filter(move |code| !self.reserved.contains(code))
    }

    /// Whether `codes()` would yield `code`.
    pub fn contains(&self, code: Code) -> bool {
        let (first, end) = self.bounds(code.len());
        code.value() >= first && code.value() < end && !self.reserved.contains(&code)
    }

    /// How many codes `codes_of_length(len)` will yield.
    pub fn count_of_length(&self, len: usize) -> u64 {
        let (first, end) = self.bounds(len);
        let reserved = self
            .reserved
            .iter()
            .filter(|code| code.len() == len && code.value() >= first && code.value() < end)
            .count() as u64;
        (end - first) - reserved
    }

    // Value range [first, end) for one length after applying start_at.
    // Lengths that are not configured produce an empty range.
    fn bounds(&self, len: usize) -> (u64, u64) {
        if !self.lengths.contains(&len) {
            return (0, 0);
        }
        let end = Code::capacity(len);
        let first = match self.start_at {
            Some(start) if start.len() > len => end,
            Some(start) if start.len() == len => start.value(),
            _ => 0,
        };
        (first, end)
    }
}
