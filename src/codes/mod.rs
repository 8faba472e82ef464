// src/codes/mod.rs
// =============================================================================
// The identifier space: short base-36 codes and the ordered set of them we
// probe.
//
// Submodules:
// - code: the `Code` type (length + numeric value, rendered zero-padded)
// - space: `CodeSpace`, the deterministic generator over configured lengths
//
// Enumeration order is fixed (shorter lengths first, ascending value inside
// a length) so a run can be resumed from what is already on disk.
// =============================================================================

mod code;
mod space;

pub use code::Code;
pub use space::CodeSpace;
