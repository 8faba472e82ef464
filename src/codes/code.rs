// src/codes/code.rs
// =============================================================================
// A single identifier.
//
// A code is stored as (length, value) rather than as text:
// - ordering is numeric and cheap (derive(Ord) compares length, then value)
// - "zero-padded to L digits" is just a Display detail
// - hashing for the resume set is two integers
//
// Example: length 3, value 46_655 renders as "zzz"; length 4, value 46_656
// renders as "1000".
// =============================================================================

use crate::error::CodeError;
use std::fmt;
use std::str::FromStr;

/// The 36 symbols a code is made of, in numeric order.
pub const ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Longest code we accept. 36^12 still fits in a u64.
pub const MAX_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Code {
    // Field order matters for derive(Ord): length first, then value
    len: u8,
    value: u64,
}

impl Code {
    /// Builds the code with the given length and numeric value.
    pub fn new(len: usize, value: u64) -> Result<Self, CodeError> {
        if len == 0 || len > MAX_LEN {
            return Err(CodeError::BadLength { len, max: MAX_LEN });
        }
        if value >= Self::capacity(len) {
            return Err(CodeError::OutOfRange { len, value });
        }
        Ok(Code {
            len: len as u8,
            value,
        })
    }

    /// Number of distinct codes of length `len` (36^len).
    pub fn capacity(len: usize) -> u64 {
        36u64.pow(len as u32)
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn value(&self) -> u64 {
        self.value
    }

    // Callers in this module have already range-checked `value`
    pub(crate) fn from_parts(len: usize, value: u64) -> Self {
        Code {
            len: len as u8,
            value,
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut digits = [b'0'; MAX_LEN];
        let mut n = self.value;
        for slot in digits[..self.len()].iter_mut().rev() {
            *slot = ALPHABET[(n % 36) as usize];
            n /= 36;
        }
        // Every byte comes from ALPHABET, so this is always ASCII
        let text = std::str::from_utf8(&digits[..self.len()]).map_err(|_| fmt::Error)?;
        f.write_str(text)
    }
}

impl FromStr for Code {
    type Err = CodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(CodeError::Empty);
        }
        let len = s.chars().count();
        if len > MAX_LEN {
            return Err(CodeError::BadLength { len, max: MAX_LEN });
        }

        let mut value = 0u64;
        for ch in s.chars() {
            let digit = ch
                .to_digit(36)
                .filter(|_| !ch.is_ascii_uppercase())
                .ok_or(CodeError::InvalidChar { ch })?;
            value = value * 36 + u64::from(digit);
        }
        Code::new(len, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_zero_padded() {
        assert_eq!(Code::new(3, 0).unwrap().to_string(), "000");
        assert_eq!(Code::new(3, 35).unwrap().to_string(), "00z");
        assert_eq!(Code::new(4, 46_656).unwrap().to_string(), "1000");
        assert_eq!(Code::new(3, 46_655).unwrap().to_string(), "zzz");
    }

    #[test]
    fn test_parse_matches_display() {
        for text in ["000", "a1b", "zzz", "1000", "3zzz", "0"] {
            let code: Code = text.parse().unwrap();
            assert_eq!(code.to_string(), text);
            assert_eq!(code.len(), text.len());
        }
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert_eq!("".parse::<Code>(), Err(CodeError::Empty));
        assert_eq!("ab-".parse::<Code>(), Err(CodeError::InvalidChar { ch: '-' }));
        assert_eq!("ABC".parse::<Code>(), Err(CodeError::InvalidChar { ch: 'A' }));
        assert!(matches!(
            "0123456789abc".parse::<Code>(),
            Err(CodeError::BadLength { len: 13, .. })
        ));
    }

    #[test]
    fn test_new_checks_range() {
        assert!(Code::new(3, Code::capacity(3)).is_err());
        assert!(Code::new(0, 0).is_err());
        assert!(Code::new(MAX_LEN, Code::capacity(MAX_LEN) - 1).is_ok());
    }

    #[test]
    fn test_order_is_length_then_value() {
        let short: Code = "zzz".parse().unwrap();
        let long: Code = "0000".parse().unwrap();
        assert!(short < long);
        assert!("a00".parse::<Code>().unwrap() < "a01".parse::<Code>().unwrap());
    }
}
