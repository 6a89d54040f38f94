//! Fractional-indexing sort keys.
//!
//! List entries are ordered by an opaque base-36 string key. Reordering an
//! entry assigns it a key strictly between its new neighbors' keys, so
//! siblings never need renumbering and concurrent reorders of different
//! entries cannot collide.
//!
//! Keys are compared as plain byte strings. Generated keys never end in the
//! zero digit, so a key can always be extended on a later insert.

use thiserror::Error;

const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const BASE: u32 = 36;

/// Errors from sort-key generation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SortKeyError {
    /// A bound contains a character outside `[0-9a-z]`.
    #[error("sort key contains invalid character")]
    InvalidCharacter,
    /// The lower bound is not strictly below the upper bound.
    #[error("lower sort key must be strictly below upper sort key")]
    BoundsOutOfOrder,
}

fn digit_value(c: u8) -> Result<u32, SortKeyError> {
    match c {
        b'0'..=b'9' => Ok(u32::from(c - b'0')),
        b'a'..=b'z' => Ok(u32::from(c - b'a') + 10),
        _ => Err(SortKeyError::InvalidCharacter),
    }
}

fn digit_char(value: u32) -> char {
    debug_assert!(value < BASE);
    char::from(ALPHABET[value as usize])
}

fn validate(key: &str) -> Result<(), SortKeyError> {
    key.bytes().try_for_each(|c| digit_value(c).map(|_| ()))
}

/// The key assigned to the first entry of an empty list.
#[must_use]
pub fn initial() -> String {
    // Midpoint of the whole key space.
    digit_char(BASE / 2).to_string()
}

/// Generate a key strictly between `low` and `high`.
///
/// `None` for `low` means "before everything"; `None` for `high` means
/// "after everything".
///
/// # Errors
///
/// Returns an error if either bound contains a character outside `[0-9a-z]`
/// or if `low >= high`.
pub fn between(low: Option<&str>, high: Option<&str>) -> Result<String, SortKeyError> {
    let low = low.unwrap_or("");
    // Empty high bound stands for +infinity: digits past its end read as BASE.
    let high = high.unwrap_or("");
    validate(low)?;
    validate(high)?;
    if !high.is_empty() && low >= high {
        return Err(SortKeyError::BoundsOutOfOrder);
    }

    let low_digit = |i: usize| low.as_bytes().get(i).map_or(Ok(0), |&c| digit_value(c));
    let high_digit = |i: usize| {
        high.as_bytes()
            .get(i)
            .map_or(Ok(BASE), |&c| digit_value(c))
    };

    let mut key = String::new();
    let mut i = 0;
    loop {
        let lo = low_digit(i)?;
        let hi = high_digit(i)?;
        if hi >= lo + 2 {
            key.push(digit_char(lo.midpoint(hi)));
            return Ok(key);
        }
        if hi == lo + 1 {
            // Pin this digit to the low bound, then find room above the rest
            // of the low key.
            key.push(digit_char(lo));
            loop {
                i += 1;
                let lo = low_digit(i)?;
                if lo == BASE - 1 {
                    key.push(digit_char(lo));
                    continue;
                }
                key.push(digit_char(lo.midpoint(BASE)));
                return Ok(key);
            }
        }
        // Digits agree; copy and move on.
        key.push(digit_char(lo));
        i += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_between(low: Option<&str>, high: Option<&str>) -> String {
        let key = between(low, high).expect("key should be generated");
        if let Some(low) = low {
            assert!(key.as_str() > low, "{key} should sort after {low}");
        }
        if let Some(high) = high {
            assert!(key.as_str() < high, "{key} should sort before {high}");
        }
        key
    }

    #[test]
    fn generates_midpoints() {
        assert_eq!(between(None, None).expect("key"), "i");
        assert_between(Some("a"), Some("b"));
        assert_between(Some("a"), Some("ab"));
        assert_between(Some("az"), Some("b"));
        assert_between(None, Some("05"));
        assert_between(Some("z"), None);
    }

    #[test]
    fn repeated_inserts_at_the_end_stay_ordered() {
        let mut last = initial();
        for _ in 0..50 {
            let next = assert_between(Some(&last), None);
            last = next;
        }
    }

    #[test]
    fn repeated_inserts_between_two_keys_stay_ordered() {
        let mut low = "a".to_string();
        let high = "b".to_string();
        for _ in 0..50 {
            low = assert_between(Some(&low), Some(&high));
        }
    }

    #[test]
    fn rejects_bad_bounds() {
        assert_eq!(
            between(Some("b"), Some("a")),
            Err(SortKeyError::BoundsOutOfOrder)
        );
        assert_eq!(
            between(Some("A"), None),
            Err(SortKeyError::InvalidCharacter)
        );
    }

    #[test]
    fn keys_never_end_in_zero() {
        for (low, high) in [(None, Some("01")), (Some("0z"), Some("1")), (None, None)] {
            let key = between(low, high).expect("key");
            assert!(!key.ends_with('0'), "{key} must not end in zero digit");
        }
    }
}
