//! Syntax checks for requested patterns.

use crate::error::{Result, VanityError};

/// The 58 address symbols: digits and letters minus `0`, `O`, `I` and `l`.
pub const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Shortest accepted pattern.
pub const MIN_PATTERN_LEN: usize = 1;

/// Longest accepted pattern. Anything longer is out of reach of brute force.
pub const MAX_PATTERN_LEN: usize = 20;

/// Returns true if `c` is one of the 58 address symbols.
#[inline]
pub fn is_base58(c: char) -> bool {
    c.is_ascii() && BASE58_ALPHABET.as_bytes().contains(&(c as u8))
}

/// Validates pattern text: length first, then alphabet membership.
pub fn validate(text: &str) -> Result<()> {
    let length = text.chars().count();
    if !(MIN_PATTERN_LEN..=MAX_PATTERN_LEN).contains(&length) {
        return Err(VanityError::InvalidLength {
            length,
            min: MIN_PATTERN_LEN,
            max: MAX_PATTERN_LEN,
        });
    }

    if let Some((index, character)) = text.chars().enumerate().find(|(_, c)| !is_base58(*c)) {
        return Err(VanityError::InvalidPattern { character, index });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_alphabet_has_58_symbols() {
        assert_eq!(BASE58_ALPHABET.len(), 58);
        for c in ['0', 'O', 'I', 'l'] {
            assert!(!is_base58(c), "{c} should be excluded");
        }
    }

    #[test]
    fn test_rejects_empty() {
        assert_eq!(
            validate(""),
            Err(VanityError::InvalidLength {
                length: 0,
                min: 1,
                max: 20
            })
        );
    }

    #[test]
    fn test_reports_first_bad_character() {
        assert_eq!(
            validate("abc0I"),
            Err(VanityError::InvalidPattern {
                character: '0',
                index: 3
            })
        );
    }

    #[test]
    fn test_length_checked_before_alphabet() {
        let err = validate(&"0".repeat(21)).unwrap_err();
        assert_eq!(err.code(), "INVALID_LENGTH");
    }

    #[test]
    fn test_non_ascii_rejected() {
        let err = validate("abé").unwrap_err();
        assert_eq!(err.code(), "INVALID_PATTERN");
    }

    proptest! {
        #[test]
        fn prop_alphabet_patterns_accepted(text in "[1-9A-HJ-NP-Za-km-z]{1,20}") {
            prop_assert!(validate(&text).is_ok());
        }

        #[test]
        fn prop_too_long_rejected(text in "[1-9A-HJ-NP-Za-km-z]{21,40}") {
            let is_length_error = matches!(validate(&text), Err(VanityError::InvalidLength { .. }));
            prop_assert!(is_length_error);
        }

        #[test]
        fn prop_foreign_character_rejected(
            prefix in "[1-9A-HJ-NP-Za-km-z]{0,9}",
            bad in "[0OIl_+/ -]",
            suffix in "[1-9A-HJ-NP-Za-km-z]{0,9}",
        ) {
            let text = format!("{prefix}{bad}{suffix}");
            let is_pattern_error = matches!(
                validate(&text),
                Err(VanityError::InvalidPattern { index, .. }) if index == prefix.len()
            );
            prop_assert!(is_pattern_error);
        }
    }
}
