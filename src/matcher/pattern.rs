//! Pattern matching implementation.

use std::fmt;
use std::str::FromStr;

use crate::error::Result;

use super::validate;

/// Where in the address the pattern must appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    /// Match at the beginning of the address
    #[default]
    Start,
    /// Match at the end of the address
    End,
    /// Match anywhere in the address
    Anywhere,
}

impl FromStr for Position {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "start" | "prefix" | "begin" => Ok(Position::Start),
            "end" | "suffix" => Ok(Position::End),
            "anywhere" | "contains" | "any" => Ok(Position::Anywhere),
            _ => Err(format!("Unknown position: {}", s)),
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Position::Start => write!(f, "start"),
            Position::End => write!(f, "end"),
            Position::Anywhere => write!(f, "anywhere"),
        }
    }
}

/// A validated pattern.
///
/// Only constructible through [`Pattern::new`], so every instance satisfies
/// the length and alphabet rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    text: String,
    position: Position,
    case_sensitive: bool,
}

impl Pattern {
    /// Validates `text` and builds a pattern from it.
    pub fn new(text: impl Into<String>, position: Position, case_sensitive: bool) -> Result<Self> {
        let text = text.into();
        validate(&text)?;

        Ok(Self {
            text,
            position,
            case_sensitive,
        })
    }

    /// Returns the pattern text as requested.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns the pattern length in characters.
    pub fn len(&self) -> usize {
        // Validated patterns are ASCII.
        self.text.len()
    }

    /// Always false; validated patterns are non-empty.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    /// Tests an address against this pattern.
    #[inline]
    pub fn matches(&self, address: &str) -> bool {
        matches_pattern(address, &self.text, self.case_sensitive, self.position)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let case = if self.case_sensitive {
            "case-sensitive"
        } else {
            "case-insensitive"
        };
        write!(f, "{} ({}, {})", self.text, self.position, case)
    }
}

/// Tests `address` against `pattern`.
///
/// Case-insensitive comparison folds ASCII letters on both sides, which is
/// exact for base58 text.
#[inline]
pub fn matches_pattern(address: &str, pattern: &str, case_sensitive: bool, position: Position) -> bool {
    if case_sensitive {
        return match position {
            Position::Start => address.starts_with(pattern),
            Position::End => address.ends_with(pattern),
            Position::Anywhere => address.contains(pattern),
        };
    }

    let addr = address.as_bytes();
    let pat = pattern.as_bytes();
    if pat.len() > addr.len() {
        return false;
    }

    match position {
        Position::Start => addr[..pat.len()].eq_ignore_ascii_case(pat),
        Position::End => addr[addr.len() - pat.len()..].eq_ignore_ascii_case(pat),
        Position::Anywhere => {
            pat.is_empty() || addr.windows(pat.len()).any(|w| w.eq_ignore_ascii_case(pat))
        }
    }
}
