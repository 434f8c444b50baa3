//! Pattern matching for base58 addresses.
//!
//! Supports three placements:
//! - Start: match at the start of the address
//! - End: match at the end of the address
//! - Anywhere: match anywhere in the address
//!
//! Patterns are validated against the base58 alphabet before they can be
//! constructed, and their expected search cost is estimated up front.

mod complexity;
mod pattern;
mod validate;

pub use complexity::{difficulty_description, Complexity, ComplexityEstimator};
pub use pattern::{matches_pattern, Pattern, Position};
pub use validate::{is_base58, validate, BASE58_ALPHABET, MAX_PATTERN_LEN, MIN_PATTERN_LEN};
