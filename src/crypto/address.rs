//! Base58 wallet address representation.

use std::fmt;

/// A 32-byte ed25519 public key together with its base58 text form.
///
/// The text is encoded once at construction since every search iteration
/// matches against it.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Address {
    bytes: [u8; 32],
    text: String,
}

impl Address {
    /// Creates an address from raw public key bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        let text = bs58::encode(bytes).into_string();
        Self { bytes, text }
    }

    /// Returns the raw public key bytes.
    #[inline]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// Returns the base58 text of the address.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Consumes the address, returning its base58 text.
    pub fn into_string(self) -> String {
        self.text
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.text)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_key_encodes_to_ones() {
        let addr = Address::from_bytes([0u8; 32]);
        assert_eq!(addr.as_str(), "11111111111111111111111111111111");
    }

    #[test]
    fn test_display_matches_text() {
        let addr = Address::from_bytes([7u8; 32]);
        assert_eq!(addr.to_string(), addr.as_str());
        assert!(format!("{:?}", addr).starts_with("Address("));
    }
}
