//! ed25519 keypair generation.

use std::fmt;

use ed25519_dalek::SigningKey;

use super::Address;

/// Secret material of a generated wallet: the 32-byte seed followed by the
/// 32-byte public key, the layout wallet tooling imports.
///
/// `Debug` never prints the bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKeyMaterial([u8; 64]);

impl SecretKeyMaterial {
    /// Returns the 32-byte ed25519 seed.
    pub fn seed(&self) -> &[u8] {
        &self.0[..32]
    }

    /// Returns the full 64-byte keypair bytes.
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    /// Base58 encoding of the full keypair bytes.
    pub fn to_base58(&self) -> String {
        bs58::encode(self.0).into_string()
    }
}

impl fmt::Debug for SecretKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKeyMaterial(<redacted>)")
    }
}

/// An ed25519 keypair with its derived address.
#[derive(Debug, Clone)]
pub struct Keypair {
    secret: SecretKeyMaterial,
    address: Address,
}

impl Keypair {
    /// Generates a new random keypair.
    ///
    /// Uses the thread-local cryptographically secure RNG.
    #[inline]
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut rand::thread_rng());
        Self::from_signing_key(&signing_key)
    }

    /// Rebuilds a keypair from a 32-byte seed.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self::from_signing_key(&SigningKey::from_bytes(&seed))
    }

    #[inline]
    fn from_signing_key(signing_key: &SigningKey) -> Self {
        let public = signing_key.verifying_key().to_bytes();

        let mut secret = [0u8; 64];
        secret[..32].copy_from_slice(&signing_key.to_bytes());
        secret[32..].copy_from_slice(&public);

        Self {
            secret: SecretKeyMaterial(secret),
            address: Address::from_bytes(public),
        }
    }

    /// Returns a reference to the derived address.
    #[inline]
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Returns the secret material.
    pub fn secret(&self) -> &SecretKeyMaterial {
        &self.secret
    }

    /// Splits the keypair into its address and secret material.
    pub fn into_parts(self) -> (Address, SecretKeyMaterial) {
        (self.address, self.secret)
    }
}
