//! Keypair generation and address encoding.
//!
//! This module provides:
//! - ed25519 key generation from the thread-local CSPRNG
//! - Base58 address encoding of the public key
//! - The `KeyGenerator` seam workers draw keypairs from

mod address;
mod keypair;

pub use address::Address;
pub use keypair::{Keypair, SecretKeyMaterial};

/// Source of uniformly random keypairs.
///
/// Workers treat the generator as opaque; the default is [`Ed25519Generator`].
pub trait KeyGenerator: Send + Sync + 'static {
    /// Produces one fresh keypair.
    fn generate(&self) -> Keypair;
}

/// Generates ed25519 keypairs with base58 addresses.
#[derive(Debug, Default, Clone, Copy)]
pub struct Ed25519Generator;

impl KeyGenerator for Ed25519Generator {
    #[inline]
    fn generate(&self) -> Keypair {
        Keypair::generate()
    }
}
