//! # sol_vanity
//!
//! Adaptive parallel search for base58 vanity wallet addresses.
//!
//! ## Architecture
//!
//! - `crypto`: ed25519 key generation and base58 address encoding
//! - `matcher`: Pattern validation, matching and cost estimation
//! - `worker`: Search workers, adaptive pool, task queue and statistics
//! - `engine`: The controller thread and its in-process API
//! - `sink`: Hand-off of generated keypairs
//! - `config`: Runtime configuration

pub mod config;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod matcher;
pub mod sink;
pub mod worker;

pub use config::{Config, EngineConfig};
pub use crypto::{Address, Ed25519Generator, KeyGenerator, Keypair, SecretKeyMaterial};
pub use engine::{Admission, Engine, SubmitOptions};
pub use error::{Result, VanityError};
pub use matcher::{Complexity, ComplexityEstimator, Pattern, Position};
pub use sink::{ChannelSink, Delivery, DiscardSink, ResultSink};
pub use worker::{Alert, AlertKind, AlertLevel, GenerationRequest, GenerationResult, PoolStatus};
