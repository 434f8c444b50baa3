//! Hand-off of winning keypairs to wallet storage.
//!
//! The engine keeps no copy of a result once it is delivered; encryption and
//! storage are the sink's concern.

use std::collections::BTreeMap;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::info;

use crate::error::{Result, VanityError};
use crate::worker::{GenerationRequest, GenerationResult};

/// Receives results of queued batch generations.
pub trait ResultSink: Send {
    fn deliver(&mut self, request: &GenerationRequest, result: GenerationResult) -> Result<()>;
}

/// A result together with the request that produced it.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub identifier: String,
    pub pattern: String,
    pub metadata: BTreeMap<String, String>,
    pub result: GenerationResult,
}

/// Forwards every result over a channel.
pub struct ChannelSink {
    tx: Sender<Delivery>,
}

impl ChannelSink {
    /// Creates the sink and the receiver its deliveries arrive on.
    pub fn new() -> (Self, Receiver<Delivery>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }
}

impl ResultSink for ChannelSink {
    fn deliver(&mut self, request: &GenerationRequest, result: GenerationResult) -> Result<()> {
        let delivery = Delivery {
            identifier: request.identifier.clone(),
            pattern: request.pattern.text().to_string(),
            metadata: request.metadata.clone(),
            result,
        };
        self.tx
            .send(delivery)
            .map_err(|_| VanityError::Sink("receiver dropped".into()))
    }
}

/// Logs the address and drops the secret material.
#[derive(Debug, Default)]
pub struct DiscardSink;

impl ResultSink for DiscardSink {
    fn deliver(&mut self, request: &GenerationRequest, result: GenerationResult) -> Result<()> {
        info!(
            identifier = %request.identifier,
            address = %result.public_key,
            "Discarding generated keypair"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;
    use crate::matcher::{Pattern, Position};
    use std::time::Duration;

    fn sample() -> (GenerationRequest, GenerationResult) {
        let pattern = Pattern::new("Ab", Position::Start, false).unwrap();
        let request = GenerationRequest::new(pattern, "wallet-7", Duration::from_secs(1));
        let (address, secret_key) = Keypair::generate().into_parts();
        let result = GenerationResult {
            public_key: address.into_string(),
            secret_key,
            worker_id: 0,
            attempts: 1,
            elapsed: Duration::from_millis(1),
        };
        (request, result)
    }

    #[test]
    fn test_channel_sink_forwards() {
        let (mut sink, rx) = ChannelSink::new();
        let (request, result) = sample();
        let address = result.public_key.clone();

        sink.deliver(&request, result).unwrap();
        let delivery = rx.try_recv().unwrap();
        assert_eq!(delivery.identifier, "wallet-7");
        assert_eq!(delivery.pattern, "Ab");
        assert_eq!(delivery.result.public_key, address);
    }

    #[test]
    fn test_channel_sink_reports_dropped_receiver() {
        let (mut sink, rx) = ChannelSink::new();
        drop(rx);
        let (request, result) = sample();
        assert_eq!(sink.deliver(&request, result).unwrap_err().code(), "SINK_ERROR");
    }
}
