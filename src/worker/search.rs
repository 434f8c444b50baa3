//! The search worker: generate a keypair, test it, repeat.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;

use crate::crypto::{KeyGenerator, Keypair};
use crate::matcher::Pattern;

/// The single terminal message a worker posts to its pool.
#[derive(Debug)]
pub enum WorkerMessage {
    /// The worker found a matching keypair and stopped.
    Found { worker_id: usize, keypair: Keypair },
    /// The worker panicked and stopped.
    Crashed { worker_id: usize, reason: String },
}

/// A worker that generates and tests keypairs until it matches or is cancelled.
///
/// The loop reads nothing shared but its cancellation flag, so any number of
/// workers can race the same pattern without synchronization.
pub struct SearchWorker {
    /// Worker ID
    id: usize,
    /// The pattern to match against
    pattern: Pattern,
    /// Keypair source
    generator: Arc<dyn KeyGenerator>,
    /// Channel for the terminal message
    events: Sender<WorkerMessage>,
    /// Set by the pool to stop this worker
    cancel: Arc<AtomicBool>,
}

impl SearchWorker {
    pub fn new(
        id: usize,
        pattern: Pattern,
        generator: Arc<dyn KeyGenerator>,
        events: Sender<WorkerMessage>,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        Self {
            id,
            pattern,
            generator,
            events,
            cancel,
        }
    }

    /// Runs the worker loop and returns the number of keypairs tested.
    ///
    /// Stops when:
    /// - A match is found (posts `Found`)
    /// - The cancellation flag is set (posts nothing)
    /// - The generator or matcher panics (posts `Crashed`)
    pub fn run(self) -> u64 {
        let mut attempts = 0u64;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.search(&mut attempts)));

        let message = match outcome {
            Ok(Some(keypair)) => WorkerMessage::Found {
                worker_id: self.id,
                keypair,
            },
            Ok(None) => return attempts,
            Err(payload) => WorkerMessage::Crashed {
                worker_id: self.id,
                reason: panic_reason(payload.as_ref()),
            },
        };

        // The pool may already have finished the race; nobody to tell then.
        let _ = self.events.send(message);
        attempts
    }

    fn search(&self, attempts: &mut u64) -> Option<Keypair> {
        while !self.cancel.load(Ordering::Relaxed) {
            let keypair = self.generator.generate();
            *attempts += 1;

            if self.pattern.matches(keypair.address().as_str()) {
                return Some(keypair);
            }
        }
        None
    }

    /// Returns the worker ID.
    pub fn id(&self) -> usize {
        self.id
    }
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Ed25519Generator;
    use crate::matcher::Position;
    use crossbeam_channel::unbounded;

    struct FailingGenerator;

    impl KeyGenerator for FailingGenerator {
        fn generate(&self) -> Keypair {
            panic!("entropy source unavailable");
        }
    }

    #[test]
    fn test_finds_match() {
        let (tx, rx) = unbounded();
        let pattern = Pattern::new("a", Position::Anywhere, false).unwrap();
        let worker = SearchWorker::new(
            3,
            pattern.clone(),
            Arc::new(Ed25519Generator),
            tx,
            Arc::new(AtomicBool::new(false)),
        );

        let attempts = worker.run();
        assert!(attempts >= 1);

        match rx.try_recv().unwrap() {
            WorkerMessage::Found { worker_id, keypair } => {
                assert_eq!(worker_id, 3);
                assert!(pattern.matches(keypair.address().as_str()));
            }
            other => panic!("unexpected message: {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_cancelled_worker_is_silent() {
        let (tx, rx) = unbounded();
        let pattern = Pattern::new("a".repeat(20), Position::Start, true).unwrap();
        let worker = SearchWorker::new(
            0,
            pattern,
            Arc::new(Ed25519Generator),
            tx,
            Arc::new(AtomicBool::new(true)),
        );

        assert_eq!(worker.run(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_panic_reported_as_crash() {
        let (tx, rx) = unbounded();
        let pattern = Pattern::new("abc", Position::Start, false).unwrap();
        let worker = SearchWorker::new(
            1,
            pattern,
            Arc::new(FailingGenerator),
            tx,
            Arc::new(AtomicBool::new(false)),
        );

        worker.run();
        match rx.try_recv().unwrap() {
            WorkerMessage::Crashed { worker_id, reason } => {
                assert_eq!(worker_id, 1);
                assert_eq!(reason, "entropy source unavailable");
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }
}
