//! In-process multi-worker communicator.
//!
//! Workers are threads connected by one unbounded channel per ordered
//! (sender, receiver) pair, so per-pair FIFO ordering matches collective
//! calls one-to-one without tagging.

use std::any::Any;
use std::sync::Mutex;
use std::sync::mpsc::{Receiver, Sender, channel};

use crate::{CommError, Communicator, Result};

type Envelope = Box<dyn Any + Send>;

/// Builder for a set of connected in-process workers.
pub struct LocalCluster;

impl LocalCluster {
    /// Create `n` connected endpoints; endpoint `r` has rank `r`.
    ///
    /// Move each endpoint into the thread that runs that worker. When a
    /// worker panics its endpoint is dropped and every peer waiting on it
    /// gets [`CommError::Disconnected`].
    #[allow(clippy::new_ret_no_self)]
    pub fn new(n: usize) -> Vec<ThreadComm> {
        assert!(n > 0, "a cluster needs at least one worker");

        let mut senders: Vec<Vec<Sender<Envelope>>> = (0..n).map(|_| Vec::with_capacity(n)).collect();
        let mut receivers: Vec<Vec<Mutex<Receiver<Envelope>>>> =
            (0..n).map(|_| Vec::with_capacity(n)).collect();

        // Destination-major so each outbox and inbox fills in rank order
        for inbox in receivers.iter_mut() {
            for outbox in senders.iter_mut() {
                let (tx, rx) = channel();
                outbox.push(tx);
                inbox.push(Mutex::new(rx));
            }
        }

        senders
            .into_iter()
            .zip(receivers)
            .enumerate()
            .map(|(rank, (senders, receivers))| ThreadComm {
                rank,
                size: n,
                senders,
                receivers,
            })
            .collect()
    }
}

/// One worker's endpoint in a [`LocalCluster`].
pub struct ThreadComm {
    rank: usize,
    size: usize,
    /// `senders[dst]` delivers to rank `dst`.
    senders: Vec<Sender<Envelope>>,
    /// `receivers[src]` yields what rank `src` sent here.
    receivers: Vec<Mutex<Receiver<Envelope>>>,
}

impl std::fmt::Debug for ThreadComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadComm")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .finish()
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn all_to_all<T: Send + 'static>(&self, outgoing: Vec<Vec<T>>) -> Result<Vec<Vec<T>>> {
        if outgoing.len() != self.size {
            return Err(CommError::BufferCount {
                expected: self.size,
                actual: outgoing.len(),
            });
        }

        for (dst, buf) in outgoing.into_iter().enumerate() {
            self.senders[dst]
                .send(Box::new(buf))
                .map_err(|_| CommError::Disconnected { peer: dst })?;
        }

        let mut incoming = Vec::with_capacity(self.size);
        for (src, rx) in self.receivers.iter().enumerate() {
            let envelope = rx
                .lock()
                .map_err(|_| CommError::Disconnected { peer: src })?
                .recv()
                .map_err(|_| CommError::Disconnected { peer: src })?;
            let buf = envelope
                .downcast::<Vec<T>>()
                .map_err(|_| CommError::TypeMismatch { peer: src })?;
            incoming.push(*buf);
        }
        Ok(incoming)
    }

    fn abort(&self, reason: &str) -> ! {
        tracing::error!(rank = self.rank, reason, "aborting worker");
        panic!("worker {} aborted: {}", self.rank, reason)
    }
}
