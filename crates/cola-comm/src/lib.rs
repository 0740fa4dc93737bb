//! Coordination between the workers of a slab-decomposed simulation.
//!
//! Every collective used by the solvers is expressed through the single
//! [`Communicator::all_to_all`] primitive: reductions, gathers, and the
//! neighbour exchange of boundary particles. Two implementations exist:
//!
//! - [`SerialComm`]: a single worker talking to itself
//! - [`LocalCluster`]: several in-process workers connected by channels,
//!   one thread per worker
//!
//! # Example
//!
//! ```
//! use cola_comm::{Communicator, LocalCluster};
//!
//! let comms = LocalCluster::new(3);
//! let sums: Vec<f64> = std::thread::scope(|s| {
//!     let handles: Vec<_> = comms
//!         .iter()
//!         .map(|c| s.spawn(move || c.all_reduce_sum(c.rank() as f64 + 1.0).unwrap()))
//!         .collect();
//!     handles.into_iter().map(|h| h.join().unwrap()).collect()
//! });
//! assert_eq!(sums, vec![6.0, 6.0, 6.0]);
//! ```

pub mod local;
pub mod serial;

pub use local::{LocalCluster, ThreadComm};
pub use serial::SerialComm;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommError {
    #[error("worker {peer} disconnected")]
    Disconnected { peer: usize },

    #[error("message from worker {peer} has an unexpected type")]
    TypeMismatch { peer: usize },

    #[error("expected {expected} outgoing buffers, got {actual}")]
    BufferCount { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, CommError>;

/// Direction tag for the ring exchange between neighbouring slabs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// Collective operations among a fixed set of workers.
///
/// Ranks are `0..size()`; slab `r` lies between slabs `r - 1` and `r + 1`
/// on a periodic ring.
pub trait Communicator: Send + Sync {
    /// This worker's rank.
    fn rank(&self) -> usize;

    /// Number of workers.
    fn size(&self) -> usize;

    /// Send `outgoing[r]` to rank `r` for every rank and return what each
    /// rank sent here, indexed by sender.
    ///
    /// Every worker must call this the same number of times.
    fn all_to_all<T: Send + 'static>(&self, outgoing: Vec<Vec<T>>) -> Result<Vec<Vec<T>>>;

    /// Terminate the whole computation.
    fn abort(&self, reason: &str) -> !;

    /// Block until every worker reaches this point.
    fn barrier(&self) -> Result<()> {
        let outgoing = (0..self.size()).map(|_| Vec::<()>::new()).collect();
        self.all_to_all(outgoing).map(|_| ())
    }

    /// Sum over all workers, valid on rank 0 only.
    fn reduce_sum(&self, local: f64) -> Result<Option<f64>> {
        let total = self.all_reduce_sum(local)?;
        Ok((self.rank() == 0).then_some(total))
    }

    /// Sum over all workers, available on every rank.
    ///
    /// Terms are added in rank order so every worker gets a bit-identical
    /// result.
    fn all_reduce_sum(&self, local: f64) -> Result<f64> {
        let outgoing = (0..self.size()).map(|_| vec![local]).collect();
        let incoming = self.all_to_all(outgoing)?;
        Ok(incoming.into_iter().flatten().sum())
    }

    /// Concatenate every worker's `local` buffer in rank order.
    fn all_gather<T: Clone + Send + 'static>(&self, local: Vec<T>) -> Result<Vec<T>> {
        let outgoing = (0..self.size()).map(|_| local.clone()).collect();
        let incoming = self.all_to_all(outgoing)?;
        Ok(incoming.into_iter().flatten().collect())
    }

    /// Rank of the left neighbour on the periodic ring.
    fn left(&self) -> usize {
        (self.rank() + self.size() - 1) % self.size()
    }

    /// Rank of the right neighbour on the periodic ring.
    fn right(&self) -> usize {
        (self.rank() + 1) % self.size()
    }

    /// Bidirectional exchange with the two neighbouring slabs.
    ///
    /// Returns `(from_left, from_right)`: what the left neighbour sent to
    /// its right, and what the right neighbour sent to its left. With one
    /// or two workers the neighbours coincide; the direction tag keeps the
    /// streams apart.
    fn exchange_with_neighbors<T: Send + 'static>(
        &self,
        to_left: Vec<T>,
        to_right: Vec<T>,
    ) -> Result<(Vec<T>, Vec<T>)> {
        let mut outgoing: Vec<Vec<(Side, T)>> = (0..self.size()).map(|_| Vec::new()).collect();
        let (left, right) = (self.left(), self.right());
        outgoing[left].extend(to_left.into_iter().map(|t| (Side::Left, t)));
        outgoing[right].extend(to_right.into_iter().map(|t| (Side::Right, t)));

        let incoming = self.all_to_all(outgoing)?;

        let mut from_left = Vec::new();
        let mut from_right = Vec::new();
        for (src, messages) in incoming.into_iter().enumerate() {
            for (side, t) in messages {
                // A message travelling right arrives from our left neighbour
                match side {
                    Side::Right if src == left => from_left.push(t),
                    Side::Left if src == right => from_right.push(t),
                    _ => {}
                }
            }
        }
        Ok((from_left, from_right))
    }
}
