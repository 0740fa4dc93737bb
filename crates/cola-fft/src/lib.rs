//! Distributed real-to-complex 3D transforms on slab-decomposed grids.
//!
//! The x axis of an `nc³` grid is split into contiguous slabs, one per
//! worker. A [`FftGrid`] owns one buffer that is read either as the padded
//! real mesh or as the half-complex Fourier mesh, never both at once; the
//! [`Space`] flag records which. [`SlabFft`] transforms a grid in place
//! with every worker participating.
//!
//! Transforms are unnormalized: `forward` followed by `inverse` returns the
//! original field multiplied by `nc³`.

pub mod grid;
pub mod slab;
pub mod transform;

pub use grid::{FftGrid, GridArena, Space};
pub use slab::Slab;
pub use transform::SlabFft;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FftError {
    #[error("communication failed during transform: {0}")]
    Comm(#[from] cola_comm::CommError),

    #[error("grid size {nc} cannot be split among {workers} workers without an empty slab")]
    Decomposition { nc: usize, workers: usize },

    #[error("gathered {actual} values, expected {expected}")]
    GatherSize { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, FftError>;
