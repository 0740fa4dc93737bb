//! One-dimensional block decomposition of the grid's x axis.

use crate::{FftError, Result};

/// The contiguous range of x planes owned by one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slab {
    /// Global grid points per dimension.
    pub nc: usize,
    /// Number of x planes owned locally.
    pub local_nx: usize,
    /// Global index of the first local x plane.
    pub local_ix0: usize,
}

impl Slab {
    /// A slab covering the whole grid.
    pub fn full(nc: usize) -> Self {
        Self {
            nc,
            local_nx: nc,
            local_ix0: 0,
        }
    }

    /// Planes per block when `nc` planes are split among `workers`.
    pub fn block_size(nc: usize, workers: usize) -> usize {
        nc.div_ceil(workers)
    }

    /// The slab of `rank` among `workers`, blocks of `ceil(nc / workers)`
    /// planes with the remainder on the last worker.
    ///
    /// Fails if any worker would be left without a plane.
    pub fn partition(nc: usize, workers: usize, rank: usize) -> Result<Self> {
        if workers == 0 || nc == 0 || Self::block_size(nc, workers) * (workers - 1) >= nc {
            return Err(FftError::Decomposition { nc, workers });
        }
        assert!(rank < workers, "rank {rank} out of range for {workers} workers");
        let block = Self::block_size(nc, workers);
        let local_ix0 = block * rank;
        let local_nx = block.min(nc - local_ix0);
        Ok(Self {
            nc,
            local_nx,
            local_ix0,
        })
    }

    /// Number of stored complex modes along z: `nc/2 + 1`.
    pub fn nckz(&self) -> usize {
        self.nc / 2 + 1
    }

    /// Padded real row length along z: `2 (nc/2 + 1)`.
    pub fn nzpad(&self) -> usize {
        2 * self.nckz()
    }

    /// Whether global x plane `ix` is local.
    pub fn contains(&self, ix: usize) -> bool {
        self.local_ix0 <= ix && ix < self.local_ix0 + self.local_nx
    }

    /// One past the last local x plane.
    pub fn end(&self) -> usize {
        self.local_ix0 + self.local_nx
    }

    /// Rank owning global x plane `ix` under [`Slab::partition`].
    pub fn owner_of(nc: usize, workers: usize, ix: usize) -> usize {
        (ix / Self::block_size(nc, workers)).min(workers - 1)
    }

    /// Real values in the local slab, padding included.
    pub fn real_len(&self) -> usize {
        self.local_nx * self.nc * self.nzpad()
    }

    /// Complex modes in the local slab.
    pub fn complex_len(&self) -> usize {
        self.local_nx * self.nc * self.nckz()
    }

    /// Flat index into the padded real view.
    #[inline]
    pub fn real_index(&self, ix_local: usize, iy: usize, iz: usize) -> usize {
        (ix_local * self.nc + iy) * self.nzpad() + iz
    }

    /// Flat index into the Fourier view.
    #[inline]
    pub fn complex_index(&self, ix_local: usize, iy: usize, iz: usize) -> usize {
        (ix_local * self.nc + iy) * self.nckz() + iz
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_slab() {
        let s = Slab::full(8);
        assert_eq!(s.local_nx, 8);
        assert_eq!(s.nckz(), 5);
        assert_eq!(s.nzpad(), 10);
        assert_eq!(s.real_len(), 8 * 8 * 10);
        assert_eq!(s.complex_len(), 8 * 8 * 5);
        assert_eq!(s.real_len(), 2 * s.complex_len());
    }

    #[test]
    fn test_partition_covers_grid() {
        let nc = 10;
        let workers = 4;
        let slabs: Vec<Slab> = (0..workers)
            .map(|r| Slab::partition(nc, workers, r).unwrap())
            .collect();

        assert_eq!(slabs[0].local_ix0, 0);
        for pair in slabs.windows(2) {
            assert_eq!(pair[0].end(), pair[1].local_ix0);
        }
        assert_eq!(slabs.last().unwrap().end(), nc);
        assert_eq!(slabs.iter().map(|s| s.local_nx).sum::<usize>(), nc);

        for ix in 0..nc {
            let owner = Slab::owner_of(nc, workers, ix);
            assert!(slabs[owner].contains(ix));
        }
    }

    #[test]
    fn test_partition_rejects_empty_slab() {
        // ceil(4/3) = 2 planes per block leaves the third worker empty
        assert!(Slab::partition(4, 3, 0).is_err());
        assert!(Slab::partition(4, 2, 1).is_ok());
    }

    #[test]
    fn test_partition_rejects_zero_workers() {
        assert!(matches!(
            Slab::partition(8, 0, 0),
            Err(FftError::Decomposition { nc: 8, workers: 0 })
        ));
        assert!(Slab::partition(0, 2, 0).is_err());
    }
}
