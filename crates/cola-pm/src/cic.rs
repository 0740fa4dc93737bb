//! Cloud-in-cell weights and an atomically accumulated mesh.

use std::sync::atomic::{AtomicU64, Ordering};

use cola_fft::{FftGrid, Slab};
use cola_math::Vec3;
use rayon::prelude::*;

/// The eight mesh vertices around a point and their tri-linear weights.
///
/// The x indices are global and unwrapped: a ghost shifted across the box
/// edge may sit at `-1` or `nc`, and only the worker owning that plane
/// uses it. The y and z indices wrap periodically.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CicStencil {
    pub ix: [i64; 2],
    pub iy: [usize; 2],
    pub iz: [usize; 2],
    pub wx: [f64; 2],
    pub wy: [f64; 2],
    pub wz: [f64; 2],
}

impl CicStencil {
    /// Stencil of position `x` on a mesh of `nc` points per side with
    /// spacing `1 / dx_inv`. `y` and `z` must lie in `[0, boxsize]`.
    #[inline]
    pub fn new(x: &Vec3, dx_inv: f64, nc: usize) -> Self {
        let gx = x.x * dx_inv;
        let gy = x.y * dx_inv;
        let gz = x.z * dx_inv;

        let ix0 = gx.floor() as i64;
        let mut iy0 = gy as usize;
        let mut iz0 = gz as usize;

        // Weights on the right vertex, taken before the wrap so a point at
        // exactly the upper edge keeps full weight on plane 0
        let wx1 = gx - ix0 as f64;
        let wy1 = gy - iy0 as f64;
        let wz1 = gz - iz0 as f64;

        if iy0 >= nc {
            iy0 = 0;
        }
        if iz0 >= nc {
            iz0 = 0;
        }
        let iy1 = if iy0 + 1 >= nc { 0 } else { iy0 + 1 };
        let iz1 = if iz0 + 1 >= nc { 0 } else { iz0 + 1 };

        Self {
            ix: [ix0, ix0 + 1],
            iy: [iy0, iy1],
            iz: [iz0, iz1],
            wx: [1.0 - wx1, wx1],
            wy: [1.0 - wy1, wy1],
            wz: [1.0 - wz1, wz1],
        }
    }

    /// `(ix, iy, iz, weight)` for each of the eight vertices.
    pub fn vertices(&self) -> impl Iterator<Item = (i64, usize, usize, f64)> + '_ {
        (0..8).map(move |n| {
            let (a, b, c) = (n >> 2, (n >> 1) & 1, n & 1);
            (
                self.ix[a],
                self.iy[b],
                self.iz[c],
                self.wx[a] * self.wy[b] * self.wz[c],
            )
        })
    }

    /// Local plane of global x index `ix`, if `slab` owns it.
    #[inline]
    pub fn local_plane(slab: &Slab, ix: i64) -> Option<usize> {
        let local = ix - slab.local_ix0 as i64;
        (local >= 0 && (local as usize) < slab.local_nx).then_some(local as usize)
    }
}

/// A real mesh slab whose cells accept concurrent additions.
///
/// Cells hold `f64` bit patterns in `AtomicU64`s; [`AtomicGrid::add`] is a
/// compare-and-swap loop, so particles can be deposited from many threads.
#[derive(Debug)]
pub struct AtomicGrid {
    slab: Slab,
    cells: Vec<AtomicU64>,
}

impl AtomicGrid {
    pub fn new(slab: Slab) -> Self {
        let n = slab.local_nx * slab.nc * slab.nc;
        Self {
            slab,
            cells: (0..n).map(|_| AtomicU64::new(0.0f64.to_bits())).collect(),
        }
    }

    pub fn slab(&self) -> &Slab {
        &self.slab
    }

    #[inline]
    fn index(&self, ix_local: usize, iy: usize, iz: usize) -> usize {
        (ix_local * self.slab.nc + iy) * self.slab.nc + iz
    }

    /// Set every cell to `value`.
    pub fn fill(&mut self, value: f64) {
        let bits = value.to_bits();
        self.cells
            .par_iter_mut()
            .for_each(|c| *c.get_mut() = bits);
    }

    /// Atomically add `value` to a cell.
    #[inline]
    pub fn add(&self, ix_local: usize, iy: usize, iz: usize, value: f64) {
        let cell = &self.cells[self.index(ix_local, iy, iz)];
        let mut current = cell.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) + value).to_bits();
            match cell.compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    pub fn get(&self, ix_local: usize, iy: usize, iz: usize) -> f64 {
        f64::from_bits(self.cells[self.index(ix_local, iy, iz)].load(Ordering::Relaxed))
    }

    /// Deposit `mass` per particle at `positions`, dropping the parts of
    /// each stencil that fall outside the local slab.
    pub fn deposit(&self, positions: &[Vec3], mass: f64, dx_inv: f64) {
        let slab = self.slab;
        positions.par_iter().for_each(|x| {
            let stencil = CicStencil::new(x, dx_inv, slab.nc);
            for (ix, iy, iz, w) in stencil.vertices() {
                if let Some(local) = CicStencil::local_plane(&slab, ix) {
                    self.add(local, iy, iz, mass * w);
                }
            }
        });
    }

    /// Sum of all cells.
    pub fn sum(&self) -> f64 {
        self.cells
            .iter()
            .map(|c| f64::from_bits(c.load(Ordering::Relaxed)))
            .sum()
    }

    /// Copy into the padded real view of `grid`, zeroing the padding.
    pub fn copy_into(&self, grid: &mut FftGrid) {
        assert_eq!(*grid.slab(), self.slab, "grid '{}' has a different slab", grid.name());
        let nc = self.slab.nc;
        let nzpad = self.slab.nzpad();
        grid.clear_real();
        grid.real_mut()
            .par_chunks_mut(nzpad)
            .zip(self.cells.par_chunks(nc))
            .for_each(|(row, cells)| {
                for (out, c) in row.iter_mut().zip(cells) {
                    *out = f64::from_bits(c.load(Ordering::Relaxed));
                }
            });
    }
}

/// Sample the real mesh `grid` at `x` with the CIC stencil, skipping
/// vertices outside the local slab.
#[inline]
pub fn interpolate(grid: &FftGrid, x: &Vec3, dx_inv: f64) -> f64 {
    let slab = grid.slab();
    let real = grid.real();
    let stencil = CicStencil::new(x, dx_inv, slab.nc);
    stencil
        .vertices()
        .filter_map(|(ix, iy, iz, w)| {
            CicStencil::local_plane(slab, ix).map(|local| w * real[slab.real_index(local, iy, iz)])
        })
        .sum()
}
