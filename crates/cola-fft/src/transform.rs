//! Distributed in-place real↔complex transforms.
//!
//! Each transform gathers every worker's slab (the dense collective), runs
//! the full 3D complex FFT as three passes of 1D `rustfft` transforms, and
//! keeps the local slab of the result.

use std::sync::Arc;

use cola_comm::Communicator;
use cola_math::Complex64;
use num_complex::Complex;
use rayon::prelude::*;
use rustfft::{Fft, FftPlanner};

use crate::grid::{FftGrid, GridArena, Space};
use crate::slab::Slab;
use crate::{FftError, Result};

/// Forward and inverse transforms for `nc³` grids over a communicator.
pub struct SlabFft<C> {
    comm: Arc<C>,
    nc: usize,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
}

impl<C> Clone for SlabFft<C> {
    fn clone(&self) -> Self {
        Self {
            comm: Arc::clone(&self.comm),
            nc: self.nc,
            forward: Arc::clone(&self.forward),
            inverse: Arc::clone(&self.inverse),
        }
    }
}

impl<C: Communicator> SlabFft<C> {
    /// Plan transforms of `nc³` grids.
    pub fn new(comm: Arc<C>, nc: usize) -> Self {
        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(nc);
        let inverse = planner.plan_fft_inverse(nc);
        Self {
            comm,
            nc,
            forward,
            inverse,
        }
    }

    pub fn nc(&self) -> usize {
        self.nc
    }

    pub fn comm(&self) -> &Arc<C> {
        &self.comm
    }

    /// This worker's slab of the grid.
    pub fn slab(&self) -> Result<Slab> {
        Slab::partition(self.nc, self.comm.size(), self.comm.rank())
    }

    /// Allocate a grid on this worker's slab.
    pub fn allocate(&self, name: &str, arena: Option<&mut GridArena>) -> Result<FftGrid> {
        Ok(FftGrid::allocate(name, self.slab()?, arena))
    }

    /// Real mesh → Fourier mesh, in place.
    pub fn forward(&self, grid: &mut FftGrid) -> Result<()> {
        assert_eq!(grid.slab().nc, self.nc, "grid '{}' has the wrong size", grid.name());
        let slab = *grid.slab();
        let nc = self.nc;

        let full = self.comm.all_gather(grid.real_values())?;
        if full.len() != nc * nc * nc {
            return Err(FftError::GatherSize {
                expected: nc * nc * nc,
                actual: full.len(),
            });
        }

        let mut data: Vec<Complex64> = full.into_iter().map(|r| Complex::new(r, 0.0)).collect();
        self.transform_3d(&mut data, &self.forward);

        let nckz = slab.nckz();
        let out = grid.raw_mut();
        for ix in 0..slab.local_nx {
            let gx = slab.local_ix0 + ix;
            for iy in 0..nc {
                let src = (gx * nc + iy) * nc;
                let dst = slab.complex_index(ix, iy, 0);
                out[dst..dst + nckz].copy_from_slice(&data[src..src + nckz]);
            }
        }
        grid.set_space(Space::Fourier);
        Ok(())
    }

    /// Fourier mesh → real mesh, in place.
    ///
    /// The modes not stored (`iz > nc/2`) are taken as the complex
    /// conjugates of their mirror modes.
    pub fn inverse(&self, grid: &mut FftGrid) -> Result<()> {
        assert_eq!(grid.slab().nc, self.nc, "grid '{}' has the wrong size", grid.name());
        let slab = *grid.slab();
        let nc = self.nc;
        let nckz = slab.nckz();

        let half = self.comm.all_gather(grid.fourier().to_vec())?;
        if half.len() != nc * nc * nckz {
            return Err(FftError::GatherSize {
                expected: nc * nc * nckz,
                actual: half.len(),
            });
        }

        let mut data = vec![Complex::new(0.0, 0.0); nc * nc * nc];
        data.par_chunks_mut(nc * nc).enumerate().for_each(|(ix, plane)| {
            let cx = cola_math::conjugate_index(ix, nc);
            for iy in 0..nc {
                let cy = cola_math::conjugate_index(iy, nc);
                for iz in 0..nc {
                    plane[iy * nc + iz] = if iz < nckz {
                        half[(ix * nc + iy) * nckz + iz]
                    } else {
                        half[(cx * nc + cy) * nckz + (nc - iz)].conj()
                    };
                }
            }
        });

        self.transform_3d(&mut data, &self.inverse);

        let nzpad = slab.nzpad();
        grid.set_space(Space::Real);
        let real = grid.real_mut();
        for ix in 0..slab.local_nx {
            let gx = slab.local_ix0 + ix;
            for iy in 0..nc {
                let src = (gx * nc + iy) * nc;
                let dst = (ix * nc + iy) * nzpad;
                for iz in 0..nc {
                    real[dst + iz] = data[src + iz].re;
                }
                real[dst + nc..dst + nzpad].fill(0.0);
            }
        }
        Ok(())
    }

    /// Full 3D complex transform of an x-major `nc³` array.
    fn transform_3d(&self, data: &mut [Complex64], plan: &Arc<dyn Fft<f64>>) {
        let nc = self.nc;
        let scratch_len = plan.get_inplace_scratch_len();
        let zero = Complex::new(0.0, 0.0);

        // z: contiguous rows
        data.par_chunks_mut(nc)
            .for_each_init(|| vec![zero; scratch_len], |scratch, row| {
                plan.process_with_scratch(row, scratch)
            });

        // y: strided within each x plane
        data.par_chunks_mut(nc * nc).for_each_init(
            || (vec![zero; nc], vec![zero; scratch_len]),
            |(line, scratch), plane| {
                for iz in 0..nc {
                    for iy in 0..nc {
                        line[iy] = plane[iy * nc + iz];
                    }
                    plan.process_with_scratch(line, scratch);
                    for iy in 0..nc {
                        plane[iy * nc + iz] = line[iy];
                    }
                }
            },
        );

        // x: transpose so x lines are contiguous, transform, transpose back
        let mut lines = vec![zero; data.len()];
        lines.par_chunks_mut(nc).enumerate().for_each(|(yz, line)| {
            for (ix, v) in line.iter_mut().enumerate() {
                *v = data[ix * nc * nc + yz];
            }
        });
        lines
            .par_chunks_mut(nc)
            .for_each_init(|| vec![zero; scratch_len], |scratch, line| {
                plan.process_with_scratch(line, scratch)
            });
        data.par_chunks_mut(nc * nc).enumerate().for_each(|(ix, plane)| {
            for (yz, v) in plane.iter_mut().enumerate() {
                *v = lines[yz * nc + ix];
            }
        });
    }
}
