//! Particle-mesh force solver.
//!
//! Solves the Poisson equation on a periodic mesh with the FFT:
//!   δ(x) → δ(k) → F_i(k) = −i k_i / k² δ(k) → F_i(x)
//! with cloud-in-cell assignment and interpolation.

use std::f64::consts::PI;

use cola_comm::Communicator;
use cola_fft::{FftGrid, GridArena, Slab, SlabFft, Space};
use cola_math::{Complex64, Vec3, fourier_index};
use cola_particle::ParticleSet;
use num_complex::Complex;
use rayon::prelude::*;

use crate::cic::{AtomicGrid, interpolate};
use crate::ghost;
use crate::{PmError, Result};

/// PM gravity on an `nc_pm³` mesh, `pm_factor` mesh cells per particle
/// spacing.
pub struct PmSolver<C> {
    fft: SlabFft<C>,
    slab: Slab,
    pm_factor: usize,
    boxsize: f64,
    density: AtomicGrid,
    /// Density, then one force component at a time.
    mesh: FftGrid,
    delta_k: Vec<Complex64>,
}

impl<C: Communicator> PmSolver<C> {
    /// Solver on the mesh of `fft`.
    pub fn new(
        fft: SlabFft<C>,
        pm_factor: usize,
        boxsize: f64,
        arena: Option<&mut GridArena>,
    ) -> Result<Self> {
        let slab = fft.slab()?;
        tracing::debug!(nc_pm = slab.nc, pm_factor, boxsize, "PM module init");
        Ok(Self {
            mesh: FftGrid::allocate("pm", slab, arena),
            density: AtomicGrid::new(slab),
            delta_k: vec![Complex::new(0.0, 0.0); slab.complex_len()],
            fft,
            slab,
            pm_factor,
            boxsize,
        })
    }

    pub fn slab(&self) -> &Slab {
        &self.slab
    }

    pub fn nc_pm(&self) -> usize {
        self.slab.nc
    }

    fn dx_inv(&self) -> f64 {
        self.slab.nc as f64 / self.boxsize
    }

    /// Fill `particles.force` with the PM force at every local particle.
    ///
    /// Positions are wrapped into the box and, with several workers,
    /// particles are first moved to the worker owning their mesh plane.
    pub fn compute_forces(&mut self, particles: &mut ParticleSet) -> Result<()> {
        let comm = std::sync::Arc::clone(self.fft.comm());
        if comm.rank() == 0 {
            tracing::debug!("PM force computation");
        }

        ghost::wrap_positions(&mut particles.particles, self.boxsize);
        if comm.size() > 1 {
            ghost::migrate(comm.as_ref(), particles, &self.slab, self.boxsize)?;
        }

        // Both slab edges are exchanged; under floor CIC the left-bound copies
        // fall outside the receiver's planes and deposit nothing
        let ghosts = ghost::exchange_ghosts(comm.as_ref(), &particles.particles, &self.slab, self.boxsize)?;
        particles.ensure_capacity(particles.np_local() + ghosts.len())?;

        let positions: Vec<Vec3> = particles
            .particles
            .iter()
            .map(|p| p.x)
            .chain(ghosts.positions())
            .collect();

        self.deposit_density(&positions);
        self.check_total_density()?;
        self.solve_poisson()?;

        let mut forces = vec![Vec3::zeros(); positions.len()];
        for axis in 0..3 {
            self.force_mesh(axis)?;
            self.force_at(&positions, axis, &mut forces);
        }

        let np = particles.np_local();
        let (local, ghost_forces) = forces.split_at_mut(np);
        ghost::fold_ghost_forces(comm.as_ref(), &ghosts, ghost_forces, &particles.particles, local)?;

        particles.force.clear();
        particles.force.extend_from_slice(local);
        Ok(())
    }

    /// CIC density contrast δ(x) of `positions` (ghosts included) into the
    /// mesh. The background is −1 so a uniform distribution gives zero.
    pub fn deposit_density(&mut self, positions: &[Vec3]) {
        let mass = (self.pm_factor * self.pm_factor * self.pm_factor) as f64;
        self.density.fill(-1.0);
        self.density.deposit(positions, mass, self.dx_inv());
        self.density.copy_into(&mut self.mesh);
    }

    /// Global sum of δ(x), which must vanish up to rounding.
    pub fn check_total_density(&self) -> Result<f64> {
        let comm = self.fft.comm();
        let sum = comm.all_reduce_sum(self.density.sum())?;
        let n = self.slab.nc as f64;
        let tolerance = f64::from(f32::EPSILON) * n * n * n;

        if sum.abs() > tolerance {
            return Err(PmError::DensityIntegrity { sum, tolerance });
        }
        if comm.rank() == 0 {
            tracing::trace!(sum, tolerance, "total CIC density OK");
        }
        Ok(sum)
    }

    /// Forward-transform the density mesh and keep δ(k).
    fn solve_poisson(&mut self) -> Result<()> {
        self.fft.forward(&mut self.mesh)?;
        self.delta_k.copy_from_slice(self.mesh.fourier());
        Ok(())
    }

    /// One real-space force component from δ(k):
    /// F(k) = −i k_axis / k² · δ(k) / nc³, zero at k = 0.
    fn force_mesh(&mut self, axis: usize) -> Result<()> {
        self.fill_force_k(axis);
        self.fft.inverse(&mut self.mesh)?;
        Ok(())
    }

    fn fill_force_k(&mut self, axis: usize) {
        let slab = self.slab;
        let nc = slab.nc;
        let nckz = slab.nckz();
        // Integer wavenumbers; 2π/L folded into the prefactor
        let f1 = -1.0 / (nc as f64).powi(3) / (2.0 * PI / self.boxsize);
        let delta_k = &self.delta_k;

        self.mesh.clear_fourier();
        self.mesh
            .fourier_mut()
            .par_iter_mut()
            .enumerate()
            .for_each(|(index, out)| {
                let k = [
                    fourier_index(index / (nc * nckz) + slab.local_ix0, nc) as f64,
                    fourier_index((index / nckz) % nc, nc) as f64,
                    fourier_index(index % nckz, nc) as f64,
                ];
                let k2 = k[0] * k[0] + k[1] * k[1] + k[2] * k[2];
                if k2 == 0.0 {
                    return;
                }
                let f2 = f1 / k2 * k[axis];
                let d = delta_k[index];
                *out = Complex::new(-f2 * d.im, f2 * d.re);
            });
    }

    /// Interpolate the current force mesh onto `positions`.
    fn force_at(&self, positions: &[Vec3], axis: usize, forces: &mut [Vec3]) {
        let dx_inv = self.dx_inv();
        let mesh = &self.mesh;
        forces
            .par_iter_mut()
            .zip(positions.par_iter())
            .for_each(|(f, x)| f[axis] = interpolate(mesh, x, dx_inv));
    }

    /// The k = 0 mode of force component `axis` built from the last
    /// density, or `None` if this worker does not hold plane 0.
    pub fn force_k_zero_mode(&mut self, axis: usize) -> Option<Complex64> {
        self.fill_force_k(axis);
        debug_assert_eq!(self.mesh.space(), Space::Fourier);
        self.slab.contains(0).then(|| self.mesh.mode_at(0, 0, 0))
    }
}
