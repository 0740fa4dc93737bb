//! Random field, Zel'dovich and second-order displacement fields.

use std::f64::consts::PI;

use cola_comm::Communicator;
use cola_cosmology::{Cosmology, PowerSpectrum};
use cola_fft::{FftGrid, GridArena, Slab, SlabFft};
use cola_math::{Complex64, Vec3, fourier_index, wrap_position};
use cola_particle::{Particle, ParticleSet};
use num_complex::Complex;
use rand::Rng;
use rand_distr::Exp1;
use rayon::prelude::*;

use crate::Result;
use crate::seed::SeedTable;

/// Component pairs `(i, j)` of the displacement gradient Ψ_i,j, in storage
/// order.
const GRADIENT_PAIRS: [(usize, usize); 6] = [(0, 0), (0, 1), (0, 2), (1, 1), (1, 2), (2, 2)];

/// Result of [`LptGenerator::set_displacements`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplacementSummary {
    /// Particles placed on this worker.
    pub np_local: usize,
    /// RMS of `D1·dx1 + D2·dx2` per component over all workers.
    pub rms_displacement: f64,
    /// Linear growth factor at the initial scale factor.
    pub d1: f64,
    /// Second-order growth factor at the initial scale factor.
    pub d2: f64,
}

/// Builds 2LPT displacement fields on one worker's slab.
///
/// Owns the nine Fourier grids of the computation. `Ψ_i` lives in
/// `psi[i]`. The six gradient grids are reused after the real-space source
/// is formed: `psi_ij[0..3]` receive Ψ⁽²⁾ and `psi_ij[3]` holds the
/// source.
pub struct LptGenerator<C> {
    fft: SlabFft<C>,
    slab: Slab,
    boxsize: f64,
    seed_table: Option<(u64, SeedTable)>,
    psi: [FftGrid; 3],
    psi_ij: [FftGrid; 6],
}

impl<C: Communicator> LptGenerator<C> {
    /// Allocate the generator's grids on this worker's slab of `fft`.
    pub fn new(fft: SlabFft<C>, boxsize: f64, mut arena: Option<&mut GridArena>) -> Result<Self> {
        let slab = fft.slab()?;
        tracing::debug!(nc = slab.nc, boxsize, "lpt init");

        let psi = std::array::from_fn(|i| {
            FftGrid::allocate(format!("psi_{}", i + 1), slab, arena.as_deref_mut())
        });
        let psi_ij = std::array::from_fn(|n| {
            let (i, j) = GRADIENT_PAIRS[n];
            FftGrid::allocate(format!("psi_{}{}", i + 1, j + 1), slab, arena.as_deref_mut())
        });

        Ok(Self {
            fft,
            slab,
            boxsize,
            seed_table: None,
            psi,
            psi_ij,
        })
    }

    pub fn slab(&self) -> &Slab {
        &self.slab
    }

    pub fn boxsize(&self) -> f64 {
        self.boxsize
    }

    /// First-order displacement grids.
    pub fn psi(&self) -> &[FftGrid; 3] {
        &self.psi
    }

    /// Second-order displacement grids.
    pub fn psi2(&self) -> &[FftGrid] {
        &self.psi_ij[..3]
    }

    /// Return the grids to `arena`.
    pub fn free(self, mut arena: Option<&mut GridArena>) {
        for grid in self.psi.into_iter().chain(self.psi_ij) {
            grid.free(arena.as_deref_mut());
        }
    }

    /// Fill the linear potential φ(k) = −δ(k)/k² into the first grid
    /// without transforming it.
    pub fn fill_phi_k(&mut self, seed: u64, spectrum: &dyn PowerSpectrum) -> &FftGrid {
        let table = self.seed_table(seed).clone();
        let [phi, _, _] = &mut self.psi;
        phi.clear_fourier();
        let out = phi.fourier_mut();

        visit_modes(&self.slab, self.boxsize, &table, spectrum, |index, _, k2, delta| {
            out[index] = -delta / k2;
        });
        &self.psi[0]
    }

    /// Linear potential φ in real space.
    pub fn generate_phi(&mut self, seed: u64, spectrum: &dyn PowerSpectrum) -> Result<&FftGrid> {
        tracing::debug!("generating phi_k");
        self.fill_phi_k(seed, spectrum);
        self.fft.inverse(&mut self.psi[0])?;
        Ok(&self.psi[0])
    }

    /// First-order displacement Ψ_i(k) = i k_i / k² · δ(k), left in Fourier
    /// space.
    pub fn generate_displacement(
        &mut self,
        seed: u64,
        spectrum: &dyn PowerSpectrum,
    ) -> &[FftGrid; 3] {
        if self.fft.comm().rank() == 0 {
            tracing::info!(seed, "generating delta_k");
        }
        let table = self.seed_table(seed).clone();
        let [p0, p1, p2] = &mut self.psi;
        p0.clear_fourier();
        p1.clear_fourier();
        p2.clear_fourier();
        let mut out = [p0.fourier_mut(), p1.fourier_mut(), p2.fourier_mut()];

        visit_modes(&self.slab, self.boxsize, &table, spectrum, |index, k, k2, delta| {
            for (axis, grid) in out.iter_mut().enumerate() {
                let b = k[axis] / k2;
                grid[index] = Complex::new(-b * delta.im, b * delta.re);
            }
        });
        &self.psi
    }

    /// Second-order displacement Ψ⁽²⁾(k) from Ψ(k).
    ///
    /// Requires [`generate_displacement`](Self::generate_displacement) to
    /// have filled the first-order grids. The result is in
    /// [`psi2`](Self::psi2), in Fourier space, scaled by `nc³` relative to
    /// Ψ because the source passed through one extra inverse transform.
    pub fn compute_psi2_k(&mut self) -> Result<()> {
        tracing::debug!("computing 2LPT displacement fields");
        let slab = self.slab;
        let dk = 2.0 * PI / self.boxsize;

        // Ψ_i,j(k) = i k_j Ψ_i(k)
        for (n, &(i, j)) in GRADIENT_PAIRS.iter().enumerate() {
            let psi = self.psi[i].fourier();
            let grad = &mut self.psi_ij[n];
            grad.clear_fourier();
            grad.fourier_mut()
                .par_iter_mut()
                .enumerate()
                .for_each(|(index, out)| {
                    let k = wavevector(&slab, dk, index);
                    let p = psi[index];
                    *out = Complex::new(-p.im * k[j], p.re * k[j]);
                });
        }

        tracing::debug!("transforming displacement gradient");
        for grid in &mut self.psi_ij {
            self.fft.inverse(grid)?;
        }

        // S = Σ_{i<j} (Ψ_i,i Ψ_j,j − Ψ_i,j²), padding included (zero there)
        let source: Vec<f64> = {
            let g: Vec<&[f64]> = self.psi_ij.iter().map(|grid| grid.real()).collect();
            (0..slab.real_len())
                .into_par_iter()
                .map(|n| {
                    g[0][n] * (g[3][n] + g[5][n]) + g[3][n] * g[5][n]
                        - g[1][n] * g[1][n]
                        - g[2][n] * g[2][n]
                        - g[4][n] * g[4][n]
                })
                .collect()
        };
        self.psi_ij[3].real_mut().copy_from_slice(&source);

        tracing::debug!("transforming second-order source");
        self.fft.forward(&mut self.psi_ij[3])?;

        // Ψ⁽²⁾_i(k) = −i k_i / k² · S(k), cleared on the Nyquist planes like
        // the first-order fields
        let (psi2, rest) = self.psi_ij.split_at_mut(3);
        let source_k = rest[0].fourier();
        for (axis, grid) in psi2.iter_mut().enumerate() {
            grid.clear_fourier();
            grid.fourier_mut()
                .par_iter_mut()
                .enumerate()
                .for_each(|(index, out)| {
                    if on_nyquist_plane(&slab, index) {
                        return;
                    }
                    let k = wavevector(&slab, dk, index);
                    let k2 = k[0] * k[0] + k[1] * k[1] + k[2] * k[2];
                    if k2 > 0.0 {
                        let s = source_k[index];
                        let b = k[axis] / k2;
                        *out = Complex::new(s.im * b, -s.re * b);
                    }
                });
        }
        Ok(())
    }

    /// Place one particle per local grid cell at the 2LPT-displaced lattice
    /// position for scale factor `a`.
    ///
    /// Particles start at rest with `a_x = a_v = a`. Fails before any work
    /// if `particles` cannot hold the local lattice.
    pub fn set_displacements(
        &mut self,
        seed: u64,
        spectrum: &dyn PowerSpectrum,
        a: f64,
        cosmology: &dyn Cosmology,
        particles: &mut ParticleSet,
    ) -> Result<DisplacementSummary> {
        let slab = self.slab;
        let nc = slab.nc;
        let np_local = slab.local_nx * nc * nc;
        particles.ensure_capacity(np_local)?;

        self.generate_displacement(seed, spectrum);
        self.compute_psi2_k()?;

        tracing::debug!("transforming 2LPT displacements");
        for i in 0..3 {
            self.fft.inverse(&mut self.psi[i])?;
            self.fft.inverse(&mut self.psi_ij[i])?;
        }

        let (d1, d2) = cosmology.growth_factors(a)?;
        tracing::debug!(a, d1, d2, "LPT growth factors");

        let dx = self.boxsize / nc as f64;
        let nc3_inv = 1.0 / (nc as f64).powi(3);
        let id0 = (slab.local_ix0 * nc * nc) as u64 + 1;
        let boxsize = self.boxsize;
        let psi: Vec<&[f64]> = self.psi.iter().map(|g| g.real()).collect();
        let psi2: Vec<&[f64]> = self.psi_ij[..3].iter().map(|g| g.real()).collect();

        let placed: Vec<Particle> = (0..np_local)
            .into_par_iter()
            .map(|n| {
                let ix = n / (nc * nc);
                let iy = (n / nc) % nc;
                let iz = n % nc;
                let index = slab.real_index(ix, iy, iz);

                let q = Vec3::new(
                    (slab.local_ix0 + ix) as f64 + 0.5,
                    iy as f64 + 0.5,
                    iz as f64 + 0.5,
                ) * dx;
                let dx1 = Vec3::new(psi[0][index], psi[1][index], psi[2][index]);
                let dx2 = Vec3::new(psi2[0][index], psi2[1][index], psi2[2][index]) * nc3_inv;

                let mut p = Particle::new(id0 + n as u64, q);
                p.x = wrap_position(&(q + dx1 * d1 + dx2 * d2), boxsize);
                p.dx1 = dx1;
                p.dx2 = dx2;
                p
            })
            .collect();

        particles.replace(placed)?;
        particles.a_x = a;
        particles.a_v = a;

        let comm = self.fft.comm();
        let sum2 = comm.all_reduce_sum(particles.sum_squared_displacement(d1, d2))?;
        let count = comm.all_reduce_sum((3 * np_local) as f64)?;
        let rms_displacement = (sum2 / count).sqrt();
        if comm.rank() == 0 {
            tracing::info!(rms_displacement, "2LPT displacements calculated");
        }

        Ok(DisplacementSummary {
            np_local,
            rms_displacement,
            d1,
            d2,
        })
    }

    fn seed_table(&mut self, seed: u64) -> &SeedTable {
        let nc = self.slab.nc;
        if self.seed_table.as_ref().is_some_and(|(s, _)| *s != seed) {
            self.seed_table = None;
        }
        &self
            .seed_table
            .get_or_insert_with(|| (seed, SeedTable::new(nc, seed)))
            .1
    }
}

/// Physical wavevector of flat Fourier index `index` in `slab`.
#[inline]
fn wavevector(slab: &Slab, dk: f64, index: usize) -> [f64; 3] {
    let nc = slab.nc;
    let nckz = slab.nckz();
    let ix = index / (nc * nckz) + slab.local_ix0;
    let iy = (index / nckz) % nc;
    let iz = index % nckz;
    [
        dk * fourier_index(ix, nc) as f64,
        dk * fourier_index(iy, nc) as f64,
        dk * fourier_index(iz, nc) as f64,
    ]
}

/// Whether any index of Fourier `index` is the Nyquist index `nc/2`.
fn on_nyquist_plane(slab: &Slab, index: usize) -> bool {
    let nc = slab.nc;
    let nckz = slab.nckz();
    let half = nc / 2;
    index / (nc * nckz) + slab.local_ix0 == half
        || (index / nckz) % nc == half
        || index % nckz == half
}

/// Draw δ(k) for every independent mode and hand each value that lands in
/// `slab` to `write(index, k, k², δ)`.
///
/// Every `(ix, iy)` row restarts its own stream from `table`, and both
/// random numbers of a mode are drawn before it can be skipped, so each
/// mode sees the same numbers whatever the slab. On the `iz = 0` plane the
/// conjugate `δ(−k) = δ(k)*` is written explicitly, possibly for a row
/// owned here whose source row is not.
fn visit_modes<F>(
    slab: &Slab,
    boxsize: f64,
    table: &SeedTable,
    spectrum: &dyn PowerSpectrum,
    mut write: F,
) where
    F: FnMut(usize, [f64; 3], f64, Complex64),
{
    let nc = slab.nc;
    let half = nc / 2;
    let dk = 2.0 * PI / boxsize;
    let k_nyquist = nc as f64 * PI / boxsize;
    let fac = (2.0 * PI / boxsize).powf(1.5);
    let fac_2pi3 = 1.0 / (8.0 * PI * PI * PI);

    for ix in 0..nc {
        let cx = cola_math::conjugate_index(ix, nc);
        if !slab.contains(ix) && !slab.contains(cx) {
            continue;
        }

        for iy in 0..nc {
            let cy = cola_math::conjugate_index(iy, nc);
            let mut rng = table.row_rng(ix, iy);

            for iz in 0..half {
                let phase = rng.gen_range(0.0..1.0) * 2.0 * PI;
                let e: f64 = rng.sample(Exp1);

                if ix == half || iy == half || iz == half {
                    continue;
                }
                if ix == 0 && iy == 0 && iz == 0 {
                    continue;
                }

                let k = [
                    dk * fourier_index(ix, nc) as f64,
                    dk * fourier_index(iy, nc) as f64,
                    dk * fourier_index(iz, nc) as f64,
                ];
                if k.iter().any(|ki| ki.abs() > k_nyquist) {
                    continue;
                }
                let k2 = k[0] * k[0] + k[1] * k[1] + k[2] * k[2];

                let amplitude = fac * (e * fac_2pi3 * spectrum.value(k2.sqrt())).sqrt();
                let delta = Complex::from_polar(amplitude, phase);
                let minus_k = [-k[0], -k[1], -k[2]];

                if iz > 0 {
                    if slab.contains(ix) {
                        write(slab.complex_index(ix - slab.local_ix0, iy, iz), k, k2, delta);
                    }
                } else if ix == 0 {
                    // Self-conjugate column: set (0, iy) and (0, −iy) together
                    if iy < half && slab.contains(0) {
                        write(slab.complex_index(0, iy, 0), k, k2, delta);
                        write(slab.complex_index(0, cy, 0), minus_k, k2, delta.conj());
                    }
                } else if ix < half {
                    if slab.contains(ix) {
                        write(slab.complex_index(ix - slab.local_ix0, iy, 0), k, k2, delta);
                    }
                    if slab.contains(cx) {
                        write(
                            slab.complex_index(cx - slab.local_ix0, cy, 0),
                            minus_k,
                            k2,
                            delta.conj(),
                        );
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use cola_comm::{LocalCluster, SerialComm};
    use cola_cosmology::{ConstantSpectrum, FlatLcdm};
    use cola_fft::Space;
    use cola_particle::ParticleError;
    use std::sync::Arc;

    use crate::LptError;

    fn serial_generator(nc: usize, boxsize: f64) -> LptGenerator<SerialComm> {
        let fft = SlabFft::new(Arc::new(SerialComm::new()), nc);
        LptGenerator::new(fft, boxsize, None).unwrap()
    }

    fn mode(grid: &FftGrid, ix: usize, iy: usize, iz: usize) -> Complex64 {
        grid.mode_at(ix - grid.slab().local_ix0, iy, iz)
    }

    #[test]
    fn test_iz_zero_plane_is_hermitian() {
        let nc = 8;
        let mut lpt = serial_generator(nc, 64.0);
        let spectrum = ConstantSpectrum::new(1.0);

        let phi = lpt.fill_phi_k(12345, &spectrum);
        for ix in 0..nc {
            for iy in 0..nc {
                let a = mode(phi, ix, iy, 0);
                let b = mode(phi, (nc - ix) % nc, (nc - iy) % nc, 0).conj();
                assert_relative_eq!(a.re, b.re, epsilon = 1e-14);
                assert_relative_eq!(a.im, b.im, epsilon = 1e-14);
            }
        }

        let psi = lpt.generate_displacement(12345, &spectrum);
        for grid in psi {
            for ix in 0..nc {
                for iy in 0..nc {
                    let a = mode(grid, ix, iy, 0);
                    let b = mode(grid, (nc - ix) % nc, (nc - iy) % nc, 0).conj();
                    assert_relative_eq!(a.re, b.re, epsilon = 1e-14);
                    assert_relative_eq!(a.im, b.im, epsilon = 1e-14);
                }
            }
        }
    }

    #[test]
    fn test_second_order_iz_zero_plane_is_hermitian() {
        let nc = 8;
        let half = nc / 2;
        let mut lpt = serial_generator(nc, 64.0);
        lpt.generate_displacement(12345, &ConstantSpectrum::new(1.0));
        lpt.compute_psi2_k().unwrap();

        for grid in lpt.psi2() {
            assert_eq!(grid.space(), Space::Fourier);
            for ix in 0..nc {
                for iy in 0..nc {
                    let a = mode(grid, ix, iy, 0);
                    let b = mode(grid, (nc - ix) % nc, (nc - iy) % nc, 0).conj();
                    assert_relative_eq!(a.re, b.re, epsilon = 1e-10);
                    assert_relative_eq!(a.im, b.im, epsilon = 1e-10);
                    if ix == half || iy == half {
                        assert_eq!(a, Complex::new(0.0, 0.0));
                    }
                }
                assert_eq!(mode(grid, ix, 1, half), Complex::new(0.0, 0.0));
            }
        }
    }

    #[test]
    fn test_nyquist_and_zero_modes_vanish() {
        let nc = 8;
        let half = nc / 2;
        let mut lpt = serial_generator(nc, 64.0);
        let phi = lpt.fill_phi_k(3, &ConstantSpectrum::new(1.0));

        assert_eq!(mode(phi, 0, 0, 0), Complex::new(0.0, 0.0));
        for a in 0..nc {
            for b in 0..nc {
                assert_eq!(mode(phi, half, a, b.min(half)), Complex::new(0.0, 0.0));
                assert_eq!(mode(phi, a, half, b.min(half)), Complex::new(0.0, 0.0));
                assert_eq!(mode(phi, a, b, half), Complex::new(0.0, 0.0));
            }
        }
        // Everything else is populated
        assert_ne!(mode(phi, 1, 0, 0), Complex::new(0.0, 0.0));
        assert_ne!(mode(phi, 5, 7, 3), Complex::new(0.0, 0.0));
    }

    #[test]
    fn test_displacement_is_gradient_of_potential() {
        // Ψ_i(k) = −i k_i φ(k)
        let nc = 6;
        let boxsize = 10.0;
        let dk = 2.0 * PI / boxsize;
        let mut lpt = serial_generator(nc, boxsize);
        let spectrum = |k: f64| 1.0 / (1.0 + k * k);

        let phi = lpt.fill_phi_k(42, &spectrum).fourier().to_vec();
        let psi = lpt.generate_displacement(42, &spectrum);
        let slab = Slab::full(nc);
        for (index, p) in phi.iter().enumerate() {
            let k = wavevector(&slab, dk, index);
            for axis in 0..3 {
                let expected = Complex::new(0.0, -k[axis]) * p;
                let got = psi[axis].fourier()[index];
                assert_relative_eq!(got.re, expected.re, epsilon = 1e-12);
                assert_relative_eq!(got.im, expected.im, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_fields_independent_of_partition() {
        let nc = 8;
        let boxsize = 32.0;
        let spectrum = ConstantSpectrum::new(2.0);

        let mut full = serial_generator(nc, boxsize);
        let phi_full = full.fill_phi_k(777, &spectrum).fourier().to_vec();
        let psi_full: Vec<Vec<Complex64>> = full
            .generate_displacement(777, &spectrum)
            .iter()
            .map(|g| g.fourier().to_vec())
            .collect();

        // Mode filling never communicates, so the workers can be driven
        // from one thread
        for comm in LocalCluster::new(3) {
            let fft = SlabFft::new(Arc::new(comm), nc);
            let mut part = LptGenerator::new(fft, boxsize, None).unwrap();
            let slab = *part.slab();
            let offset = slab.local_ix0 * nc * slab.nckz();
            let len = slab.complex_len();

            let phi = part.fill_phi_k(777, &spectrum).fourier();
            assert_eq!(phi, &phi_full[offset..offset + len]);

            let psi = part.generate_displacement(777, &spectrum);
            for (axis, grid) in psi.iter().enumerate() {
                assert_eq!(grid.fourier(), &psi_full[axis][offset..offset + len]);
            }
        }
    }

    #[test]
    fn test_plane_wave_has_no_second_order() {
        // A one-dimensional displacement has a vanishing 2LPT source
        let nc = 8;
        let mut lpt = serial_generator(nc, 8.0);
        for grid in &mut lpt.psi {
            grid.clear_fourier();
        }
        let slab = *lpt.slab();
        let psi_x = lpt.psi[0].fourier_mut();
        psi_x[slab.complex_index(1, 0, 0)] = Complex::new(0.0, 1.0);
        psi_x[slab.complex_index(nc - 1, 0, 0)] = Complex::new(0.0, -1.0);

        lpt.compute_psi2_k().unwrap();
        for grid in lpt.psi2() {
            assert_eq!(grid.space(), Space::Fourier);
            assert!(grid.fourier().iter().all(|m| m.norm() < 1e-12));
        }
    }

    #[test]
    fn test_second_order_zero_mode_cleared() {
        let mut lpt = serial_generator(8, 64.0);
        lpt.generate_displacement(5, &ConstantSpectrum::new(1.0));
        lpt.compute_psi2_k().unwrap();
        for grid in lpt.psi2() {
            assert_eq!(grid.mode_at(0, 0, 0), Complex::new(0.0, 0.0));
        }
    }

    #[test]
    fn test_set_displacements_lattice() {
        let nc = 4;
        let boxsize = 16.0;
        let mut lpt = serial_generator(nc, boxsize);
        let cosmology = FlatLcdm::new(0.3).unwrap();
        let mut particles = ParticleSet::with_capacity(2 * nc * nc * nc, 0.3);

        let summary = lpt
            .set_displacements(1, &ConstantSpectrum::new(0.01), 0.1, &cosmology, &mut particles)
            .unwrap();

        assert_eq!(summary.np_local, 64);
        assert_eq!(particles.np_local(), 64);
        assert_eq!(particles.a_x, 0.1);
        assert_eq!(particles.a_v, 0.1);
        assert!(summary.rms_displacement > 0.0);

        for (n, p) in particles.particles.iter().enumerate() {
            assert_eq!(p.id, n as u64 + 1);
            assert_eq!(p.v, Vec3::zeros());
            for axis in 0..3 {
                assert!((0.0..boxsize).contains(&p.x[axis]));
            }
        }

        // First particle sits half a cell in, displaced by D1·dx1 + D2·dx2
        let p = &particles.particles[0];
        let q = Vec3::new(2.0, 2.0, 2.0);
        let expected = cola_math::wrap_position(&(q + p.dx1 * summary.d1 + p.dx2 * summary.d2), boxsize);
        assert_relative_eq!(p.x, expected, epsilon = 1e-12);
    }

    #[test]
    fn test_capacity_checked_first() {
        let mut lpt = serial_generator(4, 16.0);
        let cosmology = FlatLcdm::new(0.3).unwrap();
        let mut particles = ParticleSet::with_capacity(10, 0.3);

        let err = lpt
            .set_displacements(1, &ConstantSpectrum::new(1.0), 0.1, &cosmology, &mut particles)
            .unwrap_err();
        assert!(matches!(
            err,
            LptError::Particle(ParticleError::Capacity {
                required: 64,
                available: 10
            })
        ));
        assert_eq!(particles.np_local(), 0);
    }
}
