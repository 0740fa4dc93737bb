//! Moving particles and ghosts between neighbouring slabs.

use std::collections::HashMap;

use cola_comm::Communicator;
use cola_fft::Slab;
use cola_math::{Vec3, wrap_position};
use cola_particle::{GhostForce, GhostParticle, Particle, ParticleSet};
use rayon::prelude::*;

use crate::Result;

/// Ghosts received from the two neighbours.
#[derive(Debug, Default, Clone)]
pub struct Ghosts {
    pub from_left: Vec<GhostParticle>,
    pub from_right: Vec<GhostParticle>,
}

impl Ghosts {
    pub fn len(&self) -> usize {
        self.from_left.len() + self.from_right.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Positions, left ghosts first.
    pub fn positions(&self) -> impl Iterator<Item = Vec3> + '_ {
        self.from_left.iter().chain(&self.from_right).map(|g| g.x)
    }
}

/// Wrap every position into `[0, boxsize)`.
pub fn wrap_positions(particles: &mut [Particle], boxsize: f64) {
    particles
        .par_iter_mut()
        .for_each(|p| p.x = wrap_position(&p.x, boxsize));
}

/// Global mesh plane containing coordinate `x`.
#[inline]
fn plane_of(x: f64, dx_inv: f64, nc: usize) -> usize {
    ((x * dx_inv) as usize).min(nc - 1)
}

/// Send every particle outside `slab` to the worker owning its plane.
///
/// Positions must already be wrapped. Returns the number of particles
/// that left this worker.
pub fn migrate<C: Communicator>(
    comm: &C,
    particles: &mut ParticleSet,
    slab: &Slab,
    boxsize: f64,
) -> Result<usize> {
    let nc = slab.nc;
    let workers = comm.size();
    let dx_inv = nc as f64 / boxsize;

    let mut outgoing: Vec<Vec<Particle>> = (0..workers).map(|_| Vec::new()).collect();
    let mut staying = Vec::with_capacity(particles.np_allocated());
    for p in particles.particles.drain(..) {
        let ix = plane_of(p.x.x, dx_inv, nc);
        if slab.contains(ix) {
            staying.push(p);
        } else {
            outgoing[Slab::owner_of(nc, workers, ix)].push(p);
        }
    }
    let sent: usize = outgoing.iter().map(Vec::len).sum();

    let incoming = comm.all_to_all(outgoing)?;
    staying.extend(incoming.into_iter().flatten());
    particles.replace(staying)?;

    if sent > 0 {
        tracing::trace!(rank = comm.rank(), sent, "migrated particles");
    }
    Ok(sent)
}

/// Exchange copies of the particles in the first and last cell of `slab`
/// with the neighbouring workers.
///
/// A copy crossing the global x boundary is shifted by `±boxsize` so its
/// stencil lands on the receiver's planes. With one worker the copies come
/// back to the sender, which reproduces the periodic wrap along x.
pub fn exchange_ghosts<C: Communicator>(
    comm: &C,
    particles: &[Particle],
    slab: &Slab,
    boxsize: f64,
) -> Result<Ghosts> {
    let nc = slab.nc;
    let dx_inv = nc as f64 / boxsize;
    let first = slab.local_ix0;
    let last = slab.end() - 1;

    let mut to_left = Vec::new();
    let mut to_right = Vec::new();
    for p in particles {
        let ix = plane_of(p.x.x, dx_inv, nc);
        if ix == first {
            let shift = if first == 0 { boxsize } else { 0.0 };
            to_left.push(GhostParticle {
                id: p.id,
                x: Vec3::new(p.x.x + shift, p.x.y, p.x.z),
            });
        }
        if ix == last {
            let shift = if last == nc - 1 { -boxsize } else { 0.0 };
            to_right.push(GhostParticle {
                id: p.id,
                x: Vec3::new(p.x.x + shift, p.x.y, p.x.z),
            });
        }
    }

    let (from_left, from_right) = comm.exchange_with_neighbors(to_left, to_right)?;
    Ok(Ghosts {
        from_left,
        from_right,
    })
}

/// Return the forces computed for received ghosts to their owners and add
/// the forces coming back onto the matching local particles.
///
/// `ghost_forces` is ordered like [`Ghosts::positions`].
pub fn fold_ghost_forces<C: Communicator>(
    comm: &C,
    ghosts: &Ghosts,
    ghost_forces: &[Vec3],
    particles: &[Particle],
    forces: &mut [Vec3],
) -> Result<()> {
    debug_assert_eq!(ghost_forces.len(), ghosts.len());
    let (left_forces, right_forces) = ghost_forces.split_at(ghosts.from_left.len());
    let back = |gs: &[GhostParticle], fs: &[Vec3]| -> Vec<GhostForce> {
        gs.iter()
            .zip(fs)
            .map(|(g, &force)| GhostForce { id: g.id, force })
            .collect()
    };

    // Ghosts from the left go back left
    let (returned_left, returned_right) = comm.exchange_with_neighbors(
        back(&ghosts.from_left, left_forces),
        back(&ghosts.from_right, right_forces),
    )?;

    if returned_left.is_empty() && returned_right.is_empty() {
        return Ok(());
    }
    let by_id: HashMap<u64, usize> = particles
        .iter()
        .enumerate()
        .map(|(i, p)| (p.id, i))
        .collect();
    for gf in returned_left.into_iter().chain(returned_right) {
        match by_id.get(&gf.id) {
            Some(&i) => forces[i] += gf.force,
            None => tracing::warn!(id = gf.id, "ghost force for unknown particle"),
        }
    }
    Ok(())
}
