//! The simulation context: everything one worker needs for a run.

use std::sync::Arc;

use cola_comm::Communicator;
use cola_cosmology::{Cosmology, FlatLcdm, PowerSpectrum};
use cola_fft::{GridArena, SlabFft};
use cola_integrator::{ColaIntegrator, StepSchedule};
use cola_lpt::{DisplacementSummary, LptGenerator};
use cola_particle::ParticleSet;
use cola_pm::PmSolver;

use crate::config::SimulationConfig;
use crate::{Error, Result};

/// Global statistics at the end of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    /// Particles summed over all workers.
    pub np_total: u64,
    /// RMS of the initial 2LPT displacement per component.
    pub rms_displacement: f64,
    /// RMS velocity per component.
    pub rms_velocity: f64,
    pub a_x: f64,
    pub a_v: f64,
}

/// One worker's share of a COLA simulation.
///
/// Built from a validated [`SimulationConfig`]; [`Simulation::run`] goes
/// through initial conditions, the leapfrog steps and the closing kick.
pub struct Simulation<C> {
    config: SimulationConfig,
    comm: Arc<C>,
    cosmology: Arc<dyn Cosmology>,
    spectrum: Arc<dyn PowerSpectrum>,
    arena: GridArena,
    pm: Option<PmSolver<C>>,
    integrator: ColaIntegrator,
    schedule: StepSchedule,
    particles: ParticleSet,
    initial: Option<DisplacementSummary>,
    steps_taken: usize,
}

impl<C: Communicator> Simulation<C> {
    pub fn new(config: SimulationConfig, comm: Arc<C>) -> Result<Self> {
        config.validate()?;
        if comm.size() != config.workers {
            return Err(Error::Config(format!(
                "configured for {} workers but running on {}",
                config.workers,
                comm.size()
            )));
        }

        let cosmology: Arc<dyn Cosmology> = Arc::new(FlatLcdm::new(config.omega_m)?);
        let spectrum = config.power_spectrum.load()?;
        let schedule = StepSchedule::uniform(config.a_init, config.a_final, config.n_steps)?;
        let particles = ParticleSet::with_capacity(config.np_alloc(), config.omega_m);

        if comm.rank() == 0 {
            tracing::info!(
                nc = config.nc,
                nc_pm = config.nc_pm(),
                boxsize = config.boxsize,
                workers = config.workers,
                np_alloc = particles.np_allocated(),
                "simulation configured"
            );
        }

        Ok(Self {
            integrator: ColaIntegrator::new(Arc::clone(&cosmology)),
            arena: GridArena::new("cola"),
            pm: None,
            initial: None,
            steps_taken: 0,
            config,
            comm,
            cosmology,
            spectrum,
            schedule,
            particles,
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn comm(&self) -> &Arc<C> {
        &self.comm
    }

    pub fn particles(&self) -> &ParticleSet {
        &self.particles
    }

    pub fn schedule(&self) -> &StepSchedule {
        &self.schedule
    }

    pub fn steps_taken(&self) -> usize {
        self.steps_taken
    }

    /// Generate 2LPT initial conditions at `a_init`, then set up the PM
    /// solver on the buffers the generator released.
    pub fn initialize(&mut self) -> Result<DisplacementSummary> {
        let fft = SlabFft::new(Arc::clone(&self.comm), self.config.nc);
        let mut lpt = LptGenerator::new(fft, self.config.boxsize, Some(&mut self.arena))?;
        let summary = lpt.set_displacements(
            self.config.seed,
            self.spectrum.as_ref(),
            self.config.a_init,
            self.cosmology.as_ref(),
            &mut self.particles,
        )?;
        lpt.free(Some(&mut self.arena));

        let fft = SlabFft::new(Arc::clone(&self.comm), self.config.nc_pm());
        self.pm = Some(PmSolver::new(
            fft,
            self.config.pm_nc_factor,
            self.config.boxsize,
            Some(&mut self.arena),
        )?);

        self.initial = Some(summary);
        self.steps_taken = 0;
        Ok(summary)
    }

    /// Forces at `a_x`, kick velocities to `kick_to`, drift positions to
    /// `drift_to`.
    pub fn step(&mut self, kick_to: f64, drift_to: f64) -> Result<()> {
        let pm = self.pm.as_mut().ok_or(Error::NotInitialized)?;
        if self.comm.rank() == 0 {
            tracing::info!(
                step = self.steps_taken + 1,
                a_x = self.particles.a_x,
                a_v = self.particles.a_v,
                kick_to,
                drift_to,
                "timestep"
            );
        }

        pm.compute_forces(&mut self.particles)?;
        self.integrator.kick(&mut self.particles, kick_to)?;
        self.integrator.drift(&mut self.particles, drift_to)?;
        self.steps_taken += 1;
        Ok(())
    }

    /// Closing force evaluation and kick, bringing velocities to `a_x`.
    pub fn finish(&mut self) -> Result<RunSummary> {
        let pm = self.pm.as_mut().ok_or(Error::NotInitialized)?;
        let a = self.particles.a_x;
        if self.comm.rank() == 0 {
            tracing::info!(a_v = self.particles.a_v, a, "final kick");
        }
        pm.compute_forces(&mut self.particles)?;
        self.integrator.kick(&mut self.particles, a)?;
        self.summary()
    }

    /// Initialize, take every scheduled step and finish.
    pub fn run(&mut self) -> Result<RunSummary> {
        self.initialize()?;
        let steps = self.schedule.steps().to_vec();
        for step in steps {
            self.step(step.kick_to, step.drift_to)?;
        }
        let summary = self.finish()?;
        if self.comm.rank() == 0 {
            tracing::info!(
                steps = self.steps_taken,
                np_total = summary.np_total,
                rms_velocity = summary.rms_velocity,
                "run complete"
            );
        }
        Ok(summary)
    }

    /// Global statistics of the current particle state.
    pub fn summary(&self) -> Result<RunSummary> {
        let np = self.comm.all_reduce_sum(self.particles.np_local() as f64)?;
        let v2 = self.comm.all_reduce_sum(self.particles.sum_squared_velocity())?;
        let rms_velocity = if np > 0.0 { (v2 / (3.0 * np)).sqrt() } else { 0.0 };
        Ok(RunSummary {
            np_total: np.round() as u64,
            rms_displacement: self.initial.map_or(0.0, |s| s.rms_displacement),
            rms_velocity,
            a_x: self.particles.a_x,
            a_v: self.particles.a_v,
        })
    }
}
