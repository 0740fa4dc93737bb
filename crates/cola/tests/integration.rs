//! End-to-end runs through the public cola API.

use std::collections::HashSet;
use std::sync::Arc;

use approx::assert_relative_eq;
use cola::{
    ConstantSpectrum, FlatLcdm, LocalCluster, LptGenerator, ParticleSet, PowerSpectrumConfig,
    RunSummary, SerialComm, Simulation, SimulationConfig, SlabFft,
};

fn small_run(workers: usize) -> SimulationConfig {
    SimulationConfig {
        nc: 8,
        boxsize: 64.0,
        pm_nc_factor: 2,
        seed: 12345,
        a_init: 0.1,
        a_final: 1.0,
        n_steps: 3,
        workers,
        power_spectrum: PowerSpectrumConfig::Constant { amplitude: 1.0 },
        ..SimulationConfig::default()
    }
}

#[test]
fn test_flat_spectrum_initial_conditions() {
    let (nc, boxsize) = (8, 64.0);
    let fft = SlabFft::new(Arc::new(SerialComm::new()), nc);
    let mut lpt = LptGenerator::new(fft, boxsize, None).unwrap();
    let spectrum = ConstantSpectrum::new(1.0);
    let cosmology = FlatLcdm::new(0.3).unwrap();

    lpt.generate_phi(12345, &spectrum).unwrap();
    let mut particles = ParticleSet::with_capacity(1024, 0.3);
    let summary = lpt
        .set_displacements(12345, &spectrum, 1.0, &cosmology, &mut particles)
        .unwrap();

    assert_eq!(summary.np_local, 512);
    assert_eq!(particles.np_local(), 512);

    let ids: HashSet<u64> = particles.particles.iter().map(|p| p.id).collect();
    assert_eq!(ids.len(), 512);
    assert!(ids.iter().all(|id| (1..=512).contains(id)));

    for p in &particles.particles {
        for d in 0..3 {
            assert!(p.x[d] >= 0.0 && p.x[d] < boxsize, "{:?}", p.x);
        }
        assert_eq!(p.v, cola::Vec3::zeros());
    }

    // Reference realization for seed 12345
    assert_relative_eq!(summary.rms_displacement, 0.0838631471938663, max_relative = 1e-3);
}

#[test]
fn test_serial_run_reaches_final_time() {
    let config = small_run(1);
    let mut sim = Simulation::new(config, Arc::new(SerialComm::new())).unwrap();
    let summary = sim.run().unwrap();

    assert_eq!(summary.np_total, 512);
    assert_eq!(summary.a_x, 1.0);
    assert_eq!(summary.a_v, 1.0);
    assert_eq!(sim.steps_taken(), 3);
    assert!(summary.rms_velocity.is_finite() && summary.rms_velocity > 0.0);

    let ids: HashSet<u64> = sim.particles().particles.iter().map(|p| p.id).collect();
    assert_eq!(ids.len(), 512);
    for p in &sim.particles().particles {
        assert!(p.x.iter().all(|&c| (0.0..64.0).contains(&c)), "{:?}", p.x);
    }
}

#[test]
fn test_two_workers_match_serial() {
    let serial = Simulation::new(small_run(1), Arc::new(SerialComm::new()))
        .unwrap()
        .run()
        .unwrap();

    let config = small_run(2);
    let comms = LocalCluster::new(2);
    let results: Vec<(RunSummary, usize)> = std::thread::scope(|s| {
        let handles: Vec<_> = comms
            .into_iter()
            .map(|comm| {
                let config = config.clone();
                s.spawn(move || {
                    let mut sim = Simulation::new(config, Arc::new(comm)).unwrap();
                    let summary = sim.run().unwrap();
                    (summary, sim.particles().np_local())
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let local_total: usize = results.iter().map(|(_, n)| n).sum();
    assert_eq!(local_total, 512);
    for (summary, _) in &results {
        assert_eq!(summary.np_total, 512);
        assert_eq!((summary.a_x, summary.a_v), (1.0, 1.0));
        assert_relative_eq!(
            summary.rms_displacement,
            serial.rms_displacement,
            max_relative = 1e-12
        );
        assert_relative_eq!(summary.rms_velocity, serial.rms_velocity, max_relative = 1e-6);
    }
}
