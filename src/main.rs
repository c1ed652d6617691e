//! Headless driver.
//!
//! Stands in for the rendering collaborator: seeds a scene from the startup
//! configuration, runs the frame loop, and consumes the per-id results the
//! renderer would. Pass a RON config path as the first argument to override
//! the defaults.

use glam::Vec3;
use spherebox::{
    scene, GpuContext, SimConfig, Simulation, SimulationError, SphereInit, SphereState,
    SubStepClock,
};

fn main() {
    env_logger::init();

    let config = match std::env::args().nth(1) {
        Some(path) => match SimConfig::from_path(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("{e}");
                std::process::exit(1);
            }
        },
        None => SimConfig::default(),
    };

    if let Err(e) = run(config) {
        log::error!("simulation failed: {e}");
        std::process::exit(1);
    }
}

fn run(config: SimConfig) -> Result<(), SimulationError> {
    config.validate()?;
    let inits = scene::random_scene(&config);
    let mut sim = Simulation::new(GpuContext::new()?, config.clone(), &inits)?;
    log::info!(
        "instance buffer ready for an instanced draw: {} bytes",
        sim.instance_buffer().size()
    );
    let mut clock = SubStepClock::new(config.time_step, 2 * config.substeps_per_frame);
    let frame_dt = config.time_step * config.substeps_per_frame as f32;

    // Last good read-back, kept so a lost device can be reseeded.
    let mut last_states: Vec<SphereState> = inits
        .iter()
        .map(|s| SphereState {
            position: s.position,
            velocity: s.velocity,
        })
        .collect();
    let mut rebuilt = false;

    for frame in 0..config.frames {
        let steps = clock.advance(frame_dt);
        let outcome = (|| -> Result<Vec<SphereState>, SimulationError> {
            for _ in 0..steps {
                sim.sub_step()?;
            }
            sim.read_back_results()
        })();

        match outcome {
            Ok(states) => {
                scan_for_instability(&states);
                last_states = states;
            }
            Err(SimulationError::DeviceLost(reason)) if !rebuilt => {
                // One rebuild from the last good state; a second loss is fatal.
                log::warn!("device lost ({reason}); rebuilding simulation");
                rebuilt = true;
                let reseeded = reseed(&inits, &last_states);
                sim = Simulation::new(GpuContext::new()?, config.clone(), &reseeded)?;
                continue;
            }
            Err(e) => return Err(e),
        }

        if frame % 60 == 0 {
            let energy = kinetic_energy(&inits, &last_states);
            log::info!(
                "frame {frame:5} t={:8.3}s kinetic energy {energy:10.3}",
                clock.simulated_time()
            );
        }
    }

    log::info!(
        "done: {} sub-steps over {} frames",
        sim.sub_steps_done(),
        config.frames
    );
    Ok(())
}

/// Rebuild the initial snapshots from the last read-back, keeping the
/// original radii and ids.
fn reseed(inits: &[SphereInit], states: &[SphereState]) -> Vec<SphereInit> {
    inits
        .iter()
        .map(|init| {
            let state = states[init.id as usize];
            SphereInit {
                id: init.id,
                radius: init.radius,
                position: state.position,
                velocity: state.velocity,
            }
        })
        .collect()
}

/// Instability is advisory: the core never self-detects, the host logs the
/// offending ids so they can be reseeded.
fn scan_for_instability(states: &[SphereState]) {
    for (id, state) in states.iter().enumerate() {
        if !state.position.is_finite() || !state.velocity.is_finite() {
            log::warn!(
                "instance {id} went non-finite (position {:?}); consider a smaller time step",
                state.position
            );
        }
    }
}

fn kinetic_energy(inits: &[SphereInit], states: &[SphereState]) -> f32 {
    inits
        .iter()
        .map(|init| {
            let velocity: Vec3 = states[init.id as usize].velocity;
            0.5 * init.radius.powi(3) * velocity.length_squared()
        })
        .sum()
}
