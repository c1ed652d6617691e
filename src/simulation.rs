//! The simulation facade.
//!
//! Owns the GPU context, pipelines, buffers and bind groups, and drives the
//! per-sub-step schedule `Assign -> SortLoop -> CellClear -> CellBuild ->
//! Integrate`. After the last sub-step of a frame the instance buffer is
//! quiescent and can be handed to the rendering collaborator.

use glam::Vec3;

use crate::config::{PhysicsConstants, SimConfig, MAX_INSTANCES};
use crate::error::SimulationError;
use crate::gpu::buffers::SimulationBuffers;
use crate::gpu::context::GpuContext;
use crate::gpu::dispatcher::{self, StageBindGroups};
use crate::gpu::pipelines::SimulationPipelines;
use crate::gpu::types::{Instance, Parameters};
use crate::scene::SphereInit;

/// Scheduler state of one sub-step. `SortLoop` is the only state that
/// re-enters itself; the CPU-side `(k, j)` loop decides its termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPhase {
    Idle,
    Assign,
    SortLoop,
    CellClear,
    CellBuild,
    Integrate,
}

/// Host-side view of one sphere after a read-back, indexed by stable id.
#[derive(Clone, Copy, Debug)]
pub struct SphereState {
    pub position: Vec3,
    pub velocity: Vec3,
}

/// GPU-resident sphere simulation.
pub struct Simulation {
    context: GpuContext,
    config: SimConfig,
    pipelines: SimulationPipelines,
    buffers: SimulationBuffers,
    bind_groups: StageBindGroups,
    phase: StepPhase,
    sub_steps_done: u64,
}

impl Simulation {
    /// Build a simulation with the production physics constants.
    pub fn new(
        context: GpuContext,
        config: SimConfig,
        spheres: &[SphereInit],
    ) -> Result<Self, SimulationError> {
        Self::with_constants(context, config, spheres, PhysicsConstants::default())
    }

    /// Build a simulation with explicit physics constants. The constants are
    /// baked into the integration pipeline at creation time.
    pub fn with_constants(
        context: GpuContext,
        config: SimConfig,
        spheres: &[SphereInit],
        constants: PhysicsConstants,
    ) -> Result<Self, SimulationError> {
        config.validate()?;
        if spheres.is_empty() || spheres.len() > MAX_INSTANCES as usize {
            return Err(SimulationError::Config(format!(
                "sphere count must be in 1..={MAX_INSTANCES}, got {}",
                spheres.len()
            )));
        }
        let count = spheres.len();
        let mut seen = vec![false; count];
        for sphere in spheres {
            let id = sphere.id as usize;
            if id >= count || seen[id] {
                return Err(SimulationError::Config(format!(
                    "sphere id {} is duplicated or outside 0..{count}",
                    sphere.id
                )));
            }
            seen[id] = true;
            if !(sphere.radius > 0.0) {
                return Err(SimulationError::Config(format!(
                    "sphere {} has non-positive radius {}",
                    sphere.id, sphere.radius
                )));
            }
            if 2.0 * sphere.radius > config.grid_size {
                return Err(SimulationError::Config(format!(
                    "sphere {} radius {} exceeds half the grid cell size {}",
                    sphere.id, sphere.radius, config.grid_size
                )));
            }
        }

        let instances: Vec<Instance> = spheres
            .iter()
            .map(|s| Instance::new(s.id, s.radius, s.position, s.velocity))
            .collect();

        let pipelines = SimulationPipelines::new(&context.device, &constants);
        let buffers = SimulationBuffers::new(&context.device, &context.queue, &config, &instances);
        let bind_groups = StageBindGroups::new(&context.device, &pipelines, &buffers);

        log::info!(
            "simulation initialized: {} spheres (padded to {}), {} grid cells",
            buffers.instance_count,
            buffers.padded_len,
            buffers.total_cells
        );

        Ok(Self {
            context,
            config,
            pipelines,
            buffers,
            bind_groups,
            phase: StepPhase::Idle,
            sub_steps_done: 0,
        })
    }

    /// Advance the simulation by one sub-step of `time_step` seconds.
    pub fn sub_step(&mut self) -> Result<(), SimulationError> {
        let device = &self.context.device;
        let queue = &self.context.queue;

        // Re-upload the scalars every sub-step so a time-step change between
        // sub-steps takes effect immediately.
        self.buffers.write_parameters(
            queue,
            Parameters {
                time_step: self.config.time_step,
                boundary: self.config.boundary,
                grid_size: self.config.grid_size,
                instance_count: self.buffers.instance_count,
            },
        );

        self.phase = StepPhase::Assign;
        log::trace!("sub-step {}: {:?}", self.sub_steps_done, self.phase);
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Grid Assign Encoder"),
        });
        dispatcher::encode_grid_assign(
            &mut encoder,
            &self.pipelines,
            &self.bind_groups,
            self.buffers.instance_count,
        );
        queue.submit(std::iter::once(encoder.finish()));

        self.phase = StepPhase::SortLoop;
        log::trace!("sub-step {}: {:?}", self.sub_steps_done, self.phase);
        dispatcher::run_bitonic_sort(device, queue, &self.pipelines, &self.buffers, &self.bind_groups);

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Cell Table And Integrate Encoder"),
        });
        self.phase = StepPhase::CellClear;
        log::trace!("sub-step {}: {:?}", self.sub_steps_done, self.phase);
        dispatcher::encode_cell_clear(
            &mut encoder,
            &self.pipelines,
            &self.bind_groups,
            self.buffers.total_cells,
        );
        self.phase = StepPhase::CellBuild;
        log::trace!("sub-step {}: {:?}", self.sub_steps_done, self.phase);
        dispatcher::encode_cell_build(
            &mut encoder,
            &self.pipelines,
            &self.bind_groups,
            self.buffers.padded_len,
        );
        self.phase = StepPhase::Integrate;
        log::trace!("sub-step {}: {:?}", self.sub_steps_done, self.phase);
        dispatcher::encode_integrate(
            &mut encoder,
            &self.pipelines,
            &self.bind_groups,
            self.buffers.instance_count,
        );
        queue.submit(std::iter::once(encoder.finish()));

        self.phase = StepPhase::Idle;
        self.sub_steps_done += 1;
        Ok(())
    }

    /// Run the given number of sub-steps back to back; the instance buffer
    /// is quiescent afterwards.
    pub fn step_frame(&mut self, substeps: u32) -> Result<(), SimulationError> {
        for _ in 0..substeps {
            self.sub_step()?;
        }
        Ok(())
    }

    /// Change the sub-step duration; takes effect on the next sub-step.
    pub fn set_time_step(&mut self, time_step: f32) {
        self.config.time_step = time_step;
    }

    /// Read the per-id integration results back to the host.
    pub fn read_back_results(&self) -> Result<Vec<SphereState>, SimulationError> {
        let raw =
            dispatcher::read_back_results(&self.context.device, &self.context.queue, &self.buffers)?;
        Ok(raw
            .into_iter()
            .map(|r| SphereState {
                position: Vec3::from_array(r.position),
                velocity: Vec3::from_array(r.velocity),
            })
            .collect())
    }

    /// The instance buffer in sorted order, with VERTEX usage; the rendering
    /// collaborator binds it as the source of an instanced draw.
    pub fn instance_buffer(&self) -> &wgpu::Buffer {
        &self.buffers.instances
    }

    /// The per-id results buffer.
    pub fn results_buffer(&self) -> &wgpu::Buffer {
        &self.buffers.results
    }

    pub fn instance_count(&self) -> u32 {
        self.buffers.instance_count
    }

    pub fn phase(&self) -> StepPhase {
        self.phase
    }

    pub fn sub_steps_done(&self) -> u64 {
        self.sub_steps_done
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn context(&self) -> &GpuContext {
        &self.context
    }
}
