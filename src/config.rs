//! Simulation configuration and the shared cell-flattening helpers.
//!
//! Every stage that maps a position to a grid cell goes through the helpers
//! in this module (the WGSL kernels carry the same expressions verbatim), so
//! the host allocation and the GPU indexing can never disagree.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::SimulationError;

/// Maximum number of spheres supported by the GPU pipeline.
pub const MAX_INSTANCES: u32 = 65_536;

/// Upper bound on grid cells per axis, keeping the cell table allocation sane.
pub const MAX_GRID_AXIS: u32 = 128;

/// Global physics constants baked into the integration kernel at pipeline
/// creation time. Defaults are the production values; tests compile dedicated
/// pipelines with modified copies.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PhysicsConstants {
    /// Penalty-contact stiffness.
    pub stiffness: f32,
    /// Gravitational acceleration along -y.
    pub gravity: f32,
    /// Cubic air-drag coefficient.
    pub drag: f32,
    /// Advisory restitution; the wall rule clamps the velocity sign instead.
    pub restitution: f32,
}

impl Default for PhysicsConstants {
    fn default() -> Self {
        Self {
            stiffness: 1000.0,
            gravity: 9.8,
            drag: 0.01,
            restitution: 0.85,
        }
    }
}

/// Startup configuration for the simulation and the headless driver.
///
/// `boundary` and `grid_size` are fixed for the lifetime of a simulation;
/// only `time_step` may change between sub-steps.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Number of spheres to simulate.
    pub instance_count: u32,
    /// Half-extent of the cubic container; the domain is `[-boundary, +boundary]^3`.
    pub boundary: f32,
    /// Side length of one grid cell. Must be at least twice the largest radius
    /// so the 27-cell neighborhood is exhaustive.
    pub grid_size: f32,
    /// Duration of one physics sub-step in seconds.
    pub time_step: f32,
    /// Sub-steps executed per displayed frame.
    pub substeps_per_frame: u32,
    /// Frames the headless driver runs before exiting.
    pub frames: u32,
    /// RNG seed for the initial scene.
    pub seed: u64,
    /// Smallest sphere radius generated by the scene builder.
    pub min_radius: f32,
    /// Largest sphere radius generated by the scene builder.
    pub max_radius: f32,
    /// Per-axis bound on initial velocity components.
    pub initial_speed: f32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            instance_count: 2048,
            boundary: 10.0,
            grid_size: 1.0,
            time_step: 1.0 / 240.0,
            substeps_per_frame: 4,
            frames: 600,
            seed: 42,
            min_radius: 0.2,
            max_radius: 0.45,
            initial_speed: 2.0,
        }
    }
}

impl SimConfig {
    /// Load a configuration from a RON file.
    pub fn from_path(path: &str) -> Result<Self, SimulationError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| SimulationError::Config(format!("cannot read {path}: {e}")))?;
        ron::from_str(&text)
            .map_err(|e| SimulationError::Config(format!("cannot parse {path}: {e}")))
    }

    /// Check the init-time invariants. This is the only reject point of the
    /// pipeline; stages themselves cannot fail under valid inputs.
    pub fn validate(&self) -> Result<(), SimulationError> {
        if !(self.boundary > 0.0) {
            return Err(SimulationError::Config(format!(
                "boundary must be positive, got {}",
                self.boundary
            )));
        }
        if !(self.grid_size > 0.0) {
            return Err(SimulationError::Config(format!(
                "grid_size must be positive, got {}",
                self.grid_size
            )));
        }
        if !(self.min_radius > 0.0) || self.min_radius > self.max_radius {
            return Err(SimulationError::Config(format!(
                "radius range [{}, {}] is empty or non-positive",
                self.min_radius, self.max_radius
            )));
        }
        if self.grid_size < 2.0 * self.max_radius {
            return Err(SimulationError::Config(format!(
                "grid_size {} is below twice the maximum radius {}; the \
                 27-cell neighbor sweep would miss contacts",
                self.grid_size, self.max_radius
            )));
        }
        if !(self.time_step > 0.0) {
            return Err(SimulationError::Config(format!(
                "time_step must be positive, got {}",
                self.time_step
            )));
        }
        if self.instance_count == 0 || self.instance_count > MAX_INSTANCES {
            return Err(SimulationError::Config(format!(
                "instance_count must be in 1..={MAX_INSTANCES}, got {}",
                self.instance_count
            )));
        }
        if self.substeps_per_frame == 0 {
            return Err(SimulationError::Config(
                "substeps_per_frame must be at least 1".into(),
            ));
        }
        let axis = grid_axis_count(self.boundary, self.grid_size);
        if axis > MAX_GRID_AXIS {
            return Err(SimulationError::Config(format!(
                "grid has {axis} cells per axis, above the limit of {MAX_GRID_AXIS}; \
                 increase grid_size or shrink the boundary"
            )));
        }
        Ok(())
    }

    /// Grid cells per axis for this configuration.
    pub fn grid_axis_count(&self) -> u32 {
        grid_axis_count(self.boundary, self.grid_size)
    }

    /// Total number of cells in the cubic grid.
    pub fn total_cells(&self) -> u32 {
        let g = self.grid_axis_count();
        g * g * g
    }

    /// Instance array length after padding to the next power of two, as the
    /// bitonic network requires.
    pub fn padded_len(&self) -> u32 {
        self.instance_count.next_power_of_two()
    }
}

/// Grid cells per axis. Mirrored verbatim by `axis_cell_count` in the WGSL
/// kernels; any change must be made in both places.
pub fn grid_axis_count(boundary: f32, grid_size: f32) -> u32 {
    (2.0 * boundary / grid_size + 0.5).ceil() as u32
}

/// Grid coordinates of a position, clamped per axis so rim-crossing spheres
/// and float rounding at the faces cannot index out of the grid.
pub fn cell_coords(position: Vec3, boundary: f32, grid_size: f32) -> (u32, u32, u32) {
    let g = grid_axis_count(boundary, grid_size);
    let upper = (g - 1) as f32;
    let offset = position + Vec3::splat(boundary);
    (
        (offset.x / grid_size).floor().clamp(0.0, upper) as u32,
        (offset.y / grid_size).floor().clamp(0.0, upper) as u32,
        (offset.z / grid_size).floor().clamp(0.0, upper) as u32,
    )
}

/// Flattened cell index of a position.
pub fn flatten_cell(position: Vec3, boundary: f32, grid_size: f32) -> u32 {
    let g = grid_axis_count(boundary, grid_size);
    let (x, y, z) = cell_coords(position, boundary, grid_size);
    (x + y * g + z * g * g).min(g * g * g - 1)
}
