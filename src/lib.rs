//! GPU-resident rigid-sphere collision simulation core.
//!
//! The crate runs a four-stage compute pipeline every sub-step: hash each
//! sphere into a uniform spatial grid, sort the sphere array by cell index
//! with a bitonic network, build a per-cell `[start, end)` table from the
//! sorted array, then integrate contact forces, gravity, drag and wall
//! collisions. Rendering, windowing and camera control are external
//! collaborators; they consume the instance buffer and the per-id results
//! this crate maintains.

pub mod clock;
pub mod config;
pub mod cpu;
pub mod error;
pub mod gpu;
pub mod scene;
pub mod simulation;

pub use clock::SubStepClock;
pub use config::{PhysicsConstants, SimConfig};
pub use error::SimulationError;
pub use gpu::context::GpuContext;
pub use scene::SphereInit;
pub use simulation::{Simulation, SphereState, StepPhase};
