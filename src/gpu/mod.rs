//! GPU-facing half of the crate: device context, buffer manager, the five
//! compute pipelines, and the per-stage dispatch code.

pub mod buffers;
pub mod context;
pub mod dispatcher;
pub mod pipelines;
pub mod types;

pub use buffers::SimulationBuffers;
pub use context::GpuContext;
pub use dispatcher::StageBindGroups;
pub use pipelines::{SimulationPipelines, CLEAR_WORKGROUP_SIZE, WORKGROUP_SIZE};
