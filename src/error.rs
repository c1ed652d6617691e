//! Error kinds surfaced by the simulation core.

/// Errors that can occur while building or driving the simulation.
///
/// Kernels themselves cannot fail at runtime under valid inputs; the
/// configuration check at init is the only reject point, and everything else
/// here reports a backend problem.
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    /// An init-time invariant was violated (bad grid size, empty scene, ...).
    #[error("invalid configuration: {0}")]
    Config(String),

    /// GPU adapter or allocation request failed.
    #[error("GPU resource acquisition failed: {0}")]
    Resource(String),

    /// Failed to create the GPU device.
    #[error("failed to create GPU device: {0}")]
    DeviceCreation(#[from] wgpu::RequestDeviceError),

    /// The backend reported device loss; all buffers are gone and the
    /// simulation must be rebuilt.
    #[error("GPU device lost: {0}")]
    DeviceLost(String),

    /// Mapping a read-back buffer failed.
    #[error("buffer mapping failed: {0}")]
    BufferMapping(String),
}
