//! Headless GPU context acquisition.

use crate::error::SimulationError;

/// Owns the wgpu device and queue the whole pipeline dispatches on.
///
/// A single queue serializes every compute dispatch, which is what gives the
/// stages their happens-before ordering; no other synchronization exists.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_name: String,
}

impl GpuContext {
    /// The integrate stage binds resource group index 4, one past the
    /// WebGPU downlevel default of 4 bind groups.
    const REQUIRED_BIND_GROUPS: u32 = 5;

    /// Acquire an adapter and device, blocking on the async requests.
    pub fn new() -> Result<Self, SimulationError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| SimulationError::Resource(format!("no suitable GPU adapter: {e}")))?;

        let info = adapter.get_info();
        log::info!("using adapter {} ({:?})", info.name, info.backend);

        let mut limits = wgpu::Limits::downlevel_defaults();
        limits.max_bind_groups = limits.max_bind_groups.max(Self::REQUIRED_BIND_GROUPS);

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("Sphere Simulation Device"),
            required_features: wgpu::Features::empty(),
            required_limits: limits,
            memory_hints: wgpu::MemoryHints::default(),
            trace: wgpu::Trace::Off,
        }))?;

        Ok(Self {
            device,
            queue,
            adapter_name: info.name,
        })
    }
}

/// Try to acquire a context for a test, skipping the test when the machine
/// has no usable adapter.
#[cfg(test)]
pub(crate) fn acquire_test_context() -> Option<GpuContext> {
    match GpuContext::new() {
        Ok(context) => Some(context),
        Err(e) => {
            eprintln!("skipping GPU test: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_creation_raises_bind_group_limit() {
        let Some(context) = acquire_test_context() else {
            return;
        };
        assert!(context.device.limits().max_bind_groups >= GpuContext::REQUIRED_BIND_GROUPS);
        assert!(!context.adapter_name.is_empty());
    }
}
