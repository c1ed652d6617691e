//! The parameter and buffer manager.
//!
//! Owns the five long-lived storage buffers every stage binds, plus the
//! staging buffers used for read-back. The instance buffer carries VERTEX
//! usage so the rendering collaborator can bind it as an instanced-draw
//! source without a copy.

use bytemuck::cast_slice;

use crate::config::SimConfig;
use crate::gpu::types::{CellRange, Instance, IntegrationResult, Parameters, SortParams};

/// GPU buffers shared by the four pipeline stages.
pub struct SimulationBuffers {
    /// Resource group 0: scalar parameters.
    pub parameters: wgpu::Buffer,
    /// Resource group 1: the instance array, padded to a power of two.
    pub instances: wgpu::Buffer,
    /// Resource group 2: bitonic strides, rewritten before each sort dispatch.
    pub sort_params: wgpu::Buffer,
    /// Resource group 3: per-cell `[start, end)` table.
    pub cells: wgpu::Buffer,
    /// Resource group 4: integration output scattered by stable id.
    pub results: wgpu::Buffer,

    pub(crate) staging_results: wgpu::Buffer,
    pub(crate) staging_instances: wgpu::Buffer,
    pub(crate) staging_cells: wgpu::Buffer,

    /// Real sphere count.
    pub instance_count: u32,
    /// Instance array length including sentinel padding.
    pub padded_len: u32,
    /// Cell table length, `grid_axis_count^3`.
    pub total_cells: u32,
}

impl SimulationBuffers {
    /// Allocate all buffers and upload the initial instances, padding the
    /// array to the next power of two with sentinel records.
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        config: &SimConfig,
        instances: &[Instance],
    ) -> Self {
        let instance_count = instances.len() as u32;
        let padded_len = instance_count.next_power_of_two();
        let total_cells = config.total_cells();

        let mut padded = instances.to_vec();
        padded.resize(padded_len as usize, Instance::sentinel());

        let instance_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Instance Buffer"),
            size: (padded_len as usize * Instance::SIZE) as u64,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::VERTEX
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        queue.write_buffer(&instance_buffer, 0, cast_slice(&padded));

        let parameters = Self::storage_buffer(
            device,
            "Parameters Buffer",
            std::mem::size_of::<Parameters>() as u64,
            wgpu::BufferUsages::COPY_DST,
        );
        let sort_params = Self::storage_buffer(
            device,
            "Sort Params Buffer",
            std::mem::size_of::<SortParams>() as u64,
            wgpu::BufferUsages::COPY_DST,
        );
        let cells = Self::storage_buffer(
            device,
            "Cell Range Buffer",
            (total_cells as usize * std::mem::size_of::<CellRange>()) as u64,
            wgpu::BufferUsages::COPY_SRC,
        );
        let results = Self::storage_buffer(
            device,
            "Results Buffer",
            (instance_count as usize * std::mem::size_of::<IntegrationResult>()) as u64,
            wgpu::BufferUsages::COPY_SRC,
        );

        let staging_results = Self::staging_buffer(
            device,
            "Results Staging Buffer",
            (instance_count as usize * std::mem::size_of::<IntegrationResult>()) as u64,
        );
        let staging_instances = Self::staging_buffer(
            device,
            "Instance Staging Buffer",
            (padded_len as usize * Instance::SIZE) as u64,
        );
        let staging_cells = Self::staging_buffer(
            device,
            "Cell Staging Buffer",
            (total_cells as usize * std::mem::size_of::<CellRange>()) as u64,
        );

        let buffers = Self {
            parameters,
            instances: instance_buffer,
            sort_params,
            cells,
            results,
            staging_results,
            staging_instances,
            staging_cells,
            instance_count,
            padded_len,
            total_cells,
        };
        buffers.write_parameters(
            queue,
            Parameters {
                time_step: config.time_step,
                boundary: config.boundary,
                grid_size: config.grid_size,
                instance_count,
            },
        );
        buffers
    }

    fn storage_buffer(
        device: &wgpu::Device,
        label: &str,
        size: u64,
        extra: wgpu::BufferUsages,
    ) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST | extra,
            mapped_at_creation: false,
        })
    }

    fn staging_buffer(device: &wgpu::Device, label: &str, size: u64) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    /// Update the scalar parameters; called at the start of every sub-step so
    /// a time-step change between sub-steps takes effect immediately.
    pub fn write_parameters(&self, queue: &wgpu::Queue, parameters: Parameters) {
        queue.write_buffer(&self.parameters, 0, bytemuck::bytes_of(&parameters));
    }

    /// Write the current bitonic strides. The write is only flushed by the
    /// next `queue.submit`, so each `(k, j)` pair needs its own submit.
    pub fn write_sort_params(&self, queue: &wgpu::Queue, k: u32, j: u32) {
        queue.write_buffer(&self.sort_params, 0, bytemuck::bytes_of(&SortParams { j, k }));
    }
}
