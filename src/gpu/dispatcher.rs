//! Stage dispatch and read-back.
//!
//! Dispatches are serialized on the single queue, so the completion of one
//! stage is a happens-before for the next stage's reads. The bitonic sweep
//! is the only stage driven by a host-side loop.

use bytemuck::Pod;

use crate::error::SimulationError;
use crate::gpu::buffers::SimulationBuffers;
use crate::gpu::pipelines::{SimulationPipelines, CLEAR_WORKGROUP_SIZE, WORKGROUP_SIZE};
use crate::gpu::types::{CellRange, Instance, IntegrationResult};

/// Launch width of the strided clear pass; the kernel strides over the rest.
const CLEAR_MAX_WORKGROUPS: u32 = 64;

/// One bind group per buffer, reused by every stage that reads the buffer.
pub struct StageBindGroups {
    pub parameters: wgpu::BindGroup,
    pub instances: wgpu::BindGroup,
    pub sort_params: wgpu::BindGroup,
    pub cells: wgpu::BindGroup,
    pub results: wgpu::BindGroup,
    /// Filler for group indices a stage's layout skips.
    pub empty: wgpu::BindGroup,
}

impl StageBindGroups {
    pub fn new(
        device: &wgpu::Device,
        pipelines: &SimulationPipelines,
        buffers: &SimulationBuffers,
    ) -> Self {
        Self {
            parameters: Self::single_buffer_group(
                device,
                &pipelines.parameters_layout,
                &buffers.parameters,
                "Parameters Bind Group",
            ),
            instances: Self::single_buffer_group(
                device,
                &pipelines.instances_layout,
                &buffers.instances,
                "Instances Bind Group",
            ),
            sort_params: Self::single_buffer_group(
                device,
                &pipelines.sort_params_layout,
                &buffers.sort_params,
                "Sort Params Bind Group",
            ),
            cells: Self::single_buffer_group(
                device,
                &pipelines.cells_layout,
                &buffers.cells,
                "Cells Bind Group",
            ),
            results: Self::single_buffer_group(
                device,
                &pipelines.results_layout,
                &buffers.results,
                "Results Bind Group",
            ),
            empty: device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Empty Bind Group"),
                layout: &pipelines.empty_layout,
                entries: &[],
            }),
        }
    }

    fn single_buffer_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        buffer: &wgpu::Buffer,
        label: &str,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        })
    }
}

/// Encode the grid-assign pass over the real instances.
pub fn encode_grid_assign(
    encoder: &mut wgpu::CommandEncoder,
    pipelines: &SimulationPipelines,
    groups: &StageBindGroups,
    instance_count: u32,
) {
    let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
        label: Some("Grid Assign Pass"),
        timestamp_writes: None,
    });
    pass.set_pipeline(&pipelines.grid_assign);
    pass.set_bind_group(0, &groups.parameters, &[]);
    pass.set_bind_group(1, &groups.instances, &[]);
    pass.dispatch_workgroups((instance_count + WORKGROUP_SIZE - 1) / WORKGROUP_SIZE, 1, 1);
}

/// Run the full bitonic sweep over the padded instance array.
///
/// Each `(k, j)` pair gets its own `write_buffer` and submit; the submit is
/// what flushes the stride write before the dispatch that consumes it.
pub fn run_bitonic_sort(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    pipelines: &SimulationPipelines,
    buffers: &SimulationBuffers,
    groups: &StageBindGroups,
) {
    let n = buffers.padded_len;
    if n < 2 {
        return;
    }
    let workgroups = (n + WORKGROUP_SIZE - 1) / WORKGROUP_SIZE;

    let mut k = 2u32;
    while k <= n {
        let mut j = k / 2;
        while j >= 1 {
            buffers.write_sort_params(queue, k, j);
            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Bitonic Sort Encoder"),
            });
            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("Bitonic Sort Pass"),
                    timestamp_writes: None,
                });
                pass.set_pipeline(&pipelines.bitonic_sort);
                pass.set_bind_group(0, &groups.empty, &[]);
                pass.set_bind_group(1, &groups.instances, &[]);
                pass.set_bind_group(2, &groups.sort_params, &[]);
                pass.dispatch_workgroups(workgroups, 1, 1);
            }
            queue.submit(std::iter::once(encoder.finish()));
            j /= 2;
        }
        k *= 2;
    }
}

/// Encode the strided cell-table clear.
pub fn encode_cell_clear(
    encoder: &mut wgpu::CommandEncoder,
    pipelines: &SimulationPipelines,
    groups: &StageBindGroups,
    total_cells: u32,
) {
    let workgroups = ((total_cells + CLEAR_WORKGROUP_SIZE - 1) / CLEAR_WORKGROUP_SIZE)
        .clamp(1, CLEAR_MAX_WORKGROUPS);
    let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
        label: Some("Cell Range Clear Pass"),
        timestamp_writes: None,
    });
    pass.set_pipeline(&pipelines.cell_range_clear);
    pass.set_bind_group(0, &groups.empty, &[]);
    pass.set_bind_group(1, &groups.empty, &[]);
    pass.set_bind_group(2, &groups.empty, &[]);
    pass.set_bind_group(3, &groups.cells, &[]);
    pass.dispatch_workgroups(workgroups, 1, 1);
}

/// Encode the boundary-detection build over the sorted array.
///
/// The build covers the sentinel tail as well: the first padded slot is the
/// thread that closes the last real cell's range.
pub fn encode_cell_build(
    encoder: &mut wgpu::CommandEncoder,
    pipelines: &SimulationPipelines,
    groups: &StageBindGroups,
    padded_len: u32,
) {
    let workgroups = (padded_len + WORKGROUP_SIZE - 1) / WORKGROUP_SIZE;
    let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
        label: Some("Cell Range Build Pass"),
        timestamp_writes: None,
    });
    pass.set_pipeline(&pipelines.cell_range_build);
    pass.set_bind_group(0, &groups.empty, &[]);
    pass.set_bind_group(1, &groups.instances, &[]);
    pass.set_bind_group(2, &groups.empty, &[]);
    pass.set_bind_group(3, &groups.cells, &[]);
    pass.dispatch_workgroups(workgroups, 1, 1);
}

/// Encode the integration pass over the real instances.
pub fn encode_integrate(
    encoder: &mut wgpu::CommandEncoder,
    pipelines: &SimulationPipelines,
    groups: &StageBindGroups,
    instance_count: u32,
) {
    let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
        label: Some("Integrate Pass"),
        timestamp_writes: None,
    });
    pass.set_pipeline(&pipelines.integrate);
    pass.set_bind_group(0, &groups.parameters, &[]);
    pass.set_bind_group(1, &groups.instances, &[]);
    pass.set_bind_group(2, &groups.empty, &[]);
    pass.set_bind_group(3, &groups.cells, &[]);
    pass.set_bind_group(4, &groups.results, &[]);
    pass.dispatch_workgroups((instance_count + WORKGROUP_SIZE - 1) / WORKGROUP_SIZE, 1, 1);
}

/// Copy the results buffer back to the host, one record per stable id.
pub fn read_back_results(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    buffers: &SimulationBuffers,
) -> Result<Vec<IntegrationResult>, SimulationError> {
    map_staging(
        device,
        queue,
        &buffers.results,
        &buffers.staging_results,
        (buffers.instance_count as usize * std::mem::size_of::<IntegrationResult>()) as u64,
    )
}

/// Debug read-back of the padded instance array in its current (sorted) order.
pub fn read_back_instances(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    buffers: &SimulationBuffers,
) -> Result<Vec<Instance>, SimulationError> {
    map_staging(
        device,
        queue,
        &buffers.instances,
        &buffers.staging_instances,
        (buffers.padded_len as usize * Instance::SIZE) as u64,
    )
}

/// Debug read-back of the cell range table.
pub fn read_back_cells(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    buffers: &SimulationBuffers,
) -> Result<Vec<CellRange>, SimulationError> {
    map_staging(
        device,
        queue,
        &buffers.cells,
        &buffers.staging_cells,
        (buffers.total_cells as usize * std::mem::size_of::<CellRange>()) as u64,
    )
}

fn map_staging<T: Pod>(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    source: &wgpu::Buffer,
    staging: &wgpu::Buffer,
    bytes: u64,
) -> Result<Vec<T>, SimulationError> {
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("Read-back Encoder"),
    });
    encoder.copy_buffer_to_buffer(source, 0, staging, 0, bytes);
    queue.submit(std::iter::once(encoder.finish()));

    let slice = staging.slice(..bytes);
    let (tx, rx) = crossbeam_channel::bounded(1);
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    device
        .poll(wgpu::PollType::Wait)
        .map_err(|e| SimulationError::DeviceLost(e.to_string()))?;
    rx.recv()
        .map_err(|_| SimulationError::BufferMapping("map callback dropped".into()))?
        .map_err(|e| SimulationError::BufferMapping(e.to_string()))?;

    let data = slice.get_mapped_range();
    let out = bytemuck::cast_slice(&data).to_vec();
    drop(data);
    staging.unmap();
    Ok(out)
}
