//! Compute pipelines for the four simulation stages.
//!
//! Resource groups keep fixed indices across every stage (0 parameters,
//! 1 instances, 2 sort params, 3 cells, 4 results); a stage's pipeline
//! layout fills the indices it does not read with an empty layout so each
//! shader declares only the groups it uses.

use crate::config::PhysicsConstants;

/// Threads per workgroup for the per-instance stages.
pub const WORKGROUP_SIZE: u32 = 64;

/// Threads per workgroup for the strided cell-table clear.
pub const CLEAR_WORKGROUP_SIZE: u32 = 256;

/// The five compute pipelines plus the per-buffer bind group layouts.
pub struct SimulationPipelines {
    pub grid_assign: wgpu::ComputePipeline,
    pub bitonic_sort: wgpu::ComputePipeline,
    pub cell_range_clear: wgpu::ComputePipeline,
    pub cell_range_build: wgpu::ComputePipeline,
    pub integrate: wgpu::ComputePipeline,

    pub parameters_layout: wgpu::BindGroupLayout,
    pub instances_layout: wgpu::BindGroupLayout,
    pub sort_params_layout: wgpu::BindGroupLayout,
    pub cells_layout: wgpu::BindGroupLayout,
    pub results_layout: wgpu::BindGroupLayout,
    pub empty_layout: wgpu::BindGroupLayout,
}

impl SimulationPipelines {
    pub fn new(device: &wgpu::Device, constants: &PhysicsConstants) -> Self {
        let parameters_layout = Self::storage_group_layout(device, "Parameters Group Layout");
        let instances_layout = Self::storage_group_layout(device, "Instances Group Layout");
        let sort_params_layout = Self::storage_group_layout(device, "Sort Params Group Layout");
        let cells_layout = Self::storage_group_layout(device, "Cells Group Layout");
        let results_layout = Self::storage_group_layout(device, "Results Group Layout");
        let empty_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Empty Group Layout"),
            entries: &[],
        });

        let assign_shader = Self::load_shader(
            device,
            include_str!("../../assets/shaders/grid_assign.wgsl"),
            "grid_assign.wgsl",
        );
        let sort_shader = Self::load_shader(
            device,
            include_str!("../../assets/shaders/bitonic_sort.wgsl"),
            "bitonic_sort.wgsl",
        );
        let clear_shader = Self::load_shader(
            device,
            include_str!("../../assets/shaders/cell_range_clear.wgsl"),
            "cell_range_clear.wgsl",
        );
        let build_shader = Self::load_shader(
            device,
            include_str!("../../assets/shaders/cell_range_build.wgsl"),
            "cell_range_build.wgsl",
        );
        let integrate_source = splice_constants(
            include_str!("../../assets/shaders/sphere_integrate.wgsl"),
            constants,
        );
        let integrate_shader = Self::load_shader(device, &integrate_source, "sphere_integrate.wgsl");

        let grid_assign = Self::create_compute_pipeline(
            device,
            &assign_shader,
            &[&parameters_layout, &instances_layout],
            "assign_cells",
            "Grid Assign Pipeline",
        );
        let bitonic_sort = Self::create_compute_pipeline(
            device,
            &sort_shader,
            &[&empty_layout, &instances_layout, &sort_params_layout],
            "sort_step",
            "Bitonic Sort Pipeline",
        );
        let cell_range_clear = Self::create_compute_pipeline(
            device,
            &clear_shader,
            &[&empty_layout, &empty_layout, &empty_layout, &cells_layout],
            "clear_ranges",
            "Cell Range Clear Pipeline",
        );
        let cell_range_build = Self::create_compute_pipeline(
            device,
            &build_shader,
            &[&empty_layout, &instances_layout, &empty_layout, &cells_layout],
            "build_ranges",
            "Cell Range Build Pipeline",
        );
        let integrate = Self::create_compute_pipeline(
            device,
            &integrate_shader,
            &[
                &parameters_layout,
                &instances_layout,
                &empty_layout,
                &cells_layout,
                &results_layout,
            ],
            "integrate",
            "Integrate Pipeline",
        );

        Self {
            grid_assign,
            bitonic_sort,
            cell_range_clear,
            cell_range_build,
            integrate,
            parameters_layout,
            instances_layout,
            sort_params_layout,
            cells_layout,
            results_layout,
            empty_layout,
        }
    }

    fn storage_group_layout(device: &wgpu::Device, label: &str) -> wgpu::BindGroupLayout {
        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(label),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: false },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        })
    }

    fn load_shader(device: &wgpu::Device, source: &str, label: &str) -> wgpu::ShaderModule {
        device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        })
    }

    fn create_compute_pipeline(
        device: &wgpu::Device,
        shader: &wgpu::ShaderModule,
        group_layouts: &[&wgpu::BindGroupLayout],
        entry_point: &str,
        label: &str,
    ) -> wgpu::ComputePipeline {
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&format!("{label} Layout")),
            bind_group_layouts: group_layouts,
            push_constant_ranges: &[],
        });

        device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(label),
            layout: Some(&pipeline_layout),
            module: shader,
            entry_point: Some(entry_point),
            compilation_options: Default::default(),
            cache: None,
        })
    }
}

/// Splice the physics constants into the integration shader source. The
/// shader file carries the production values, so this is a no-op for the
/// default constants.
fn splice_constants(source: &str, constants: &PhysicsConstants) -> String {
    source
        .replace(
            "const STIFFNESS: f32 = 1000.0;",
            &format!("const STIFFNESS: f32 = {:?};", constants.stiffness),
        )
        .replace(
            "const GRAVITY: f32 = 9.8;",
            &format!("const GRAVITY: f32 = {:?};", constants.gravity),
        )
        .replace(
            "const DRAG: f32 = 0.01;",
            &format!("const DRAG: f32 = {:?};", constants.drag),
        )
        .replace(
            "const RESTITUTION: f32 = 0.85;",
            &format!("const RESTITUTION: f32 = {:?};", constants.restitution),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splices_every_constant() {
        let source = include_str!("../../assets/shaders/sphere_integrate.wgsl");
        let spliced = splice_constants(
            source,
            &PhysicsConstants {
                stiffness: 500.0,
                gravity: 0.0,
                drag: 0.25,
                restitution: 1.0,
            },
        );
        assert!(spliced.contains("const STIFFNESS: f32 = 500.0;"));
        assert!(spliced.contains("const GRAVITY: f32 = 0.0;"));
        assert!(spliced.contains("const DRAG: f32 = 0.25;"));
        assert!(spliced.contains("const RESTITUTION: f32 = 1.0;"));
        assert!(!spliced.contains("9.8"));
    }

    #[test]
    fn default_constants_leave_source_unchanged() {
        let source = include_str!("../../assets/shaders/sphere_integrate.wgsl");
        assert_eq!(splice_constants(source, &PhysicsConstants::default()), source);
    }
}
