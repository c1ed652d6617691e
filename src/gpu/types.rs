//! GPU-visible record types.
//!
//! Every struct here is the byte-for-byte mirror of a WGSL declaration in
//! `assets/shaders/`. Layouts follow std430 with 16-byte aligned 3-vectors,
//! padded explicitly so `bytemuck` can treat them as plain bytes.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

/// Cell index used for bitonic padding slots; sorts after every real cell.
pub const SENTINEL_CELL: u32 = u32::MAX;

/// One sphere as the kernels see it (48 bytes).
///
/// `id` survives sorting and addresses the slot in the results buffer;
/// `cell_index` is recomputed by the grid-assign stage every sub-step.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct Instance {
    pub id: u32,
    pub radius: f32,
    pub cell_index: u32,
    pub _pad0: u32,
    pub position: [f32; 3],
    pub _pad1: u32,
    pub velocity: [f32; 3],
    pub _pad2: u32,
}

impl Instance {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn new(id: u32, radius: f32, position: Vec3, velocity: Vec3) -> Self {
        Self {
            id,
            radius,
            cell_index: 0,
            _pad0: 0,
            position: position.to_array(),
            _pad1: 0,
            velocity: velocity.to_array(),
            _pad2: 0,
        }
    }

    /// Padding record for power-of-two sort lengths. Never integrated; its
    /// cell index keeps it at the tail of every sort.
    pub fn sentinel() -> Self {
        Self {
            id: u32::MAX,
            radius: 0.0,
            cell_index: SENTINEL_CELL,
            _pad0: 0,
            position: [0.0; 3],
            _pad1: 0,
            velocity: [0.0; 3],
            _pad2: 0,
        }
    }

    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }

    pub fn velocity(&self) -> Vec3 {
        Vec3::from_array(self.velocity)
    }
}

/// Integration output scattered by stable id (32 bytes).
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct IntegrationResult {
    pub position: [f32; 3],
    pub _pad0: f32,
    pub velocity: [f32; 3],
    pub _pad1: f32,
}

/// Scalar simulation parameters (16 bytes).
///
/// The fourth word is the real instance count; the assign and integrate
/// kernels bound their thread ranges with it, which also skips the bitonic
/// padding slots at the array tail.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct Parameters {
    pub time_step: f32,
    pub boundary: f32,
    pub grid_size: f32,
    pub instance_count: u32,
}

/// Current strides of the bitonic network, rewritten by the host before
/// every sort dispatch (8 bytes).
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct SortParams {
    pub j: u32,
    pub k: u32,
}

/// Half-open `[start, end)` range of one grid cell into the sorted instance
/// array; `start == end` means the cell is empty (8 bytes).
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct CellRange {
    pub start: u32,
    pub end: u32,
}

impl CellRange {
    pub fn len(&self) -> u32 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{offset_of, size_of};

    #[test]
    fn instance_matches_wgsl_layout() {
        assert_eq!(Instance::SIZE, 48);
        assert_eq!(offset_of!(Instance, id), 0);
        assert_eq!(offset_of!(Instance, radius), 4);
        assert_eq!(offset_of!(Instance, cell_index), 8);
        assert_eq!(offset_of!(Instance, position), 16);
        assert_eq!(offset_of!(Instance, velocity), 32);
    }

    #[test]
    fn result_matches_wgsl_layout() {
        assert_eq!(size_of::<IntegrationResult>(), 32);
        assert_eq!(offset_of!(IntegrationResult, velocity), 16);
    }

    #[test]
    fn scalar_records_match_wgsl_layout() {
        assert_eq!(size_of::<Parameters>(), 16);
        assert_eq!(size_of::<SortParams>(), 8);
        assert_eq!(size_of::<CellRange>(), 8);
    }

    #[test]
    fn sentinel_sorts_after_every_real_cell() {
        let sentinel = Instance::sentinel();
        assert_eq!(sentinel.cell_index, SENTINEL_CELL);
        assert!(sentinel.cell_index > crate::config::MAX_GRID_AXIS.pow(3));
        assert_eq!(sentinel.radius, 0.0);
    }
}
