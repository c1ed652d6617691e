//! CPU reference pipeline.
//!
//! Runs the same four stages as the GPU path with identical semantics:
//! assign, sort by cell index, cell range build, integrate. The test suite
//! checks the quantified invariants against this implementation and
//! cross-checks it against the device pipeline; the host can also use it to
//! validate a GPU read-back.

use glam::Vec3;
use rayon::prelude::*;

use crate::config::{self, PhysicsConstants, SimConfig};
use crate::gpu::types::CellRange;
use crate::scene::SphereInit;
use crate::simulation::SphereState;

/// One sphere in the reference pipeline.
#[derive(Clone, Copy, Debug)]
pub struct CpuSphere {
    pub id: u32,
    pub radius: f32,
    pub cell_index: u32,
    pub position: Vec3,
    pub velocity: Vec3,
}

/// The reference simulation. Mirrors the GPU buffers with plain vectors;
/// `results` is indexed by stable id like the results buffer.
pub struct CpuSimulation {
    pub config: SimConfig,
    pub constants: PhysicsConstants,
    pub spheres: Vec<CpuSphere>,
    pub cells: Vec<CellRange>,
    pub results: Vec<SphereState>,
}

impl CpuSimulation {
    pub fn new(config: SimConfig, constants: PhysicsConstants, inits: &[SphereInit]) -> Self {
        let spheres = inits
            .iter()
            .map(|s| CpuSphere {
                id: s.id,
                radius: s.radius,
                cell_index: 0,
                position: s.position,
                velocity: s.velocity,
            })
            .collect();
        let results = inits
            .iter()
            .map(|s| SphereState {
                position: s.position,
                velocity: s.velocity,
            })
            .collect();
        Self {
            config,
            constants,
            spheres,
            cells: Vec::new(),
            results,
        }
    }

    /// Stage 1: recompute every sphere's cell index from its position.
    pub fn assign_cells(&mut self) {
        let (boundary, grid_size) = (self.config.boundary, self.config.grid_size);
        for sphere in &mut self.spheres {
            sphere.cell_index = config::flatten_cell(sphere.position, boundary, grid_size);
        }
    }

    /// Stage 2: order the array by cell index. The GPU uses a bitonic
    /// network; only the postcondition matters here.
    pub fn sort_by_cell(&mut self) {
        self.spheres.sort_by_key(|s| s.cell_index);
    }

    /// Stage 3: rebuild the per-cell `[start, end)` table with the same
    /// boundary-detection rule as the kernel.
    pub fn build_cell_ranges(&mut self) {
        let total = self.config.total_cells() as usize;
        self.cells = vec![CellRange::default(); total];
        let n = self.spheres.len();
        for i in 0..n {
            let cell = self.spheres[i].cell_index as usize;
            if i == 0 {
                self.cells[cell].start = 0;
            } else {
                let prev = self.spheres[i - 1].cell_index as usize;
                if cell != prev {
                    self.cells[cell].start = i as u32;
                    self.cells[prev].end = i as u32;
                }
            }
            if i == n - 1 {
                self.cells[cell].end = n as u32;
            }
        }
    }

    /// Stage 4: contact forces, gravity, wall reflection, drag, advance.
    pub fn integrate(&mut self) {
        let updates: Vec<(Vec3, Vec3)> = {
            let this = &*self;
            (0..this.spheres.len())
                .into_par_iter()
                .map(|i| this.integrate_one(i))
                .collect()
        };
        for (sphere, (position, velocity)) in self.spheres.iter_mut().zip(updates) {
            sphere.position = position;
            sphere.velocity = velocity;
            self.results[sphere.id as usize] = SphereState { position, velocity };
        }
    }

    fn integrate_one(&self, i: usize) -> (Vec3, Vec3) {
        let sphere = self.spheres[i];
        let dt = self.config.time_step;
        let boundary = self.config.boundary;
        let g = self.config.grid_axis_count();

        let cx = (sphere.cell_index % g) as i32;
        let cy = ((sphere.cell_index / g) % g) as i32;
        let cz = (sphere.cell_index / (g * g)) as i32;

        let mut force = Vec3::ZERO;
        for dz in -1i32..=1 {
            let z = cz + dz;
            if z < 0 || z >= g as i32 {
                continue;
            }
            for dy in -1i32..=1 {
                let y = cy + dy;
                if y < 0 || y >= g as i32 {
                    continue;
                }
                for dx in -1i32..=1 {
                    let x = cx + dx;
                    if x < 0 || x >= g as i32 {
                        continue;
                    }
                    let neighbor = (x as u32 + y as u32 * g + z as u32 * g * g) as usize;
                    let range = self.cells[neighbor];
                    for j in range.start as usize..range.end as usize {
                        if j == i {
                            continue;
                        }
                        let other = self.spheres[j];
                        let rel = sphere.position - other.position;
                        let dist = rel.length();
                        let overlap = sphere.radius + other.radius - dist;
                        if overlap > 0.0 && dist > 1e-6 {
                            force += self.constants.stiffness * overlap * (rel / dist);
                        }
                    }
                }
            }
        }

        let mass = sphere.radius * sphere.radius * sphere.radius;
        let accel = force / mass + Vec3::new(0.0, -self.constants.gravity, 0.0);

        let mut velocity = sphere.velocity + accel * dt;
        for axis in 0..3 {
            if sphere.position[axis] + sphere.radius > boundary {
                velocity[axis] = -velocity[axis].abs();
            }
            if sphere.position[axis] - sphere.radius < -boundary {
                velocity[axis] = velocity[axis].abs();
            }
        }

        let position = sphere.position + sphere.velocity * dt + 0.5 * accel * dt * dt;
        velocity *= 1.0 - self.constants.drag * velocity.length().powi(3) * dt;

        (position, velocity)
    }

    /// One full sub-step in pipeline order.
    pub fn sub_step(&mut self) {
        self.assign_cells();
        self.sort_by_cell();
        self.build_cell_ranges();
        self.integrate();
    }

    /// Total kinetic energy with unit-density masses.
    pub fn kinetic_energy(&self) -> f32 {
        self.spheres
            .iter()
            .map(|s| 0.5 * s.radius.powi(3) * s.velocity.length_squared())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene;
    use proptest::prelude::*;

    fn test_config(instance_count: u32) -> SimConfig {
        SimConfig {
            instance_count,
            boundary: 10.0,
            grid_size: 1.0,
            time_step: 1.0 / 240.0,
            max_radius: 0.5,
            min_radius: 0.2,
            ..SimConfig::default()
        }
    }

    fn no_gravity() -> PhysicsConstants {
        PhysicsConstants {
            gravity: 0.0,
            drag: 0.0,
            ..PhysicsConstants::default()
        }
    }

    fn sim_at_positions(positions: &[(f32, f32, f32)]) -> CpuSimulation {
        let inits: Vec<SphereInit> = positions
            .iter()
            .enumerate()
            .map(|(id, &(x, y, z))| SphereInit {
                id: id as u32,
                radius: 0.3,
                position: Vec3::new(x, y, z),
                velocity: Vec3::ZERO,
            })
            .collect();
        CpuSimulation::new(
            test_config(inits.len() as u32),
            PhysicsConstants::default(),
            &inits,
        )
    }

    proptest! {
        #[test]
        fn assign_matches_shared_flatten_helper(
            positions in prop::collection::vec((-9.5f32..9.5, -9.5f32..9.5, -9.5f32..9.5), 1..64)
        ) {
            let mut sim = sim_at_positions(&positions);
            sim.assign_cells();
            let total = sim.config.total_cells();
            for sphere in &sim.spheres {
                let expected = config::flatten_cell(
                    sphere.position,
                    sim.config.boundary,
                    sim.config.grid_size,
                );
                prop_assert_eq!(sphere.cell_index, expected);
                prop_assert!(sphere.cell_index < total);
            }
        }

        #[test]
        fn sort_is_a_monotone_permutation(keys in prop::collection::vec(0u32..100, 1..256)) {
            let mut sim = sim_at_positions(&[(0.0, 0.0, 0.0)]);
            sim.spheres = keys
                .iter()
                .enumerate()
                .map(|(id, &key)| CpuSphere {
                    id: id as u32,
                    radius: 0.3,
                    cell_index: key,
                    position: Vec3::ZERO,
                    velocity: Vec3::ZERO,
                })
                .collect();
            sim.sort_by_cell();

            for pair in sim.spheres.windows(2) {
                prop_assert!(pair[0].cell_index <= pair[1].cell_index);
            }
            let mut ids: Vec<u32> = sim.spheres.iter().map(|s| s.id).collect();
            ids.sort_unstable();
            prop_assert_eq!(ids, (0..keys.len() as u32).collect::<Vec<u32>>());
        }

        #[test]
        fn cell_table_is_exact(
            positions in prop::collection::vec((-9.0f32..9.0, -9.0f32..9.0, -9.0f32..9.0), 1..128)
        ) {
            let mut sim = sim_at_positions(&positions);
            sim.assign_cells();
            sim.sort_by_cell();
            sim.build_cell_ranges();

            let n = sim.spheres.len() as u32;
            // Ranges concatenate to [0, N) exactly once.
            let mut ranges: Vec<&CellRange> =
                sim.cells.iter().filter(|c| !c.is_empty()).collect();
            ranges.sort_by_key(|r| r.start);
            let mut cursor = 0u32;
            for range in &ranges {
                prop_assert_eq!(range.start, cursor);
                cursor = range.end;
            }
            prop_assert_eq!(cursor, n);

            // Each non-empty range holds exactly the spheres of its cell;
            // empty cells stay {0, 0}.
            for (cell_index, range) in sim.cells.iter().enumerate() {
                if range.is_empty() {
                    prop_assert_eq!(range.start, 0);
                    prop_assert_eq!(range.end, 0);
                }
                for sphere in &sim.spheres[range.start as usize..range.end as usize] {
                    prop_assert_eq!(sphere.cell_index, cell_index as u32);
                }
            }
        }
    }

    #[test]
    fn falling_sphere_tracks_free_fall() {
        let config = test_config(1);
        let start = Vec3::new(0.0, 0.5 * config.boundary, 0.0);
        let inits = [SphereInit {
            id: 0,
            radius: 0.5,
            position: start,
            velocity: Vec3::ZERO,
        }];
        let mut sim = CpuSimulation::new(config.clone(), PhysicsConstants::default(), &inits);
        for _ in 0..120 {
            sim.sub_step();
        }
        let elapsed = 120.0 * config.time_step;
        let free_fall = start.y - 0.5 * 9.8 * elapsed * elapsed;
        // Drag keeps the sphere slightly above the vacuum trajectory.
        assert!(sim.spheres[0].position.y < free_fall + 0.1);
        assert!(sim.spheres[0].position.y > free_fall - 0.1);
        assert!(sim.spheres[0].velocity.y < 0.0);
    }

    #[test]
    fn head_on_pair_reverses_without_gaining_speed() {
        // The penalty contact needs a sub-step well below sqrt(m / K) to
        // stay near-elastic.
        let config = SimConfig {
            time_step: 1.0 / 2400.0,
            ..test_config(2)
        };
        let inits = [
            SphereInit {
                id: 0,
                radius: 0.5,
                position: Vec3::new(-1.0, 0.0, 0.0),
                velocity: Vec3::new(1.0, 0.0, 0.0),
            },
            SphereInit {
                id: 1,
                radius: 0.5,
                position: Vec3::new(1.0, 0.0, 0.0),
                velocity: Vec3::new(-1.0, 0.0, 0.0),
            },
        ];
        let mut sim = CpuSimulation::new(config, no_gravity(), &inits);
        for _ in 0..4800 {
            sim.sub_step();
        }
        let a = sim.results[0].velocity;
        let b = sim.results[1].velocity;
        assert!(a.x < 0.0, "left sphere must bounce back, got {a:?}");
        assert!(b.x > 0.0, "right sphere must bounce back, got {b:?}");
        assert!(a.x.abs() <= 1.08, "contact must not add speed, got {a:?}");
        assert!(b.x.abs() <= 1.08, "contact must not add speed, got {b:?}");
    }

    #[test]
    fn packed_lattice_occupies_one_cell_each() {
        let config = test_config(512);
        let inits = scene::lattice_scene(8, 1.0, 0.2);
        let before: Vec<Vec3> = inits.iter().map(|s| s.position).collect();
        let mut sim = CpuSimulation::new(config.clone(), no_gravity(), &inits);
        sim.sub_step();

        let occupied: Vec<&CellRange> = sim.cells.iter().filter(|c| !c.is_empty()).collect();
        assert_eq!(occupied.len(), 512);
        assert!(occupied.iter().all(|r| r.len() == 1));

        let noise = config.time_step * config.time_step * 1000.0;
        for sphere in &sim.spheres {
            let moved = (sphere.position - before[sphere.id as usize]).length();
            assert!(moved <= noise);
        }
    }

    #[test]
    fn boundary_trap_reverses_velocity_in_one_sub_step() {
        let config = test_config(1);
        let radius = 0.5;
        let inits = [SphereInit {
            id: 0,
            radius,
            position: Vec3::new(config.boundary - 0.1 * radius, 0.0, 0.0),
            velocity: Vec3::new(10.0, 0.0, 0.0),
        }];
        let mut sim = CpuSimulation::new(config, no_gravity(), &inits);
        sim.sub_step();
        assert!(sim.spheres[0].velocity.x < 0.0);
    }

    #[test]
    fn drag_strictly_decreases_kinetic_energy() {
        let config = test_config(1);
        let inits = [SphereInit {
            id: 0,
            radius: 0.4,
            position: Vec3::ZERO,
            velocity: Vec3::new(3.0, 0.0, 0.0),
        }];
        let constants = PhysicsConstants {
            gravity: 0.0,
            ..PhysicsConstants::default()
        };
        let mut sim = CpuSimulation::new(config, constants, &inits);
        let mut previous = sim.kinetic_energy();
        for _ in 0..50 {
            sim.sub_step();
            let current = sim.kinetic_energy();
            assert!(current < previous);
            previous = current;
        }
    }

    #[test]
    fn spheres_stay_contained_and_counted() {
        let config = test_config(100);
        let inits = scene::random_scene(&config);
        let mut sim = CpuSimulation::new(config.clone(), PhysicsConstants::default(), &inits);
        for _ in 0..200 {
            sim.sub_step();
        }
        assert_eq!(sim.spheres.len(), 100);
        let mut ids: Vec<u32> = sim.spheres.iter().map(|s| s.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, (0..100).collect::<Vec<u32>>());
        for sphere in &sim.spheres {
            for axis in 0..3 {
                assert!(
                    sphere.position[axis].abs() <= config.boundary + 0.1,
                    "sphere {} escaped on axis {axis}: {:?}",
                    sphere.id,
                    sphere.position
                );
            }
        }
    }
}
