//! Initial scene construction.
//!
//! Everything here is deterministic given the configuration seed, so a run
//! can be replayed exactly from its startup configuration.

use glam::Vec3;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::config::SimConfig;

/// Snapshot of one sphere at time zero.
#[derive(Clone, Copy, Debug)]
pub struct SphereInit {
    /// Stable identifier; also the slot in the results buffer.
    pub id: u32,
    pub radius: f32,
    pub position: Vec3,
    pub velocity: Vec3,
}

/// Spawn `instance_count` spheres with random positions and velocities
/// inside the cube, keeping every sphere fully contained at time zero.
pub fn random_scene(config: &SimConfig) -> Vec<SphereInit> {
    let mut rng = SmallRng::seed_from_u64(config.seed);
    (0..config.instance_count)
        .map(|id| {
            let radius = rng.gen_range(config.min_radius..=config.max_radius);
            let limit = config.boundary - radius;
            let position = Vec3::new(
                rng.gen_range(-limit..=limit),
                rng.gen_range(-limit..=limit),
                rng.gen_range(-limit..=limit),
            );
            let velocity = Vec3::new(
                rng.gen_range(-config.initial_speed..=config.initial_speed),
                rng.gen_range(-config.initial_speed..=config.initial_speed),
                rng.gen_range(-config.initial_speed..=config.initial_speed),
            );
            SphereInit {
                id,
                radius,
                position,
                velocity,
            }
        })
        .collect()
}

/// Regular `per_axis^3` lattice centered on the origin, at rest.
pub fn lattice_scene(per_axis: u32, spacing: f32, radius: f32) -> Vec<SphereInit> {
    let half = (per_axis as f32 - 1.0) * spacing * 0.5;
    let mut spheres = Vec::with_capacity((per_axis * per_axis * per_axis) as usize);
    for z in 0..per_axis {
        for y in 0..per_axis {
            for x in 0..per_axis {
                let id = x + y * per_axis + z * per_axis * per_axis;
                spheres.push(SphereInit {
                    id,
                    radius,
                    position: Vec3::new(
                        x as f32 * spacing - half,
                        y as f32 * spacing - half,
                        z as f32 * spacing - half,
                    ),
                    velocity: Vec3::ZERO,
                });
            }
        }
    }
    spheres
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_reproduces_the_scene() {
        let config = SimConfig {
            instance_count: 128,
            seed: 99,
            ..SimConfig::default()
        };
        let a = random_scene(&config);
        let b = random_scene(&config);
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.position, y.position);
            assert_eq!(x.velocity, y.velocity);
            assert_eq!(x.radius, y.radius);
        }
    }

    #[test]
    fn spawned_spheres_are_contained_with_unique_ids() {
        let config = SimConfig {
            instance_count: 512,
            ..SimConfig::default()
        };
        let scene = random_scene(&config);
        assert_eq!(scene.len(), 512);
        for (index, sphere) in scene.iter().enumerate() {
            assert_eq!(sphere.id, index as u32);
            for axis in 0..3 {
                assert!(sphere.position[axis].abs() + sphere.radius <= config.boundary);
            }
            assert!(sphere.radius >= config.min_radius && sphere.radius <= config.max_radius);
        }
    }

    #[test]
    fn lattice_is_centered_and_regular() {
        let scene = lattice_scene(4, 1.5, 0.3);
        assert_eq!(scene.len(), 64);
        let sum: Vec3 = scene.iter().map(|s| s.position).sum();
        assert!(sum.length() < 1e-4);
        assert_eq!(scene[0].position, Vec3::splat(-2.25));
    }
}
