//! Scene description: starfield, event horizon and accretion disk.

use std::f32::consts::{FRAC_PI_2, TAU};

use glam::{Mat4, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::StarfieldConfig;
use crate::disk::{DISK_INNER_RADIUS, DISK_OUTER_RADIUS};

pub const HORIZON_RADIUS: f32 = 1.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Star {
    pub position: Vec3,
    pub color: Vec3,
    /// World-space edge length of the point sprite.
    pub size: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Starfield {
    pub stars: Vec<Star>,
    pub visible: bool,
}

impl Starfield {
    /// Scatter `config.count` white stars uniformly in a cube of edge
    /// `config.spread` centred on the origin. Same seed, same sky.
    pub fn generate(config: &StarfieldConfig) -> Self {
        let config = config.sanitized();
        let mut rng = StdRng::seed_from_u64(config.seed);
        let half = config.spread * 0.5;
        let stars = (0..config.count)
            .map(|_| Star {
                position: Vec3::new(
                    rng.gen_range(-half..half),
                    rng.gen_range(-half..half),
                    rng.gen_range(-half..half),
                ),
                color: Vec3::ONE,
                size: config.size,
            })
            .collect();
        Self {
            stars,
            visible: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Horizon {
    pub center: Vec3,
    pub radius: f32,
}

impl Default for Horizon {
    fn default() -> Self {
        Self {
            center: Vec3::ZERO,
            radius: HORIZON_RADIUS,
        }
    }
}

/// The ring mesh lies in its local XY plane; `tilt` lays it flat and `spin`
/// turns it about its own axis.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AccretionDisk {
    pub inner_radius: f32,
    pub outer_radius: f32,
    pub tilt: f32,
    pub spin: f32,
}

impl Default for AccretionDisk {
    fn default() -> Self {
        Self {
            inner_radius: DISK_INNER_RADIUS,
            outer_radius: DISK_OUTER_RADIUS,
            tilt: FRAC_PI_2,
            spin: 0.0,
        }
    }
}

impl AccretionDisk {
    pub fn model_matrix(&self) -> Mat4 {
        Mat4::from_rotation_x(self.tilt) * Mat4::from_rotation_z(self.spin)
    }

    /// Rotate by `delta` radians; the angle stays in [0, TAU).
    pub fn advance(&mut self, delta: f32) {
        if delta.is_finite() {
            self.spin = (self.spin + delta).rem_euclid(TAU);
        }
    }

    /// World-space normal of the disk plane.
    pub fn normal(&self) -> Vec3 {
        self.model_matrix().transform_vector3(Vec3::Z).normalize_or_zero()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Scene {
    pub starfield: Starfield,
    pub horizon: Horizon,
    pub disk: AccretionDisk,
}

impl Scene {
    pub fn new(stars: &StarfieldConfig) -> Self {
        Self {
            starfield: Starfield::generate(stars),
            horizon: Horizon::default(),
            disk: AccretionDisk::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starfield_is_seeded() {
        let config = StarfieldConfig {
            count: 100,
            ..StarfieldConfig::default()
        };
        let a = Starfield::generate(&config);
        let b = Starfield::generate(&config);
        assert_eq!(a, b);
        assert_eq!(a.stars.len(), 100);

        let other = Starfield::generate(&StarfieldConfig { seed: 7, ..config });
        assert_ne!(a.stars[0].position, other.stars[0].position);
    }

    #[test]
    fn test_stars_within_spread() {
        let config = StarfieldConfig::default();
        let field = Starfield::generate(&config);
        assert_eq!(field.stars.len(), 5000);
        for star in &field.stars {
            assert!(star.position.abs().max_element() <= config.spread * 0.5);
            assert_eq!(star.size, config.size);
        }
    }

    #[test]
    fn test_huge_spread_is_clamped() {
        let config = StarfieldConfig {
            count: 50,
            spread: 1.0e38,
            ..StarfieldConfig::default()
        };
        let field = Starfield::generate(&config);
        assert_eq!(field.stars.len(), 50);
        for star in &field.stars {
            assert!(star.position.is_finite());
            assert!(star.position.abs().max_element() <= crate::config::MAX_STAR_SPREAD * 0.5);
        }
    }

    #[test]
    fn test_disk_lies_flat() {
        let disk = AccretionDisk::default();
        assert!(disk.normal().y.abs() > 0.999);
        let rim = disk.model_matrix().transform_point3(Vec3::new(DISK_OUTER_RADIUS, 0.0, 0.0));
        assert!(rim.y.abs() < 1e-5);
    }

    #[test]
    fn test_spin_wraps() {
        let mut disk = AccretionDisk::default();
        for _ in 0..1000 {
            disk.advance(0.1);
        }
        assert!((0.0..TAU).contains(&disk.spin));
        disk.advance(f32::NAN);
        assert!(disk.spin.is_finite());
    }

    #[test]
    fn test_spin_keeps_plane() {
        let mut disk = AccretionDisk::default();
        let normal = disk.normal();
        disk.advance(1.3);
        assert!((disk.normal() - normal).length() < 1e-5);
    }
}
