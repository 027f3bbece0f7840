//! Perspective camera and orbit controls.
//!
//! The camera orbits a target (the black hole) with damped mouse input. Each
//! frame the horizon centre is projected through it to find where on screen
//! the lensing distortion is anchored.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3};

use crate::config::CameraConfig;

/// Keeps the orbit away from the poles, where look-at degenerates.
const POLAR_EPSILON: f32 = 1e-4;

/// Closest and farthest orbit radius reachable by zooming.
const MIN_ORBIT_RADIUS: f32 = 1.5;
const MAX_ORBIT_RADIUS: f32 = 200.0;

// ============================================================================
// Camera
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    /// Vertical field of view in degrees.
    pub fov_y_degrees: f32,
    /// Width over height.
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Camera {
    pub fn from_config(config: &CameraConfig, aspect: f32) -> Self {
        let mut camera = Self {
            position: Vec3::from_array(config.position),
            target: Vec3::from_array(config.target),
            up: Vec3::Y,
            fov_y_degrees: config.fov,
            aspect: 1.0,
            near: config.near,
            far: config.far,
        };
        camera.set_aspect(aspect);
        camera
    }

    /// Ignores non-positive or non-finite ratios (e.g. a minimised window).
    pub fn set_aspect(&mut self, aspect: f32) {
        if aspect.is_finite() && aspect > 0.0 {
            self.aspect = aspect;
        }
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    /// Depth maps to [0, 1] as wgpu expects.
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y_degrees.to_radians(), self.aspect, self.near, self.far)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Project a world point to normalised device coordinates.
    pub fn project_to_ndc(&self, world: Vec3) -> Vec3 {
        self.view_projection().project_point3(world)
    }

    /// Project a world point to NDC and texture coordinates.
    pub fn screen_position(&self, world: Vec3) -> ScreenPosition {
        let ndc = self.project_to_ndc(world);
        ScreenPosition {
            ndc,
            uv: ndc_to_uv(ndc.truncate()),
        }
    }

    pub fn forward(&self) -> Vec3 {
        (self.target - self.position).normalize_or_zero()
    }

    /// World-space ray through a point given in NDC.
    pub fn ray_through(&self, ndc: Vec2) -> Ray {
        self.ray_caster().ray(ndc)
    }

    /// Ray generator with the inverse view-projection computed once.
    pub fn ray_caster(&self) -> RayCaster {
        RayCaster {
            inverse: self.view_projection().inverse(),
            origin: self.position,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RayCaster {
    inverse: Mat4,
    origin: Vec3,
}

impl RayCaster {
    pub fn ray(&self, ndc: Vec2) -> Ray {
        let near = self.inverse.project_point3(ndc.extend(0.0));
        let far = self.inverse.project_point3(ndc.extend(1.0));
        Ray {
            origin: self.origin,
            direction: (far - near).normalize_or_zero(),
        }
    }
}

/// GPU layout of the camera (see `scene_common.wgsl`).
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct CameraUniforms {
    pub view: [[f32; 4]; 4],
    pub proj: [[f32; 4]; 4],
    /// xy = render extent in pixels
    pub viewport: [f32; 4],
}

impl CameraUniforms {
    pub fn new(camera: &Camera, width: u32, height: u32) -> Self {
        Self {
            view: camera.view_matrix().to_cols_array_2d(),
            proj: camera.projection_matrix().to_cols_array_2d(),
            viewport: [width as f32, height as f32, 0.0, 0.0],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Nearest positive hit distance against a sphere.
    pub fn intersect_sphere(&self, center: Vec3, radius: f32) -> Option<f32> {
        let oc = self.origin - center;
        let b = oc.dot(self.direction);
        let c = oc.length_squared() - radius * radius;
        let discriminant = b * b - c;
        if discriminant < 0.0 {
            return None;
        }
        let root = discriminant.sqrt();
        let near = -b - root;
        if near > 0.0 {
            return Some(near);
        }
        let far = -b + root;
        (far > 0.0).then_some(far)
    }

    /// Hit distance against the plane through `point` with `normal`.
    pub fn intersect_plane(&self, point: Vec3, normal: Vec3) -> Option<f32> {
        let denom = normal.dot(self.direction);
        if denom.abs() < 1e-6 {
            return None;
        }
        let t = (point - self.origin).dot(normal) / denom;
        (t > 0.0).then_some(t)
    }
}

/// A world point on screen.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScreenPosition {
    pub ndc: Vec3,
    /// Texture coordinates: origin top-left, v grows downward.
    pub uv: Vec2,
}

/// NDC (y up) to texture coordinates (y down).
pub fn ndc_to_uv(ndc: Vec2) -> Vec2 {
    Vec2::new((ndc.x + 1.0) * 0.5, (1.0 - ndc.y) * 0.5)
}

// ============================================================================
// Orbit controls
// ============================================================================

/// Damped orbit around the camera target.
///
/// Input accumulates into pending deltas; each [`update`](Self::update)
/// applies the `damping` fraction of them and decays the rest, so motion
/// eases out after the input stops.
#[derive(Clone, Debug, PartialEq)]
pub struct OrbitControls {
    pub damping: f32,
    /// Radians per pixel of drag.
    pub rotate_speed: f32,
    pending_theta: f32,
    pending_phi: f32,
    pending_zoom: f32,
}

impl OrbitControls {
    pub fn new(damping: f32) -> Self {
        Self {
            damping: if damping.is_finite() { damping.clamp(0.001, 1.0) } else { 0.05 },
            rotate_speed: 0.005,
            pending_theta: 0.0,
            pending_phi: 0.0,
            pending_zoom: 0.0,
        }
    }

    /// Queue a drag, in pixels.
    pub fn rotate(&mut self, dx: f32, dy: f32) {
        self.pending_theta -= dx * self.rotate_speed;
        self.pending_phi -= dy * self.rotate_speed;
    }

    /// Queue a zoom; positive moves closer. One unit scales the radius ~10%.
    pub fn zoom(&mut self, steps: f32) {
        self.pending_zoom += steps;
    }

    pub fn is_settled(&self) -> bool {
        self.pending_theta.abs() < 1e-6 && self.pending_phi.abs() < 1e-6 && self.pending_zoom.abs() < 1e-6
    }

    /// Apply one damping step to `camera`.
    pub fn update(&mut self, camera: &mut Camera) {
        let offset = camera.position - camera.target;
        let radius = offset.length();
        if radius <= f32::EPSILON {
            return;
        }

        // Spherical coordinates around +Y
        let mut theta = offset.x.atan2(offset.z);
        let mut phi = (offset.y / radius).clamp(-1.0, 1.0).acos();

        theta += self.pending_theta * self.damping;
        phi = (phi + self.pending_phi * self.damping).clamp(POLAR_EPSILON, std::f32::consts::PI - POLAR_EPSILON);
        let scale = 0.9_f32.powf(self.pending_zoom * self.damping);
        let radius = (radius * scale).clamp(MIN_ORBIT_RADIUS, MAX_ORBIT_RADIUS);

        let decay = 1.0 - self.damping;
        self.pending_theta *= decay;
        self.pending_phi *= decay;
        self.pending_zoom *= decay;

        camera.position = camera.target
            + Vec3::new(
                radius * phi.sin() * theta.sin(),
                radius * phi.cos(),
                radius * phi.sin() * theta.cos(),
            );
    }
}

/// Camera plus its controls.
#[derive(Clone, Debug, PartialEq)]
pub struct OrbitCamera {
    pub camera: Camera,
    pub controls: OrbitControls,
}

impl OrbitCamera {
    pub fn from_config(config: &CameraConfig, aspect: f32) -> Self {
        Self {
            camera: Camera::from_config(config, aspect),
            controls: OrbitControls::new(config.damping),
        }
    }

    pub fn update(&mut self) {
        self.controls.update(&mut self.camera);
    }
}
