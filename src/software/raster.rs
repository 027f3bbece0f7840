//! CPU rendering of the scene pass.
//!
//! The horizon and disk are ray cast per pixel; stars are splatted as small
//! squares the same size the GPU sprites would be. A per-pixel ray distance
//! buffer plays the role of the depth attachment.

use glam::{Vec2, Vec3, Vec4};

use super::framebuffer::Framebuffer;
use crate::camera::Camera;
use crate::disk::{self, DiskParams};
use crate::scene::Scene;

/// Render stars, horizon and disk into `out` (cleared first).
pub fn render_scene(scene: &Scene, camera: &Camera, params: &DiskParams, out: &mut Framebuffer) {
    out.clear();
    let width = out.width();
    let height = out.height();
    let mut depth = vec![f32::INFINITY; out.pixels().len()];

    let caster = camera.ray_caster();
    let horizon = scene.horizon;
    let disk_model = scene.disk.model_matrix();
    let disk_inverse = disk_model.inverse();
    let disk_center = disk_model.transform_point3(Vec3::ZERO);
    let disk_normal = scene.disk.normal();

    // Opaque horizon first so stars behind it fail the depth test
    for y in 0..height {
        for x in 0..width {
            let ray = caster.ray(pixel_ndc(x, y, width, height));
            if let Some(t) = ray.intersect_sphere(horizon.center, horizon.radius) {
                depth[(y * width + x) as usize] = t;
            }
        }
    }

    if scene.starfield.visible {
        splat_stars(scene, camera, out, &mut depth);
    }

    // Additive disk: tested against depth, never writes it
    for y in 0..height {
        for x in 0..width {
            let ray = caster.ray(pixel_ndc(x, y, width, height));
            let Some(t) = ray.intersect_plane(disk_center, disk_normal) else {
                continue;
            };
            let i = (y * width + x) as usize;
            if t >= depth[i] {
                continue;
            }
            let local = disk_inverse.transform_point3(ray.at(t));
            if let Some(sample) = disk::shade(Vec2::new(local.x, local.y), params.time, params.color) {
                let add = sample.additive();
                let pixel = &mut out.pixels_mut()[i];
                *pixel += Vec4::new(add.x, add.y, add.z, 0.0);
            }
        }
    }

    out.saturate();
}

/// NDC of the centre of pixel (x, y); y grows downward in pixels.
fn pixel_ndc(x: u32, y: u32, width: u32, height: u32) -> Vec2 {
    Vec2::new(
        (x as f32 + 0.5) / width as f32 * 2.0 - 1.0,
        1.0 - (y as f32 + 0.5) / height as f32 * 2.0,
    )
}

fn splat_stars(scene: &Scene, camera: &Camera, out: &mut Framebuffer, depth: &mut [f32]) {
    let width = out.width();
    let height = out.height();
    let view_proj = camera.view_projection();
    let focal = camera.projection_matrix().y_axis.y;
    let near = camera.near.max(1e-4);

    for star in &scene.starfield.stars {
        let clip = view_proj * star.position.extend(1.0);
        if clip.w <= near {
            continue;
        }
        let ndc = clip.truncate() / clip.w;
        let cx = (ndc.x + 1.0) * 0.5 * width as f32;
        let cy = (1.0 - ndc.y) * 0.5 * height as f32;
        // Half edge in pixels, at least half a pixel
        let half = (star.size * 0.5 * focal / clip.w * height as f32 * 0.5).max(0.5);

        let x0 = (cx - half).round().max(0.0) as i64;
        let x1 = ((cx + half).round() as i64).min(width as i64);
        let y0 = (cy - half).round().max(0.0) as i64;
        let y1 = ((cy + half).round() as i64).min(height as i64);
        if x0 >= x1 || y0 >= y1 {
            continue;
        }

        let distance = (star.position - camera.position).length();
        for py in y0..y1 {
            for px in x0..x1 {
                let i = (py as u32 * width + px as u32) as usize;
                if distance < depth[i] {
                    depth[i] = distance;
                    out.pixels_mut()[i] = star.color.extend(1.0);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CameraConfig, StarfieldConfig};
    use crate::pipeline::RenderExtent;
    use crate::scene::Star;

    fn empty_scene() -> Scene {
        Scene::new(&StarfieldConfig {
            count: 0,
            ..StarfieldConfig::default()
        })
    }

    fn disk_params() -> DiskParams {
        DiskParams {
            time: 0.0,
            color: Vec3::new(1.0, 0.667, 0.2),
        }
    }

    #[test]
    fn test_horizon_is_black_and_disk_glows() {
        let camera = Camera::from_config(&CameraConfig::default(), 1.0);
        let mut fb = Framebuffer::new(RenderExtent::new(64, 64));
        render_scene(&empty_scene(), &camera, &disk_params(), &mut fb);

        assert_eq!(fb.pixel(32, 32).truncate(), Vec3::ZERO);
        let lit = fb.pixels().iter().filter(|p| p.truncate().max_element() > 0.01).count();
        assert!(lit > 0, "disk should light some pixels");
        assert!(fb.pixels().iter().all(|p| p.w == 1.0));
    }

    #[test]
    fn test_star_hidden_behind_horizon() {
        let camera = Camera::from_config(&CameraConfig::default(), 1.0);
        let mut scene = empty_scene();
        // Directly behind the hole along the view axis
        let behind = -camera.position.normalize() * 20.0;
        scene.starfield.stars.push(Star {
            position: behind,
            color: Vec3::ONE,
            size: 2.0,
        });
        let mut fb = Framebuffer::new(RenderExtent::new(32, 32));
        render_scene(&scene, &camera, &disk_params(), &mut fb);
        assert_eq!(fb.pixel(16, 16).truncate(), Vec3::ZERO);
    }

    #[test]
    fn test_visible_star_is_at_least_one_pixel() {
        let camera = Camera::from_config(&CameraConfig::default(), 1.0);
        let extent = RenderExtent::new(64, 64);
        let mut without = Framebuffer::new(extent);
        render_scene(&empty_scene(), &camera, &disk_params(), &mut without);

        let mut scene = empty_scene();
        let world = camera.position + camera.forward() * 50.0 + Vec3::new(0.0, 20.0, 0.0);
        scene.starfield.stars.push(Star {
            position: world,
            color: Vec3::ONE,
            size: 0.0001,
        });
        let mut with = Framebuffer::new(extent);
        render_scene(&scene, &camera, &disk_params(), &mut with);
        let changed = with
            .pixels()
            .iter()
            .zip(without.pixels())
            .filter(|(a, b)| a != b)
            .count();
        assert!(changed >= 1);

        scene.starfield.visible = false;
        render_scene(&scene, &camera, &disk_params(), &mut with);
        assert_eq!(with, without);
    }
}
