use bytemuck::{Pod, Zeroable};
use std::f32::consts::{PI, TAU};

use crate::scene::Starfield;

/// Horizon sphere tessellation.
pub const SPHERE_SEGMENTS: u32 = 64;

/// Disk ring tessellation (around, across).
pub const RING_THETA_SEGMENTS: u32 = 128;
pub const RING_PHI_SEGMENTS: u32 = 32;

/// Vertex for fullscreen quad
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
}

impl QuadVertex {
    const ATTRIBS: [wgpu::VertexAttribute; 2] =
        wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2];

    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBS,
        }
    }
}

#[rustfmt::skip]
pub const QUAD_VERTICES: &[QuadVertex] = &[
    QuadVertex { position: [-1.0, -1.0], uv: [0.0, 1.0] },
    QuadVertex { position: [ 1.0, -1.0], uv: [1.0, 1.0] },
    QuadVertex { position: [ 1.0,  1.0], uv: [1.0, 0.0] },
    QuadVertex { position: [-1.0, -1.0], uv: [0.0, 1.0] },
    QuadVertex { position: [ 1.0,  1.0], uv: [1.0, 0.0] },
    QuadVertex { position: [-1.0,  1.0], uv: [0.0, 0.0] },
];

/// Position + texture coordinate, used by the horizon and the disk.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
}

impl MeshVertex {
    const ATTRIBS: [wgpu::VertexAttribute; 2] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x2];

    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<MeshVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBS,
        }
    }
}

/// Per-instance star data (see `stars.wgsl`).
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct StarInstance {
    pub position: [f32; 3],
    pub size: f32,
    pub color: [f32; 3],
    pub _padding: f32,
}

impl StarInstance {
    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<StarInstance>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: 12, // [f32; 3] is 12 bytes
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32,
                },
                wgpu::VertexAttribute {
                    offset: 16,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x3,
                },
            ],
        }
    }
}

pub fn star_instances(field: &Starfield) -> Vec<StarInstance> {
    field
        .stars
        .iter()
        .map(|star| StarInstance {
            position: star.position.to_array(),
            size: star.size,
            color: star.color.to_array(),
            _padding: 0.0,
        })
        .collect()
}

/// UV sphere, counter-clockwise when seen from outside.
pub fn create_sphere_geometry(radius: f32, width_segments: u32, height_segments: u32) -> (Vec<MeshVertex>, Vec<u32>) {
    let w = width_segments.max(3);
    let h = height_segments.max(2);

    let mut vertices = Vec::with_capacity(((w + 1) * (h + 1)) as usize);
    for iy in 0..=h {
        let v = iy as f32 / h as f32;
        for ix in 0..=w {
            let u = ix as f32 / w as f32;
            vertices.push(MeshVertex {
                position: [
                    -radius * (u * TAU).cos() * (v * PI).sin(),
                    radius * (v * PI).cos(),
                    radius * (u * TAU).sin() * (v * PI).sin(),
                ],
                uv: [u, 1.0 - v],
            });
        }
    }

    let row = w + 1;
    let mut indices = Vec::with_capacity((w * h * 6) as usize);
    for iy in 0..h {
        for ix in 0..w {
            let a = iy * row + ix + 1;
            let b = iy * row + ix;
            let c = (iy + 1) * row + ix;
            let d = (iy + 1) * row + ix + 1;
            // Pole rows collapse to a single triangle
            if iy != 0 {
                indices.extend_from_slice(&[a, b, d]);
            }
            if iy != h - 1 {
                indices.extend_from_slice(&[b, c, d]);
            }
        }
    }

    (vertices, indices)
}

/// Flat annulus in the XY plane. UVs map the outer radius to the unit square.
pub fn create_ring_geometry(
    inner_radius: f32,
    outer_radius: f32,
    theta_segments: u32,
    phi_segments: u32,
) -> (Vec<MeshVertex>, Vec<u32>) {
    let theta = theta_segments.max(3);
    let phi = phi_segments.max(1);
    let step = (outer_radius - inner_radius) / phi as f32;

    let mut vertices = Vec::with_capacity(((theta + 1) * (phi + 1)) as usize);
    for j in 0..=phi {
        let radius = inner_radius + j as f32 * step;
        for i in 0..=theta {
            let segment = i as f32 / theta as f32 * TAU;
            let x = radius * segment.cos();
            let y = radius * segment.sin();
            vertices.push(MeshVertex {
                position: [x, y, 0.0],
                uv: [(x / outer_radius + 1.0) / 2.0, (y / outer_radius + 1.0) / 2.0],
            });
        }
    }

    let mut indices = Vec::with_capacity((theta * phi * 6) as usize);
    for j in 0..phi {
        let level = j * (theta + 1);
        for i in 0..theta {
            let a = level + i;
            let b = a + theta + 1;
            let c = a + theta + 2;
            let d = a + 1;
            indices.extend_from_slice(&[a, b, d, b, c, d]);
        }
    }

    (vertices, indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_instance_layout() {
        assert_eq!(std::mem::size_of::<StarInstance>(), 32);
        assert_eq!(std::mem::size_of::<MeshVertex>(), 20);
    }

    #[test]
    fn test_sphere_vertices_on_surface() {
        let (vertices, indices) = create_sphere_geometry(1.0, SPHERE_SEGMENTS, SPHERE_SEGMENTS);
        assert_eq!(vertices.len(), 65 * 65);
        for v in &vertices {
            assert!((Vec3::from_array(v.position).length() - 1.0).abs() < 1e-5);
        }
        // two pole rows contribute one triangle per segment
        assert_eq!(indices.len(), (64 * 64 * 2 - 2 * 64) * 3);
        assert!(indices.iter().all(|&i| (i as usize) < vertices.len()));
    }

    #[test]
    fn test_sphere_faces_outward() {
        let (vertices, indices) = create_sphere_geometry(1.0, 16, 16);
        for tri in indices.chunks(3) {
            let [a, b, c] = [0, 1, 2].map(|k| Vec3::from_array(vertices[tri[k] as usize].position));
            let normal = (b - a).cross(c - a);
            let centroid = (a + b + c) / 3.0;
            assert!(normal.dot(centroid) > 0.0);
        }
    }

    #[test]
    fn test_ring_bounds() {
        let (vertices, indices) = create_ring_geometry(1.5, 4.5, RING_THETA_SEGMENTS, RING_PHI_SEGMENTS);
        assert_eq!(vertices.len(), 129 * 33);
        assert_eq!(indices.len(), 128 * 32 * 6);
        for v in &vertices {
            let r = Vec3::from_array(v.position).length();
            assert!((1.5 - 1e-4..=4.5 + 1e-4).contains(&r));
            assert!(v.uv.iter().all(|c| (0.0..=1.0).contains(c)));
        }
    }
}
