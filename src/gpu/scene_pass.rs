//! Scene pass: starfield, horizon sphere and accretion disk.
//!
//! Draw order is stars, horizon, disk. The first two write depth; the disk
//! only tests against it and blends additively on top.

use anyhow::Result;
use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use super::mesh::{
    create_ring_geometry, create_sphere_geometry, star_instances, MeshVertex, StarInstance, RING_PHI_SEGMENTS,
    RING_THETA_SEGMENTS, SPHERE_SEGMENTS,
};
use super::{compile_program, uniform_buffer, uniform_layout};
use crate::camera::{Camera, CameraUniforms};
use crate::disk::{DiskParams, DiskUniforms};
use crate::pipeline::RenderExtent;
use crate::programs::{ProgramAsset, DISK_PROGRAM, HORIZON_PROGRAM, STARS_PROGRAM};
use crate::scene::{Scene, Starfield};

pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct ModelUniforms {
    model: [[f32; 4]; 4],
}

/// Indexed mesh living on the GPU.
struct GpuMesh {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
}

impl GpuMesh {
    fn new(device: &wgpu::Device, label: &str, (vertices, indices): (Vec<MeshVertex>, Vec<u32>)) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{} Vertex Buffer", label)),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{} Index Buffer", label)),
            contents: bytemuck::cast_slice(&indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex_buffer,
            index_buffer,
            index_count: indices.len() as u32,
        }
    }

    fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(0..self.index_count, 0, 0..1);
    }
}

pub struct ScenePass {
    star_pipeline: wgpu::RenderPipeline,
    horizon_pipeline: wgpu::RenderPipeline,
    disk_pipeline: wgpu::RenderPipeline,

    camera_buffer: wgpu::Buffer,
    camera_bind_group: wgpu::BindGroup,
    horizon_model_buffer: wgpu::Buffer,
    horizon_model_bind_group: wgpu::BindGroup,
    disk_model_buffer: wgpu::Buffer,
    disk_model_bind_group: wgpu::BindGroup,
    disk_uniform_buffer: wgpu::Buffer,
    disk_uniform_bind_group: wgpu::BindGroup,

    sphere: GpuMesh,
    ring: GpuMesh,
    star_buffer: Option<wgpu::Buffer>,
    star_count: u32,

    _depth_texture: wgpu::Texture,
    depth_view: wgpu::TextureView,
    depth_extent: RenderExtent,
}

impl ScenePass {
    pub fn new(device: &wgpu::Device, format: wgpu::TextureFormat, extent: RenderExtent, scene: &Scene) -> Result<Self> {
        let camera_layout = uniform_layout(
            device,
            "Camera Uniform Layout",
            wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
        );
        let model_layout = uniform_layout(device, "Model Uniform Layout", wgpu::ShaderStages::VERTEX);
        let disk_layout = uniform_layout(device, "Disk Uniform Layout", wgpu::ShaderStages::FRAGMENT);

        let star_pipeline = create_scene_pipeline(
            device,
            &STARS_PROGRAM,
            format,
            &[&camera_layout],
            StarInstance::desc(),
            SceneBlend::Opaque,
        )?;
        let horizon_pipeline = create_scene_pipeline(
            device,
            &HORIZON_PROGRAM,
            format,
            &[&camera_layout, &model_layout],
            MeshVertex::desc(),
            SceneBlend::Opaque,
        )?;
        let disk_pipeline = create_scene_pipeline(
            device,
            &DISK_PROGRAM,
            format,
            &[&camera_layout, &model_layout, &disk_layout],
            MeshVertex::desc(),
            SceneBlend::Additive,
        )?;

        let (camera_buffer, camera_bind_group) = uniform_buffer(
            device,
            &camera_layout,
            std::mem::size_of::<CameraUniforms>(),
            "Camera Uniforms",
        );
        let (horizon_model_buffer, horizon_model_bind_group) = uniform_buffer(
            device,
            &model_layout,
            std::mem::size_of::<ModelUniforms>(),
            "Horizon Model Uniforms",
        );
        let (disk_model_buffer, disk_model_bind_group) = uniform_buffer(
            device,
            &model_layout,
            std::mem::size_of::<ModelUniforms>(),
            "Disk Model Uniforms",
        );
        let (disk_uniform_buffer, disk_uniform_bind_group) = uniform_buffer(
            device,
            &disk_layout,
            std::mem::size_of::<DiskUniforms>(),
            "Disk Uniforms",
        );

        let sphere = GpuMesh::new(
            device,
            "Horizon",
            create_sphere_geometry(scene.horizon.radius, SPHERE_SEGMENTS, SPHERE_SEGMENTS),
        );
        let ring = GpuMesh::new(
            device,
            "Disk",
            create_ring_geometry(
                scene.disk.inner_radius,
                scene.disk.outer_radius,
                RING_THETA_SEGMENTS,
                RING_PHI_SEGMENTS,
            ),
        );

        let (depth_texture, depth_view) = create_depth_texture(device, extent);

        let mut pass = Self {
            star_pipeline,
            horizon_pipeline,
            disk_pipeline,
            camera_buffer,
            camera_bind_group,
            horizon_model_buffer,
            horizon_model_bind_group,
            disk_model_buffer,
            disk_model_bind_group,
            disk_uniform_buffer,
            disk_uniform_bind_group,
            sphere,
            ring,
            star_buffer: None,
            star_count: 0,
            _depth_texture: depth_texture,
            depth_view,
            depth_extent: extent,
        };
        pass.set_stars(device, &scene.starfield);
        Ok(pass)
    }

    /// Replace the star instance buffer.
    pub fn set_stars(&mut self, device: &wgpu::Device, field: &Starfield) {
        let instances = star_instances(field);
        self.star_count = instances.len() as u32;
        self.star_buffer = (!instances.is_empty()).then(|| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Star Instance Buffer"),
                contents: bytemuck::cast_slice(&instances),
                usage: wgpu::BufferUsages::VERTEX,
            })
        });
        log::debug!("Uploaded {} stars", self.star_count);
    }

    pub fn resize(&mut self, device: &wgpu::Device, extent: RenderExtent) {
        if extent == self.depth_extent {
            return;
        }
        let (texture, view) = create_depth_texture(device, extent);
        self._depth_texture = texture;
        self.depth_view = view;
        self.depth_extent = extent;
    }

    /// Per-frame transforms.
    pub fn write_frame(&self, queue: &wgpu::Queue, camera: &Camera, scene: &Scene, extent: RenderExtent) {
        let camera_uniforms = CameraUniforms::new(camera, extent.width, extent.height);
        queue.write_buffer(&self.camera_buffer, 0, bytemuck::bytes_of(&camera_uniforms));

        let horizon = ModelUniforms {
            model: glam::Mat4::from_translation(scene.horizon.center).to_cols_array_2d(),
        };
        queue.write_buffer(&self.horizon_model_buffer, 0, bytemuck::bytes_of(&horizon));

        let disk = ModelUniforms {
            model: scene.disk.model_matrix().to_cols_array_2d(),
        };
        queue.write_buffer(&self.disk_model_buffer, 0, bytemuck::bytes_of(&disk));
    }

    pub fn write_disk(&self, queue: &wgpu::Queue, params: &DiskParams) {
        let uniforms = DiskUniforms::from(params);
        queue.write_buffer(&self.disk_uniform_buffer, 0, bytemuck::bytes_of(&uniforms));
    }

    pub fn record(&self, encoder: &mut wgpu::CommandEncoder, output: &wgpu::TextureView, stars_visible: bool) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Scene Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: output,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        pass.set_bind_group(0, &self.camera_bind_group, &[]);

        if stars_visible {
            if let Some(stars) = &self.star_buffer {
                pass.set_pipeline(&self.star_pipeline);
                pass.set_vertex_buffer(0, stars.slice(..));
                pass.draw(0..6, 0..self.star_count);
            }
        }

        pass.set_pipeline(&self.horizon_pipeline);
        pass.set_bind_group(1, &self.horizon_model_bind_group, &[]);
        self.sphere.draw(&mut pass);

        pass.set_pipeline(&self.disk_pipeline);
        pass.set_bind_group(1, &self.disk_model_bind_group, &[]);
        pass.set_bind_group(2, &self.disk_uniform_bind_group, &[]);
        self.ring.draw(&mut pass);
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum SceneBlend {
    /// Writes colour and depth.
    Opaque,
    /// `src * alpha + dst`, depth tested but not written, both faces.
    Additive,
}

fn create_scene_pipeline(
    device: &wgpu::Device,
    program: &ProgramAsset,
    format: wgpu::TextureFormat,
    bind_group_layouts: &[&wgpu::BindGroupLayout],
    vertex_layout: wgpu::VertexBufferLayout<'static>,
    blend: SceneBlend,
) -> Result<wgpu::RenderPipeline> {
    let shader = compile_program(device, program)?;
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(&format!("{} Pipeline Layout", program.name)),
        bind_group_layouts,
        push_constant_ranges: &[],
    });

    let (blend_state, cull_mode, depth_write_enabled) = match blend {
        SceneBlend::Opaque => (wgpu::BlendState::REPLACE, Some(wgpu::Face::Back), true),
        SceneBlend::Additive => (
            wgpu::BlendState {
                color: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::SrcAlpha,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                },
                // Destination alpha stays opaque
                alpha: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::Zero,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                },
            },
            None, // Render both sides
            false,
        ),
    };

    Ok(device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(&format!("{} Pipeline", program.name)),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some(program.vertex_entry),
            buffers: &[vertex_layout],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some(program.fragment_entry),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(blend_state),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    }))
}

fn create_depth_texture(device: &wgpu::Device, extent: RenderExtent) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Scene Depth"),
        size: wgpu::Extent3d {
            width: extent.width.max(1),
            height: extent.height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}
