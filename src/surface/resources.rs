// resources.rs — 带所有权的 GPU 句柄 + 两种表面共用的网格缓冲
//
// 句柄在 release() 或 Drop 时同步销毁，构建中途失败也不会泄漏已经创建的资源。
// write_texture / write_buffer 要到下一次 submit 才真正执行，销毁前先空提交一次，
// 否则挂起的写入会引用已销毁的资源。

use crate::blend::yuv_matrix_columns;
use crate::config::{ProjectionConfig, Topology};
use crate::error::{CompileError, Result, ShaderStageKind, StateError};
use crate::gpu::RenderContext;
use crate::mesh::PanoramaMesh;
use crate::shader::ShaderProgram;
use glam::Mat4;
use std::ops::Deref;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use wgpu::util::DeviceExt;

pub(crate) const UNIFORM_GROUP: u32 = 0;
pub(crate) const TEXTURE_GROUP: u32 = 1;

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub(crate) struct CameraUniform {
    mvp: [[f32; 4]; 4],
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub(crate) struct SeamUniform {
    origin: [f32; 4],
    params: [f32; 4], // x = 带半宽, y = 拓扑, z = sRGB 目标
    yuv: [[f32; 4]; 3],
}

impl SeamUniform {
    pub(crate) fn new(
        config: &ProjectionConfig,
        half_width: f32,
        topology: Topology,
        srgb_target: bool,
    ) -> Self {
        let [x, y, z] = config.origin;
        Self {
            origin: [x, y, z, 1.0],
            params: [
                half_width,
                match topology {
                    Topology::Sphere => 0.0,
                    Topology::Rectangle => 1.0,
                },
                if srgb_target { 1.0 } else { 0.0 },
                0.0,
            ],
            yuv: yuv_matrix_columns(),
        }
    }
}

pub(crate) struct GpuBuffer {
    buffer: wgpu::Buffer,
    live: bool,
}

impl GpuBuffer {
    pub(crate) fn new(buffer: wgpu::Buffer) -> Self {
        Self { buffer, live: true }
    }

    pub(crate) fn destroy(&mut self) {
        if self.live {
            self.buffer.destroy();
            self.live = false;
        }
    }
}

impl Deref for GpuBuffer {
    type Target = wgpu::Buffer;

    fn deref(&self) -> &wgpu::Buffer {
        &self.buffer
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// 把挂起的队列写入提交掉
fn flush_pending_writes(queue: &wgpu::Queue) {
    queue.submit(std::iter::empty());
}

pub(crate) struct GpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
    queue: Arc<wgpu::Queue>,
    live: bool,
}

impl GpuTexture {
    pub(crate) fn create(
        ctx: &RenderContext,
        label: &str,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
    ) -> Result<Self> {
        let texture = ctx.create_scoped(label, |device| {
            device.create_texture(&wgpu::TextureDescriptor {
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                label: Some(label),
                view_formats: &[],
            })
        })?;
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(Self {
            texture,
            view,
            width,
            height,
            queue: Arc::clone(&ctx.queue),
            live: true,
        })
    }

    /// 整张覆盖写入；`bytes_per_pixel` 1 (单通道平面) 或 4 (RGBA)
    pub(crate) fn write(&self, data: &[u8], bytes_per_pixel: u32) {
        let size = wgpu::Extent3d {
            width: self.width,
            height: self.height,
            depth_or_array_layers: 1,
        };
        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_pixel * self.width),
                rows_per_image: Some(self.height),
            },
            size,
        );
    }

    pub(crate) fn destroy(&mut self) {
        if self.live {
            flush_pending_writes(&self.queue);
            self.texture.destroy();
            self.live = false;
        }
    }
}

impl Drop for GpuTexture {
    fn drop(&mut self) {
        self.destroy();
    }
}

pub(crate) fn linear_sampler(ctx: &RenderContext, label: &str) -> Result<wgpu::Sampler> {
    let sampler = ctx.create_scoped(label, |device| {
        device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(label),
            // 鱼眼圆外的坐标不要绕回到另一半图像
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        })
    })?;
    Ok(sampler)
}

/// 反射出来的绑定必须落在约定的 group 里
pub(crate) fn binding_in_group(
    program: &ShaderProgram,
    name: &str,
    group: u32,
) -> std::result::Result<u32, CompileError> {
    let slot = program.uniform_location(name)?;
    if slot.group != group {
        return Err(CompileError::new(
            name,
            ShaderStageKind::Link,
            format!("`{name}` is bound in group {}, expected {group}", slot.group),
        ));
    }
    Ok(slot.binding)
}

/// 静态网格缓冲 + 相机 / 接缝 uniform。两种表面都组合一份。
pub(crate) struct MeshBuffers {
    positions: GpuBuffer,
    front_uvs: GpuBuffer,
    back_uvs: GpuBuffer,
    indices: GpuBuffer,
    index_count: u32,
    camera: GpuBuffer,
    seam: GpuBuffer,
    uniform_layout: wgpu::BindGroupLayout,
    uniform_bind_group: wgpu::BindGroup,
    queue: Arc<wgpu::Queue>,
    owner: ThreadId,
    released: bool,
}

impl MeshBuffers {
    pub(crate) fn upload(
        ctx: &RenderContext,
        label: &str,
        mesh: &PanoramaMesh,
        program: &ShaderProgram,
        seam: SeamUniform,
    ) -> Result<Self> {
        let vertex_buffer = |name: &str, contents: &[u8], usage: wgpu::BufferUsages| {
            let label = format!("{label} {name}");
            ctx.create_scoped(&label, |device| {
                device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(&label),
                    contents,
                    usage,
                })
            })
            .map(GpuBuffer::new)
        };

        let positions = vertex_buffer(
            "positions",
            bytemuck::cast_slice(&mesh.positions),
            wgpu::BufferUsages::VERTEX,
        )?;
        let front_uvs = vertex_buffer(
            "front uvs",
            bytemuck::cast_slice(&mesh.front_uvs),
            wgpu::BufferUsages::VERTEX,
        )?;
        let back_uvs = vertex_buffer(
            "back uvs",
            bytemuck::cast_slice(&mesh.back_uvs),
            wgpu::BufferUsages::VERTEX,
        )?;
        let indices = vertex_buffer(
            "indices",
            bytemuck::cast_slice(&mesh.indices),
            wgpu::BufferUsages::INDEX,
        )?;

        let camera_uniform = CameraUniform {
            mvp: Mat4::IDENTITY.to_cols_array_2d(),
        };
        let camera = vertex_buffer(
            "camera",
            bytemuck::cast_slice(&[camera_uniform]),
            wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        )?;
        let seam = vertex_buffer(
            "seam",
            bytemuck::cast_slice(&[seam]),
            wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        )?;

        let camera_binding = binding_in_group(program, "camera", UNIFORM_GROUP)?;
        let seam_binding = binding_in_group(program, "seam", UNIFORM_GROUP)?;

        let uniform_layout = ctx.create_scoped("panorama uniform layout", |device| {
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("panorama uniform layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: camera_binding,
                        visibility: wgpu::ShaderStages::VERTEX,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: seam_binding,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                ],
            })
        })?;

        let uniform_bind_group = ctx.create_scoped("panorama uniforms", |device| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                layout: &uniform_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: camera_binding,
                        resource: camera.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: seam_binding,
                        resource: seam.as_entire_binding(),
                    },
                ],
                label: Some("panorama uniforms"),
            })
        })?;

        Ok(Self {
            positions,
            front_uvs,
            back_uvs,
            indices,
            index_count: mesh.indices.len() as u32,
            camera,
            seam,
            uniform_layout,
            uniform_bind_group,
            queue: Arc::clone(&ctx.queue),
            owner: thread::current().id(),
            released: false,
        })
    }

    pub(crate) fn create_pipeline(
        &self,
        ctx: &RenderContext,
        label: &str,
        program: &ShaderProgram,
        texture_layout: &wgpu::BindGroupLayout,
    ) -> Result<wgpu::RenderPipeline> {
        let position = [wgpu::VertexAttribute {
            format: wgpu::VertexFormat::Float32x3,
            offset: 0,
            shader_location: program.attribute_location("position")?,
        }];
        let uv_front = [wgpu::VertexAttribute {
            format: wgpu::VertexFormat::Float32x2,
            offset: 0,
            shader_location: program.attribute_location("uv_front")?,
        }];
        let uv_back = [wgpu::VertexAttribute {
            format: wgpu::VertexFormat::Float32x2,
            offset: 0,
            shader_location: program.attribute_location("uv_back")?,
        }];
        // 三个属性各占一个顶点缓冲槽
        let buffers = [
            wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &position,
            },
            wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &uv_front,
            },
            wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &uv_back,
            },
        ];

        let layout = ctx.create_scoped(label, |device| {
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(label),
                bind_group_layouts: &[&self.uniform_layout, texture_layout],
                push_constant_ranges: &[],
            })
        })?;

        let pipeline = ctx.create_scoped(label, |device| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module: &program.vertex_module,
                    entry_point: program.vertex_entry(),
                    buffers: &buffers,
                },
                fragment: Some(wgpu::FragmentState {
                    module: &program.fragment_module,
                    entry_point: program.fragment_entry(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: ctx.target_format,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    // 球从内部看是逆时针，外侧剔除
                    cull_mode: Some(wgpu::Face::Back),
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState {
                    count: 1,
                    mask: !0,
                    alpha_to_coverage_enabled: false,
                },
                multiview: None,
            })
        })?;
        Ok(pipeline)
    }

    /// 已释放或跨线程调用都直接拒绝
    pub(crate) fn check_drawable(&self) -> std::result::Result<(), StateError> {
        if self.released {
            return Err(StateError::Released);
        }
        if thread::current().id() != self.owner {
            return Err(StateError::WrongThread);
        }
        Ok(())
    }

    pub(crate) fn write_camera(&self, mvp: Mat4) {
        let uniform = CameraUniform {
            mvp: mvp.to_cols_array_2d(),
        };
        self.queue.write_buffer(&self.camera, 0, bytemuck::cast_slice(&[uniform]));
    }

    /// 一次完整的绘制：清屏 + 索引三角形覆盖整个表面，然后提交
    pub(crate) fn encode_draw(
        &self,
        ctx: &RenderContext,
        target: &wgpu::TextureView,
        pipeline: &wgpu::RenderPipeline,
        textures: &wgpu::BindGroup,
    ) {
        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Panorama Encoder"),
            });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Panorama Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: true,
                    },
                })],
                depth_stencil_attachment: None,
            });

            render_pass.set_pipeline(pipeline);
            render_pass.set_bind_group(UNIFORM_GROUP, &self.uniform_bind_group, &[]);
            render_pass.set_bind_group(TEXTURE_GROUP, textures, &[]);
            render_pass.set_vertex_buffer(0, self.positions.slice(..));
            render_pass.set_vertex_buffer(1, self.front_uvs.slice(..));
            render_pass.set_vertex_buffer(2, self.back_uvs.slice(..));
            render_pass.set_index_buffer(self.indices.slice(..), wgpu::IndexFormat::Uint32);
            render_pass.draw_indexed(0..self.index_count, 0, 0..1);
        }
        ctx.queue.submit(std::iter::once(encoder.finish()));
    }

    pub(crate) fn release(&mut self) {
        if self.released {
            return;
        }
        flush_pending_writes(&self.queue);
        for buffer in [
            &mut self.positions,
            &mut self.front_uvs,
            &mut self.back_uvs,
            &mut self.indices,
            &mut self.camera,
            &mut self.seam,
        ] {
            buffer.destroy();
        }
        self.released = true;
    }

    pub(crate) fn is_released(&self) -> bool {
        self.released
    }
}

impl Drop for MeshBuffers {
    fn drop(&mut self) {
        self.release();
    }
}

/// group 1 的纹理 + 采样器布局，绑定号来自着色器反射
pub(crate) struct TextureBindings {
    pub layout: wgpu::BindGroupLayout,
    textures: Vec<u32>,
    sampler: u32,
}

impl TextureBindings {
    pub(crate) fn reflect(
        ctx: &RenderContext,
        label: &str,
        program: &ShaderProgram,
        texture_names: &[&str],
        sampler_name: &str,
    ) -> Result<Self> {
        let textures = texture_names
            .iter()
            .map(|name| binding_in_group(program, name, TEXTURE_GROUP))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let sampler = binding_in_group(program, sampler_name, TEXTURE_GROUP)?;

        let mut entries: Vec<wgpu::BindGroupLayoutEntry> = textures
            .iter()
            .map(|&binding| wgpu::BindGroupLayoutEntry {
                binding,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    multisampled: false,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                },
                count: None,
            })
            .collect();
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: sampler,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        });

        let layout = ctx.create_scoped(label, |device| {
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                entries: &entries,
                label: Some(label),
            })
        })?;

        Ok(Self {
            layout,
            textures,
            sampler,
        })
    }

    /// `views` 与 reflect 时的纹理名一一对应
    pub(crate) fn bind(
        &self,
        ctx: &RenderContext,
        label: &str,
        views: &[&wgpu::TextureView],
        sampler: &wgpu::Sampler,
    ) -> Result<wgpu::BindGroup> {
        let mut entries: Vec<wgpu::BindGroupEntry> = self
            .textures
            .iter()
            .zip(views)
            .map(|(&binding, view)| wgpu::BindGroupEntry {
                binding,
                resource: wgpu::BindingResource::TextureView(view),
            })
            .collect();
        entries.push(wgpu::BindGroupEntry {
            binding: self.sampler,
            resource: wgpu::BindingResource::Sampler(sampler),
        });

        let bind_group = ctx.create_scoped(label, |device| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                layout: &self.layout,
                entries: &entries,
                label: Some(label),
            })
        })?;
        Ok(bind_group)
    }
}
