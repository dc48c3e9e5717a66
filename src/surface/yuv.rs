// yuv.rs — 逐帧 YUV 表面：三张 R8 平面纹理，混合和色彩转换都在片元着色器里

use super::resources::{linear_sampler, GpuTexture, MeshBuffers, SeamUniform, TextureBindings};
use super::{PanoramaSurface, SurfaceKind};
use crate::config::{ProjectionConfig, Topology};
use crate::error::{ResourceError, Result, StateError};
use crate::frame::{chroma_size, FrameInput, YuvFrameRef};
use crate::gpu::RenderContext;
use crate::mesh;
use crate::shader::{ShaderProgram, PANORAMA_VERTEX, YUV_BLEND_FRAGMENT};
use glam::Mat4;

const LABEL: &str = "yuv panorama";

/// 当前帧尺寸对应的三张平面纹理
struct YuvPlanes {
    y: GpuTexture,
    u: GpuTexture,
    v: GpuTexture,
    bind_group: wgpu::BindGroup,
}

impl YuvPlanes {
    fn create(
        ctx: &RenderContext,
        bindings: &TextureBindings,
        sampler: &wgpu::Sampler,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        let max = ctx.max_texture_dimension();
        if width > max || height > max {
            return Err(ResourceError::TooLarge {
                label: "yuv plane y".to_string(),
                width,
                height,
                max,
            }
            .into());
        }
        let (cw, ch) = chroma_size(width, height);
        let format = wgpu::TextureFormat::R8Unorm;
        let y = GpuTexture::create(ctx, "yuv plane y", width, height, format)?;
        let u = GpuTexture::create(ctx, "yuv plane u", cw, ch, format)?;
        let v = GpuTexture::create(ctx, "yuv plane v", cw, ch, format)?;
        let bind_group = bindings.bind(ctx, "yuv planes", &[&y.view, &u.view, &v.view], sampler)?;
        Ok(Self { y, u, v, bind_group })
    }

    fn matches(&self, frame: &YuvFrameRef<'_>) -> bool {
        self.y.width == frame.width && self.y.height == frame.height
    }

    fn upload(&self, frame: &YuvFrameRef<'_>) {
        self.y.write(frame.y, 1);
        self.u.write(frame.u, 1);
        self.v.write(frame.v, 1);
    }

    fn destroy(&mut self) {
        self.y.destroy();
        self.u.destroy();
        self.v.destroy();
    }
}

pub struct YuvPanoramaSurface {
    topology: Topology,
    mesh: MeshBuffers,
    pipeline: Option<wgpu::RenderPipeline>,
    bindings: TextureBindings,
    sampler: wgpu::Sampler,
    planes: Option<YuvPlanes>,
}

impl YuvPanoramaSurface {
    pub fn new(ctx: &RenderContext, topology: Topology, config: &ProjectionConfig) -> Result<Self> {
        let grid = mesh::generate(config, topology)?;
        let program = ShaderProgram::compile(ctx, LABEL, PANORAMA_VERTEX, YUV_BLEND_FRAGMENT)?;
        let seam = SeamUniform::new(
            config,
            config.blend.yuv_half_width,
            topology,
            ctx.target_format.is_srgb(),
        );
        let mesh = MeshBuffers::upload(ctx, LABEL, &grid, &program, seam)?;

        let sampler = linear_sampler(ctx, "yuv plane sampler")?;
        let bindings = TextureBindings::reflect(
            ctx,
            "yuv texture layout",
            &program,
            &["tex_y", "tex_u", "tex_v"],
            "plane_sampler",
        )?;
        let pipeline = mesh.create_pipeline(ctx, "YUV Panorama Pipeline", &program, &bindings.layout)?;

        log::info!(
            "yuv panorama ready ({:?}): {} vertices, {} triangles",
            topology,
            grid.vertex_count(),
            grid.triangle_count()
        );

        Ok(Self {
            topology,
            mesh,
            pipeline: Some(pipeline),
            bindings,
            sampler,
            planes: None,
        })
    }

    /// 帧尺寸变化时重建平面纹理，旧纹理先销毁
    fn resize_planes(&mut self, ctx: &RenderContext, frame: &YuvFrameRef<'_>) -> Result<()> {
        if self.planes.as_ref().is_some_and(|p| p.matches(frame)) {
            return Ok(());
        }
        if let Some(mut old) = self.planes.take() {
            old.destroy();
        }
        log::debug!("yuv planes sized to {}x{}", frame.width, frame.height);
        let planes = YuvPlanes::create(ctx, &self.bindings, &self.sampler, frame.width, frame.height)?;
        self.planes = Some(planes);
        Ok(())
    }
}

impl PanoramaSurface for YuvPanoramaSurface {
    fn kind(&self) -> SurfaceKind {
        SurfaceKind::PlanarYuv
    }

    fn topology(&self) -> Topology {
        self.topology
    }

    fn draw(
        &mut self,
        ctx: &RenderContext,
        target: &wgpu::TextureView,
        mvp: Mat4,
        frame: FrameInput<'_>,
    ) -> Result<()> {
        self.mesh.check_drawable()?;
        let frame = match frame {
            FrameInput::Yuv(frame) => frame,
            other => {
                return Err(StateError::FrameKind {
                    surface: "planar YUV",
                    frame: other.describe(),
                }
                .into())
            }
        };
        // 校验在任何上传之前
        frame.validate()?;

        self.resize_planes(ctx, &frame)?;
        let (Some(pipeline), Some(planes)) = (self.pipeline.as_ref(), self.planes.as_ref()) else {
            return Err(StateError::Released.into());
        };

        let mvp = match self.topology {
            Topology::Sphere => mvp,
            Topology::Rectangle => Mat4::IDENTITY,
        };
        ctx.draw_scoped(LABEL, |_| {
            planes.upload(&frame);
            self.mesh.write_camera(mvp);
            self.mesh.encode_draw(ctx, target, pipeline, &planes.bind_group);
        })?;
        Ok(())
    }

    fn release(&mut self) {
        if self.mesh.is_released() {
            return;
        }
        if let Some(mut planes) = self.planes.take() {
            planes.destroy();
        }
        self.pipeline = None;
        self.mesh.release();
        log::debug!("yuv panorama released");
    }

    fn is_released(&self) -> bool {
        self.mesh.is_released()
    }
}

impl Drop for YuvPanoramaSurface {
    fn drop(&mut self) {
        self.release();
    }
}
