// bitmap.rs — 位图双鱼眼：球面网格 + 一张 RGBA 纹理，接缝处线性混合

use super::resources::{linear_sampler, GpuTexture, MeshBuffers, SeamUniform, TextureBindings};
use super::{PanoramaSurface, SurfaceKind};
use crate::config::{ProjectionConfig, Topology};
use crate::error::{Result, StateError};
use crate::frame::FrameInput;
use crate::gpu::RenderContext;
use crate::mesh;
use crate::shader::{ShaderProgram, DECODED_BLEND_FRAGMENT, PANORAMA_VERTEX};
use glam::Mat4;
use image::RgbaImage;
use std::borrow::Cow;

const LABEL: &str = "decoded panorama";

pub struct BitmapPanoramaSphere {
    mesh: MeshBuffers,
    // 着色器模块归管线所有，release 时一起丢弃
    pipeline: Option<wgpu::RenderPipeline>,
    texture: GpuTexture,
    bind_group: wgpu::BindGroup,
}

impl BitmapPanoramaSphere {
    pub fn new(ctx: &RenderContext, image: &RgbaImage, config: &ProjectionConfig) -> Result<Self> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(StateError::EmptyFrame { width, height }.into());
        }

        let grid = mesh::generate(config, Topology::Sphere)?;
        let program =
            ShaderProgram::compile(ctx, LABEL, PANORAMA_VERTEX, DECODED_BLEND_FRAGMENT)?;
        let seam = SeamUniform::new(
            config,
            config.blend.decoded_half_width,
            Topology::Sphere,
            ctx.target_format.is_srgb(),
        );
        let mesh = MeshBuffers::upload(ctx, LABEL, &grid, &program, seam)?;

        let image = fit_to_device(image, ctx.max_texture_dimension());
        let (width, height) = image.dimensions();
        let texture = GpuTexture::create(
            ctx,
            "panorama texture",
            width,
            height,
            wgpu::TextureFormat::Rgba8UnormSrgb,
        )?;
        texture.write(image.as_raw(), 4);

        let sampler = linear_sampler(ctx, "panorama sampler")?;
        let bindings = TextureBindings::reflect(
            ctx,
            "panorama texture layout",
            &program,
            &["panorama"],
            "panorama_sampler",
        )?;
        let bind_group = bindings.bind(ctx, "panorama textures", &[&texture.view], &sampler)?;
        let pipeline = mesh.create_pipeline(ctx, "Decoded Panorama Pipeline", &program, &bindings.layout)?;

        log::info!(
            "decoded panorama ready: {}x{} texture, {} vertices, {} triangles",
            width,
            height,
            grid.vertex_count(),
            grid.triangle_count()
        );

        Ok(Self {
            mesh,
            pipeline: Some(pipeline),
            texture,
            bind_group,
        })
    }
}

/// 超过 GPU 纹理上限就等比缩到上限以内
fn fit_to_device(image: &RgbaImage, max_dimension: u32) -> Cow<'_, RgbaImage> {
    let (src_w, src_h) = image.dimensions();
    if src_w <= max_dimension && src_h <= max_dimension {
        return Cow::Borrowed(image);
    }

    let scale = max_dimension as f32 / src_w.max(src_h) as f32;
    let new_w = ((src_w as f32 * scale) as u32).clamp(1, max_dimension);
    let new_h = ((src_h as f32 * scale) as u32).clamp(1, max_dimension);
    log::warn!(
        "image {}x{} exceeds the GPU limit {}, scaled to {}x{}",
        src_w,
        src_h,
        max_dimension,
        new_w,
        new_h
    );
    Cow::Owned(image::imageops::resize(
        image,
        new_w,
        new_h,
        image::imageops::FilterType::Lanczos3,
    ))
}

impl PanoramaSurface for BitmapPanoramaSphere {
    fn kind(&self) -> SurfaceKind {
        SurfaceKind::DecodedImage
    }

    fn topology(&self) -> Topology {
        Topology::Sphere
    }

    fn draw(
        &mut self,
        ctx: &RenderContext,
        target: &wgpu::TextureView,
        mvp: Mat4,
        frame: FrameInput<'_>,
    ) -> Result<()> {
        self.mesh.check_drawable()?;
        if !matches!(frame, FrameInput::Static) {
            return Err(StateError::FrameKind {
                surface: "decoded image",
                frame: frame.describe(),
            }
            .into());
        }

        let Some(pipeline) = self.pipeline.as_ref() else {
            return Err(StateError::Released.into());
        };
        ctx.draw_scoped(LABEL, |_| {
            self.mesh.write_camera(mvp);
            self.mesh.encode_draw(ctx, target, pipeline, &self.bind_group);
        })?;
        Ok(())
    }

    fn release(&mut self) {
        if self.mesh.is_released() {
            return;
        }
        self.texture.destroy();
        self.pipeline = None;
        self.mesh.release();
        log::debug!("decoded panorama released");
    }

    fn is_released(&self) -> bool {
        self.mesh.is_released()
    }
}

impl Drop for BitmapPanoramaSphere {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn small_images_are_borrowed() {
        let img = RgbaImage::from_pixel(64, 32, Rgba([1, 2, 3, 255]));
        assert!(matches!(fit_to_device(&img, 8192), Cow::Borrowed(_)));
    }

    #[test]
    fn oversized_images_keep_aspect() {
        let img = RgbaImage::from_pixel(400, 200, Rgba([0, 0, 0, 255]));
        let fitted = fit_to_device(&img, 100);
        assert_eq!(fitted.dimensions(), (100, 50));
    }
}
