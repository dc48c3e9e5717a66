// surface/mod.rs — 全景表面：共同接口 + 两种实现 + 宿主侧的当前表面

mod bitmap;
mod resources;
mod yuv;

pub use bitmap::BitmapPanoramaSphere;
pub use yuv::YuvPanoramaSurface;

use crate::config::{ProjectionConfig, Topology};
use crate::error::Result;
use crate::frame::FrameInput;
use crate::gpu::RenderContext;
use glam::Mat4;
use image::RgbaImage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceKind {
    /// 解码后的 RGBA 位图，一次上传
    DecodedImage,
    /// 逐帧 Y/U/V 三平面
    PlanarYuv,
}

/// A renderable panorama: one mesh, one shader program and the textures it samples.
///
/// All methods must be called on the thread that created the surface.
pub trait PanoramaSurface {
    fn kind(&self) -> SurfaceKind;

    fn topology(&self) -> Topology;

    /// Clears `target` and draws the whole surface into it.
    ///
    /// `mvp` is ignored by the rectangle topology. A YUV surface needs
    /// `FrameInput::Yuv`; the frame is validated before any texture upload.
    fn draw(
        &mut self,
        ctx: &RenderContext,
        target: &wgpu::TextureView,
        mvp: Mat4,
        frame: FrameInput<'_>,
    ) -> Result<()>;

    /// Destroys every GPU object synchronously. Idempotent.
    fn release(&mut self);

    fn is_released(&self) -> bool;
}

/// 构建表面所需的输入
pub enum SurfaceSource {
    Bitmap(RgbaImage),
    Video { topology: Topology },
}

pub fn build(
    ctx: &RenderContext,
    source: SurfaceSource,
    config: &ProjectionConfig,
) -> Result<Box<dyn PanoramaSurface>> {
    let surface: Box<dyn PanoramaSurface> = match source {
        SurfaceSource::Bitmap(image) => Box::new(BitmapPanoramaSphere::new(ctx, &image, config)?),
        SurfaceSource::Video { topology } => {
            Box::new(YuvPanoramaSurface::new(ctx, topology, config)?)
        }
    };
    log::info!(
        "built {:?} surface ({:?})",
        surface.kind(),
        surface.topology()
    );
    Ok(surface)
}

/// 宿主持有的当前表面。切换时新表面先建好，旧表面同步释放后再装上；
/// 构建失败则保留旧表面。
#[derive(Default)]
pub struct ActiveSurface {
    current: Option<Box<dyn PanoramaSurface>>,
}

impl ActiveSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(
        &mut self,
        ctx: &RenderContext,
        source: SurfaceSource,
        config: &ProjectionConfig,
    ) -> Result<()> {
        let next = build(ctx, source, config)?;
        if let Some(mut old) = self.current.take() {
            old.release();
        }
        self.current = Some(next);
        Ok(())
    }

    pub fn clear(&mut self) {
        if let Some(mut old) = self.current.take() {
            old.release();
        }
    }

    pub fn kind(&self) -> Option<SurfaceKind> {
        self.current.as_ref().map(|s| s.kind())
    }

    pub fn topology(&self) -> Option<Topology> {
        self.current.as_ref().map(|s| s.topology())
    }

    /// 没有表面时返回 Ok(false)，调用方自己清屏
    pub fn draw(
        &mut self,
        ctx: &RenderContext,
        target: &wgpu::TextureView,
        mvp: Mat4,
        frame: FrameInput<'_>,
    ) -> Result<bool> {
        match self.current.as_mut() {
            Some(surface) => {
                surface.draw(ctx, target, mvp, frame)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl Drop for ActiveSurface {
    fn drop(&mut self) {
        self.clear();
    }
}
