// renderer.rs — 窗口渲染器：wgpu 窗口表面 + 当前全景表面 + egui 叠加层

use dualfish::error::ResourceError;
use dualfish::{
    ActiveSurface, FrameInput, PanoramaCamera, ProjectionConfig, RenderContext, SurfaceKind,
    SurfaceSource, Topology, YuvFrame,
};
use glam::Vec3;
use image::RgbaImage;
use winit::window::Window;

pub struct Renderer {
    surface: wgpu::Surface,
    config: wgpu::SurfaceConfiguration,
    pub size: winit::dpi::PhysicalSize<u32>,
    pub ctx: RenderContext,

    projection: ProjectionConfig,
    panorama: ActiveSurface,
    // 最近一帧视频，没有新帧时重画它
    last_frame: Option<YuvFrame>,

    // UI
    pub egui_ctx: egui::Context,
    pub egui_state: egui_winit::State,
    egui_renderer: egui_wgpu::Renderer,
}

impl Renderer {
    pub async fn new(
        window: &Window,
        projection: ProjectionConfig,
    ) -> Result<Self, ResourceError> {
        let size = window.inner_size();
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = unsafe { instance.create_surface(window) }
            .map_err(|e| ResourceError::Device(e.to_string()))?;
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or(ResourceError::NoAdapter)?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    features: wgpu::Features::empty(),
                    limits: wgpu::Limits::default().using_resolution(adapter.limits()),
                    label: None,
                },
                None,
            )
            .await
            .map_err(|e| ResourceError::Device(e.to_string()))?;

        let info = adapter.get_info();
        log::info!("adapter: {} ({:?})", info.name, info.backend);

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| ResourceError::Device("surface reports no formats".into()))?;
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo, // VSync on
            alpha_mode,
            view_formats: vec![],
        };
        surface.configure(&device, &config);

        let ctx = RenderContext::new(device, queue, surface_format);

        let egui_ctx = egui::Context::default();
        let mut egui_state = egui_winit::State::new(window);
        // 高 DPI 显示器
        egui_state.set_pixels_per_point(window.scale_factor() as f32);
        let egui_renderer = egui_wgpu::Renderer::new(&ctx.device, config.format, None, 1);

        Ok(Self {
            surface,
            config,
            size,
            ctx,
            projection,
            panorama: ActiveSurface::new(),
            last_frame: None,
            egui_ctx,
            egui_state,
            egui_renderer,
        })
    }

    pub fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.size = new_size;
            self.config.width = new_size.width;
            self.config.height = new_size.height;
            self.surface.configure(&self.ctx.device, &self.config);
        }
    }

    pub fn set_vsync(&mut self, enabled: bool) {
        self.config.present_mode = if enabled {
            wgpu::PresentMode::Fifo
        } else {
            wgpu::PresentMode::AutoNoVsync
        };
        self.surface.configure(&self.ctx.device, &self.config);
    }

    pub fn projection(&self) -> &ProjectionConfig {
        &self.projection
    }

    pub fn source_kind(&self) -> Option<SurfaceKind> {
        self.panorama.kind()
    }

    /// 换成位图源；失败时保留当前的源
    pub fn load_bitmap(&mut self, img: RgbaImage) -> dualfish::Result<()> {
        let (w, h) = img.dimensions();
        self.panorama
            .replace(&self.ctx, SurfaceSource::Bitmap(img), &self.projection)?;
        self.last_frame = None;
        log::info!("switched to bitmap source {}x{}", w, h);
        Ok(())
    }

    pub fn start_video(&mut self, topology: Topology) -> dualfish::Result<()> {
        self.panorama
            .replace(&self.ctx, SurfaceSource::Video { topology }, &self.projection)?;
        self.last_frame = None;
        log::info!("switched to video source ({:?})", topology);
        Ok(())
    }

    pub fn push_frame(&mut self, frame: YuvFrame) {
        self.last_frame = Some(frame);
    }

    pub fn render_with_ui(
        &mut self,
        window: &Window,
        camera: &PanoramaCamera,
        run_ui: impl FnOnce(&egui::Context),
    ) -> Result<(), wgpu::SurfaceError> {
        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        // 1. 全景 (表面自己清屏 + 提交)
        let aspect = self.config.width as f32 / self.config.height as f32;
        let mvp = camera.mvp(aspect, Vec3::from(self.projection.origin));
        let frame = match (self.panorama.kind(), self.last_frame.as_ref()) {
            (Some(SurfaceKind::PlanarYuv), Some(frame)) => Some(FrameInput::Yuv(frame.view())),
            (Some(SurfaceKind::PlanarYuv), None) => None,
            _ => Some(FrameInput::Static),
        };
        let drawn = match frame {
            Some(frame) => match self.panorama.draw(&self.ctx, &view, mvp, frame) {
                Ok(drawn) => drawn,
                Err(e) => {
                    log::warn!("panorama frame skipped: {}", e);
                    false
                }
            },
            None => false,
        };

        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        // 2. UI
        let raw_input = self.egui_state.take_egui_input(window);
        let full_output = self.egui_ctx.run(raw_input, run_ui);

        self.egui_state
            .handle_platform_output(window, &self.egui_ctx, full_output.platform_output);
        let clipped_primitives = self.egui_ctx.tessellate(full_output.shapes);

        let screen_descriptor = egui_wgpu::renderer::ScreenDescriptor {
            size_in_pixels: [self.config.width, self.config.height],
            pixels_per_point: window.scale_factor() as f32,
        };

        for (id, delta) in &full_output.textures_delta.set {
            self.egui_renderer
                .update_texture(&self.ctx.device, &self.ctx.queue, *id, delta);
        }

        self.egui_renderer.update_buffers(
            &self.ctx.device,
            &self.ctx.queue,
            &mut encoder,
            &clipped_primitives,
            &screen_descriptor,
        );

        {
            // 没画全景时这里负责清屏
            let load = if drawn {
                wgpu::LoadOp::Load
            } else {
                wgpu::LoadOp::Clear(wgpu::Color {
                    r: 0.1,
                    g: 0.1,
                    b: 0.1,
                    a: 1.0,
                })
            };
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Egui Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations { load, store: true },
                })],
                depth_stencil_attachment: None,
            });
            self.egui_renderer
                .render(&mut render_pass, &clipped_primitives, &screen_descriptor);
        }

        for id in &full_output.textures_delta.free {
            self.egui_renderer.free_texture(id);
        }

        self.ctx.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        Ok(())
    }
}

impl Drop for Renderer {
    // 字段按声明顺序析构，ctx 在 panorama 之前；表面必须先释放
    fn drop(&mut self) {
        self.panorama.clear();
        self.last_frame = None;
    }
}
