// gpu_surfaces.rs — 离屏绘制测试；没有可用的 GPU 适配器时直接跳过

use dualfish::error::{Error, ResourceError, StateError};
use dualfish::frame::chroma_size;
use dualfish::surface::{self, BitmapPanoramaSphere, YuvPanoramaSurface};
use dualfish::{
    ActiveSurface, FrameInput, PanoramaCamera, PanoramaSurface, ProjectionConfig, RenderContext,
    SurfaceKind, SurfaceSource, Topology, YuvFrame,
};
use glam::{Mat4, Vec3};
use image::{Rgba, RgbaImage};

// 64 * 4 = 256，正好满足拷贝的行对齐
const TARGET: u32 = 64;

fn context() -> Option<RenderContext> {
    context_with(wgpu::TextureFormat::Rgba8UnormSrgb)
}

fn context_with(format: wgpu::TextureFormat) -> Option<RenderContext> {
    match pollster::block_on(RenderContext::headless(format)) {
        Ok(ctx) => Some(ctx),
        Err(e) => {
            eprintln!("skipping GPU test: {e}");
            None
        }
    }
}

fn small_config() -> ProjectionConfig {
    ProjectionConfig {
        output_width: 64,
        output_height: 32,
        sample_step: 4,
        ..ProjectionConfig::default()
    }
}

/// 左半红 (前镜头)，右半蓝 (背镜头)
fn split_image() -> RgbaImage {
    RgbaImage::from_fn(128, 64, |x, _| {
        if x < 64 {
            Rgba([255, 0, 0, 255])
        } else {
            Rgba([0, 0, 255, 255])
        }
    })
}

fn gray_image() -> RgbaImage {
    RgbaImage::from_pixel(128, 64, Rgba([128, 128, 128, 255]))
}

fn assert_gray(pixel: [u8; 4]) {
    for c in &pixel[..3] {
        assert!((*c as i32 - 128).abs() <= 4, "expected gray, got {:?}", pixel);
    }
}

fn gray_frame(width: u32, height: u32) -> YuvFrame {
    let (cw, ch) = chroma_size(width, height);
    YuvFrame {
        width,
        height,
        y: vec![128; (width * height) as usize],
        u: vec![128; (cw * ch) as usize],
        v: vec![128; (cw * ch) as usize],
    }
}

struct Target {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

fn target(ctx: &RenderContext) -> Target {
    let texture = ctx.device.create_texture(&wgpu::TextureDescriptor {
        label: Some("test target"),
        size: wgpu::Extent3d {
            width: TARGET,
            height: TARGET,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: ctx.target_format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    Target { texture, view }
}

fn read_pixel(ctx: &RenderContext, target: &Target, x: u32, y: u32) -> [u8; 4] {
    let bytes_per_row = TARGET * 4;
    let buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("readback"),
        size: (bytes_per_row * TARGET) as u64,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });
    let mut encoder = ctx
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
    encoder.copy_texture_to_buffer(
        wgpu::ImageCopyTexture {
            texture: &target.texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::ImageCopyBuffer {
            buffer: &buffer,
            layout: wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(TARGET),
            },
        },
        wgpu::Extent3d {
            width: TARGET,
            height: TARGET,
            depth_or_array_layers: 1,
        },
    );
    ctx.queue.submit(std::iter::once(encoder.finish()));

    let slice = buffer.slice(..);
    slice.map_async(wgpu::MapMode::Read, |r| r.expect("map readback buffer"));
    ctx.device.poll(wgpu::Maintain::Wait);
    let data = slice.get_mapped_range();
    let at = (y * bytes_per_row + x * 4) as usize;
    [data[at], data[at + 1], data[at + 2], data[at + 3]]
}

fn front_view_mvp(config: &ProjectionConfig) -> Mat4 {
    PanoramaCamera::new().mvp(1.0, Vec3::from(config.origin))
}

#[test]
fn bitmap_sphere_shows_front_lens_straight_ahead() {
    let Some(ctx) = context() else { return };
    let config = small_config();
    let mut sphere = BitmapPanoramaSphere::new(&ctx, &split_image(), &config).unwrap();
    let target = target(&ctx);

    sphere
        .draw(&ctx, &target.view, front_view_mvp(&config), FrameInput::Static)
        .unwrap();

    let center = read_pixel(&ctx, &target, TARGET / 2, TARGET / 2);
    assert!(center[0] > 200 && center[2] < 50, "center pixel {:?}", center);
}

#[test]
fn build_picks_kind_from_source() {
    let Some(ctx) = context() else { return };
    let config = small_config();

    let bitmap = surface::build(&ctx, SurfaceSource::Bitmap(split_image()), &config).unwrap();
    assert_eq!(bitmap.kind(), SurfaceKind::DecodedImage);
    assert_eq!(bitmap.topology(), Topology::Sphere);

    let video = surface::build(
        &ctx,
        SurfaceSource::Video {
            topology: Topology::Rectangle,
        },
        &config,
    )
    .unwrap();
    assert_eq!(video.kind(), SurfaceKind::PlanarYuv);
    assert_eq!(video.topology(), Topology::Rectangle);
}

#[test]
fn yuv_rectangle_renders_gray_frame() {
    let Some(ctx) = context() else { return };
    let mut rect = YuvPanoramaSurface::new(&ctx, Topology::Rectangle, &small_config()).unwrap();
    let target = target(&ctx);
    let frame = gray_frame(32, 16);

    // 平面拓扑忽略 mvp
    let garbage = Mat4::from_scale(Vec3::splat(1000.0));
    rect.draw(&ctx, &target.view, garbage, FrameInput::Yuv(frame.view()))
        .unwrap();

    assert_gray(read_pixel(&ctx, &target, TARGET / 2, TARGET / 2));
}

#[test]
fn unorm_target_keeps_source_brightness() {
    let Some(ctx) = context_with(wgpu::TextureFormat::Rgba8Unorm) else { return };
    let config = small_config();
    let target = target(&ctx);

    let mut sphere = BitmapPanoramaSphere::new(&ctx, &gray_image(), &config).unwrap();
    sphere
        .draw(&ctx, &target.view, front_view_mvp(&config), FrameInput::Static)
        .unwrap();
    assert_gray(read_pixel(&ctx, &target, TARGET / 2, TARGET / 2));

    let mut rect = YuvPanoramaSurface::new(&ctx, Topology::Rectangle, &config).unwrap();
    let frame = gray_frame(32, 16);
    rect.draw(&ctx, &target.view, Mat4::IDENTITY, FrameInput::Yuv(frame.view()))
        .unwrap();
    assert_gray(read_pixel(&ctx, &target, TARGET / 2, TARGET / 2));
}

#[test]
fn empty_bitmap_is_rejected() {
    let Some(ctx) = context() else { return };
    let err = BitmapPanoramaSphere::new(&ctx, &RgbaImage::new(0, 0), &small_config())
        .err()
        .unwrap();
    assert!(matches!(
        err,
        Error::State(StateError::EmptyFrame { width: 0, height: 0 })
    ));
}

#[test]
fn yuv_frames_may_change_size() {
    let Some(ctx) = context() else { return };
    let config = small_config();
    let mut sphere = YuvPanoramaSurface::new(&ctx, Topology::Sphere, &config).unwrap();
    let target = target(&ctx);
    let mvp = front_view_mvp(&config);

    for (w, h) in [(32, 16), (33, 17), (32, 16)] {
        let frame = gray_frame(w, h);
        sphere
            .draw(&ctx, &target.view, mvp, FrameInput::Yuv(frame.view()))
            .unwrap();
    }
}

#[test]
fn mismatched_planes_are_rejected() {
    let Some(ctx) = context() else { return };
    let config = small_config();
    let mut sphere = YuvPanoramaSurface::new(&ctx, Topology::Sphere, &config).unwrap();
    let target = target(&ctx);
    let mut frame = gray_frame(32, 16);
    frame.u.pop();

    let err = sphere
        .draw(&ctx, &target.view, front_view_mvp(&config), FrameInput::Yuv(frame.view()))
        .unwrap_err();
    assert!(matches!(err, Error::State(StateError::PlaneSize { .. })));

    // 表面仍然可用
    let good = gray_frame(32, 16);
    sphere
        .draw(&ctx, &target.view, front_view_mvp(&config), FrameInput::Yuv(good.view()))
        .unwrap();
}

#[test]
fn frame_beyond_device_limit_is_rejected() {
    let Some(ctx) = context() else { return };
    let mut rect = YuvPanoramaSurface::new(&ctx, Topology::Rectangle, &small_config()).unwrap();
    let target = target(&ctx);
    let frame = gray_frame(ctx.max_texture_dimension() + 1, 2);

    let err = rect
        .draw(&ctx, &target.view, Mat4::IDENTITY, FrameInput::Yuv(frame.view()))
        .unwrap_err();
    assert!(matches!(err, Error::Resource(ResourceError::TooLarge { .. })));
}

#[test]
fn wrong_frame_kind_is_rejected() {
    let Some(ctx) = context() else { return };
    let config = small_config();
    let target = target(&ctx);
    let frame = gray_frame(32, 16);

    let mut sphere = BitmapPanoramaSphere::new(&ctx, &split_image(), &config).unwrap();
    let err = sphere
        .draw(&ctx, &target.view, Mat4::IDENTITY, FrameInput::Yuv(frame.view()))
        .unwrap_err();
    assert!(matches!(err, Error::State(StateError::FrameKind { .. })));

    let mut video = YuvPanoramaSurface::new(&ctx, Topology::Sphere, &config).unwrap();
    let err = video
        .draw(&ctx, &target.view, Mat4::IDENTITY, FrameInput::Static)
        .unwrap_err();
    assert!(matches!(err, Error::State(StateError::FrameKind { .. })));
}

#[test]
fn draw_after_release_fails() {
    let Some(ctx) = context() else { return };
    let config = small_config();
    let target = target(&ctx);
    let mut sphere = BitmapPanoramaSphere::new(&ctx, &split_image(), &config).unwrap();

    sphere.release();
    sphere.release();
    assert!(sphere.is_released());
    let err = sphere
        .draw(&ctx, &target.view, Mat4::IDENTITY, FrameInput::Static)
        .unwrap_err();
    assert!(matches!(err, Error::State(StateError::Released)));
    let mut video = YuvPanoramaSurface::new(&ctx, Topology::Sphere, &config).unwrap();
    let frame = gray_frame(32, 16);
    video
        .draw(&ctx, &target.view, Mat4::IDENTITY, FrameInput::Yuv(frame.view()))
        .unwrap();
    video.release();
    let err = video
        .draw(&ctx, &target.view, Mat4::IDENTITY, FrameInput::Yuv(frame.view()))
        .unwrap_err();
    assert!(matches!(err, Error::State(StateError::Released)));
}

#[test]
fn draw_from_another_thread_fails() {
    let Some(ctx) = context() else { return };
    let config = small_config();
    let target = target(&ctx);
    let mut sphere = BitmapPanoramaSphere::new(&ctx, &split_image(), &config).unwrap();

    let result = std::thread::scope(|s| {
        s.spawn(|| sphere.draw(&ctx, &target.view, Mat4::IDENTITY, FrameInput::Static))
            .join()
            .unwrap()
    });
    assert!(matches!(
        result,
        Err(Error::State(StateError::WrongThread))
    ));

    // 回到所属线程照常绘制
    sphere
        .draw(&ctx, &target.view, Mat4::IDENTITY, FrameInput::Static)
        .unwrap();
}

#[test]
fn failed_switch_keeps_current_surface() {
    let Some(ctx) = context() else { return };
    let config = small_config();
    let mut active = ActiveSurface::new();
    assert_eq!(active.kind(), None);

    active
        .replace(&ctx, SurfaceSource::Bitmap(split_image()), &config)
        .unwrap();
    assert_eq!(active.kind(), Some(SurfaceKind::DecodedImage));

    let broken = ProjectionConfig {
        sample_step: 0,
        ..config.clone()
    };
    assert!(active
        .replace(&ctx, SurfaceSource::Video { topology: Topology::Sphere }, &broken)
        .is_err());
    assert_eq!(active.kind(), Some(SurfaceKind::DecodedImage));

    active
        .replace(&ctx, SurfaceSource::Video { topology: Topology::Sphere }, &config)
        .unwrap();
    assert_eq!(active.kind(), Some(SurfaceKind::PlanarYuv));

    let target = target(&ctx);
    let frame = gray_frame(32, 16);
    assert!(active
        .draw(&ctx, &target.view, Mat4::IDENTITY, FrameInput::Yuv(frame.view()))
        .unwrap());

    active.clear();
    assert!(!active
        .draw(&ctx, &target.view, Mat4::IDENTITY, FrameInput::Static)
        .unwrap());
}

#[test]
fn bitmap_replaced_before_first_draw() {
    let Some(ctx) = context() else { return };
    let config = small_config();
    let mut active = ActiveSurface::new();

    // 第一张的纹理上传还没提交就被换掉
    active
        .replace(&ctx, SurfaceSource::Bitmap(gray_image()), &config)
        .unwrap();
    active
        .replace(&ctx, SurfaceSource::Bitmap(split_image()), &config)
        .unwrap();

    let target = target(&ctx);
    assert!(active
        .draw(&ctx, &target.view, front_view_mvp(&config), FrameInput::Static)
        .unwrap());
    let center = read_pixel(&ctx, &target, TARGET / 2, TARGET / 2);
    assert!(center[0] > 200 && center[2] < 50, "center pixel {:?}", center);
}

#[test]
fn release_with_pending_upload_keeps_queue_usable() {
    let Some(ctx) = context() else { return };
    let config = small_config();
    let target = target(&ctx);

    let mut first = BitmapPanoramaSphere::new(&ctx, &split_image(), &config).unwrap();
    first.release();
    drop(first);

    let mut second = BitmapPanoramaSphere::new(&ctx, &gray_image(), &config).unwrap();
    second
        .draw(&ctx, &target.view, front_view_mvp(&config), FrameInput::Static)
        .unwrap();
    assert_gray(read_pixel(&ctx, &target, TARGET / 2, TARGET / 2));
}

#[test]
fn surface_released_before_context_is_dropped() {
    let Some(ctx) = context() else { return };
    let config = small_config();
    let mut active = ActiveSurface::new();
    active
        .replace(&ctx, SurfaceSource::Bitmap(split_image()), &config)
        .unwrap();

    // 上传还挂在队列里；先清掉表面再丢上下文
    active.clear();
    assert_eq!(active.kind(), None);
    drop(active);
    drop(ctx);
}

#[test]
fn rejected_gpu_calls_come_back_as_errors() {
    let Some(ctx) = context() else { return };
    // MAP_READ 只能和 COPY_DST 搭配，校验必然失败
    let invalid = |device: &wgpu::Device| {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("invalid usage"),
            size: 256,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::UNIFORM,
            mapped_at_creation: false,
        })
    };

    let err = ctx.draw_scoped("invalid draw", invalid).err().unwrap();
    assert!(matches!(err, ResourceError::Draw { .. }));
    let err = ctx.create_scoped("invalid buffer", invalid).err().unwrap();
    assert!(matches!(err, ResourceError::Allocation { .. }));

    // 设备仍然可用
    let mut sphere = BitmapPanoramaSphere::new(&ctx, &gray_image(), &small_config()).unwrap();
    let target = target(&ctx);
    sphere
        .draw(&ctx, &target.view, Mat4::IDENTITY, FrameInput::Static)
        .unwrap();
}
