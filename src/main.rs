// main.rs — 查看器：菜单、状态栏、鼠标交互，图片 / 原始视频两种源

#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")] // 在 Release 模式下隐藏控制台窗口

mod cli;
mod renderer;

use dualfish::camera::{MAX_FOV, MIN_FOV};
use dualfish::frame::{frame_channel, FrameHandoff};
use dualfish::player::{spawn_raw_yuv, RawVideo};
use dualfish::{stitch, PanoramaCamera, ProjectionConfig, SurfaceKind, Topology};
use renderer::Renderer;

use winit::{
    dpi::{LogicalSize, PhysicalPosition},
    event::*,
    event_loop::{ControlFlow, EventLoop},
    window::{Fullscreen, WindowBuilder},
};

use image::io::Reader as ImageReader;
use image::RgbaImage;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];
const FRAME_QUEUE: usize = 4;

/// 后台线程回传给界面的消息
enum Loaded {
    Image(PathBuf, RgbaImage),
    Failed(String),
    Exported(PathBuf),
}

/// 菜单里点出来、要在事件循环里执行的动作
enum UiAction {
    OpenImage(PathBuf),
    OpenVideo(RawVideo),
    Export(PathBuf),
}

struct ViewState {
    camera: PanoramaCamera,
    is_fullscreen: bool,
    show_fps: bool,
    vsync_enabled: bool,
    is_busy: bool,
    video_topology: Topology,
    video_size: String,
    status: Option<String>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = match cli::parse(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(2);
        }
    };
    let projection = match cli::resolve_config(&args) {
        Ok(config) => config,
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(2);
        }
    };

    let event_loop = EventLoop::new();
    let window = match WindowBuilder::new()
        .with_title("Dual Fisheye Panorama")
        .with_inner_size(LogicalSize::new(1280, 720))
        .build(&event_loop)
    {
        Ok(window) => Arc::new(window),
        Err(e) => {
            log::error!("failed to create window: {}", e);
            std::process::exit(1);
        }
    };

    let mut renderer = match pollster::block_on(Renderer::new(&window, projection)) {
        Ok(renderer) => renderer,
        Err(e) => {
            log::error!("failed to initialise the renderer: {}", e);
            std::process::exit(1);
        }
    };

    let mut view = ViewState {
        camera: PanoramaCamera::new(),
        is_fullscreen: false,
        show_fps: false,
        vsync_enabled: true,
        is_busy: false,
        video_topology: if args.rect {
            Topology::Rectangle
        } else {
            Topology::Sphere
        },
        video_size: "1920x960".to_string(),
        status: None,
    };

    // 交互状态
    let mut mouse_pressed = false;
    let mut last_mouse_pos: Option<PhysicalPosition<f64>> = None;

    // FPS 计算
    let mut last_frame_time = Instant::now();
    let mut frame_count = 0;
    let mut fps = 0.0;

    // 当前源
    let mut current_image: Option<PathBuf> = None;
    let mut handoff: Option<FrameHandoff> = None;

    // 异步加载通道
    let (tx, rx): (Sender<Loaded>, Receiver<Loaded>) = channel();

    if let Some(path) = args.image.clone() {
        view.is_busy = true;
        start_load_image(path, tx.clone());
    }
    if let Some(video) = args.video.clone() {
        handoff = start_video(&mut renderer, video, view.video_topology);
    }

    event_loop.run(move |event, _, control_flow| {
        *control_flow = ControlFlow::Poll;

        // 后台线程的结果
        while let Ok(msg) = rx.try_recv() {
            match msg {
                Loaded::Image(path, rgba) => {
                    view.is_busy = false;
                    match renderer.load_bitmap(rgba) {
                        Ok(()) => {
                            // 切到图片后停掉视频读取线程
                            handoff = None;
                            view.status = None;
                            current_image = Some(path);
                        }
                        Err(e) => {
                            log::error!("failed to show {}: {}", path.display(), e);
                            view.status = Some(format!("Error: {e}"));
                        }
                    }
                }
                Loaded::Failed(reason) => {
                    view.is_busy = false;
                    view.status = Some(reason);
                }
                Loaded::Exported(path) => {
                    view.is_busy = false;
                    view.status = Some(format!("Exported {}", path.display()));
                }
            }
        }

        // 只取最新一帧
        if let Some(h) = handoff.as_mut() {
            if let Some(frame) = h.latest() {
                renderer.push_frame(frame);
            }
            if h.is_disconnected() {
                view.status = Some("Video stopped, see log".to_string());
                handoff = None;
            }
        }

        match event {
            Event::WindowEvent { event, .. } => {
                // 先让 egui 处理事件
                let response = renderer.egui_state.on_event(&renderer.egui_ctx, &event);
                if response.consumed {
                    return;
                }

                match event {
                    WindowEvent::CloseRequested => {
                        *control_flow = ControlFlow::Exit;
                    }

                    WindowEvent::Resized(new_size) => {
                        renderer.resize(new_size);
                    }

                    WindowEvent::ScaleFactorChanged { new_inner_size, .. } => {
                        renderer.resize(*new_inner_size);
                    }

                    // 键盘快捷键
                    WindowEvent::KeyboardInput { input, .. } => {
                        if input.state == ElementState::Pressed {
                            match input.virtual_keycode {
                                Some(VirtualKeyCode::O) => {
                                    if let Some(path) = pick_image() {
                                        view.is_busy = true;
                                        start_load_image(path, tx.clone());
                                    }
                                }
                                Some(VirtualKeyCode::R) => view.camera.reset_orientation(),
                                Some(VirtualKeyCode::F11) => {
                                    toggle_fullscreen(&window, &mut view.is_fullscreen)
                                }
                                _ => {}
                            }
                        }
                    }

                    // 鼠标交互
                    WindowEvent::MouseInput { state, button, .. } => {
                        if button == MouseButton::Left {
                            mouse_pressed = state == ElementState::Pressed;
                            if !mouse_pressed {
                                last_mouse_pos = None;
                            }
                        }
                    }

                    WindowEvent::CursorMoved { position, .. } => {
                        if mouse_pressed {
                            if let Some(last_pos) = last_mouse_pos {
                                view.camera.drag(
                                    (position.x - last_pos.x) as f32,
                                    (position.y - last_pos.y) as f32,
                                    renderer.size.width as f32,
                                    renderer.size.height as f32,
                                );
                            }
                            last_mouse_pos = Some(position);
                        }
                    }

                    WindowEvent::MouseWheel { delta, .. } => {
                        let scroll = match delta {
                            MouseScrollDelta::LineDelta(_, y) => y,
                            MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / 20.0,
                        };
                        view.camera.scroll(scroll);
                    }

                    // 触控板双指缩放
                    WindowEvent::TouchpadMagnify { delta, .. } => {
                        let delta = delta as f32;
                        if delta > -1.0 {
                            view.camera.zoom_gesture(1.0 + delta, 1.0);
                        }
                    }

                    WindowEvent::DroppedFile(path) => {
                        view.is_busy = true;
                        start_load_image(path, tx.clone());
                    }

                    _ => {}
                }
            }

            Event::RedrawRequested(_) => {
                // FPS 统计
                frame_count += 1;
                let now = Instant::now();
                if now.duration_since(last_frame_time).as_secs_f32() >= 1.0 {
                    fps = frame_count as f32 / now.duration_since(last_frame_time).as_secs_f32();
                    frame_count = 0;
                    last_frame_time = now;
                }

                let mut action = None;
                let mut vsync_changed = false;
                let source = renderer.source_kind();
                let can_export = current_image.is_some() && source == Some(SurfaceKind::DecodedImage);
                let camera = view.camera;
                let render_result = renderer.render_with_ui(&window, &camera, |ctx| {
                    draw_ui(
                        ctx,
                        &mut view,
                        &mut action,
                        &mut vsync_changed,
                        source,
                        can_export,
                        fps,
                        &window,
                    );
                });

                if vsync_changed {
                    renderer.set_vsync(view.vsync_enabled);
                }

                match action {
                    Some(UiAction::OpenImage(path)) => {
                        view.is_busy = true;
                        start_load_image(path, tx.clone());
                    }
                    Some(UiAction::OpenVideo(video)) => {
                        if let Some(h) = start_video(&mut renderer, video, view.video_topology) {
                            handoff = Some(h);
                            current_image = None;
                            view.status = None;
                        } else {
                            view.status = Some("Failed to start video, see log".to_string());
                        }
                    }
                    Some(UiAction::Export(target)) => {
                        if let Some(source) = current_image.clone() {
                            view.is_busy = true;
                            start_export(source, target, renderer.projection().clone(), tx.clone());
                        }
                    }
                    None => {}
                }

                match render_result {
                    Ok(_) => {}
                    Err(wgpu::SurfaceError::Lost) => renderer.resize(renderer.size),
                    Err(wgpu::SurfaceError::OutOfMemory) => *control_flow = ControlFlow::Exit,
                    Err(e) => log::warn!("render error: {:?}", e),
                }
            }

            Event::MainEventsCleared => {
                window.request_redraw();
            }

            _ => {}
        }
    });
}

fn pick_image() -> Option<PathBuf> {
    rfd::FileDialog::new()
        .add_filter("Images", &IMAGE_EXTENSIONS)
        .pick_file()
}

fn toggle_fullscreen(window: &winit::window::Window, is_fullscreen: &mut bool) {
    *is_fullscreen = !*is_fullscreen;
    if *is_fullscreen {
        window.set_fullscreen(Some(Fullscreen::Borderless(None)));
    } else {
        window.set_fullscreen(None);
    }
}

/// 先打开视频文件启动读取线程，再切换到 YUV 表面；任一步失败都保持原来的源
fn start_video(renderer: &mut Renderer, video: RawVideo, topology: Topology) -> Option<FrameHandoff> {
    let (frame_tx, handoff) = frame_channel(FRAME_QUEUE);
    let handle = match spawn_raw_yuv(video, frame_tx) {
        Ok(handle) => handle,
        Err(e) => {
            log::error!("failed to open raw video: {}", e);
            return None;
        }
    };
    if let Err(e) = renderer.start_video(topology) {
        // handoff 一丢，读取线程就会退出
        log::error!("failed to build the video surface: {}", e);
        drop(handoff);
        let _ = handle.join();
        return None;
    }
    Some(handoff)
}

fn decode_image(path: &Path) -> Result<RgbaImage, String> {
    let file = File::open(path).map_err(|e| format!("Failed to open {}: {}", path.display(), e))?;
    let reader = BufReader::new(file);

    let img = ImageReader::new(reader)
        .with_guessed_format()
        .map_err(image::ImageError::IoError)
        .and_then(|mut r| {
            r.no_limits();
            r.decode()
        })
        .map_err(|e| format!("Failed to decode {}: {}", path.display(), e))?;

    log::info!("image loaded: {}x{}", img.width(), img.height());
    Ok(img.to_rgba8())
}

fn start_load_image(path: PathBuf, tx: Sender<Loaded>) {
    thread::spawn(move || {
        log::info!("loading {} in the background", path.display());
        let msg = match decode_image(&path) {
            Ok(rgba) => Loaded::Image(path, rgba),
            Err(e) => {
                log::error!("{}", e);
                Loaded::Failed(e)
            }
        };
        if tx.send(msg).is_err() {
            log::warn!("viewer closed before the image finished loading");
        }
    });
}

/// 重新读源图，CPU 拼成等距柱状图后写盘
fn start_export(source: PathBuf, target: PathBuf, config: ProjectionConfig, tx: Sender<Loaded>) {
    thread::spawn(move || {
        let result = decode_image(&source).and_then(|img| {
            let pano = stitch::stitch_equirect(&img, &config).map_err(|e| e.to_string())?;
            pano.save(&target)
                .map_err(|e| format!("Failed to write {}: {}", target.display(), e))
        });
        let msg = match result {
            Ok(()) => {
                log::info!("exported panorama to {}", target.display());
                Loaded::Exported(target)
            }
            Err(e) => {
                log::error!("{}", e);
                Loaded::Failed(e)
            }
        };
        let _ = tx.send(msg);
    });
}

#[allow(clippy::too_many_arguments)]
fn draw_ui(
    ctx: &egui::Context,
    view: &mut ViewState,
    action: &mut Option<UiAction>,
    vsync_changed: &mut bool,
    source: Option<SurfaceKind>,
    can_export: bool,
    fps: f32,
    window: &winit::window::Window,
) {
    egui::TopBottomPanel::top("menu_bar").show(ctx, |ui| {
        egui::menu::bar(ui, |ui| {
            // File
            ui.menu_button("File", |ui| {
                if ui.button("Open image…").clicked() {
                    ui.close_menu();
                    if let Some(path) = pick_image() {
                        *action = Some(UiAction::OpenImage(path));
                    }
                }

                ui.menu_button("Open raw YUV…", |ui| {
                    ui.horizontal(|ui| {
                        ui.label("Size");
                        ui.text_edit_singleline(&mut view.video_size);
                    });
                    ui.radio_value(&mut view.video_topology, Topology::Sphere, "Sphere");
                    ui.radio_value(&mut view.video_topology, Topology::Rectangle, "Flat rectangle");
                    if ui.button("Choose file…").clicked() {
                        ui.close_menu();
                        match dualfish::player::parse_size(&view.video_size) {
                            Some((width, height)) => {
                                if let Some(path) = rfd::FileDialog::new()
                                    .add_filter("Raw I420", &["yuv", "i420", "raw"])
                                    .pick_file()
                                {
                                    *action = Some(UiAction::OpenVideo(RawVideo {
                                        path,
                                        width,
                                        height,
                                        fps: 30.0,
                                    }));
                                }
                            }
                            None => {
                                view.status = Some(format!("Bad frame size `{}`", view.video_size));
                            }
                        }
                    }
                });

                if ui
                    .add_enabled(can_export && !view.is_busy, egui::Button::new("Export panorama…"))
                    .clicked()
                {
                    ui.close_menu();
                    if let Some(path) = rfd::FileDialog::new()
                        .add_filter("PNG", &["png"])
                        .add_filter("JPEG", &["jpg", "jpeg"])
                        .set_file_name("panorama.png")
                        .save_file()
                    {
                        *action = Some(UiAction::Export(path));
                    }
                }

                if ui.button("Exit").clicked() {
                    std::process::exit(0);
                }
            });

            // View
            ui.menu_button("View", |ui| {
                if ui.button("Reset view").clicked() {
                    view.camera.reset_orientation();
                    ui.close_menu();
                }

                let label = if view.is_fullscreen {
                    "Exit fullscreen"
                } else {
                    "Fullscreen"
                };
                if ui.button(label).clicked() {
                    toggle_fullscreen(window, &mut view.is_fullscreen);
                    ui.close_menu();
                }

                ui.separator();
                ui.add(egui::Slider::new(&mut view.camera.fov, MIN_FOV..=MAX_FOV).text("FOV"));
                ui.menu_button("Input sensitivity", |ui| {
                    ui.add(
                        egui::Slider::new(&mut view.camera.sensitivity_scale, 0.1..=5.0)
                            .text("multiplier"),
                    );
                    if ui.button("Reset to 1.0").clicked() {
                        view.camera.sensitivity_scale = 1.0;
                    }
                });

                ui.separator();
                if ui.checkbox(&mut view.show_fps, "Show FPS").clicked() {
                    ui.close_menu();
                }
                if ui.checkbox(&mut view.vsync_enabled, "VSync").clicked() {
                    *vsync_changed = true;
                }
            });
        });
    });

    egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
        ui.horizontal(|ui| {
            if view.is_busy {
                ui.label(egui::RichText::new("Working…").color(egui::Color32::YELLOW));
                ui.label("|");
            }

            let source_label = match source {
                Some(SurfaceKind::DecodedImage) => "Image",
                Some(SurfaceKind::PlanarYuv) => "Video",
                None => "No source",
            };
            ui.label(source_label);
            ui.label("|");
            ui.label(format!("FOV: {:.1}°", view.camera.fov));
            ui.label("|");
            ui.label(format!("Yaw: {:.1}°", view.camera.yaw));
            ui.label("|");
            ui.label(format!("Pitch: {:.1}°", view.camera.pitch));

            if view.show_fps {
                ui.label("|");
                ui.label(egui::RichText::new(format!("FPS: {:.1}", fps)).color(egui::Color32::GREEN));
            }

            if let Some(status) = &view.status {
                ui.label("|");
                ui.label(egui::RichText::new(status).color(egui::Color32::LIGHT_RED));
            }
        });
    });
}
