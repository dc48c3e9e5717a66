// gpu.rs — 渲染上下文：device / queue / 目标格式，以及资源创建时的错误作用域

use crate::error::ResourceError;
use std::sync::Arc;

pub struct RenderContext {
    pub device: wgpu::Device,
    // 表面里的纹理 / 缓冲各持一份，销毁前先冲掉挂起的写入
    pub queue: Arc<wgpu::Queue>,
    pub target_format: wgpu::TextureFormat,
}

impl RenderContext {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, target_format: wgpu::TextureFormat) -> Self {
        Self {
            device,
            queue: Arc::new(queue),
            target_format,
        }
    }

    /// Device without a window surface, for offscreen rendering and tests.
    pub async fn headless(target_format: wgpu::TextureFormat) -> Result<Self, ResourceError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(ResourceError::NoAdapter)?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("dualfish headless device"),
                    features: wgpu::Features::empty(),
                    limits: wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits()),
                },
                None,
            )
            .await
            .map_err(|e| ResourceError::Device(e.to_string()))?;

        let info = adapter.get_info();
        log::info!("headless adapter: {} ({:?})", info.name, info.backend);

        Ok(Self::new(device, queue, target_format))
    }

    pub fn max_texture_dimension(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }

    /// 在 OOM + 校验错误作用域里执行一段 GPU 调用，返回捕获到的第一个错误
    fn scoped<T>(&self, run: impl FnOnce(&wgpu::Device) -> T) -> (T, Option<wgpu::Error>) {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = run(&self.device);
        let validation = pollster::block_on(self.device.pop_error_scope());
        let out_of_memory = pollster::block_on(self.device.pop_error_scope());
        (value, validation.or(out_of_memory))
    }

    /// 在错误作用域里创建 GPU 资源；失败直接上报，不重试。
    pub fn create_scoped<T>(
        &self,
        label: &str,
        create: impl FnOnce(&wgpu::Device) -> T,
    ) -> Result<T, ResourceError> {
        match self.scoped(create) {
            (_, Some(err)) => {
                log::error!("gpu resource `{}` failed: {}", label, err);
                Err(ResourceError::Allocation {
                    label: label.to_string(),
                    reason: err.to_string(),
                })
            }
            (value, None) => Ok(value),
        }
    }

    /// 上传 + 编码 + 提交放在同一个错误作用域里，校验失败变成 Err 而不是崩溃
    pub fn draw_scoped<T>(
        &self,
        label: &str,
        draw: impl FnOnce(&wgpu::Device) -> T,
    ) -> Result<T, ResourceError> {
        match self.scoped(draw) {
            (_, Some(err)) => {
                log::error!("gpu draw `{}` failed: {}", label, err);
                Err(ResourceError::Draw {
                    label: label.to_string(),
                    reason: err.to_string(),
                })
            }
            (value, None) => Ok(value),
        }
    }
}
