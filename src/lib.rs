// lib.rs — 双鱼眼全景拼接 / 渲染核心
//
// 网格生成、镜头投影、接缝融合、着色器反射都是纯 CPU 代码；
// surface 模块负责 GPU 资源与绘制。窗口、解码、UI 在 bin 里。

pub mod blend;
pub mod camera;
pub mod config;
pub mod error;
pub mod frame;
pub mod gpu;
pub mod lens;
pub mod mesh;
pub mod player;
pub mod shader;
pub mod stitch;
pub mod surface;

pub use camera::PanoramaCamera;
pub use config::{BlendBands, ProjectionConfig, Topology};
pub use error::{CompileError, ConfigError, Error, ResourceError, Result, StateError};
pub use frame::{FrameHandoff, FrameInput, YuvFrame, YuvFrameRef};
pub use gpu::RenderContext;
pub use mesh::PanoramaMesh;
pub use shader::{ShaderInterface, ShaderProgram};
pub use surface::{ActiveSurface, PanoramaSurface, SurfaceKind, SurfaceSource};
