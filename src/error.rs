// error.rs — 构建 / 绘制全景表面时的错误分类
//
// 所有错误在发生处都不可恢复：构建或绘制直接中止，不会替换成默认几何或空白纹理。

use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error(transparent)]
    State(#[from] StateError),
}

/// Invalid or degenerate `ProjectionConfig`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("sample step must be greater than zero")]
    ZeroSampleStep,
    #[error("output size {width}x{height} is not divisible by sample step {step}")]
    StepNotDivisor { width: u32, height: u32, step: u32 },
    #[error("`{field}` must be a finite positive number, got {value}")]
    NonPositive { field: &'static str, value: f32 },
    #[error("`{field}` must be finite")]
    NotFinite { field: &'static str },
    #[error("failed to read config {path}: {reason}")]
    Io { path: String, reason: String },
    #[error("failed to parse config {path}: {reason}")]
    Parse { path: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStageKind {
    Vertex,
    Fragment,
    Link,
}

impl fmt::Display for ShaderStageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStageKind::Vertex => f.write_str("vertex"),
            ShaderStageKind::Fragment => f.write_str("fragment"),
            ShaderStageKind::Link => f.write_str("link"),
        }
    }
}

/// Shader build or link failure, carrying the compiler diagnostic.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{stage} stage of `{label}` failed: {log}")]
pub struct CompileError {
    pub label: String,
    pub stage: ShaderStageKind,
    pub log: String,
}

impl CompileError {
    pub fn new(label: &str, stage: ShaderStageKind, log: impl Into<String>) -> Self {
        Self {
            label: label.to_string(),
            stage,
            log: log.into(),
        }
    }
}

/// GPU buffer / texture allocation failure, or a draw the device rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResourceError {
    #[error("gpu rejected `{label}`: {reason}")]
    Allocation { label: String, reason: String },
    #[error("`{label}` is {width}x{height}, device limit is {max}")]
    TooLarge {
        label: String,
        width: u32,
        height: u32,
        max: u32,
    },
    #[error("gpu rejected draw of `{label}`: {reason}")]
    Draw { label: String, reason: String },
    #[error("no suitable gpu adapter")]
    NoAdapter,
    #[error("gpu device request failed: {0}")]
    Device(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plane {
    Y,
    U,
    V,
}

impl fmt::Display for Plane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Plane::Y => f.write_str("Y"),
            Plane::U => f.write_str("U"),
            Plane::V => f.write_str("V"),
        }
    }
}

/// Draw-time misuse: torn-down surface, foreign thread, or inconsistent frame data.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StateError {
    #[error("surface has been released")]
    Released,
    #[error("surface is owned by another render thread")]
    WrongThread,
    #[error("frame size {width}x{height} is empty")]
    EmptyFrame { width: u32, height: u32 },
    #[error("{plane} plane has {actual} bytes, expected {expected}")]
    PlaneSize {
        plane: Plane,
        expected: usize,
        actual: usize,
    },
    #[error("{surface} surface cannot draw {frame} frame data")]
    FrameKind {
        surface: &'static str,
        frame: &'static str,
    },
}
