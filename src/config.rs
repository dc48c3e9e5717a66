// config.rs — 投影参数 (ProjectionConfig)
//
// 一个表面构建之后参数就不再变化；顶点 / 纹理坐标完全由这里的字段决定。
// 中心点和半径以参考双鱼眼图像的像素为单位 (source_width x source_height)。

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 投影表面拓扑
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topology {
    Sphere,    // 球面，相机在球心向外看
    Rectangle, // 展开平面，直接铺满 clip space
}

/// 前后两路的重叠带半宽。两种格式的刻度不同，分开保存。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendBands {
    /// Model-space units along the lens axis (same scale as `sphere_radius`).
    pub decoded_half_width: f32,
    /// Unit-direction scale, [-1, 1].
    pub yuv_half_width: f32,
}

impl Default for BlendBands {
    fn default() -> Self {
        Self {
            decoded_half_width: 30.0,
            yuv_half_width: 0.06,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionConfig {
    pub output_width: u32,
    pub output_height: u32,
    pub sample_step: u32,
    pub source_width: f32,
    pub source_height: f32,
    pub front_center: [f32; 2],
    pub back_center: [f32; 2],
    pub view_radius: f32,
    pub lens_fov_deg: f32,
    pub sphere_radius: f32,
    pub origin: [f32; 3],
    pub blend: BlendBands,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        // 3840x1920 左右并排双鱼眼，镜头视场 190°
        Self {
            output_width: 1440,
            output_height: 720,
            sample_step: 40,
            source_width: 3840.0,
            source_height: 1920.0,
            front_center: [960.0, 960.0],
            back_center: [2880.0, 960.0],
            view_radius: 960.0,
            lens_fov_deg: 190.0,
            sphere_radius: 90.0,
            origin: [0.0, 0.0, 0.0],
            blend: BlendBands::default(),
        }
    }
}

impl ProjectionConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let config: ProjectionConfig =
            serde_json::from_str(&text).map_err(|e| ConfigError::Parse {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        config.validate()?;
        log::info!(
            "loaded projection config {} ({}x{} step {})",
            path.display(),
            config.output_width,
            config.output_height,
            config.sample_step
        );
        Ok(config)
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let step = self.sample_step;
        if step == 0 {
            return Err(ConfigError::ZeroSampleStep);
        }
        if self.output_width == 0 {
            return Err(ConfigError::NonPositive {
                field: "output_width",
                value: 0.0,
            });
        }
        if self.output_height == 0 {
            return Err(ConfigError::NonPositive {
                field: "output_height",
                value: 0.0,
            });
        }
        if self.output_width % step != 0 || self.output_height % step != 0 {
            return Err(ConfigError::StepNotDivisor {
                width: self.output_width,
                height: self.output_height,
                step,
            });
        }

        let positive = [
            ("source_width", self.source_width),
            ("source_height", self.source_height),
            ("view_radius", self.view_radius),
            ("lens_fov_deg", self.lens_fov_deg),
            ("sphere_radius", self.sphere_radius),
            ("blend.decoded_half_width", self.blend.decoded_half_width),
            ("blend.yuv_half_width", self.blend.yuv_half_width),
        ];
        for (field, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::NonPositive { field, value });
            }
        }
        if self.lens_fov_deg > 360.0 {
            return Err(ConfigError::NonPositive {
                field: "lens_fov_deg",
                value: self.lens_fov_deg,
            });
        }

        let finite = [
            ("front_center", self.front_center.iter().all(|v| v.is_finite())),
            ("back_center", self.back_center.iter().all(|v| v.is_finite())),
            ("origin", self.origin.iter().all(|v| v.is_finite())),
        ];
        for (field, ok) in finite {
            if !ok {
                return Err(ConfigError::NotFinite { field });
            }
        }
        Ok(())
    }

    /// (iMax, jMax): 列数 (经度方向) 与行数 (纬度方向)
    pub fn grid_dims(&self) -> (usize, usize) {
        let step = self.sample_step.max(1);
        (
            (self.output_width / step + 1) as usize,
            (self.output_height / step + 1) as usize,
        )
    }
}
