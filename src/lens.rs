// lens.rs — 等距鱼眼镜头模型
//
// 前镜头光轴 -X，背镜头光轴 +X，两者的上方向都是 +Y。
// 输出的纹理坐标以整张源图 (左右并排双鱼眼) 归一化到 [0,1]。

use crate::config::ProjectionConfig;
use glam::{Vec2, Vec3};

/// 经度 phi ∈ [0, 2π]，极角 theta ∈ [0, π] 对应的单位方向
pub fn sphere_direction(phi: f32, theta: f32) -> Vec3 {
    let sin_t = theta.sin();
    Vec3::new(sin_t * phi.cos(), theta.cos(), sin_t * phi.sin())
}

/// 背镜头朝向相反：经度转半圈后再按前镜头的方式投影
pub fn turn_to_back(dir: Vec3) -> Vec3 {
    Vec3::new(-dir.x, dir.y, -dir.z)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FisheyeLens {
    center: Vec2,
    radius: Vec2,
    half_fov: f32,
}

impl FisheyeLens {
    pub fn new(center_px: [f32; 2], config: &ProjectionConfig) -> Self {
        let size = Vec2::new(config.source_width, config.source_height);
        Self {
            center: Vec2::from(center_px) / size,
            radius: Vec2::splat(config.view_radius) / size,
            half_fov: config.lens_fov_deg.to_radians() * 0.5,
        }
    }

    pub fn front(config: &ProjectionConfig) -> Self {
        Self::new(config.front_center, config)
    }

    pub fn back(config: &ProjectionConfig) -> Self {
        Self::new(config.back_center, config)
    }

    /// Maps a unit direction in the lens frame (axis -X) to a source texture coordinate.
    /// Directions outside the lens field land outside the image circle; they are not clamped.
    pub fn project(&self, dir: Vec3) -> [f32; 2] {
        let cos_a = (-dir.x).clamp(-1.0, 1.0);
        let alpha = cos_a.acos();

        // right = forward x up = -Z
        let px = -dir.z;
        let py = dir.y;
        let rho = (px * px + py * py).sqrt();
        if rho < 1e-6 {
            // 光轴上 (或正后方)：退化到圆心
            return self.center.to_array();
        }

        let r = alpha / self.half_fov;
        let uv = Vec2::new(
            self.center.x + self.radius.x * r * px / rho,
            self.center.y - self.radius.y * r * py / rho,
        );
        uv.to_array()
    }
}
