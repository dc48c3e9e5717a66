// blend.rs — 前后两路在接缝带内的线性融合，以及 YUV -> RGB 转换
//
// 着色器 (src/shaders/*.wgsl) 做同样的计算；这里的版本给 CPU 拼接和测试用，
// 转换矩阵也从这里作为 uniform 上传，保证两边只有一份常量。

use glam::{Mat3, Vec3, Vec4};
use std::f32::consts::PI;

/// 列主序：R = Y + 1.13983 V, G = Y - 0.39465 U - 0.58060 V, B = Y + 2.03211 U
pub const YUV_TO_RGB: Mat3 = Mat3::from_cols(
    Vec3::new(1.0, 1.0, 1.0),
    Vec3::new(0.0, -0.39465, 2.03211),
    Vec3::new(1.13983, -0.58060, 0.0),
);

/// 接缝坐标 s 所在的区域
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SeamRegion {
    Front,
    Back,
    /// Weight of the front sample, in (0, 1).
    Band(f32),
}

/// 边界本身归入纯色分支 (>= / <=)，带内为线性渐变，s = 0 时正好 0.5。
pub fn seam_region(s: f32, half_width: f32) -> SeamRegion {
    if s >= half_width {
        SeamRegion::Back
    } else if s <= -half_width {
        SeamRegion::Front
    } else {
        SeamRegion::Band(0.5 - s / (2.0 * half_width))
    }
}

pub fn front_weight(s: f32, half_width: f32) -> f32 {
    match seam_region(s, half_width) {
        SeamRegion::Front => 1.0,
        SeamRegion::Back => 0.0,
        SeamRegion::Band(w) => w,
    }
}

/// Decoded-color blend. `s` is the model-space offset along the lens axis.
pub fn blend_decoded(front: Vec4, back: Vec4, s: f32, half_width: f32) -> Vec4 {
    match seam_region(s, half_width) {
        SeamRegion::Front => front,
        SeamRegion::Back => back,
        SeamRegion::Band(w) => w * front + (1.0 - w) * back,
    }
}

/// 平面 YUV (都在 [0,1]) 转 RGB；色度先减 0.5 居中
pub fn yuv_to_rgb(yuv: Vec3) -> Vec3 {
    YUV_TO_RGB * Vec3::new(yuv.x, yuv.y - 0.5, yuv.z - 0.5)
}

/// YUV blend: both samples are converted first, then cross-faded.
pub fn blend_yuv(front_yuv: Vec3, back_yuv: Vec3, s: f32, half_width: f32) -> Vec3 {
    let front = yuv_to_rgb(front_yuv);
    let back = yuv_to_rgb(back_yuv);
    match seam_region(s, half_width) {
        SeamRegion::Front => front,
        SeamRegion::Back => back,
        SeamRegion::Band(w) => w * front + (1.0 - w) * back,
    }
}

/// 球面上的接缝坐标：单位方向在镜头轴 (X) 上的分量
pub fn sphere_seam(position: Vec3, origin: Vec3) -> f32 {
    (position - origin).normalize_or_zero().x
}

/// 展开平面上的接缝坐标：clip 位置还原出经纬度，sin(θ)·cos(φ)
pub fn rect_seam(x: f32, y: f32) -> f32 {
    let phi = (1.0 + x) * PI;
    let theta = (1.0 - y) * 0.5 * PI;
    theta.sin() * phi.cos()
}

/// Matrix columns padded to vec4 for a WGSL uniform block.
pub fn yuv_matrix_columns() -> [[f32; 4]; 3] {
    let m = YUV_TO_RGB;
    [
        m.x_axis.extend(0.0).to_array(),
        m.y_axis.extend(0.0).to_array(),
        m.z_axis.extend(0.0).to_array(),
    ]
}
