// camera.rs — 视角参数 (yaw / pitch / fov) 与手势，输出给表面的 MVP

use glam::{Mat4, Vec3};

pub const DEFAULT_FOV: f32 = 75.0;
pub const MIN_FOV: f32 = 20.0;
pub const MAX_FOV: f32 = 120.0;
const PITCH_LIMIT: f32 = 89.9;
const Z_NEAR: f32 = 0.1;
const Z_FAR: f32 = 1000.0;

/// 球心处的相机。yaw = pitch = 0 时看向前镜头光轴 (-X)。角度单位都是度。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PanoramaCamera {
    pub yaw: f32,
    pub pitch: f32,
    pub fov: f32,
    pub sensitivity_scale: f32,
}

impl Default for PanoramaCamera {
    fn default() -> Self {
        Self {
            yaw: 0.0,
            pitch: 0.0,
            fov: DEFAULT_FOV,
            sensitivity_scale: 1.0,
        }
    }
}

impl PanoramaCamera {
    pub fn new() -> Self {
        Self::default()
    }

    /// 直接按角度增量旋转，pitch 夹在两极之内
    pub fn add_gesture_rotation(&mut self, pitch_delta: f32, yaw_delta: f32) {
        self.yaw = (self.yaw + yaw_delta).rem_euclid(360.0);
        self.pitch = (self.pitch + pitch_delta).clamp(-PITCH_LIMIT, PITCH_LIMIT);
    }

    /// 鼠标拖动的像素位移：一个像素对应视野里的一个像素角，画面跟着指针走
    pub fn drag(&mut self, dx: f32, dy: f32, viewport_width: f32, viewport_height: f32) {
        if viewport_width <= 0.0 || viewport_height <= 0.0 {
            return;
        }
        let v_f = self.fov.to_radians();
        let aspect = viewport_width / viewport_height;
        let h_f = 2.0 * ((v_f / 2.0).tan() * aspect).atan();

        let yaw_per_px = (h_f / viewport_width).to_degrees();
        let pitch_per_px = (v_f / viewport_height).to_degrees();

        self.add_gesture_rotation(
            dy * pitch_per_px * self.sensitivity_scale,
            dx * yaw_per_px * self.sensitivity_scale,
        );
    }

    /// 双指缩放：距离变大 -> 视野变窄
    pub fn zoom_gesture(&mut self, new_dist: f32, old_dist: f32) {
        if !(new_dist > 0.0 && old_dist > 0.0) || !new_dist.is_finite() || !old_dist.is_finite() {
            return;
        }
        self.fov = (self.fov * old_dist / new_dist).clamp(MIN_FOV, MAX_FOV);
    }

    /// 滚轮，一格 2.5°
    pub fn scroll(&mut self, lines: f32) {
        self.fov = (self.fov - lines * 2.5).clamp(MIN_FOV, MAX_FOV);
    }

    pub fn reset_orientation(&mut self) {
        self.yaw = 0.0;
        self.pitch = 0.0;
        self.fov = DEFAULT_FOV;
    }

    pub fn forward(&self) -> Vec3 {
        let (yaw, pitch) = (self.yaw.to_radians(), self.pitch.to_radians());
        Vec3::new(
            -pitch.cos() * yaw.cos(),
            pitch.sin(),
            pitch.cos() * yaw.sin(),
        )
    }

    pub fn view(&self, eye: Vec3) -> Mat4 {
        Mat4::look_to_rh(eye, self.forward(), Vec3::Y)
    }

    pub fn projection(&self, aspect: f32) -> Mat4 {
        let aspect = if aspect.is_finite() && aspect > 0.0 { aspect } else { 1.0 };
        Mat4::perspective_rh(self.fov.to_radians(), aspect, Z_NEAR, Z_FAR)
    }

    /// 相机放在 `origin` (球心)，球的模型矩阵是单位阵
    pub fn mvp(&self, aspect: f32, origin: Vec3) -> Mat4 {
        self.projection(aspect) * self.view(origin)
    }
}
