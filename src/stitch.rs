// stitch.rs — CPU 拼接：双鱼眼位图 -> 等距柱状全景 (导出用)
//
// 先按配置生成一张查找表 (每个输出像素的前后采样坐标 + 接缝坐标)，
// 同一配置下可以反复拼接多张图。

use crate::blend::blend_decoded;
use crate::config::ProjectionConfig;
use crate::error::{Result, StateError};
use crate::lens::{sphere_direction, turn_to_back, FisheyeLens};
use glam::{Vec2, Vec4};
use image::{Rgba, RgbaImage};
use std::f32::consts::PI;

#[derive(Debug, Clone, Copy)]
struct WarpEntry {
    front: Vec2,
    back: Vec2,
    seam: f32,
}

pub struct WarpTable {
    width: u32,
    height: u32,
    half_width: f32,
    entries: Vec<WarpEntry>,
}

impl WarpTable {
    /// 输出尺寸取 output_width x output_height，像素中心采样
    pub fn new(config: &ProjectionConfig) -> Result<Self> {
        config.validate()?;
        let (width, height) = (config.output_width, config.output_height);

        let front = FisheyeLens::front(config);
        let back = FisheyeLens::back(config);
        let mut entries = Vec::with_capacity(width as usize * height as usize);
        for j in 0..height {
            let theta = PI * (j as f32 + 0.5) / height as f32;
            for i in 0..width {
                let phi = 2.0 * PI * (i as f32 + 0.5) / width as f32;
                let dir = sphere_direction(phi, theta);
                entries.push(WarpEntry {
                    front: Vec2::from(front.project(dir)),
                    back: Vec2::from(back.project(turn_to_back(dir))),
                    seam: dir.x * config.sphere_radius,
                });
            }
        }

        log::debug!("warp table {}x{} built", width, height);
        Ok(Self {
            width,
            height,
            half_width: config.blend.decoded_half_width,
            entries,
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// 空源图直接报错，不输出空白全景
    pub fn stitch(&self, source: &RgbaImage) -> Result<RgbaImage> {
        let (width, height) = source.dimensions();
        if width == 0 || height == 0 {
            return Err(StateError::EmptyFrame { width, height }.into());
        }
        let mut out = RgbaImage::new(self.width, self.height);
        for (pixel, entry) in out.pixels_mut().zip(&self.entries) {
            let front = sample_bilinear(source, entry.front);
            let back = sample_bilinear(source, entry.back);
            let color = blend_decoded(front, back, entry.seam, self.half_width);
            *pixel = to_rgba8(color);
        }
        Ok(out)
    }
}

/// 一次性拼接
pub fn stitch_equirect(source: &RgbaImage, config: &ProjectionConfig) -> Result<RgbaImage> {
    WarpTable::new(config)?.stitch(source)
}

/// uv 以整张图归一化；越界夹到边缘
fn sample_bilinear(image: &RgbaImage, uv: Vec2) -> Vec4 {
    let (w, h) = image.dimensions();
    let x = (uv.x * w as f32 - 0.5).clamp(0.0, (w - 1) as f32);
    let y = (uv.y * h as f32 - 0.5).clamp(0.0, (h - 1) as f32);
    let (x0, y0) = (x.floor() as u32, y.floor() as u32);
    let (x1, y1) = ((x0 + 1).min(w - 1), (y0 + 1).min(h - 1));
    let (tx, ty) = (x - x0 as f32, y - y0 as f32);

    let texel = |x: u32, y: u32| Vec4::from(image.get_pixel(x, y).0.map(|c| c as f32 / 255.0));
    let top = texel(x0, y0).lerp(texel(x1, y0), tx);
    let bottom = texel(x0, y1).lerp(texel(x1, y1), tx);
    top.lerp(bottom, ty)
}

fn to_rgba8(color: Vec4) -> Rgba<u8> {
    let c = (color.clamp(Vec4::ZERO, Vec4::ONE) * 255.0).round();
    Rgba([c.x as u8, c.y as u8, c.z as u8, c.w as u8])
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);

    /// 左半红 (前镜头)，右半蓝 (背镜头)
    fn split_source(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, _| if x < width / 2 { RED } else { BLUE })
    }

    fn small_config() -> ProjectionConfig {
        ProjectionConfig {
            output_width: 64,
            output_height: 32,
            sample_step: 8,
            ..ProjectionConfig::default()
        }
    }

    #[test]
    fn output_matches_configured_size() {
        let pano = stitch_equirect(&split_source(128, 64), &small_config()).unwrap();
        assert_eq!(pano.dimensions(), (64, 32));
    }

    #[test]
    fn far_from_seam_each_lens_is_pure() {
        let pano = stitch_equirect(&split_source(128, 64), &small_config()).unwrap();
        // phi ≈ π 朝 -X：前镜头
        assert_eq!(*pano.get_pixel(32, 16), RED);
        // phi ≈ 0 朝 +X：背镜头
        assert_eq!(*pano.get_pixel(0, 16), BLUE);
        assert_eq!(*pano.get_pixel(63, 16), BLUE);
    }

    #[test]
    fn seam_band_mixes_both_lenses() {
        let pano = stitch_equirect(&split_source(128, 64), &small_config()).unwrap();
        // phi ≈ π/2 朝 +Z，正好在接缝上
        let px = pano.get_pixel(16, 16);
        assert!(px[0] > 60 && px[2] > 60, "expected a mix, got {:?}", px);
    }

    #[test]
    fn table_is_reusable() {
        let table = WarpTable::new(&small_config()).unwrap();
        let a = table.stitch(&split_source(128, 64)).unwrap();
        let b = table.stitch(&split_source(256, 128)).unwrap();
        assert_eq!(a.dimensions(), b.dimensions());
        assert_eq!(a.get_pixel(32, 16), b.get_pixel(32, 16));
    }

    #[test]
    fn empty_source_is_an_error() {
        let err = stitch_equirect(&RgbaImage::new(0, 0), &small_config()).unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::State(StateError::EmptyFrame { width: 0, height: 0 })
        ));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = ProjectionConfig {
            sample_step: 0,
            ..small_config()
        };
        assert!(WarpTable::new(&config).is_err());
    }
}
