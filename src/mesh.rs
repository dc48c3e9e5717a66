// mesh.rs — 全景表面网格生成 (顶点 + 前/后两套纹理坐标 + 三角形索引)
//
// 输出空间按 sample_step 等间距采样，网格按行 (纬度) 优先存放：index = j * iMax + i。

use crate::config::{ProjectionConfig, Topology};
use crate::error::Result;
use crate::lens::{sphere_direction, turn_to_back, FisheyeLens};
use glam::Vec3;
use std::f32::consts::PI;

#[derive(Debug, Clone)]
pub struct PanoramaMesh {
    pub positions: Vec<[f32; 3]>,
    pub front_uvs: Vec<[f32; 2]>,
    pub back_uvs: Vec<[f32; 2]>,
    pub indices: Vec<u32>,
    /// iMax
    pub columns: usize,
    /// jMax
    pub rows: usize,
}

impl PanoramaMesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// 根据投影参数生成网格。纯函数：同样的输入永远得到同样的输出。
pub fn generate(config: &ProjectionConfig, topology: Topology) -> Result<PanoramaMesh> {
    config.validate()?;

    let (columns, rows) = config.grid_dims();
    let step = config.sample_step as f32;
    let width = config.output_width as f32;
    let height = config.output_height as f32;
    let origin = Vec3::from(config.origin);

    let front = FisheyeLens::front(config);
    let back = FisheyeLens::back(config);

    let count = columns * rows;
    let mut positions = Vec::with_capacity(count);
    let mut front_uvs = Vec::with_capacity(count);
    let mut back_uvs = Vec::with_capacity(count);

    for j in 0..rows {
        let v = j as f32 * step / height;
        let theta = PI * v;

        for i in 0..columns {
            let u = i as f32 * step / width;
            let phi = 2.0 * PI * u;
            let dir = sphere_direction(phi, theta);

            let position = match topology {
                Topology::Sphere => origin + config.sphere_radius * dir,
                // 展开平面：直接放在 clip space，(u,v) = (0,0) 在左上角
                Topology::Rectangle => Vec3::new(-1.0 + 2.0 * u, 1.0 - 2.0 * v, 0.0),
            };

            positions.push(position.to_array());
            front_uvs.push(front.project(dir));
            back_uvs.push(back.project(turn_to_back(dir)));
        }
    }

    let indices = grid_indices(columns, rows);

    log::debug!(
        "panorama mesh {:?}: {}x{} grid, {} vertices, {} triangles",
        topology,
        columns,
        rows,
        positions.len(),
        indices.len() / 3
    );

    Ok(PanoramaMesh {
        positions,
        front_uvs,
        back_uvs,
        indices,
        columns,
        rows,
    })
}

/// 每个 2x2 网格块拆成两个三角形；从球内部看是逆时针。
fn grid_indices(columns: usize, rows: usize) -> Vec<u32> {
    let mut indices = Vec::with_capacity(6 * columns.saturating_sub(1) * rows.saturating_sub(1));
    let stride = columns as u32;

    for j in 0..rows.saturating_sub(1) {
        for i in 0..columns.saturating_sub(1) {
            let a = j as u32 * stride + i as u32;
            let below = a + stride;

            indices.extend_from_slice(&[
                a, below, a + 1,
                below, below + 1, a + 1,
            ]);
        }
    }
    indices
}
