//! 常量缓冲区记录
//!
//! 与着色器 cbuffer 布局一一对应的 `#[repr(C)]` 结构体。
//! 所有字段都是 4 字节对齐的标量或数组，结构体内没有填充，可以直接实现 `Pod`。
//!
//! - `ObjectConstants`：每个对象一条（cbPerObject）
//! - `PassConstants`：每帧一条（cbPass）
//! - `LightConstants`：每个光源一条
//! - `ParticleInstance`：粒子实例数据（实例缓冲区，不需要 256 对齐）

use bytemuck::{Pod, Zeroable};

use crate::core::math::{to_gpu_matrix, Matrix4, Vector3};

/// 每个对象的常量
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ObjectConstants {
    /// 世界矩阵
    pub world: [[f32; 4]; 4],
    /// 纹理坐标变换
    pub tex_transform: [[f32; 4]; 4],
}

impl ObjectConstants {
    pub fn new(world: &Matrix4) -> Self {
        Self {
            world: to_gpu_matrix(world),
            tex_transform: to_gpu_matrix(&Matrix4::identity()),
        }
    }
}

impl Default for ObjectConstants {
    fn default() -> Self {
        Self::new(&Matrix4::identity())
    }
}

/// 每帧的常量
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PassConstants {
    pub view: [[f32; 4]; 4],
    pub proj: [[f32; 4]; 4],
    pub view_proj: [[f32; 4]; 4],
    pub eye_pos: [f32; 3],
    pub total_time: f32,
    pub render_target_size: [f32; 2],
    pub delta_time: f32,
    /// 帧号（低 32 位）
    pub frame_index: u32,
    /// 环境光
    pub ambient: [f32; 4],
}

impl PassConstants {
    /// 从视图/投影矩阵构建
    pub fn new(view: &Matrix4, proj: &Matrix4, eye_pos: &Vector3) -> Self {
        let view_proj = proj * view;
        Self {
            view: to_gpu_matrix(view),
            proj: to_gpu_matrix(proj),
            view_proj: to_gpu_matrix(&view_proj),
            eye_pos: [eye_pos.x, eye_pos.y, eye_pos.z],
            total_time: 0.0,
            render_target_size: [0.0, 0.0],
            delta_time: 0.0,
            frame_index: 0,
            ambient: [0.25, 0.25, 0.35, 1.0],
        }
    }

    /// 设置时间信息
    pub fn with_timing(mut self, frame_number: u64, total_time: f32, delta_time: f32) -> Self {
        self.frame_index = frame_number as u32;
        self.total_time = total_time;
        self.delta_time = delta_time;
        self
    }

    /// 设置渲染目标尺寸
    pub fn with_render_target(mut self, width: u32, height: u32) -> Self {
        self.render_target_size = [width as f32, height as f32];
        self
    }
}

/// 光源常量
///
/// 布局与 HLSL 打包规则一致：每个 float3 后面跟一个 float 凑满 16 字节。
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LightConstants {
    pub strength: [f32; 3],
    /// 点光源/聚光灯
    pub falloff_start: f32,
    /// 方向光/聚光灯
    pub direction: [f32; 3],
    /// 点光源/聚光灯
    pub falloff_end: f32,
    /// 点光源/聚光灯
    pub position: [f32; 3],
    /// 聚光灯
    pub spot_power: f32,
}

impl LightConstants {
    /// 方向光
    pub fn directional(direction: Vector3, strength: [f32; 3]) -> Self {
        let direction = direction.try_normalize(f32::EPSILON).unwrap_or_else(|| -Vector3::y());
        Self {
            strength,
            falloff_start: 1.0,
            direction: [direction.x, direction.y, direction.z],
            falloff_end: 10.0,
            position: [0.0, 0.0, 0.0],
            spot_power: 64.0,
        }
    }
}

/// 粒子实例数据
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ParticleInstance {
    pub position: [f32; 3],
    pub size: f32,
    pub color: [f32; 4],
}
