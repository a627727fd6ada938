//! 数学类型
//!
//! 基于 `nalgebra` 的类型别名，常量记录和场景变换共用。

pub type Point3 = nalgebra::Point3<f32>;
pub type Vector3 = nalgebra::Vector3<f32>;
pub type Matrix4 = nalgebra::Matrix4<f32>;

/// 角度转弧度
#[inline]
pub fn deg_to_rad(degrees: f32) -> f32 {
    degrees * std::f32::consts::PI / 180.0
}

/// 转换为常量缓冲区使用的列主序数组
///
/// nalgebra 内部即为列主序，HLSL 默认也按列主序读取 cbuffer 中的矩阵。
#[inline]
pub fn to_gpu_matrix(m: &Matrix4) -> [[f32; 4]; 4] {
    *m.as_ref()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpu_matrix_layout() {
        let m = Matrix4::new_translation(&Vector3::new(1.0, 2.0, 3.0));
        let raw = to_gpu_matrix(&m);
        // 第 4 列存放平移
        assert_eq!(raw[3][0], 1.0);
        assert_eq!(raw[3][1], 2.0);
        assert_eq!(raw[3][2], 3.0);
    }

    #[test]
    fn test_deg_to_rad() {
        assert!((deg_to_rad(180.0) - std::f32::consts::PI).abs() < 1e-6);
    }
}
