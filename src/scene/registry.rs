//! 资源注册表
//!
//! 按名称登记网格，渲染项通过名称引用网格。注册表由调用方显式创建并传入场景，
//! 没有全局实例。

use std::collections::HashMap;

use crate::core::error::{FrameRingError, Result};

/// 网格信息（几何数据已上传到 GPU 的默认堆，这里只记录绘制所需的参数）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshInfo {
    /// 网格 ID，写入绘制命令
    pub id: u32,
    pub vertex_count: u32,
    pub index_count: u32,
}

/// 资源注册表
#[derive(Debug, Default)]
pub struct AssetRegistry {
    meshes: HashMap<String, MeshInfo>,
}

impl AssetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 带内置几何体（box / grid / sphere）的注册表
    pub fn with_builtin_meshes() -> Self {
        let mut registry = Self::new();
        // box: 6 面 * 4 顶点；grid: 20x20 顶点；sphere: 20 层 20 片
        let builtin = [
            ("box", 24, 36),
            ("grid", 400, 19 * 19 * 6),
            ("sphere", 401, 20 * 20 * 6),
        ];
        for (name, vertex_count, index_count) in builtin {
            let id = registry.meshes.len() as u32;
            registry.meshes.insert(name.to_string(), MeshInfo { id, vertex_count, index_count });
        }
        registry
    }

    /// 登记网格，名称重复时报错
    pub fn register_mesh(&mut self, name: impl Into<String>, vertex_count: u32, index_count: u32) -> Result<MeshInfo> {
        let name = name.into();
        if self.meshes.contains_key(&name) {
            return Err(FrameRingError::Asset(format!("Mesh '{}' is already registered", name)));
        }
        let info = MeshInfo {
            id: self.meshes.len() as u32,
            vertex_count,
            index_count,
        };
        tracing::debug!(mesh = %name, id = info.id, "Mesh registered");
        self.meshes.insert(name, info);
        Ok(info)
    }

    /// 按名称查找网格
    pub fn mesh(&self, name: &str) -> Result<MeshInfo> {
        self.meshes
            .get(name)
            .copied()
            .ok_or_else(|| FrameRingError::Asset(format!("Unknown mesh '{}'", name)))
    }

    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_meshes() {
        let registry = AssetRegistry::with_builtin_meshes();
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.mesh("box").unwrap().index_count, 36);
        assert_ne!(registry.mesh("box").unwrap().id, registry.mesh("sphere").unwrap().id);
    }

    #[test]
    fn test_duplicate_and_unknown() {
        let mut registry = AssetRegistry::new();
        let info = registry.register_mesh("quad", 4, 6).unwrap();
        assert_eq!(info.id, 0);
        assert!(matches!(registry.register_mesh("quad", 4, 6), Err(FrameRingError::Asset(_))));
        assert!(matches!(registry.mesh("teapot"), Err(FrameRingError::Asset(_))));
    }
}
