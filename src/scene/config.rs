//! 场景配置模块
//!
//! 定义场景配置，包括相机、渲染项、光源和粒子发射器。

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::core::error::{ConfigError, FrameRingError, Result};
use crate::core::math::{deg_to_rad, Matrix4, Point3, Vector3};
use super::particle::ParticleKind;

/// 3D 变换数据
///
/// 包含位置、旋转和缩放信息。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    /// 位置 (x, y, z)
    #[serde(default = "default_position")]
    pub position: [f32; 3],

    /// 旋转（欧拉角，度数）(pitch, yaw, roll)
    #[serde(default = "default_rotation")]
    pub rotation: [f32; 3],

    /// 缩放 (x, y, z)
    #[serde(default = "default_scale")]
    pub scale: [f32; 3],
}

fn default_position() -> [f32; 3] {
    [0.0, 0.0, 0.0]
}

fn default_rotation() -> [f32; 3] {
    [0.0, 0.0, 0.0]
}

fn default_scale() -> [f32; 3] {
    [1.0, 1.0, 1.0]
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: default_position(),
            rotation: default_rotation(),
            scale: default_scale(),
        }
    }
}

impl Transform {
    /// 在指定位置创建变换
    pub fn at(position: [f32; 3]) -> Self {
        Self { position, ..Self::default() }
    }

    /// 创建模型矩阵
    ///
    /// 变换顺序：缩放 -> 旋转 -> 平移
    pub fn to_matrix(&self) -> Matrix4 {
        let translation = Matrix4::new_translation(&Vector3::from(self.position));

        let pitch = deg_to_rad(self.rotation[0]);
        let yaw = deg_to_rad(self.rotation[1]);
        let roll = deg_to_rad(self.rotation[2]);
        let rotation = Matrix4::from_axis_angle(&Vector3::z_axis(), roll)
            * Matrix4::from_axis_angle(&Vector3::y_axis(), yaw)
            * Matrix4::from_axis_angle(&Vector3::x_axis(), pitch);

        let scale = Matrix4::new_nonuniform_scaling(&Vector3::from(self.scale));

        translation * rotation * scale
    }
}

/// 相机配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    #[serde(default)]
    pub transform: Transform,

    /// 垂直视场角（度）
    #[serde(default = "default_fov")]
    pub fov: f32,

    #[serde(default = "default_near_clip")]
    pub near_clip: f32,

    #[serde(default = "default_far_clip")]
    pub far_clip: f32,
}

fn default_fov() -> f32 {
    60.0
}

fn default_near_clip() -> f32 {
    0.1
}

fn default_far_clip() -> f32 {
    100.0
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            transform: Transform::at([0.0, 2.0, 8.0]),
            fov: default_fov(),
            near_clip: default_near_clip(),
            far_clip: default_far_clip(),
        }
    }
}

impl CameraConfig {
    /// 相机位置
    pub fn eye(&self) -> Vector3 {
        Vector3::from(self.transform.position)
    }

    /// 视图矩阵（默认朝向 -Z）
    pub fn view_matrix(&self) -> Matrix4 {
        let eye = self.eye();
        let pitch = deg_to_rad(self.transform.rotation[0]);
        let yaw = deg_to_rad(self.transform.rotation[1]);

        let forward = Vector3::new(
            yaw.sin() * pitch.cos(),
            -pitch.sin(),
            -yaw.cos() * pitch.cos(),
        );
        let target = eye + forward;

        Matrix4::look_at_rh(&Point3::from(eye), &Point3::from(target), &Vector3::y())
    }

    pub fn projection_matrix(&self, aspect_ratio: f32) -> Matrix4 {
        Matrix4::new_perspective(aspect_ratio, deg_to_rad(self.fov), self.near_clip, self.far_clip)
    }
}

/// 渲染项配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderItemConfig {
    pub name: String,

    /// 资源注册表中的网格名称
    pub mesh: String,

    #[serde(default)]
    pub transform: Transform,

    /// 绕 Y 轴的旋转速度（度/秒）
    #[serde(default)]
    pub spin: f32,
}

/// 方向光配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LightConfig {
    #[serde(default = "default_light_direction")]
    pub direction: [f32; 3],

    #[serde(default = "default_light_strength")]
    pub strength: [f32; 3],
}

fn default_light_direction() -> [f32; 3] {
    [0.57735, -0.57735, 0.57735]
}

fn default_light_strength() -> [f32; 3] {
    [0.8, 0.8, 0.8]
}

impl Default for LightConfig {
    fn default() -> Self {
        Self {
            direction: default_light_direction(),
            strength: default_light_strength(),
        }
    }
}

/// 粒子发射器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmitterConfig {
    pub kind: ParticleKind,

    #[serde(default)]
    pub origin: [f32; 3],

    /// 发射间隔（秒）
    #[serde(default = "default_interval")]
    pub interval: f32,
}

fn default_interval() -> f32 {
    0.25
}

/// 场景配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneConfig {
    #[serde(default)]
    pub camera: CameraConfig,

    #[serde(default)]
    pub items: Vec<RenderItemConfig>,

    #[serde(default)]
    pub lights: Vec<LightConfig>,

    #[serde(default)]
    pub emitters: Vec<EmitterConfig>,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig::default(),
            items: vec![
                RenderItemConfig {
                    name: "ground".to_string(),
                    mesh: "grid".to_string(),
                    transform: Transform {
                        scale: [20.0, 1.0, 20.0],
                        ..Transform::default()
                    },
                    spin: 0.0,
                },
                RenderItemConfig {
                    name: "crate".to_string(),
                    mesh: "box".to_string(),
                    transform: Transform::at([0.0, 0.5, 0.0]),
                    spin: 45.0,
                },
                RenderItemConfig {
                    name: "ball".to_string(),
                    mesh: "sphere".to_string(),
                    transform: Transform::at([2.5, 1.0, 0.0]),
                    spin: 0.0,
                },
            ],
            lights: vec![LightConfig::default()],
            emitters: vec![
                EmitterConfig {
                    kind: ParticleKind::Snow { fall_speed: 1.5, spread: 8.0 },
                    origin: [0.0, 10.0, 0.0],
                    interval: 0.05,
                },
                EmitterConfig {
                    kind: ParticleKind::Firework { burst_count: 48, speed: 6.0 },
                    origin: [-3.0, 4.0, -2.0],
                    interval: 1.0,
                },
            ],
        }
    }
}

impl SceneConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| FrameRingError::Config(ConfigError::FileNotFound(format!(
                "Failed to read scene config file '{}': {}",
                path.display(),
                e
            ))))?;

        let config: Self = toml::from_str(&contents)
            .map_err(|e| FrameRingError::Config(ConfigError::ParseError(format!(
                "Failed to parse scene config: {}",
                e
            ))))?;

        config.validate()?;
        Ok(config)
    }

    /// 验证场景配置
    ///
    /// 发射间隔必须是有限正数，否则 `Scene::update` 无法推进冷却时间。
    pub fn validate(&self) -> Result<()> {
        for (i, emitter) in self.emitters.iter().enumerate() {
            if !emitter.interval.is_finite() || emitter.interval <= 0.0 {
                return Err(ConfigError::InvalidValue {
                    field: format!("emitters[{}].interval", i),
                    reason: format!("Emit interval must be a positive number, got {}", emitter.interval),
                }.into());
            }
        }
        Ok(())
    }

    pub fn from_file_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if path.exists() {
            match Self::from_file(path) {
                Ok(config) => {
                    tracing::info!("Loaded scene config from: {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to load scene config: {}, using defaults", e);
                    Self::default()
                }
            }
        } else {
            tracing::info!("Scene config not found, using defaults");
            Self::default()
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let contents = toml::to_string_pretty(self)
            .map_err(|e| FrameRingError::Config(ConfigError::ParseError(format!(
                "Failed to serialize scene config: {}",
                e
            ))))?;

        fs::write(path, contents)?;
        tracing::info!("Saved scene config to: {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_transform() {
        let transform = Transform::default();
        assert_eq!(transform.position, [0.0, 0.0, 0.0]);
        assert_eq!(transform.scale, [1.0, 1.0, 1.0]);
        assert!((transform.to_matrix() - Matrix4::identity()).norm() < 1e-6);
    }

    #[test]
    fn test_transform_to_matrix() {
        let matrix = Transform::at([1.0, 2.0, 3.0]).to_matrix();

        // 检查平移部分
        assert!((matrix[(0, 3)] - 1.0).abs() < 0.001);
        assert!((matrix[(1, 3)] - 2.0).abs() < 0.001);
        assert!((matrix[(2, 3)] - 3.0).abs() < 0.001);
    }

    #[test]
    fn test_camera_looks_down_negative_z() {
        let camera = CameraConfig {
            transform: Transform::default(),
            ..CameraConfig::default()
        };
        let view = camera.view_matrix();
        let p = view.transform_point(&Point3::new(0.0, 0.0, -5.0));
        assert!((p.z + 5.0).abs() < 0.001);
    }

    #[test]
    fn test_scene_toml() {
        let text = r#"
            [camera]
            fov = 45.0

            [[items]]
            name = "crate"
            mesh = "box"
            spin = 30.0

            [[emitters]]
            origin = [0.0, 1.0, 0.0]
            kind = { type = "gun", muzzle_speed = 20.0, spread_deg = 3.0 }
        "#;
        let scene: SceneConfig = toml::from_str(text).unwrap();
        assert_eq!(scene.camera.fov, 45.0);
        assert_eq!(scene.items[0].transform, Transform::default());
        assert!(scene.lights.is_empty());
        assert!(matches!(scene.emitters[0].kind, ParticleKind::Gun { .. }));
        assert_eq!(scene.emitters[0].interval, 0.25);
    }

    #[test]
    fn test_default_scene_round_trips_through_toml() {
        let scene = SceneConfig::default();
        let text = toml::to_string_pretty(&scene).unwrap();
        let parsed: SceneConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.items.len(), scene.items.len());
        assert_eq!(parsed.emitters.len(), 2);
    }

    #[test]
    fn test_non_positive_interval_rejected() {
        assert!(SceneConfig::default().validate().is_ok());

        for interval in [0.0, -1.0, f32::NAN, f32::INFINITY] {
            let mut scene = SceneConfig::default();
            scene.emitters[1].interval = interval;
            let err = scene.validate().unwrap_err();
            assert!(matches!(
                err,
                FrameRingError::Config(ConfigError::InvalidValue { ref field, .. }) if field == "emitters[1].interval"
            ));
        }
    }

    #[test]
    fn test_from_file_validates() {
        let path = std::env::temp_dir().join(format!("frame_ring_scene_{}.toml", std::process::id()));
        fs::write(
            &path,
            r#"
            [[emitters]]
            interval = 0.0
            kind = { type = "gun", muzzle_speed = 20.0, spread_deg = 3.0 }
            "#,
        )
        .unwrap();

        let result = SceneConfig::from_file(&path);
        fs::remove_file(&path).unwrap();
        assert!(matches!(result, Err(FrameRingError::Config(ConfigError::InvalidValue { .. }))));
    }
}
