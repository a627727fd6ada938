//! 场景模块
//!
//! 场景每帧的职责只有两件事：
//!
//! 1. `update`：推进动画与粒子
//! 2. `write_frame`：把本帧的常量写入帧资源的上传区域，并录制绘制命令
//!
//! 写入目标必须是 `FrameRing::begin_frame` 刚返回的槽位，场景本身不关心同步。

pub mod config;
pub mod particle;
pub mod registry;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::trace;

use crate::core::error::Result;
use crate::core::math::{Matrix4, Vector3};
use crate::renderer::command::Command;
use crate::renderer::constants::{LightConstants, ObjectConstants, PassConstants};
use crate::renderer::frame::FrameResource;

pub use config::{CameraConfig, EmitterConfig, LightConfig, RenderItemConfig, SceneConfig, Transform};
pub use particle::{Particle, ParticleKind, ParticleSystem};
pub use registry::{AssetRegistry, MeshInfo};

/// 帧时间信息
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameTiming {
    /// 从 0 开始的帧号
    pub frame_number: u64,
    /// 累计时间（秒）
    pub total_time: f32,
    /// 本帧时长（秒）
    pub delta_time: f32,
}

impl FrameTiming {
    /// 推进一帧
    pub fn advance(&mut self, delta_time: f32) {
        self.frame_number += 1;
        self.total_time += delta_time;
        self.delta_time = delta_time;
    }
}

/// 一帧写入的内容统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameContents {
    pub objects: usize,
    pub lights: usize,
    pub particles: usize,
}

#[derive(Debug)]
struct RenderItem {
    name: String,
    mesh: MeshInfo,
    transform: Transform,
    spin: f32,
    /// 当前绕 Y 轴的附加角度（度）
    angle: f32,
}

impl RenderItem {
    fn world_matrix(&self) -> Matrix4 {
        Matrix4::from_axis_angle(&Vector3::y_axis(), self.angle.to_radians()) * self.transform.to_matrix()
    }
}

#[derive(Debug)]
struct Emitter {
    kind: ParticleKind,
    origin: Vector3,
    interval: f32,
    /// 距离下次发射的剩余时间
    cooldown: f32,
}

/// 场景
pub struct Scene {
    camera: CameraConfig,
    items: Vec<RenderItem>,
    lights: Vec<LightConstants>,
    emitters: Vec<Emitter>,
    particles: ParticleSystem,
    rng: StdRng,
    render_target: (u32, u32),
}

impl Scene {
    /// 根据配置创建场景，网格名称在此处解析
    pub fn new(config: &SceneConfig, registry: &AssetRegistry, particle_capacity: usize, seed: u64) -> Result<Self> {
        let items = config
            .items
            .iter()
            .map(|item| {
                Ok(RenderItem {
                    name: item.name.clone(),
                    mesh: registry.mesh(&item.mesh)?,
                    transform: item.transform.clone(),
                    spin: item.spin,
                    angle: 0.0,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let lights = config
            .lights
            .iter()
            .map(|light| LightConstants::directional(Vector3::from(light.direction), light.strength))
            .collect();

        config.validate()?;
        let emitters = config
            .emitters
            .iter()
            .map(|e| Emitter {
                kind: e.kind,
                origin: Vector3::from(e.origin),
                interval: e.interval,
                cooldown: 0.0,
            })
            .collect();

        tracing::info!(
            items = config.items.len(),
            lights = config.lights.len(),
            emitters = config.emitters.len(),
            "Scene created"
        );

        Ok(Self {
            camera: config.camera.clone(),
            items,
            lights,
            emitters,
            particles: ParticleSystem::new(particle_capacity),
            rng: StdRng::seed_from_u64(seed),
            render_target: (1280, 720),
        })
    }

    /// 推进动画与粒子
    pub fn update(&mut self, timing: &FrameTiming) {
        let dt = timing.delta_time;
        for item in &mut self.items {
            item.angle = (item.angle + item.spin * dt) % 360.0;
        }

        for emitter in &mut self.emitters {
            emitter.cooldown -= dt;
            if emitter.cooldown > 0.0 {
                continue;
            }
            // 本帧到期的批次数，一次性发射，池满后其余批次只计数
            let bursts = ((-emitter.cooldown / emitter.interval).floor() as usize).saturating_add(1);
            self.particles.emit_bursts(&emitter.kind, emitter.origin, &mut self.rng, bursts);

            let cooldown = emitter.cooldown.rem_euclid(emitter.interval);
            emitter.cooldown = if cooldown > 0.0 && cooldown.is_finite() { cooldown } else { emitter.interval };
        }

        self.particles.update(dt);
    }

    /// 写入帧资源并录制绘制命令
    ///
    /// 所有映射在返回前都已结束，包括出错的情况。
    pub fn write_frame(&self, frame: &mut FrameResource, timing: &FrameTiming) -> Result<FrameContents> {
        let slot = frame.index();
        let regions = frame.regions_mut();
        let (width, height) = self.render_target;

        let view = self.camera.view_matrix();
        let proj = self.camera.projection_matrix(width as f32 / height as f32);
        let pass = PassConstants::new(&view, &proj, &self.camera.eye())
            .with_timing(timing.frame_number, timing.total_time, timing.delta_time)
            .with_render_target(width, height);
        {
            let mut mapped = regions.pass.map()?;
            mapped.copy_record(0, &pass)?;
        }
        regions.commands.record(Command::SetPassConstants {
            offset: 0,
            descriptor: regions.descriptors.pass,
        })?;

        {
            let mut mapped = regions.lights.map()?;
            for (i, light) in self.lights.iter().enumerate() {
                mapped.copy_record(i, light)?;
            }
        }
        if let Some(&descriptor) = regions.descriptors.lights.first() {
            if !self.lights.is_empty() {
                regions.commands.record(Command::SetLightConstants {
                    offset: 0,
                    descriptor,
                    count: self.lights.len() as u32,
                })?;
            }
        }

        {
            let mut mapped = regions.objects.map()?;
            for (i, item) in self.items.iter().enumerate() {
                mapped.copy_record(i, &ObjectConstants::new(&item.world_matrix()))?;
                regions.commands.record(Command::DrawObject {
                    object_index: i,
                    offset: mapped.element_offset(i)?,
                    descriptor: regions.descriptors.objects[i],
                    mesh: item.mesh.id,
                    index_count: item.mesh.index_count,
                })?;
                trace!(slot, object = %item.name, "Object constants written");
            }
        }

        let mut particle_count = 0;
        {
            let mut mapped = regions.particles.map()?;
            let capacity = mapped.capacity();
            for (i, instance) in self.particles.instances().take(capacity).enumerate() {
                mapped.copy_record(i, &instance)?;
                particle_count += 1;
            }
        }
        if particle_count > 0 {
            regions.commands.record(Command::DrawParticles {
                instance_count: particle_count as u32,
            })?;
        }

        Ok(FrameContents {
            objects: self.items.len(),
            lights: self.lights.len(),
            particles: particle_count,
        })
    }

    pub fn particles(&self) -> &ParticleSystem {
        &self.particles
    }
}
