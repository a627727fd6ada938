//! 粒子系统
//!
//! 粒子种类用一个封闭的枚举表示，每种发射器只是 [`ParticleKind`] 的一个变体，
//! 发射逻辑在 `emit` 中按变体分派。粒子池容量固定：超出容量的粒子直接丢弃并计数，
//! 从不扩容，保证每帧的实例缓冲区大小有上界。

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::core::math::{deg_to_rad, Vector3};
use crate::renderer::constants::ParticleInstance;

const GRAVITY: f32 = -9.8;

/// 粒子种类
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParticleKind {
    /// 雪花：在发射点上方水平范围内随机生成，缓慢下落
    Snow { fall_speed: f32, spread: f32 },
    /// 烟花：一次向所有方向爆发 `burst_count` 个粒子
    Firework { burst_count: u32, speed: f32 },
    /// 枪口：沿 -Z 方向发射单个粒子，带散布角
    Gun { muzzle_speed: f32, spread_deg: f32 },
}

impl ParticleKind {
    /// 种类名称
    pub fn name(&self) -> &'static str {
        match self {
            ParticleKind::Snow { .. } => "snow",
            ParticleKind::Firework { .. } => "firework",
            ParticleKind::Gun { .. } => "gun",
        }
    }

    /// 一次发射的粒子数
    pub fn burst_size(&self) -> usize {
        match *self {
            ParticleKind::Firework { burst_count, .. } => burst_count as usize,
            ParticleKind::Snow { .. } | ParticleKind::Gun { .. } => 1,
        }
    }

    /// 在 `origin` 处发射一批粒子，最多生成 `limit` 个
    ///
    /// 超出 `limit` 的部分不会被构造。
    pub fn emit<R: Rng + ?Sized>(&self, origin: Vector3, rng: &mut R, limit: usize) -> Vec<Particle> {
        if limit == 0 {
            return Vec::new();
        }
        match *self {
            ParticleKind::Snow { fall_speed, spread } => {
                let half = spread.max(0.0) * 0.5;
                let offset = Vector3::new(
                    rng.gen_range(-half..=half),
                    0.0,
                    rng.gen_range(-half..=half),
                );
                let drift = Vector3::new(rng.gen_range(-0.2..=0.2), -fall_speed, rng.gen_range(-0.2..=0.2));
                vec![Particle {
                    position: origin + offset,
                    velocity: drift,
                    gravity: 0.0,
                    age: 0.0,
                    lifetime: 8.0,
                    size: 0.05,
                    color: [1.0, 1.0, 1.0, 1.0],
                }]
            }
            ParticleKind::Firework { burst_count, speed } => {
                let color = [rng.gen_range(0.4..=1.0), rng.gen_range(0.4..=1.0), rng.gen_range(0.4..=1.0), 1.0];
                (0..self.burst_size().min(limit))
                    .map(|_| {
                        let direction = random_unit_vector(rng);
                        Particle {
                            position: origin,
                            velocity: direction * speed,
                            gravity: GRAVITY * 0.5,
                            age: 0.0,
                            lifetime: 1.5,
                            size: 0.08,
                            color,
                        }
                    })
                    .collect()
            }
            ParticleKind::Gun { muzzle_speed, spread_deg } => {
                let spread = deg_to_rad(spread_deg.abs());
                let yaw = if spread > 0.0 { rng.gen_range(-spread..=spread) } else { 0.0 };
                let pitch = if spread > 0.0 { rng.gen_range(-spread..=spread) } else { 0.0 };
                let direction = Vector3::new(yaw.sin(), pitch.sin(), -yaw.cos() * pitch.cos());
                vec![Particle {
                    position: origin,
                    velocity: direction * muzzle_speed,
                    gravity: GRAVITY,
                    age: 0.0,
                    lifetime: 2.0,
                    size: 0.03,
                    color: [1.0, 0.85, 0.3, 1.0],
                }]
            }
        }
    }
}

fn random_unit_vector<R: Rng + ?Sized>(rng: &mut R) -> Vector3 {
    loop {
        let v = Vector3::new(
            rng.gen_range(-1.0..=1.0),
            rng.gen_range(-1.0..=1.0),
            rng.gen_range(-1.0..=1.0),
        );
        let len2 = v.norm_squared();
        if len2 > 1e-4 && len2 <= 1.0 {
            return v / len2.sqrt();
        }
    }
}

/// 单个粒子
#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    pub position: Vector3,
    pub velocity: Vector3,
    /// 竖直加速度
    pub gravity: f32,
    pub age: f32,
    pub lifetime: f32,
    pub size: f32,
    pub color: [f32; 4],
}

impl Particle {
    pub fn is_alive(&self) -> bool {
        self.age < self.lifetime
    }

    /// 转换为实例数据，透明度随寿命线性衰减
    pub fn to_instance(&self) -> ParticleInstance {
        let fade = (1.0 - self.age / self.lifetime).clamp(0.0, 1.0);
        ParticleInstance {
            position: [self.position.x, self.position.y, self.position.z],
            size: self.size,
            color: [self.color[0], self.color[1], self.color[2], self.color[3] * fade],
        }
    }
}

/// 固定容量的粒子池
#[derive(Debug)]
pub struct ParticleSystem {
    capacity: usize,
    particles: Vec<Particle>,
    dropped: u64,
}

impl ParticleSystem {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            particles: Vec::with_capacity(capacity),
            dropped: 0,
        }
    }

    /// 剩余容量
    pub fn room(&self) -> usize {
        self.capacity - self.particles.len()
    }

    /// 发射一批并加入，返回实际接收的数量
    pub fn emit<R: Rng + ?Sized>(&mut self, kind: &ParticleKind, origin: Vector3, rng: &mut R) -> usize {
        self.emit_bursts(kind, origin, rng, 1)
    }

    /// 连续发射 `bursts` 批
    ///
    /// 只构造放得下的粒子，池满之后剩余批次直接计入丢弃数。
    pub fn emit_bursts<R: Rng + ?Sized>(
        &mut self,
        kind: &ParticleKind,
        origin: Vector3,
        rng: &mut R,
        bursts: usize,
    ) -> usize {
        let burst_size = kind.burst_size() as u64;
        if burst_size == 0 {
            return 0;
        }
        let mut accepted = 0;
        for done in 0..bursts {
            let room = self.room();
            if room == 0 {
                let remaining = (bursts - done) as u64;
                self.dropped = self.dropped.saturating_add(remaining.saturating_mul(burst_size));
                break;
            }
            let particles = kind.emit(origin, rng, room);
            let count = particles.len();
            self.particles.extend(particles);
            self.dropped = self.dropped.saturating_add(burst_size - count as u64);
            accepted += count;
        }
        accepted
    }

    /// 积分并移除寿命耗尽的粒子
    pub fn update(&mut self, dt: f32) {
        for p in &mut self.particles {
            p.velocity.y += p.gravity * dt;
            p.position += p.velocity * dt;
            p.age += dt;
        }
        self.particles.retain(Particle::is_alive);
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn instances(&self) -> impl Iterator<Item = ParticleInstance> + '_ {
        self.particles.iter().map(Particle::to_instance)
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 因容量不足被丢弃的粒子总数
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_firework_burst() {
        let mut rng = StdRng::seed_from_u64(7);
        let kind = ParticleKind::Firework { burst_count: 32, speed: 5.0 };
        let particles = kind.emit(Vector3::zeros(), &mut rng, usize::MAX);
        assert_eq!(particles.len(), 32);
        for p in &particles {
            assert!((p.velocity.norm() - 5.0).abs() < 1e-3);
        }
    }

    #[test]
    fn test_snow_within_spread() {
        let mut rng = StdRng::seed_from_u64(1);
        let kind = ParticleKind::Snow { fall_speed: 2.0, spread: 4.0 };
        for _ in 0..50 {
            let p = &kind.emit(Vector3::new(0.0, 10.0, 0.0), &mut rng, 1)[0];
            assert!(p.position.x.abs() <= 2.0 && p.position.z.abs() <= 2.0);
            assert_eq!(p.position.y, 10.0);
            assert_eq!(p.velocity.y, -2.0);
        }
    }

    #[test]
    fn test_gun_fires_forward() {
        let mut rng = StdRng::seed_from_u64(3);
        let kind = ParticleKind::Gun { muzzle_speed: 30.0, spread_deg: 0.0 };
        let p = &kind.emit(Vector3::zeros(), &mut rng, 1)[0];
        assert!((p.velocity - Vector3::new(0.0, 0.0, -30.0)).norm() < 1e-4);
    }

    #[test]
    fn test_capacity_drops_excess() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut system = ParticleSystem::new(10);
        let kind = ParticleKind::Firework { burst_count: 8, speed: 1.0 };

        assert_eq!(system.emit(&kind, Vector3::zeros(), &mut rng), 8);
        assert_eq!(system.emit(&kind, Vector3::zeros(), &mut rng), 2);
        assert_eq!(system.len(), 10);
        assert_eq!(system.dropped(), 6);
    }

    #[test]
    fn test_huge_burst_only_builds_what_fits() {
        let mut rng = StdRng::seed_from_u64(13);
        let kind = ParticleKind::Firework { burst_count: u32::MAX, speed: 1.0 };
        assert_eq!(kind.emit(Vector3::zeros(), &mut rng, 4).len(), 4);
        assert!(kind.emit(Vector3::zeros(), &mut rng, 0).is_empty());

        let mut system = ParticleSystem::new(16);
        assert_eq!(system.emit(&kind, Vector3::zeros(), &mut rng), 16);
        assert_eq!(system.len(), 16);
        assert_eq!(system.dropped(), u32::MAX as u64 - 16);
    }

    #[test]
    fn test_full_pool_counts_remaining_bursts() {
        let mut rng = StdRng::seed_from_u64(21);
        let mut system = ParticleSystem::new(3);
        let snow = ParticleKind::Snow { fall_speed: 1.0, spread: 1.0 };

        assert_eq!(system.emit_bursts(&snow, Vector3::zeros(), &mut rng, 10), 3);
        assert_eq!(system.room(), 0);
        assert_eq!(system.dropped(), 7);

        let firework = ParticleKind::Firework { burst_count: 5, speed: 1.0 };
        assert_eq!(system.emit_bursts(&firework, Vector3::zeros(), &mut rng, 4), 0);
        assert_eq!(system.dropped(), 7 + 20);
    }

    #[test]
    fn test_update_retires_expired() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut system = ParticleSystem::new(64);
        system.emit(&ParticleKind::Gun { muzzle_speed: 10.0, spread_deg: 0.0 }, Vector3::zeros(), &mut rng);

        system.update(0.5);
        let p = &system.particles()[0];
        assert!(p.position.z < 0.0);
        assert!(p.velocity.y < 0.0);
        let instance = system.instances().next().unwrap();
        assert!(instance.color[3] < 1.0);

        system.update(2.0);
        assert!(system.is_empty());
    }

    #[test]
    fn test_kind_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            kind: ParticleKind,
        }
        let w: Wrapper = toml::from_str(r#"kind = { type = "snow", fall_speed = 1.0, spread = 2.0 }"#).unwrap();
        assert_eq!(w.kind, ParticleKind::Snow { fall_speed: 1.0, spread: 2.0 });
        assert_eq!(w.kind.name(), "snow");
    }
}
