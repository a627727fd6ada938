//! frame_ring 演示程序
//!
//! 在模拟的 GPU 时间线上运行帧循环：CPU 每帧更新场景、写入常量、提交命令，
//! GPU 线程以固定延迟执行。帧资源数量与 GPU 延迟可以通过配置或命令行调整，
//! 用来观察 CPU 何时因为 GPU 落后一整圈而阻塞。
//!
//! # 使用方法
//!
//! ```bash
//! # 使用配置文件（config.toml / scene.toml）
//! cargo run
//!
//! # 双缓冲，GPU 明显慢于 CPU
//! cargo run -- --frame-count 2 --latency-ms 12 --frames 60
//! ```
//!
//! # 架构概览
//!
//! ```text
//! ┌─────────────┐
//! │   main.rs   │  帧循环
//! └──────┬──────┘
//!        │
//! ┌──────▼──────┐
//! │    Scene    │  更新 + 写入常量
//! └──────┬──────┘
//!        │
//! ┌──────▼──────┐
//! │  FrameRing  │  槽位轮转 + Fence 等待
//! └──────┬──────┘
//!        │
//! ┌──────▼──────┐
//! │ GPU 时间线   │  ThreadedQueue
//! └─────────────┘
//! ```

use anyhow::Context;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use frame_ring::core::{log, Config};
use frame_ring::renderer::{FrameRing, FrameRingDesc, ThreadedQueue};
use frame_ring::ring_info;
use frame_ring::scene::{AssetRegistry, FrameTiming, Scene, SceneConfig};

/// 每帧粒子实例数上限
const MAX_PARTICLES: usize = 2048;

/// 应用程序入口点
///
/// # 初始化流程
///
/// 1. 加载配置文件（config.toml）并应用命令行参数
/// 2. 初始化日志系统
/// 3. 加载场景配置（scene.toml）并创建场景
/// 4. 启动 GPU 时间线，创建帧资源环
/// 5. 运行帧循环，结束时 flush 并输出统计
fn main() -> anyhow::Result<()> {
    // 1. 加载配置（在初始化日志之前）
    let mut config = Config::from_file_or_default("config.toml");
    config.apply_args(std::env::args());
    config.validate().context("Invalid configuration")?;

    // 2. 初始化日志系统
    let log_file = config.logging.file_output.then(|| config.logging.log_file.as_str());
    log::init_logger(config.logging.level, config.logging.file_output, log_file)?;
    info!(version = env!("CARGO_PKG_VERSION"), "frame_ring starting...");

    // 3. 场景
    let scene_config = SceneConfig::from_file_or_default("scene.toml");
    let registry = AssetRegistry::with_builtin_meshes();
    let mut scene = Scene::new(&scene_config, &registry, MAX_PARTICLES, 0x5eed)
        .context("Failed to build scene")?;

    // 4. 帧资源环
    let queue = ThreadedQueue::new(Duration::from_millis(config.gpu.latency_ms))
        .context("Failed to start GPU timeline")?;
    let desc = FrameRingDesc {
        max_particles: MAX_PARTICLES,
        ..FrameRingDesc::from_config(&config)
    };
    let mut ring = FrameRing::new(queue, desc).context("Failed to create frame ring")?;

    ring_info!(
        frame_count = config.frame.frame_count,
        frames = config.frame.frames_to_run,
        latency_ms = config.gpu.latency_ms,
        cpu_frame_ms = config.gpu.frame_time_ms,
        "Entering frame loop..."
    );

    // 5. 帧循环
    let cpu_work = Duration::from_millis(config.gpu.frame_time_ms);
    let mut timing = FrameTiming::default();
    let mut last = Instant::now();
    let started = last;

    for _ in 0..config.frame.frames_to_run {
        let now = Instant::now();
        timing.advance(now.duration_since(last).as_secs_f32());
        last = now;

        scene.update(&timing);

        let slot = ring.begin_frame()?;
        let contents = scene.write_frame(ring.frame_mut(slot)?, &timing)?;
        // 模拟 CPU 侧的其余工作（剔除、排序等）
        thread::sleep(cpu_work);
        let fence = ring.end_frame(slot)?;

        debug!(
            frame = timing.frame_number,
            slot,
            fence = fence.value(),
            completed = ring.completed_value().value(),
            in_flight = ring.in_flight(),
            particles = contents.particles,
            "Frame done"
        );
    }

    let elapsed = started.elapsed();
    let descriptors = ring.descriptor_stats();
    let sync = ring.sync_stats();
    let stats = ring.shutdown()?;

    ring_info!(
        frames = stats.frames_submitted,
        stalls = stats.stalls,
        waits = sync.waits,
        elapsed_ms = elapsed.as_millis() as u64,
        cbv_used = descriptors.used,
        cbv_usage_percent = descriptors.usage_percent() as f64,
        dropped_particles = scene.particles().dropped(),
        "Frame loop finished"
    );

    Ok(())
}
