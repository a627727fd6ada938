//! frame_ring - CPU/GPU 流水线帧资源管理
//!
//! CPU 录制第 k 帧时，GPU 可能仍在执行第 k-1 ... k-N+1 帧。本库提供让两者
//! 重叠执行而不互相踩踏的最小机制：
//!
//! - 单调递增的 Fence 与同步器（signal / wait_until / completed_value）
//! - N 个帧资源组成的环，复用槽位前等待 GPU 读完
//! - 按 256 字节对齐的常量缓冲区上传区域，只能在作用域映射内写入
//!
//! # 模块结构
//!
//! - `core`: 核心功能模块（日志、配置、错误处理、数学类型）
//! - `renderer`: 同步、命令提交、上传缓冲区、描述符堆与帧资源环
//! - `scene`: 场景配置、资源注册表、粒子系统，以及每帧常量的写入
//!
//! # 使用示例
//!
//! ```
//! use frame_ring::renderer::{FrameRing, FrameRingDesc, ImmediateQueue};
//! use frame_ring::scene::{AssetRegistry, FrameTiming, Scene, SceneConfig};
//!
//! let registry = AssetRegistry::with_builtin_meshes();
//! let mut scene = Scene::new(&SceneConfig::default(), &registry, 1024, 0)?;
//! let mut ring = FrameRing::new(ImmediateQueue::new(), FrameRingDesc::default())?;
//!
//! let mut timing = FrameTiming::default();
//! for _ in 0..5 {
//!     timing.advance(1.0 / 60.0);
//!     scene.update(&timing);
//!
//!     let slot = ring.begin_frame()?;
//!     scene.write_frame(ring.frame_mut(slot)?, &timing)?;
//!     ring.end_frame(slot)?;
//! }
//! ring.shutdown()?;
//! # Ok::<(), frame_ring::core::FrameRingError>(())
//! ```

pub mod core;
pub mod renderer;
pub mod scene;
