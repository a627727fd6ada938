//! 渲染器模块
//!
//! CPU 与 GPU 流水线化所需的帧资源管理，与具体图形 API 无关。
//!
//! # 模块组织
//!
//! - `sync`：Fence 与 Fence 同步器
//! - `queue`：命令队列接口及模拟实现
//! - `command`：命令分配器与命令列表
//! - `resource`：上传缓冲区（常量缓冲区 / 实例缓冲区）
//! - `constants`：着色器常量记录
//! - `descriptor`：CBV 描述符堆
//! - `frame`：帧资源环

pub mod sync;
pub mod queue;
pub mod command;
pub mod resource;
pub mod constants;
pub mod descriptor;
pub mod frame;

pub use frame::{FrameResource, FrameRing, FrameRingDesc, RingStats, SlotState};
pub use queue::{CommandQueue, ImmediateQueue, ManualQueue, ManualQueueHandle, ThreadedQueue};
pub use sync::{Fence, FenceSynchronizer, FenceValue};
