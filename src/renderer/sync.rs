//! GPU 同步机制模块
//!
//! 提供 CPU-GPU 同步原语：Fence 与 Fence 同步器。
//!
//! # 设计原则
//!
//! - **单调递增**：Fence 值只增不减，CPU 侧 signal，GPU 侧完成
//! - **事件等待**：等待通过条件变量实现（对应 `SetEventOnCompletion` +
//!   `WaitForSingleObject`），不忙等
//! - **设备丢失即致命**：等待过程中设备丢失会唤醒等待方并返回错误，从不重试
//!
//! # 使用场景
//!
//! 1. **帧同步**：复用帧资源前确保 GPU 已读完该帧的数据
//! 2. **Flush**：关闭或重建资源前等待所有已提交的工作完成

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use tracing::{debug, trace};

use crate::core::error::{DeviceError, MisuseError, Result};
use super::queue::CommandQueue;

/// Fence 值
///
/// 用于CPU-GPU同步的单调递增值。
/// 0 表示"从未使用"，第一次 signal 得到 1。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FenceValue(u64);

impl FenceValue {
    /// 从未 signal 过的值
    pub const ZERO: FenceValue = FenceValue(0);

    /// 创建新的Fence值
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// 获取内部值
    pub fn value(&self) -> u64 {
        self.0
    }

    /// 下一个Fence值
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// 是否为初始值
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

#[derive(Debug)]
struct FenceState {
    /// GPU 可见的已完成值
    completed: u64,
    /// 设备丢失原因
    lost: Option<String>,
}

/// Fence
///
/// CPU 与 GPU 共享的计数器。GPU 侧（队列实现）在执行完 signal 之前提交的
/// 所有命令后调用 [`Fence::complete`]；CPU 侧通过 [`Fence::wait_for`] 阻塞等待。
#[derive(Debug)]
pub struct Fence {
    state: Mutex<FenceState>,
    on_completion: Condvar,
}

impl Fence {
    /// 创建新的 Fence，初始完成值为 0
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FenceState { completed: 0, lost: None }),
            on_completion: Condvar::new(),
        }
    }

    /// 读取已完成的值（非阻塞）
    pub fn completed_value(&self) -> FenceValue {
        FenceValue(self.state.lock().completed)
    }

    /// GPU 侧：标记某个值已完成并唤醒所有等待者
    ///
    /// 旧值不会覆盖新值。
    pub fn complete(&self, value: FenceValue) {
        let mut state = self.state.lock();
        if value.0 > state.completed {
            state.completed = value.0;
            trace!(completed = value.0, "Fence completed");
            self.on_completion.notify_all();
        }
    }

    /// GPU 侧：报告设备丢失，唤醒所有等待者
    pub fn lose_device(&self, reason: impl Into<String>) {
        let mut state = self.state.lock();
        if state.lost.is_none() {
            state.lost = Some(reason.into());
        }
        self.on_completion.notify_all();
    }

    /// 设备丢失原因（如果已丢失）
    pub fn device_lost(&self) -> Option<String> {
        self.state.lock().lost.clone()
    }

    /// 阻塞直到完成值 >= `value`
    ///
    /// 返回是否真的发生了阻塞。设备丢失时返回错误。
    pub fn wait_for(&self, value: FenceValue) -> Result<bool> {
        let mut state = self.state.lock();
        if state.completed >= value.0 {
            return Ok(false);
        }

        while state.completed < value.0 {
            if let Some(reason) = &state.lost {
                return Err(DeviceError::DeviceLost(reason.clone()).into());
            }
            self.on_completion.wait(&mut state);
        }
        Ok(true)
    }
}

impl Default for Fence {
    fn default() -> Self {
        Self::new()
    }
}

/// 同步统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// signal 次数
    pub signals: u64,
    /// wait_until 调用次数
    pub waits: u64,
    /// 实际阻塞的等待次数
    pub stalls: u64,
}

/// Fence 同步器
///
/// 持有命令队列与 Fence，CPU 侧唯一的 signal/wait 入口。
/// 单线程使用：只有帧循环线程调用 `signal` 与 `wait_until`。
///
/// # 示例
///
/// ```
/// use frame_ring::renderer::queue::ImmediateQueue;
/// use frame_ring::renderer::sync::FenceSynchronizer;
///
/// let mut sync = FenceSynchronizer::new(ImmediateQueue::new());
/// let value = sync.signal()?;
/// sync.wait_until(value)?;
/// assert_eq!(sync.completed_value(), value);
/// # Ok::<(), frame_ring::core::FrameRingError>(())
/// ```
pub struct FenceSynchronizer<Q: CommandQueue> {
    queue: Q,
    fence: Arc<Fence>,
    /// 最近一次 signal 的值（CPU 侧）
    current: FenceValue,
    stats: SyncStats,
}

impl<Q: CommandQueue> FenceSynchronizer<Q> {
    /// 创建新的同步器
    pub fn new(queue: Q) -> Self {
        Self {
            queue,
            fence: Arc::new(Fence::new()),
            current: FenceValue::ZERO,
            stats: SyncStats::default(),
        }
    }

    /// 递增计数器并向队列提交 signal
    ///
    /// 非阻塞。提交失败时计数器不前进，错误直接返回。
    pub fn signal(&mut self) -> Result<FenceValue> {
        let next = self.current.next();
        self.queue.signal(&self.fence, next)?;
        self.current = next;
        self.stats.signals += 1;
        trace!(fence = next.value(), "Fence signaled");
        Ok(next)
    }

    /// 阻塞直到 GPU 完成 `value`
    ///
    /// 没有超时；设备丢失以错误形式返回。
    pub fn wait_until(&mut self, value: FenceValue) -> Result<()> {
        if value > self.current {
            return Err(MisuseError::FenceNotSignaled {
                value: value.value(),
                current: self.current.value(),
            }.into());
        }

        self.stats.waits += 1;
        if self.fence.completed_value() < value {
            debug!(
                fence = value.value(),
                completed = self.fence.completed_value().value(),
                "Waiting for GPU"
            );
        }

        if self.fence.wait_for(value)? {
            self.stats.stalls += 1;
            debug!(fence = value.value(), "GPU wait completed");
        }
        Ok(())
    }

    /// GPU 可见的已完成值（非阻塞）
    pub fn completed_value(&self) -> FenceValue {
        self.fence.completed_value()
    }

    /// 最近一次 signal 的值
    pub fn current_value(&self) -> FenceValue {
        self.current
    }

    /// 检查特定Fence值是否已完成
    pub fn is_completed(&self, value: FenceValue) -> bool {
        self.completed_value() >= value
    }

    /// 等待所有已提交的工作完成
    pub fn flush(&mut self) -> Result<()> {
        let current = self.current;
        if current.is_zero() {
            return Ok(());
        }
        self.wait_until(current)
    }

    /// 设备丢失原因（如果已丢失）
    pub fn device_lost(&self) -> Option<String> {
        self.fence.device_lost()
    }

    /// 共享的 Fence
    pub fn fence(&self) -> &Arc<Fence> {
        &self.fence
    }

    /// 命令队列
    pub fn queue(&self) -> &Q {
        &self.queue
    }

    /// 命令队列（可变）
    pub fn queue_mut(&mut self) -> &mut Q {
        &mut self.queue
    }

    /// 统计信息
    pub fn stats(&self) -> SyncStats {
        self.stats
    }
}
