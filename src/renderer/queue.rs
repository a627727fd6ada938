//! 命令队列模块
//!
//! 帧资源环通过 [`CommandQueue`] 与 GPU 交互：提交命令列表、在队列上 signal
//! Fence。真实设备的实现不在本 crate 中；这里提供三种模拟实现：
//!
//! - [`ImmediateQueue`]：signal 立即完成，GPU 永远不落后
//! - [`ManualQueue`]：signal 挂起，由测试代码通过 [`ManualQueueHandle`] 手动完成
//! - [`ThreadedQueue`]：独立的 "GPU 时间线" 线程按固定延迟执行命令

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::core::error::{DeviceError, Result};
use super::command::CommandList;
use super::sync::{Fence, FenceValue};

/// 命令提交接口
///
/// 对应 DX12 的 `ID3D12CommandQueue::ExecuteCommandLists` 与 `Signal`。
/// 任何错误都视为设备丢失，调用方不得重试。
pub trait CommandQueue {
    /// 提交命令列表
    fn execute(&mut self, list: CommandList) -> Result<()>;

    /// 在之前提交的所有命令完成后将 `fence` 置为 `value`
    fn signal(&mut self, fence: &Arc<Fence>, value: FenceValue) -> Result<()>;
}

/// 立即完成的队列
#[derive(Debug, Default)]
pub struct ImmediateQueue {
    executed: u64,
}

impl ImmediateQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已执行的命令列表数量
    pub fn executed(&self) -> u64 {
        self.executed
    }
}

impl CommandQueue for ImmediateQueue {
    fn execute(&mut self, _list: CommandList) -> Result<()> {
        self.executed += 1;
        Ok(())
    }

    fn signal(&mut self, fence: &Arc<Fence>, value: FenceValue) -> Result<()> {
        fence.complete(value);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct ManualState {
    pending: VecDeque<(Arc<Fence>, FenceValue)>,
    executed: Vec<CommandList>,
    fence: Option<Arc<Fence>>,
    failure: Option<String>,
}

/// 手动完成的队列
///
/// 所有 signal 都进入挂起列表，直到通过句柄完成。
#[derive(Debug, Default)]
pub struct ManualQueue {
    shared: Arc<Mutex<ManualState>>,
}

/// [`ManualQueue`] 的控制句柄，可以跨线程使用
#[derive(Debug, Clone)]
pub struct ManualQueueHandle {
    shared: Arc<Mutex<ManualState>>,
}

impl ManualQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取控制句柄
    pub fn handle(&self) -> ManualQueueHandle {
        ManualQueueHandle {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl CommandQueue for ManualQueue {
    fn execute(&mut self, list: CommandList) -> Result<()> {
        let mut state = self.shared.lock();
        if let Some(reason) = &state.failure {
            return Err(DeviceError::SubmissionFailed(reason.clone()).into());
        }
        state.executed.push(list);
        Ok(())
    }

    fn signal(&mut self, fence: &Arc<Fence>, value: FenceValue) -> Result<()> {
        let mut state = self.shared.lock();
        if let Some(reason) = &state.failure {
            return Err(DeviceError::SubmissionFailed(reason.clone()).into());
        }
        state.fence = Some(Arc::clone(fence));
        state.pending.push_back((Arc::clone(fence), value));
        Ok(())
    }
}

impl ManualQueueHandle {
    /// 完成最早挂起的 signal
    pub fn complete_next(&self) -> Option<FenceValue> {
        let next = self.shared.lock().pending.pop_front();
        next.map(|(fence, value)| {
            fence.complete(value);
            value
        })
    }

    /// 完成所有 <= `value` 的挂起 signal
    pub fn complete_through(&self, value: FenceValue) -> usize {
        let ready: Vec<_> = {
            let mut state = self.shared.lock();
            let split = state
                .pending
                .iter()
                .position(|(_, v)| *v > value)
                .unwrap_or(state.pending.len());
            state.pending.drain(..split).collect()
        };
        for (fence, v) in &ready {
            fence.complete(*v);
        }
        ready.len()
    }

    /// 完成所有挂起的 signal
    pub fn complete_all(&self) -> usize {
        let ready: Vec<_> = self.shared.lock().pending.drain(..).collect();
        for (fence, v) in &ready {
            fence.complete(*v);
        }
        ready.len()
    }

    /// 挂起的 signal 数量
    pub fn pending_count(&self) -> usize {
        self.shared.lock().pending.len()
    }

    /// 已提交的命令列表数量
    pub fn executed_count(&self) -> usize {
        self.shared.lock().executed.len()
    }

    /// 最近提交的命令列表
    pub fn last_executed(&self) -> Option<CommandList> {
        self.shared.lock().executed.last().cloned()
    }

    /// 模拟设备丢失：之后的提交全部失败，正在等待的线程被唤醒
    pub fn lose_device(&self, reason: &str) {
        let fence = {
            let mut state = self.shared.lock();
            state.failure = Some(reason.to_string());
            state.pending.clear();
            state.fence.clone()
        };
        if let Some(fence) = fence {
            fence.lose_device(reason);
        }
    }
}

enum GpuWork {
    Execute(CommandList),
    Signal(Arc<Fence>, FenceValue),
}

/// GPU 时间线线程统计
#[derive(Debug, Clone, Copy, Default)]
pub struct GpuTimelineStats {
    /// 执行的命令列表数量
    pub lists: u64,
    /// 执行的绘制调用数量
    pub draws: u64,
}

/// 由独立线程模拟 GPU 的队列
///
/// 提交按顺序执行：每个命令列表耗时 `latency`，signal 在之前的列表全部执行完后完成。
pub struct ThreadedQueue {
    sender: Option<mpsc::Sender<GpuWork>>,
    worker: Option<JoinHandle<GpuTimelineStats>>,
    executed: Arc<AtomicU64>,
}

impl ThreadedQueue {
    /// 启动 GPU 时间线线程
    pub fn new(latency: Duration) -> Result<Self> {
        let (sender, receiver) = mpsc::channel::<GpuWork>();
        let executed = Arc::new(AtomicU64::new(0));
        let worker_executed = Arc::clone(&executed);

        let worker = thread::Builder::new()
            .name("gpu-timeline".to_string())
            .spawn(move || {
                let mut stats = GpuTimelineStats::default();
                for work in receiver {
                    match work {
                        GpuWork::Execute(list) => {
                            thread::sleep(latency);
                            stats.lists += 1;
                            stats.draws += list.draw_count() as u64;
                            worker_executed.fetch_add(1, Ordering::Release);
                        }
                        GpuWork::Signal(fence, value) => fence.complete(value),
                    }
                }
                debug!(lists = stats.lists, "GPU timeline drained");
                stats
            })?;

        info!(latency_ms = latency.as_millis() as u64, "GPU timeline started");

        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
            executed,
        })
    }

    /// 已执行完的命令列表数量
    pub fn executed(&self) -> u64 {
        self.executed.load(Ordering::Acquire)
    }

    fn send(&self, work: GpuWork) -> Result<()> {
        self.sender
            .as_ref()
            .ok_or_else(|| DeviceError::DeviceLost("GPU timeline stopped".to_string()))?
            .send(work)
            .map_err(|_| DeviceError::DeviceLost("GPU timeline thread terminated".to_string()).into())
    }

    /// 停止时间线线程并返回统计
    pub fn shutdown(&mut self) -> Option<GpuTimelineStats> {
        self.sender.take();
        let worker = self.worker.take()?;
        match worker.join() {
            Ok(stats) => Some(stats),
            Err(_) => {
                warn!("GPU timeline thread panicked");
                None
            }
        }
    }
}

impl CommandQueue for ThreadedQueue {
    fn execute(&mut self, list: CommandList) -> Result<()> {
        self.send(GpuWork::Execute(list))
    }

    fn signal(&mut self, fence: &Arc<Fence>, value: FenceValue) -> Result<()> {
        self.send(GpuWork::Signal(Arc::clone(fence), value))
    }
}

impl Drop for ThreadedQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}
