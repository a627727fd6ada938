//! 帧资源环
//!
//! 每帧都有独立的资源集（命令分配器 + 对象/帧/光源常量缓冲区 + 粒子实例缓冲区），
//! N 个帧资源循环使用：
//!
//! - 帧 k：CPU 正在写入
//! - 帧 k-1 ... k-N+1：已提交，GPU 可能仍在读取
//! - 帧 k-N：GPU 已完成，槽位可以复用
//!
//! 复用槽位之前必须等待该槽位最后一次提交时记录的 Fence 值完成。只有当 GPU
//! 落后整整一圈时 `begin_frame` 才会真正阻塞。
//!
//! # 槽位状态
//!
//! ```text
//! Idle ──begin_frame──▶ InUseByCpu ──end_frame──▶ SubmittedToGpu ──fence──▶ Idle
//! ```

use bytemuck::Pod;
use tracing::{debug, info, trace, warn};

use crate::core::config::Config;
use crate::core::error::{CapacityError, DeviceError, FrameRingError, MisuseError, Result};
use super::command::CommandAllocator;
use super::constants::{LightConstants, ObjectConstants, ParticleInstance, PassConstants};
use super::descriptor::{DescriptorHeap, DescriptorHeapStats};
use super::queue::CommandQueue;
use super::resource::UploadBuffer;
use super::sync::{FenceSynchronizer, FenceValue, SyncStats};

/// 槽位状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// 空闲，可以复用
    Idle,
    /// CPU 正在录制
    InUseByCpu,
    /// 已提交，GPU 可能仍在读取
    SubmittedToGpu,
}

/// 帧资源环的创建参数
#[derive(Debug, Clone)]
pub struct FrameRingDesc {
    /// 帧资源数量（>= 2）
    pub frame_count: usize,
    /// 常量缓冲区步长对齐
    pub alignment: u64,
    /// 每帧对象常量记录数
    pub max_objects: usize,
    /// 每帧光源常量记录数
    pub max_lights: usize,
    /// 每帧粒子实例数
    pub max_particles: usize,
}

impl Default for FrameRingDesc {
    fn default() -> Self {
        Self {
            frame_count: 3,
            alignment: 256,
            max_objects: 64,
            max_lights: 4,
            max_particles: 1024,
        }
    }
}

impl FrameRingDesc {
    /// 从配置构建
    pub fn from_config(config: &Config) -> Self {
        Self {
            frame_count: config.frame.frame_count,
            alignment: config.constant_buffer.alignment,
            max_objects: config.constant_buffer.max_objects,
            max_lights: config.constant_buffer.max_lights,
            ..Self::default()
        }
    }

    /// 整个环需要的 CBV 数量：每帧 pass + lights + objects
    ///
    /// 超出 u32 时视为描述符堆容量不足。
    fn heap_capacity(&self) -> Result<u32> {
        self.max_lights
            .checked_add(self.max_objects)
            .and_then(|n| n.checked_add(1))
            .and_then(|n| n.checked_mul(self.frame_count))
            .and_then(|n| u32::try_from(n).ok())
            .ok_or(FrameRingError::Capacity(CapacityError::DescriptorHeap {
                kind: "CBV",
                capacity: u32::MAX,
            }))
    }
}

/// 帧资源的 CBV 描述符索引
#[derive(Debug, Clone, Default)]
pub struct SlotDescriptors {
    pub pass: u32,
    pub lights: Vec<u32>,
    pub objects: Vec<u32>,
}

impl SlotDescriptors {
    fn all(&self) -> impl Iterator<Item = u32> + '_ {
        std::iter::once(self.pass)
            .chain(self.lights.iter().copied())
            .chain(self.objects.iter().copied())
    }
}

/// 帧资源
pub struct FrameResource {
    index: usize,
    state: SlotState,
    /// GPU 读完本槽位数据时的 Fence 值
    completion_fence: FenceValue,
    allocator: CommandAllocator,
    object_cb: UploadBuffer<ObjectConstants>,
    pass_cb: UploadBuffer<PassConstants>,
    light_cb: UploadBuffer<LightConstants>,
    particle_vb: UploadBuffer<ParticleInstance>,
    descriptors: SlotDescriptors,
}

/// 帧资源中可同时借用的各区域
///
/// 各字段互不重叠，可以同时映射多个区域并录制命令。
pub struct FrameRegions<'a> {
    pub objects: &'a mut UploadBuffer<ObjectConstants>,
    pub pass: &'a mut UploadBuffer<PassConstants>,
    pub lights: &'a mut UploadBuffer<LightConstants>,
    pub particles: &'a mut UploadBuffer<ParticleInstance>,
    pub commands: &'a mut CommandAllocator,
    pub descriptors: &'a SlotDescriptors,
}

impl FrameResource {
    fn new(index: usize, desc: &FrameRingDesc, heap: &mut DescriptorHeap) -> Result<Self> {
        let object_cb = UploadBuffer::constant(format!("object_cb[{}]", index), desc.max_objects, desc.alignment)?;
        let pass_cb = UploadBuffer::constant(format!("pass_cb[{}]", index), 1, desc.alignment)?;
        let light_cb = UploadBuffer::constant(format!("light_cb[{}]", index), desc.max_lights, desc.alignment)?;
        let particle_vb = UploadBuffer::vertex(format!("particle_vb[{}]", index), desc.max_particles)?;

        let descriptors = SlotDescriptors {
            pass: heap.allocate()?.index,
            lights: (0..desc.max_lights)
                .map(|_| heap.allocate().map(|h| h.index))
                .collect::<Result<_>>()?,
            objects: (0..desc.max_objects)
                .map(|_| heap.allocate().map(|h| h.index))
                .collect::<Result<_>>()?,
        };

        Ok(Self {
            index,
            state: SlotState::Idle,
            completion_fence: FenceValue::ZERO,
            allocator: CommandAllocator::new(index),
            object_cb,
            pass_cb,
            light_cb,
            particle_vb,
            descriptors,
        })
    }

    /// 槽位索引
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn state(&self) -> SlotState {
        self.state
    }

    /// 最后一次提交记录的 Fence 值
    pub fn completion_fence(&self) -> FenceValue {
        self.completion_fence
    }

    /// 同时借用所有区域
    pub fn regions_mut(&mut self) -> FrameRegions<'_> {
        FrameRegions {
            objects: &mut self.object_cb,
            pass: &mut self.pass_cb,
            lights: &mut self.light_cb,
            particles: &mut self.particle_vb,
            commands: &mut self.allocator,
            descriptors: &self.descriptors,
        }
    }

    pub fn object_constants(&self) -> &UploadBuffer<ObjectConstants> {
        &self.object_cb
    }

    pub fn pass_constants(&self) -> &UploadBuffer<PassConstants> {
        &self.pass_cb
    }

    pub fn light_constants(&self) -> &UploadBuffer<LightConstants> {
        &self.light_cb
    }

    pub fn particle_instances(&self) -> &UploadBuffer<ParticleInstance> {
        &self.particle_vb
    }

    pub fn commands(&self) -> &CommandAllocator {
        &self.allocator
    }

    pub fn descriptors(&self) -> &SlotDescriptors {
        &self.descriptors
    }

    /// 第一个仍处于映射状态的区域
    fn mapped_region(&self) -> Option<&str> {
        fn check<T: Pod>(buffer: &UploadBuffer<T>) -> Option<&str> {
            buffer.is_mapped().then(|| buffer.name())
        }
        check(&self.object_cb)
            .or_else(|| check(&self.pass_cb))
            .or_else(|| check(&self.light_cb))
            .or_else(|| check(&self.particle_vb))
    }
}

/// 帧环统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RingStats {
    /// begin_frame 成功次数
    pub frames_begun: u64,
    /// end_frame 成功次数
    pub frames_submitted: u64,
    /// begin_frame 中真正阻塞的次数
    pub stalls: u64,
}

/// 帧资源环
///
/// # 示例
///
/// ```
/// use frame_ring::renderer::frame::{FrameRing, FrameRingDesc};
/// use frame_ring::renderer::queue::ImmediateQueue;
///
/// let mut ring = FrameRing::new(ImmediateQueue::new(), FrameRingDesc::default())?;
/// for _ in 0..10 {
///     let slot = ring.begin_frame()?;
///     ring.end_frame(slot)?;
/// }
/// assert_eq!(ring.stats().stalls, 0);
/// ring.shutdown()?;
/// # Ok::<(), frame_ring::core::FrameRingError>(())
/// ```
pub struct FrameRing<Q: CommandQueue> {
    slots: Vec<FrameResource>,
    /// 最近一次 begin_frame 返回的槽位
    cursor: usize,
    /// 正在录制的槽位
    open: Option<usize>,
    sync: FenceSynchronizer<Q>,
    descriptor_heap: DescriptorHeap,
    /// 设备丢失后环被毒化，之后的所有调用都返回该错误
    lost: Option<DeviceError>,
    flushed: bool,
    stats: RingStats,
}

impl<Q: CommandQueue> FrameRing<Q> {
    /// 创建帧资源环，预先分配所有槽位的资源
    pub fn new(queue: Q, desc: FrameRingDesc) -> Result<Self> {
        if desc.frame_count < 2 {
            return Err(MisuseError::InvalidFrameCount(desc.frame_count).into());
        }

        let heap_capacity = desc.heap_capacity()?;
        let mut descriptor_heap = DescriptorHeap::cbv(heap_capacity);

        let slots = (0..desc.frame_count)
            .map(|i| FrameResource::new(i, &desc, &mut descriptor_heap))
            .collect::<Result<Vec<_>>>()?;

        info!(
            frame_count = desc.frame_count,
            max_objects = desc.max_objects,
            max_lights = desc.max_lights,
            cbv_descriptors = heap_capacity,
            "Frame ring created"
        );

        Ok(Self {
            cursor: desc.frame_count - 1,
            slots,
            open: None,
            sync: FenceSynchronizer::new(queue),
            descriptor_heap,
            lost: None,
            flushed: false,
            stats: RingStats::default(),
        })
    }

    /// 前进到下一个槽位，必要时等待 GPU 读完它
    ///
    /// 返回可以写入的槽位索引。
    pub fn begin_frame(&mut self) -> Result<usize> {
        self.check_lost()?;
        if let Some(open) = self.open {
            return Err(MisuseError::FrameAlreadyOpen(open).into());
        }

        let next = (self.cursor + 1) % self.slots.len();
        let fence = self.slots[next].completion_fence;

        if !fence.is_zero() {
            let stalls_before = self.sync.stats().stalls;
            let waited = self.sync.wait_until(fence);
            self.poison_on_device_error(waited)?;
            if self.sync.stats().stalls > stalls_before {
                self.stats.stalls += 1;
                debug!(slot = next, fence = fence.value(), "Stalled waiting for frame resource");
            }
        }
        self.update_availability();

        let completed = self.sync.completed_value();
        let slot = &mut self.slots[next];
        if slot.completion_fence > completed {
            return Err(MisuseError::SlotInFlight {
                slot: next,
                fence: slot.completion_fence.value(),
                completed: completed.value(),
            }.into());
        }

        slot.allocator.reset()?;
        slot.state = SlotState::InUseByCpu;
        self.cursor = next;
        self.open = Some(next);
        self.flushed = false;
        self.stats.frames_begun += 1;

        trace!(slot = next, completed = completed.value(), "Frame begun");
        Ok(next)
    }

    /// 提交槽位的命令并 signal，记录完成 Fence 值
    pub fn end_frame(&mut self, slot_index: usize) -> Result<FenceValue> {
        self.check_lost()?;
        let open = self.open.ok_or(MisuseError::NoFrameOpen)?;
        if open != slot_index {
            return Err(MisuseError::SlotMismatch { expected: open, got: slot_index }.into());
        }

        let slot = &mut self.slots[slot_index];
        if let Some(region) = slot.mapped_region() {
            return Err(MisuseError::RegionMapped(region.to_string()).into());
        }

        let list = slot.allocator.close()?;
        let draws = list.draw_count();
        self.open = None;

        let executed = self.sync.queue_mut().execute(list);
        self.poison_on_device_error(executed)?;
        let signaled = self.sync.signal();
        let fence = self.poison_on_device_error(signaled)?;

        let slot = &mut self.slots[slot_index];
        slot.allocator.mark_submitted()?;
        slot.completion_fence = fence;
        slot.state = SlotState::SubmittedToGpu;
        self.stats.frames_submitted += 1;

        trace!(slot = slot_index, fence = fence.value(), draws, "Frame submitted");
        Ok(fence)
    }

    /// 当前打开的帧资源
    pub fn current_frame_mut(&mut self) -> Result<&mut FrameResource> {
        let open = self.open.ok_or(MisuseError::NoFrameOpen)?;
        Ok(&mut self.slots[open])
    }

    /// 打开的帧资源（索引必须与 begin_frame 返回的一致）
    pub fn frame_mut(&mut self, slot_index: usize) -> Result<&mut FrameResource> {
        let open = self.open.ok_or(MisuseError::NoFrameOpen)?;
        if open != slot_index {
            return Err(MisuseError::SlotMismatch { expected: open, got: slot_index }.into());
        }
        Ok(&mut self.slots[open])
    }

    /// 只读访问任意槽位
    pub fn frame(&self, slot_index: usize) -> Option<&FrameResource> {
        self.slots.get(slot_index)
    }

    /// 等待所有已提交的帧完成
    pub fn flush(&mut self) -> Result<()> {
        self.check_lost()?;
        let flushed = self.sync.flush();
        self.poison_on_device_error(flushed)?;
        self.update_availability();
        self.flushed = true;
        Ok(())
    }

    /// 关闭：flush 并释放描述符
    pub fn shutdown(mut self) -> Result<RingStats> {
        if let Some(open) = self.open {
            crate::ring_warn!(slot = open, "Shutting down with an open frame; discarding its commands");
            self.open = None;
            self.slots[open].state = SlotState::Idle;
        }
        self.flush()?;

        let descriptors = self.descriptor_heap.stats();
        for slot in &self.slots {
            for index in slot.descriptors.all() {
                self.descriptor_heap.free(index)?;
            }
        }

        let sync = self.sync.stats();
        info!(
            frames = self.stats.frames_submitted,
            stalls = self.stats.stalls,
            last_fence = self.sync.current_value().value(),
            signals = sync.signals,
            cbv_used = descriptors.used,
            cbv_high_water = descriptors.high_water,
            "Frame ring shut down"
        );
        Ok(self.stats)
    }

    /// 槽位数量
    pub fn frame_count(&self) -> usize {
        self.slots.len()
    }

    /// 当前打开的槽位
    pub fn open_slot(&self) -> Option<usize> {
        self.open
    }

    /// GPU 可见的已完成值
    pub fn completed_value(&self) -> FenceValue {
        self.sync.completed_value()
    }

    /// 最近一次 signal 的值
    pub fn current_fence(&self) -> FenceValue {
        self.sync.current_value()
    }

    /// 槽位状态（已提交的槽位在 Fence 完成后视为空闲）
    pub fn slot_state(&self, slot_index: usize) -> Option<SlotState> {
        let slot = self.slots.get(slot_index)?;
        match slot.state {
            SlotState::SubmittedToGpu if self.sync.is_completed(slot.completion_fence) => {
                Some(SlotState::Idle)
            }
            state => Some(state),
        }
    }

    /// GPU 仍可能在读取的槽位数量
    pub fn in_flight(&self) -> usize {
        (0..self.slots.len())
            .filter(|&i| self.slot_state(i) == Some(SlotState::SubmittedToGpu))
            .count()
    }

    pub fn stats(&self) -> RingStats {
        self.stats
    }

    pub fn sync_stats(&self) -> SyncStats {
        self.sync.stats()
    }

    pub fn descriptor_stats(&self) -> DescriptorHeapStats {
        self.descriptor_heap.stats()
    }

    /// 命令队列
    pub fn queue(&self) -> &Q {
        self.sync.queue()
    }

    /// 设备是否已丢失
    pub fn is_lost(&self) -> bool {
        self.lost.is_some()
    }

    /// 根据已完成的 Fence 值把已提交槽位标记为空闲
    fn update_availability(&mut self) {
        let completed = self.sync.completed_value();
        for slot in &mut self.slots {
            if slot.state == SlotState::SubmittedToGpu && slot.completion_fence <= completed {
                slot.state = SlotState::Idle;
            }
        }
    }

    fn check_lost(&self) -> Result<()> {
        match &self.lost {
            Some(err) => Err(err.clone().into()),
            None => Ok(()),
        }
    }

    /// 记录设备错误并毒化环
    fn poison_on_device_error<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(FrameRingError::Device(err)) = &result {
            crate::ring_error!(error = %err, "Device lost; frame ring must be recreated");
            self.lost = Some(err.clone());
            self.open = None;
        }
        result
    }
}

impl<Q: CommandQueue> Drop for FrameRing<Q> {
    fn drop(&mut self) {
        if self.lost.is_some() || self.flushed || self.sync.current_value().is_zero() {
            return;
        }
        if let Err(e) = self.sync.flush() {
            warn!(error = %e, "Failed to flush frame ring on drop");
        }
    }
}
