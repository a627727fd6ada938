//! 描述符堆模块
//!
//! 为每个帧资源的常量缓冲区记录分配 CBV 描述符。
//!
//! 分配优先复用空闲列表中的索引，之后才线性增长；释放的描述符回到空闲列表，
//! 因此长时间运行（反复重建帧资源）不会耗尽堆。容量固定，耗尽即报错。

use crate::core::error::{CapacityError, MisuseError, Result};

/// 描述符类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorType {
    /// 常量缓冲视图 (CBV)
    ConstantBufferView,
    /// 着色资源视图 (SRV)
    ShaderResourceView,
    /// 采样器
    Sampler,
}

impl DescriptorType {
    /// 获取描述符类型名称
    pub fn name(&self) -> &'static str {
        match self {
            DescriptorType::ConstantBufferView => "CBV",
            DescriptorType::ShaderResourceView => "SRV",
            DescriptorType::Sampler => "Sampler",
        }
    }
}

/// 描述符句柄（CPU + GPU）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorHandle {
    /// 堆内索引
    pub index: u32,
    /// CPU 句柄指针值
    pub cpu: usize,
    /// GPU 句柄指针值
    pub gpu: u64,
}

/// 描述符堆
#[derive(Debug)]
pub struct DescriptorHeap {
    descriptor_type: DescriptorType,
    capacity: u32,
    increment_size: u32,
    cpu_base: usize,
    gpu_base: u64,
    /// 下一个从未分配过的索引
    next: u32,
    free_list: Vec<u32>,
    allocated: Vec<bool>,
    used: u32,
    high_water: u32,
}

impl DescriptorHeap {
    /// 创建新的描述符堆
    pub fn new(descriptor_type: DescriptorType, capacity: u32, increment_size: u32) -> Self {
        Self {
            descriptor_type,
            capacity,
            increment_size,
            cpu_base: 0x1000,
            gpu_base: 0x1_0000_0000,
            next: 0,
            free_list: Vec::new(),
            allocated: vec![false; capacity as usize],
            used: 0,
            high_water: 0,
        }
    }

    /// 创建 CBV 堆（D3D12 典型增量 32 字节）
    pub fn cbv(capacity: u32) -> Self {
        Self::new(DescriptorType::ConstantBufferView, capacity, 32)
    }

    /// 分配一个描述符
    pub fn allocate(&mut self) -> Result<DescriptorHandle> {
        let index = match self.free_list.pop() {
            Some(index) => index,
            None if self.next < self.capacity => {
                let index = self.next;
                self.next += 1;
                index
            }
            None => {
                return Err(CapacityError::DescriptorHeap {
                    kind: self.descriptor_type.name(),
                    capacity: self.capacity,
                }.into());
            }
        };

        self.allocated[index as usize] = true;
        self.used += 1;
        self.high_water = self.high_water.max(self.used);
        Ok(self.handle(index))
    }

    /// 释放描述符
    pub fn free(&mut self, index: u32) -> Result<()> {
        match self.allocated.get_mut(index as usize) {
            Some(slot) if *slot => {
                *slot = false;
                self.used -= 1;
                self.free_list.push(index);
                Ok(())
            }
            _ => Err(MisuseError::InvalidDescriptor(index).into()),
        }
    }

    /// 根据索引计算句柄
    pub fn handle(&self, index: u32) -> DescriptorHandle {
        DescriptorHandle {
            index,
            cpu: self.cpu_base + (index as usize) * (self.increment_size as usize),
            gpu: self.gpu_base + (index as u64) * (self.increment_size as u64),
        }
    }

    /// 当前已使用数量
    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn descriptor_type(&self) -> DescriptorType {
        self.descriptor_type
    }

    /// 统计信息
    pub fn stats(&self) -> DescriptorHeapStats {
        DescriptorHeapStats {
            descriptor_type: self.descriptor_type,
            capacity: self.capacity,
            used: self.used,
            high_water: self.high_water,
        }
    }
}

/// 描述符堆统计信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorHeapStats {
    pub descriptor_type: DescriptorType,
    pub capacity: u32,
    pub used: u32,
    /// 历史最高使用量
    pub high_water: u32,
}

impl DescriptorHeapStats {
    /// 使用率（百分比）
    pub fn usage_percent(&self) -> f32 {
        if self.capacity == 0 {
            0.0
        } else {
            (self.used as f32 / self.capacity as f32) * 100.0
        }
    }
}
