//! 上传缓冲区模块
//!
//! CPU 可写、GPU 可读的上传内存区域，按固定步长存放同一类型的记录。
//! 对应 DX12 中 upload heap 上的常量缓冲区（`UploadBuffer<T>`）。
//!
//! # 设计原则
//!
//! - **构造时检查对齐**：常量缓冲区步长必须是 256 字节的倍数，错误在创建时报告
//! - **作用域映射**：写入只能通过 [`MappedRegion`] 进行，守卫析构时自动 unmap，
//!   包括错误路径和 panic 展开
//! - **类型安全**：记录类型必须是 `Pod`，直接按字节拷贝
//!
//! 底层内存用 `Vec<u8>` 模拟；测试中可以用 [`UploadBuffer::read_record`]
//! 代替 GPU 读回数据。

use bytemuck::Pod;
use std::marker::PhantomData;

use crate::core::config::MIN_CONSTANT_BUFFER_ALIGNMENT;
use crate::core::error::{CapacityError, MisuseError, Result};

/// 缓冲区使用类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsageType {
    /// 常量缓冲区（需要 256 字节对齐）
    Constant,
    /// 顶点/实例缓冲区（紧密排列）
    Vertex,
}

/// 计算按 `alignment` 向上取整后的大小
///
/// `alignment` 必须是 2 的幂。
pub fn align_up(size: u64, alignment: u64) -> u64 {
    (size + alignment - 1) & !(alignment - 1)
}

/// 常量缓冲区的字节大小（向上取整到 256）
pub fn calc_constant_buffer_byte_size(size: u64) -> u64 {
    align_up(size, MIN_CONSTANT_BUFFER_ALIGNMENT)
}

/// 上传缓冲区
///
/// # 类型参数
///
/// * `T` - 缓冲区中存储的记录类型
///
/// # 示例
///
/// ```
/// use frame_ring::renderer::resource::UploadBuffer;
///
/// let mut buffer = UploadBuffer::<[f32; 4]>::constant("tint", 4, 256)?;
/// {
///     let mut mapped = buffer.map()?;
///     mapped.copy_record(2, &[1.0, 0.5, 0.25, 1.0])?;
/// }
/// assert_eq!(buffer.read_as(2)?, [1.0, 0.5, 0.25, 1.0]);
/// # Ok::<(), frame_ring::core::FrameRingError>(())
/// ```
#[derive(Debug)]
pub struct UploadBuffer<T: Pod> {
    /// 调试名称
    name: String,
    /// 记录数量
    element_count: usize,
    /// 每条记录占用的字节数（对齐后）
    stride: u64,
    /// 使用类型
    usage: BufferUsageType,
    /// 模拟的上传堆内存
    storage: Vec<u8>,
    /// 是否处于映射状态
    mapped: bool,
    _phantom: PhantomData<T>,
}

impl<T: Pod> UploadBuffer<T> {
    /// 创建常量缓冲区，步长按 `alignment` 向上取整
    ///
    /// `alignment` 必须是 2 的幂且是 256 的倍数。
    pub fn constant(name: impl Into<String>, element_count: usize, alignment: u64) -> Result<Self> {
        if !alignment.is_power_of_two() || alignment % MIN_CONSTANT_BUFFER_ALIGNMENT != 0 {
            return Err(MisuseError::InvalidAlignment(alignment).into());
        }
        let stride = align_up(std::mem::size_of::<T>() as u64, alignment);
        Self::with_stride(name, element_count, stride, BufferUsageType::Constant)
    }

    /// 创建紧密排列的顶点/实例缓冲区
    pub fn vertex(name: impl Into<String>, element_count: usize) -> Result<Self> {
        let stride = std::mem::size_of::<T>() as u64;
        Self::with_stride(name, element_count, stride, BufferUsageType::Vertex)
    }

    /// 使用显式步长创建
    ///
    /// 常量缓冲区的步长必须是 256 的倍数，且不小于记录大小。
    pub fn with_stride(
        name: impl Into<String>,
        element_count: usize,
        stride: u64,
        usage: BufferUsageType,
    ) -> Result<Self> {
        let record_size = std::mem::size_of::<T>();
        if usage == BufferUsageType::Constant
            && (stride == 0 || stride % MIN_CONSTANT_BUFFER_ALIGNMENT != 0)
        {
            return Err(MisuseError::MisalignedStride {
                stride,
                alignment: MIN_CONSTANT_BUFFER_ALIGNMENT,
            }.into());
        }
        if (record_size as u64) > stride {
            return Err(CapacityError::RecordTooLarge { size: record_size, stride }.into());
        }

        let total_size = stride as usize * element_count;
        Ok(Self {
            name: name.into(),
            element_count,
            stride,
            usage,
            storage: vec![0u8; total_size],
            mapped: false,
            _phantom: PhantomData,
        })
    }

    /// 映射内存供 CPU 写入
    ///
    /// 返回的守卫析构时自动 unmap。
    pub fn map(&mut self) -> Result<MappedRegion<'_, T>> {
        if self.mapped {
            return Err(MisuseError::RegionMapped(self.name.clone()).into());
        }
        self.mapped = true;
        Ok(MappedRegion { buffer: self })
    }

    /// 读取一条记录的原始字节（模拟 GPU 读取）
    ///
    /// 区域处于映射状态时不可读取。
    pub fn read_record(&self, index: usize) -> Result<&[u8]> {
        if self.mapped {
            return Err(MisuseError::RegionMapped(self.name.clone()).into());
        }
        let offset = self.element_offset(index)? as usize;
        Ok(&self.storage[offset..offset + std::mem::size_of::<T>()])
    }

    /// 读取一条记录并按 `T` 解释
    pub fn read_as(&self, index: usize) -> Result<T> {
        Ok(bytemuck::pod_read_unaligned(self.read_record(index)?))
    }

    /// 记录在缓冲区中的字节偏移
    pub fn element_offset(&self, index: usize) -> Result<u64> {
        if index >= self.element_count {
            return Err(CapacityError::ArenaIndex {
                region: self.name.clone(),
                index,
                capacity: self.element_count,
            }.into());
        }
        Ok(self.stride * index as u64)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 记录容量
    pub fn element_count(&self) -> usize {
        self.element_count
    }

    /// 对齐后的步长
    pub fn stride(&self) -> u64 {
        self.stride
    }

    /// 总大小
    pub fn total_size(&self) -> u64 {
        self.storage.len() as u64
    }

    pub fn usage(&self) -> BufferUsageType {
        self.usage
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped
    }
}

/// 映射中的上传区域
///
/// 持有缓冲区的独占借用，因此同一时刻只有一个写入者。
pub struct MappedRegion<'a, T: Pod> {
    buffer: &'a mut UploadBuffer<T>,
}

impl<'a, T: Pod> MappedRegion<'a, T> {
    /// 写入一条记录到 `index * stride`
    pub fn copy_record(&mut self, index: usize, record: &T) -> Result<()> {
        self.copy_bytes(index, bytemuck::bytes_of(record))
    }

    /// 写入原始字节，长度不能超过步长
    pub fn copy_bytes(&mut self, index: usize, bytes: &[u8]) -> Result<()> {
        let offset = self.buffer.element_offset(index)? as usize;
        if bytes.len() as u64 > self.buffer.stride {
            return Err(CapacityError::RecordTooLarge {
                size: bytes.len(),
                stride: self.buffer.stride,
            }.into());
        }
        self.buffer.storage[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// 记录容量
    pub fn capacity(&self) -> usize {
        self.buffer.element_count
    }

    /// 记录的字节偏移
    pub fn element_offset(&self, index: usize) -> Result<u64> {
        self.buffer.element_offset(index)
    }

    /// 显式 unmap
    pub fn unmap(self) {}
}

impl<T: Pod> Drop for MappedRegion<'_, T> {
    fn drop(&mut self) {
        self.buffer.mapped = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytemuck::Zeroable;

    #[repr(C)]
    #[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
    struct TestData {
        value: f32,
        id: u32,
    }

    #[test]
    fn test_constant_buffer_alignment() {
        assert_eq!(calc_constant_buffer_byte_size(100), 256);
        assert_eq!(calc_constant_buffer_byte_size(256), 256);
        assert_eq!(calc_constant_buffer_byte_size(300), 512);
    }

    #[test]
    fn test_upload_buffer_sizing() {
        let buffer = UploadBuffer::<TestData>::constant("test", 10, 256).unwrap();
        assert_eq!(buffer.element_count(), 10);
        assert_eq!(buffer.stride(), 256);
        assert_eq!(buffer.total_size(), 2560);

        let buffer = UploadBuffer::<TestData>::vertex("instances", 10).unwrap();
        assert_eq!(buffer.stride(), 8);
        assert_eq!(buffer.total_size(), 80);
    }

    #[test]
    fn test_misaligned_stride_rejected() {
        let err = UploadBuffer::<TestData>::with_stride("bad", 4, 100, BufferUsageType::Constant)
            .unwrap_err();
        assert!(matches!(
            err,
            crate::core::FrameRingError::Misuse(MisuseError::MisalignedStride { stride: 100, alignment: 256 })
        ));

        assert!(UploadBuffer::<TestData>::constant("bad", 4, 128).is_err());
        assert!(UploadBuffer::<TestData>::constant("bad", 4, 768).is_err());
        assert!(UploadBuffer::<TestData>::constant("ok", 4, 512).is_ok());
    }

    #[test]
    fn test_record_larger_than_stride() {
        let err = UploadBuffer::<[u8; 512]>::with_stride("big", 1, 256, BufferUsageType::Constant)
            .unwrap_err();
        assert!(matches!(err, crate::core::FrameRingError::Capacity(_)));
    }

    #[test]
    fn test_copy_record_round_trip() {
        let mut buffer = UploadBuffer::<TestData>::constant("objects", 4, 256).unwrap();
        {
            let mut mapped = buffer.map().unwrap();
            mapped.copy_record(0, &TestData { value: 1.5, id: 7 }).unwrap();
            mapped.copy_record(3, &TestData { value: -2.0, id: 9 }).unwrap();
        }

        assert_eq!(buffer.read_as(0).unwrap(), TestData { value: 1.5, id: 7 });
        assert_eq!(buffer.read_as(3).unwrap(), TestData { value: -2.0, id: 9 });
        // 未写入的记录保持为零
        assert_eq!(buffer.read_as(1).unwrap(), TestData::zeroed());
        assert_eq!(buffer.element_offset(3).unwrap(), 768);
    }

    #[test]
    fn test_copy_record_out_of_range() {
        let mut buffer = UploadBuffer::<TestData>::constant("objects", 2, 256).unwrap();
        let mut mapped = buffer.map().unwrap();
        let err = mapped.copy_record(2, &TestData::zeroed()).unwrap_err();
        assert!(matches!(err, crate::core::FrameRingError::Capacity(CapacityError::ArenaIndex { index: 2, capacity: 2, .. })));
    }

    #[test]
    fn test_unmapped_on_every_exit_path() {
        let mut buffer = UploadBuffer::<TestData>::constant("objects", 1, 256).unwrap();

        let write = |buffer: &mut UploadBuffer<TestData>| -> Result<()> {
            let mut mapped = buffer.map()?;
            mapped.copy_record(5, &TestData::zeroed())?;
            mapped.unmap();
            Ok(())
        };
        assert!(write(&mut buffer).is_err());
        assert!(!buffer.is_mapped());

        let mapped = buffer.map().unwrap();
        mapped.unmap();
        assert!(!buffer.is_mapped());
        assert!(buffer.read_record(0).is_ok());
    }

    #[test]
    fn test_read_while_mapped_rejected() {
        let mut buffer = UploadBuffer::<TestData>::constant("objects", 1, 256).unwrap();
        let mapped = buffer.map().unwrap();
        std::mem::forget(mapped);
        assert!(buffer.is_mapped());
        assert!(buffer.read_record(0).is_err());
        assert!(buffer.map().is_err());
    }
}
