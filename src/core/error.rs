//! 错误处理模块
//!
//! 定义了帧资源环中使用的统一错误类型。
//!
//! # 错误分类
//!
//! - **设备丢失**（`DeviceError`）：提交或创建调用失败，致命且不可重试，
//!   必须向上传播，由调用方销毁并重建设备及全部资源
//! - **误用**（`MisuseError`）：违反前置条件，在构造或入口处检查，从不静默忽略
//! - **容量耗尽**（`CapacityError`）：环、常量缓冲区或描述符堆超出容量，
//!   固定大小，不动态扩展

use std::fmt;

/// 统一的 Result 类型
///
/// 所有可能返回错误的函数都应该使用这个类型。
pub type Result<T> = std::result::Result<T, FrameRingError>;

/// frame_ring 的错误类型
#[derive(Debug)]
pub enum FrameRingError {
    /// 配置错误
    Config(ConfigError),

    /// 设备错误（设备丢失、提交失败）
    Device(DeviceError),

    /// 调用方违反前置条件
    Misuse(MisuseError),

    /// 容量耗尽
    Capacity(CapacityError),

    /// IO 错误
    Io(std::io::Error),

    /// 日志系统错误
    Log(String),

    /// 场景资源错误（注册表查找、重复注册）
    Asset(String),
}

/// 配置相关的错误
#[derive(Debug)]
pub enum ConfigError {
    /// 配置文件未找到
    FileNotFound(String),

    /// 配置文件解析失败
    ParseError(String),

    /// 配置值无效
    InvalidValue { field: String, reason: String },
}

/// 设备相关的错误
///
/// 任何一种都意味着设备已不可用。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// 设备丢失
    DeviceLost(String),

    /// 命令提交失败
    SubmissionFailed(String),

    /// 显存或上传堆耗尽
    OutOfMemory(String),
}

/// 调用方误用
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MisuseError {
    /// 常量缓冲区步长未按最小对齐要求对齐
    MisalignedStride { stride: u64, alignment: u64 },

    /// 对齐值不是 2 的幂或小于硬件最小值
    InvalidAlignment(u64),

    /// 已有一帧处于 CPU 录制状态时再次调用 begin_frame
    FrameAlreadyOpen(usize),

    /// 没有打开的帧
    NoFrameOpen,

    /// end_frame 的槽位与当前打开的槽位不一致
    SlotMismatch { expected: usize, got: usize },

    /// 在 GPU 仍可能读取时复用槽位
    SlotInFlight { slot: usize, fence: u64, completed: u64 },

    /// 区域仍处于映射状态
    RegionMapped(String),

    /// 命令分配器状态不允许该操作
    InvalidCommandState { operation: &'static str, state: String },

    /// 环大小无效
    InvalidFrameCount(usize),

    /// 描述符重复释放或越界
    InvalidDescriptor(u32),

    /// 等待一个从未 signal 过的 Fence 值（会永久阻塞）
    FenceNotSignaled { value: u64, current: u64 },
}

/// 容量相关的错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapacityError {
    /// 常量缓冲区记录索引越界
    ArenaIndex { region: String, index: usize, capacity: usize },

    /// 单条记录超过步长
    RecordTooLarge { size: usize, stride: u64 },

    /// 描述符堆耗尽
    DescriptorHeap { kind: &'static str, capacity: u32 },
}

impl fmt::Display for FrameRingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameRingError::Config(e) => write!(f, "Configuration error: {}", e),
            FrameRingError::Device(e) => write!(f, "Device error: {}", e),
            FrameRingError::Misuse(e) => write!(f, "Misuse: {}", e),
            FrameRingError::Capacity(e) => write!(f, "Capacity exceeded: {}", e),
            FrameRingError::Io(e) => write!(f, "IO error: {}", e),
            FrameRingError::Log(msg) => write!(f, "Log error: {}", msg),
            FrameRingError::Asset(msg) => write!(f, "Asset error: {}", msg),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {}", path),
            ConfigError::ParseError(msg) => write!(f, "Failed to parse config: {}", msg),
            ConfigError::InvalidValue { field, reason } => {
                write!(f, "Invalid value for '{}': {}", field, reason)
            }
        }
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::DeviceLost(msg) => write!(f, "Device lost: {}", msg),
            DeviceError::SubmissionFailed(msg) => write!(f, "Submission failed: {}", msg),
            DeviceError::OutOfMemory(msg) => write!(f, "Out of memory: {}", msg),
        }
    }
}

impl fmt::Display for MisuseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MisuseError::MisalignedStride { stride, alignment } => write!(
                f,
                "Stride {} is not a multiple of the constant buffer alignment {}",
                stride, alignment
            ),
            MisuseError::InvalidAlignment(alignment) => {
                write!(f, "Invalid constant buffer alignment: {}", alignment)
            }
            MisuseError::FrameAlreadyOpen(slot) => {
                write!(f, "Frame slot {} is still being recorded", slot)
            }
            MisuseError::NoFrameOpen => write!(f, "No frame is open"),
            MisuseError::SlotMismatch { expected, got } => write!(
                f,
                "end_frame called for slot {} but slot {} is open",
                got, expected
            ),
            MisuseError::SlotInFlight { slot, fence, completed } => write!(
                f,
                "Slot {} reused while in flight (fence {}, completed {})",
                slot, fence, completed
            ),
            MisuseError::RegionMapped(name) => write!(f, "Region '{}' is still mapped", name),
            MisuseError::InvalidCommandState { operation, state } => {
                write!(f, "Cannot {} a command allocator in state {}", operation, state)
            }
            MisuseError::InvalidFrameCount(count) => {
                write!(f, "Frame ring needs at least 2 slots, got {}", count)
            }
            MisuseError::InvalidDescriptor(index) => {
                write!(f, "Descriptor index {} is not allocated", index)
            }
            MisuseError::FenceNotSignaled { value, current } => write!(
                f,
                "Waiting for fence value {} which was never signaled (last signaled {})",
                value, current
            ),
        }
    }
}

impl fmt::Display for CapacityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapacityError::ArenaIndex { region, index, capacity } => write!(
                f,
                "Record index {} out of range for region '{}' (capacity {})",
                index, region, capacity
            ),
            CapacityError::RecordTooLarge { size, stride } => {
                write!(f, "Record of {} bytes does not fit stride {}", size, stride)
            }
            CapacityError::DescriptorHeap { kind, capacity } => {
                write!(f, "{} descriptor heap exhausted (capacity {})", kind, capacity)
            }
        }
    }
}

impl std::error::Error for FrameRingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FrameRingError::Io(e) => Some(e),
            FrameRingError::Config(e) => Some(e),
            FrameRingError::Device(e) => Some(e),
            FrameRingError::Misuse(e) => Some(e),
            FrameRingError::Capacity(e) => Some(e),
            _ => None,
        }
    }
}

impl std::error::Error for ConfigError {}
impl std::error::Error for DeviceError {}
impl std::error::Error for MisuseError {}
impl std::error::Error for CapacityError {}

impl FrameRingError {
    /// 是否为设备丢失类错误（需要重建设备）
    pub fn is_device_lost(&self) -> bool {
        matches!(self, FrameRingError::Device(_))
    }
}

impl From<std::io::Error> for FrameRingError {
    fn from(err: std::io::Error) -> Self {
        FrameRingError::Io(err)
    }
}

impl From<ConfigError> for FrameRingError {
    fn from(err: ConfigError) -> Self {
        FrameRingError::Config(err)
    }
}

impl From<DeviceError> for FrameRingError {
    fn from(err: DeviceError) -> Self {
        FrameRingError::Device(err)
    }
}

impl From<MisuseError> for FrameRingError {
    fn from(err: MisuseError) -> Self {
        FrameRingError::Misuse(err)
    }
}

impl From<CapacityError> for FrameRingError {
    fn from(err: CapacityError) -> Self {
        FrameRingError::Capacity(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_lost_classification() {
        let err: FrameRingError = DeviceError::DeviceLost("hung".to_string()).into();
        assert!(err.is_device_lost());

        let err: FrameRingError = MisuseError::NoFrameOpen.into();
        assert!(!err.is_device_lost());
    }

    #[test]
    fn test_error_messages() {
        let err: FrameRingError = MisuseError::MisalignedStride { stride: 100, alignment: 256 }.into();
        assert_eq!(
            err.to_string(),
            "Misuse: Stride 100 is not a multiple of the constant buffer alignment 256"
        );

        let err: FrameRingError = CapacityError::ArenaIndex {
            region: "object".to_string(),
            index: 8,
            capacity: 8,
        }
        .into();
        assert!(err.to_string().contains("capacity 8"));
    }
}
