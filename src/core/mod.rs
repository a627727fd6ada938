//! 核心功能模块
//!
//! 本模块提供日志系统、配置管理、错误处理和数学类型。
//! 这些模块独立于帧资源环，可以在任何上层模块中使用。
//!
//! # 模块组织
//!
//! - `log`：日志系统，提供结构化的日志记录功能
//! - `config`：配置管理，支持从配置文件加载设置
//! - `error`：错误处理，定义统一的错误类型
//! - `math`：nalgebra 类型别名

pub mod log;
pub mod config;
pub mod error;
pub mod math;

// 重新导出常用类型，方便使用
pub use error::{Result, FrameRingError};
pub use config::Config;
