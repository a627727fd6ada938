//! 配置管理模块
//!
//! 提供帧资源环配置的加载、解析和管理功能。
//! 支持从 TOML 配置文件加载，也支持命令行参数覆盖。
//!
//! # 配置文件格式 (config.toml)
//!
//! ```toml
//! [frame]
//! frame_count = 3        # 帧资源数量（>= 2）
//! frames_to_run = 120
//!
//! [constant_buffer]
//! alignment = 256        # 常量缓冲区最小对齐
//! max_objects = 64
//! max_lights = 4
//!
//! [gpu]
//! latency_ms = 4         # 模拟 GPU 每帧的执行时间
//! frame_time_ms = 2      # 模拟 CPU 每帧的录制时间
//!
//! [logging]
//! level = "info"         # trace, debug, info, warn, error
//! file_output = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::error::{ConfigError, Result};

/// D3D12 常量缓冲区要求的最小对齐（字节）
pub const MIN_CONSTANT_BUFFER_ALIGNMENT: u64 = 256;

/// 配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// 帧资源环配置
    #[serde(default)]
    pub frame: FrameConfig,

    /// 常量缓冲区配置
    #[serde(default)]
    pub constant_buffer: ConstantBufferConfig,

    /// 模拟 GPU 配置
    #[serde(default)]
    pub gpu: GpuConfig,

    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 帧资源环配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameConfig {
    /// 帧资源数量（环大小）
    #[serde(default = "default_frame_count")]
    pub frame_count: usize,

    /// 演示程序运行的帧数
    #[serde(default = "default_frames_to_run")]
    pub frames_to_run: u64,
}

/// 常量缓冲区配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstantBufferConfig {
    /// 步长对齐（必须是 256 的倍数）
    #[serde(default = "default_alignment")]
    pub alignment: u64,

    /// 每帧最多的对象常量记录数
    #[serde(default = "default_max_objects")]
    pub max_objects: usize,

    /// 每帧最多的光源常量记录数
    #[serde(default = "default_max_lights")]
    pub max_lights: usize,
}

/// 模拟 GPU 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpuConfig {
    /// GPU 执行一帧命令所需时间（毫秒）
    #[serde(default = "default_latency_ms")]
    pub latency_ms: u64,

    /// CPU 录制一帧所需时间（毫秒）
    #[serde(default = "default_frame_time_ms")]
    pub frame_time_ms: u64,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// 是否输出到文件
    #[serde(default = "default_file_output")]
    pub file_output: bool,

    /// 日志文件路径
    #[serde(default = "default_log_file")]
    pub log_file: String,
}

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

// 默认值函数
fn default_frame_count() -> usize { 3 }
fn default_frames_to_run() -> u64 { 120 }
fn default_alignment() -> u64 { MIN_CONSTANT_BUFFER_ALIGNMENT }
fn default_max_objects() -> usize { 64 }
fn default_max_lights() -> usize { 4 }
fn default_latency_ms() -> u64 { 4 }
fn default_frame_time_ms() -> u64 { 2 }
fn default_log_level() -> LogLevel { LogLevel::Info }
fn default_file_output() -> bool { false }
fn default_log_file() -> String { "frame_ring.log".to_string() }

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            frame_count: default_frame_count(),
            frames_to_run: default_frames_to_run(),
        }
    }
}

impl Default for ConstantBufferConfig {
    fn default() -> Self {
        Self {
            alignment: default_alignment(),
            max_objects: default_max_objects(),
            max_lights: default_max_lights(),
        }
    }
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            latency_ms: default_latency_ms(),
            frame_time_ms: default_frame_time_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_output: default_file_output(),
            log_file: default_log_file(),
        }
    }
}

impl Config {
    /// 从配置文件加载
    ///
    /// # 参数
    ///
    /// * `path` - 配置文件路径
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();

        let contents = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path_str.clone()))?;

        toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(e.to_string()).into())
    }

    /// 从配置文件加载，如果文件不存在则使用默认配置
    pub fn from_file_or_default<P: AsRef<Path>>(path: P) -> Self {
        Self::from_file(path).unwrap_or_default()
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        std::fs::write(path, contents)?;
        Ok(())
    }

    /// 从命令行参数覆盖配置
    ///
    /// 支持的参数：
    /// - `--frames <value>`: 运行帧数
    /// - `--frame-count <value>`: 帧资源数量
    /// - `--latency-ms <value>`: 模拟 GPU 延迟
    /// - `--log-level <value>`: 日志级别
    pub fn apply_args<I>(&mut self, args: I)
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let args: Vec<String> = args.into_iter().map(|s| s.as_ref().to_string()).collect();

        let value_of = |flag: &str| -> Option<&String> {
            args.iter()
                .position(|a| a == flag)
                .and_then(|idx| args.get(idx + 1))
        };

        if let Some(frames) = value_of("--frames").and_then(|v| v.parse().ok()) {
            self.frame.frames_to_run = frames;
        }

        if let Some(count) = value_of("--frame-count").and_then(|v| v.parse().ok()) {
            self.frame.frame_count = count;
        }

        if let Some(latency) = value_of("--latency-ms").and_then(|v| v.parse().ok()) {
            self.gpu.latency_ms = latency;
        }

        if let Some(level) = value_of("--log-level").and_then(|v| LogLevel::parse(v)) {
            self.logging.level = level;
        }
    }

    /// 验证配置的有效性
    pub fn validate(&self) -> Result<()> {
        if self.frame.frame_count < 2 {
            return Err(ConfigError::InvalidValue {
                field: "frame.frame_count".to_string(),
                reason: "At least 2 frame resources are required".to_string(),
            }.into());
        }

        let alignment = self.constant_buffer.alignment;
        if !alignment.is_power_of_two() || alignment % MIN_CONSTANT_BUFFER_ALIGNMENT != 0 {
            return Err(ConfigError::InvalidValue {
                field: "constant_buffer.alignment".to_string(),
                reason: format!("Alignment must be a power of two and a multiple of {}", MIN_CONSTANT_BUFFER_ALIGNMENT),
            }.into());
        }

        if self.constant_buffer.max_objects == 0 {
            return Err(ConfigError::InvalidValue {
                field: "constant_buffer.max_objects".to_string(),
                reason: "At least one object record is required".to_string(),
            }.into());
        }

        Ok(())
    }
}

impl LogLevel {
    /// 从字符串解析日志级别
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.frame.frame_count, 3);
        assert_eq!(config.constant_buffer.alignment, 256);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.frame.frame_count = 1;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.constant_buffer.alignment = 128;
        assert!(config.validate().is_err());

        config.constant_buffer.alignment = 768;
        assert!(config.validate().is_err());

        config.constant_buffer.alignment = 512;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_apply_args() {
        let mut config = Config::default();
        config.apply_args(["frame_ring", "--frames", "10", "--frame-count", "2", "--latency-ms", "7"]);
        assert_eq!(config.frame.frames_to_run, 10);
        assert_eq!(config.frame.frame_count, 2);
        assert_eq!(config.gpu.latency_ms, 7);

        // 无法解析的值保持原样
        config.apply_args(["--frames", "many"]);
        assert_eq!(config.frame.frames_to_run, 10);
    }

    #[test]
    fn test_partial_toml() {
        let config: Config = toml::from_str("[frame]\nframe_count = 2\n").unwrap();
        assert_eq!(config.frame.frame_count, 2);
        assert_eq!(config.frame.frames_to_run, 120);
        assert_eq!(config.logging.level, LogLevel::Info);
    }
}
