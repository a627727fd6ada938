//! 命令录制模块
//!
//! 每个帧资源持有一个 `CommandAllocator`（对应 DX12 的 CommandAllocator +
//! CommandList 组合）。分配器只有在 GPU 确认读完之后才能重置，这一点由
//! 帧资源环保证；分配器自身只负责录制状态机。
//!
//! # 状态机
//!
//! ```text
//! Initial ──reset──▶ Recording ──close──▶ Closed ──submit──▶ Pending
//!    ▲                                                          │
//!    └──────────────────────── reset ◀──────────────────────────┘
//! ```

use crate::core::error::{MisuseError, Result};

/// 录制的命令
///
/// 常量缓冲区绑定携带区域内的字节偏移和分配到的 CBV 描述符索引。
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// 绑定帧常量（根参数：pass）
    SetPassConstants { offset: u64, descriptor: u32 },
    /// 绑定光源常量
    SetLightConstants { offset: u64, descriptor: u32, count: u32 },
    /// 绘制一个对象
    DrawObject {
        object_index: usize,
        offset: u64,
        descriptor: u32,
        mesh: u32,
        index_count: u32,
    },
    /// 以实例方式绘制粒子
    DrawParticles { instance_count: u32 },
}

/// 命令分配器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandAllocatorState {
    /// 初始状态
    Initial,
    /// 正在记录
    Recording,
    /// 已完成记录
    Closed,
    /// 已提交，GPU 可能仍在读取
    Pending,
}

/// 已关闭、可提交的命令列表
#[derive(Debug, Clone, PartialEq)]
pub struct CommandList {
    slot: usize,
    commands: Vec<Command>,
}

impl CommandList {
    /// 录制该列表的帧槽位
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// 命令
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// 绘制调用数量
    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, Command::DrawObject { .. } | Command::DrawParticles { .. }))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// 命令分配器
#[derive(Debug)]
pub struct CommandAllocator {
    slot: usize,
    state: CommandAllocatorState,
    commands: Vec<Command>,
    reset_count: u64,
}

impl CommandAllocator {
    /// 为指定帧槽位创建分配器
    pub fn new(slot: usize) -> Self {
        Self {
            slot,
            state: CommandAllocatorState::Initial,
            commands: Vec::new(),
            reset_count: 0,
        }
    }

    /// 当前状态
    pub fn state(&self) -> CommandAllocatorState {
        self.state
    }

    /// 重置次数
    pub fn reset_count(&self) -> u64 {
        self.reset_count
    }

    /// 重置并开始录制
    ///
    /// 调用方必须保证 GPU 已经不再使用上一次提交的命令。
    pub fn reset(&mut self) -> Result<()> {
        if self.state == CommandAllocatorState::Recording {
            return Err(self.invalid("reset"));
        }
        self.commands.clear();
        self.state = CommandAllocatorState::Recording;
        self.reset_count += 1;
        Ok(())
    }

    /// 录制一条命令
    pub fn record(&mut self, command: Command) -> Result<()> {
        if self.state != CommandAllocatorState::Recording {
            return Err(self.invalid("record into"));
        }
        self.commands.push(command);
        Ok(())
    }

    /// 结束录制，得到可提交的命令列表
    pub fn close(&mut self) -> Result<CommandList> {
        if self.state != CommandAllocatorState::Recording {
            return Err(self.invalid("close"));
        }
        self.state = CommandAllocatorState::Closed;
        Ok(CommandList {
            slot: self.slot,
            commands: std::mem::take(&mut self.commands),
        })
    }

    /// 标记已提交
    pub fn mark_submitted(&mut self) -> Result<()> {
        if self.state != CommandAllocatorState::Closed {
            return Err(self.invalid("submit"));
        }
        self.state = CommandAllocatorState::Pending;
        Ok(())
    }

    /// 已录制的命令数量
    pub fn recorded(&self) -> usize {
        self.commands.len()
    }

    fn invalid(&self, operation: &'static str) -> crate::core::FrameRingError {
        MisuseError::InvalidCommandState {
            operation,
            state: format!("{:?}", self.state),
        }
        .into()
    }
}
