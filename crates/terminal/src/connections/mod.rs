//! 连接模块
//!
//! 提供两种终端传输的统一抽象：本地 PTY 和 SSH 远程 Shell。
//!
//! ## 模块结构
//! - `session_config` - 会话配置与校验
//! - `local_pty` - 本地 PTY 连接
//! - `ssh_connection` - SSH 远程连接
//!
//! 两种传输统一为 `ChannelAdapter` 和类型（写入/调整尺寸/终止语义一致），
//! 输出以无界通道的 `ChannelMsg` 流交付，不保证分块边界。

pub mod local_pty;
pub mod session_config;
pub mod ssh_connection;

pub use local_pty::LocalPty;
pub use session_config::{SessionConfig, TransportKind, DEFAULT_COLS, DEFAULT_ROWS};
pub use ssh_connection::{SSHOpts, SshShellProc, DEFAULT_SSH_PORT, SSH_CONNECT_TIMEOUT};

use crate::error::TerminalError;
use crate::events::ExitStatus;

/// 传输输出流消息
#[derive(Debug)]
pub enum ChannelMsg {
    /// 原始输出分块（任意切分）
    Data(Vec<u8>),
    /// SFTP 子通道就绪（仅远程）
    SftpReady,
    /// 传输退出
    Exit(ExitStatus),
}

/// 传输适配器和类型
///
/// 每个实例由且仅由一个会话核心独占持有。
pub enum ChannelAdapter {
    /// 本地 PTY 进程
    Local(LocalPty),
    /// SSH 远程 Shell
    Remote(SshShellProc),
}

impl ChannelAdapter {
    /// 写入输入字节
    pub fn write(&self, bytes: &[u8]) -> Result<(), TerminalError> {
        match self {
            Self::Local(pty) => pty.write(bytes),
            Self::Remote(ssh) => ssh.write(bytes),
        }
    }

    /// 调整终端尺寸
    pub fn resize(&self, cols: u16, rows: u16) -> Result<(), TerminalError> {
        match self {
            Self::Local(pty) => pty.resize(cols, rows),
            Self::Remote(ssh) => ssh.resize(cols, rows),
        }
    }

    /// 终止传输并释放底层资源
    ///
    /// 幂等；不等待对端确认。
    pub fn kill(&self) {
        match self {
            Self::Local(pty) => pty.kill(),
            Self::Remote(ssh) => ssh.kill(),
        }
    }

    /// 注入写入使用的行结束符
    ///
    /// 本地 PTY 用 LF；远程 Shell 沿用上游习惯的 CRLF。
    pub fn line_ending(&self) -> &'static [u8] {
        match self {
            Self::Local(_) => b"\n",
            Self::Remote(_) => b"\r\n",
        }
    }
}
