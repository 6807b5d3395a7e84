//! TermCast 终端会话核心
//!
//! 在同一套抽象下复用本地 PTY 会话和 SSH 远程会话，独立于任何 UI 框架。
//! 负责会话生命周期、命令边界识别、Git 凭证自动注入和补全建议。
//!
//! ## 模块结构
//! - `emitter` - 事件发射器抽象 trait
//! - `error` - 错误类型定义
//! - `events` - 会话事件定义
//! - `command_recognizer` - 命令边界识别与历史
//! - `prompt_watcher` - 认证提示检测（滚动窗口）
//! - `git_auth` - Git 凭证注入
//! - `suggestion` - 补全建议（内置命令 + 历史 + 建议服务）
//! - `connections` - 连接模块（本地 PTY、SSH）
//! - `session` - 会话核心（生命周期编排）
//! - `session_manager` - 会话注册表

// 核心抽象
pub mod emitter;

// 基础类型
pub mod error;
pub mod events;

// 数据路径组件
pub mod command_recognizer;
pub mod git_auth;
pub mod prompt_watcher;
pub mod suggestion;

// 连接
pub mod connections;

// 会话管理
pub mod session;
pub mod session_manager;

// 重新导出常用类型
pub use command_recognizer::{CommandRecognizer, MAX_HISTORY};
pub use connections::{
    ChannelAdapter, ChannelMsg, LocalPty, SSHOpts, SessionConfig, SshShellProc, TransportKind,
    DEFAULT_COLS, DEFAULT_ROWS, DEFAULT_SSH_PORT, SSH_CONNECT_TIMEOUT,
};
pub use emitter::{ChannelEmitter, DynEmitter, NoOpEmitter, SessionEventEmit};
pub use error::TerminalError;
pub use events::{
    ExitStatus, SessionEvent, EVENT_SESSION_DATA, EVENT_SESSION_ERROR, EVENT_SESSION_EXIT,
    EVENT_SFTP_READY,
};
pub use git_auth::{GitAuthManager, PromptFlags, KNOWN_HOST};
pub use prompt_watcher::{PromptEvent, PromptPhase, PromptWatcher};
pub use session::{SessionCore, SessionState, DEFAULT_PROMPT_DELAY};
pub use session_manager::SessionRegistry;
pub use suggestion::{
    AdvisoryClient, LinkSuggestionProvider, NoSuggestionProvider, MAX_SUGGESTIONS,
};
