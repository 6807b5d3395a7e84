//! 会话事件定义
//!
//! 会话核心通过单一带标签的事件流向 UI 层发布事件，
//! 事件负载统一为 JSON（camelCase），由 `emitter` 模块投递。

use serde::{Deserialize, Serialize};
use serde_json::json;

/// 输出数据事件名
pub const EVENT_SESSION_DATA: &str = "session-data";
/// 会话退出事件名
pub const EVENT_SESSION_EXIT: &str = "session-exit";
/// 会话错误事件名
pub const EVENT_SESSION_ERROR: &str = "session-error";
/// SFTP 子通道就绪事件名（仅远程会话，至多一次）
pub const EVENT_SFTP_READY: &str = "session-sftp-ready";

/// 终端退出状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitStatus {
    /// 退出码
    pub code: i32,
    /// 终止信号（仅本地进程可能存在）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<i32>,
}

impl ExitStatus {
    /// 按退出码创建
    pub fn with_code(code: i32) -> Self {
        Self { code, signal: None }
    }
}

/// 会话生命周期事件
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// 终端输出（原样转发，不保证分块边界）
    Data(Vec<u8>),
    /// 传输退出
    Exit(ExitStatus),
    /// 会话级错误（仅配置错误和传输错误会到达这里）
    Error(String),
    /// SFTP 子通道就绪
    SftpReady,
}

impl SessionEvent {
    /// 事件名（UI 层订阅用）
    pub fn name(&self) -> &'static str {
        match self {
            Self::Data(_) => EVENT_SESSION_DATA,
            Self::Exit(_) => EVENT_SESSION_EXIT,
            Self::Error(_) => EVENT_SESSION_ERROR,
            Self::SftpReady => EVENT_SFTP_READY,
        }
    }

    /// 构造 JSON 负载
    ///
    /// 输出字节以 UTF-8 宽松解码后投递；终端转义序列原样保留。
    pub fn payload(&self, session_id: &str) -> serde_json::Value {
        match self {
            Self::Data(bytes) => json!({
                "id": session_id,
                "data": String::from_utf8_lossy(bytes),
            }),
            Self::Exit(status) => json!({
                "id": session_id,
                "code": status.code,
                "signal": status.signal,
            }),
            Self::Error(message) => json!({
                "id": session_id,
                "message": message,
            }),
            Self::SftpReady => json!({ "id": session_id }),
        }
    }
}
