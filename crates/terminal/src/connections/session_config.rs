//! 会话配置与校验
//!
//! 会话启动后配置不可变。远程会话在发起任何连接之前必须校验
//! 至少有一种可用的凭证材料（私钥或密码），否则直接以配置错误失败。

use serde::{Deserialize, Serialize};

use termcast_core::record::{SessionKind, SessionRecord};

use crate::error::TerminalError;

/// 默认终端列数
pub const DEFAULT_COLS: u16 = 80;
/// 默认终端行数
pub const DEFAULT_ROWS: u16 = 24;

/// 传输类型
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// 本地 PTY
    #[default]
    Local,
    /// SSH 远程 Shell
    Remote,
}

/// 会话配置
///
/// 标识由 UI 层分配，核心从不生成。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// 会话标识
    pub id: String,

    /// 传输类型
    #[serde(rename = "type", default)]
    pub kind: TransportKind,

    /// 远程主机
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// 远程端口
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// 远程用户名
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// 私钥路径
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_path: Option<String>,

    /// 跳板机（上游未实现，仅记录并告警）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jump_host: Option<String>,

    /// 初始列数
    #[serde(default = "default_cols")]
    pub cols: u16,

    /// 初始行数
    #[serde(default = "default_rows")]
    pub rows: u16,
}

fn default_cols() -> u16 {
    DEFAULT_COLS
}

fn default_rows() -> u16 {
    DEFAULT_ROWS
}

impl SessionConfig {
    /// 创建本地会话配置
    pub fn local(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: TransportKind::Local,
            host: None,
            port: None,
            username: None,
            key_path: None,
            jump_host: None,
            cols: DEFAULT_COLS,
            rows: DEFAULT_ROWS,
        }
    }

    /// 创建远程会话配置
    pub fn remote(id: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            host: Some(host.into()),
            kind: TransportKind::Remote,
            ..Self::local(id)
        }
    }

    /// 设置用户名
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// 设置端口
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// 设置私钥路径
    pub fn with_key_path(mut self, path: impl Into<String>) -> Self {
        self.key_path = Some(path.into());
        self
    }

    /// 设置初始终端尺寸
    pub fn with_geometry(mut self, cols: u16, rows: u16) -> Self {
        self.cols = cols;
        self.rows = rows;
        self
    }

    /// 从持久化记录构造
    pub fn from_record(record: &SessionRecord) -> Self {
        Self {
            id: record.id.clone(),
            kind: match record.kind {
                SessionKind::Local => TransportKind::Local,
                SessionKind::Remote => TransportKind::Remote,
            },
            host: record.host.clone(),
            port: record.port,
            username: record.username.clone(),
            key_path: record.key_path.clone(),
            jump_host: record.jump_host.clone(),
            cols: DEFAULT_COLS,
            rows: DEFAULT_ROWS,
        }
    }

    /// 校验配置
    ///
    /// 远程会话必须有主机、用户名，以及私钥或密码至少其一。
    /// 在任何连接尝试之前执行。
    pub fn validate(&self, has_password: bool) -> Result<(), TerminalError> {
        if self.kind == TransportKind::Local {
            return Ok(());
        }

        if self.host.as_deref().map_or(true, str::is_empty) {
            return Err(TerminalError::InvalidConfig("远程会话缺少主机".into()));
        }
        if self.username.as_deref().map_or(true, str::is_empty) {
            return Err(TerminalError::InvalidConfig("远程会话缺少用户名".into()));
        }
        if self.key_path.is_none() && !has_password {
            return Err(TerminalError::InvalidConfig(
                "远程会话需要私钥或密码至少一种凭证".into(),
            ));
        }

        if self.jump_host.is_some() {
            tracing::warn!("[SessionConfig] 跳板机配置尚未支持，将被忽略");
        }

        Ok(())
    }
}
