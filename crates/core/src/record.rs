//! 会话记录持久化
//!
//! 管理用户保存的会话记录，支持本地和远程（SSH）会话。
//! 记录存储在 `~/.config/termcast/sessions.json`。
//!
//! 终端核心在会话启动时读取记录，从不写入；写入由设置界面完成。
//!
//! ## 记录文件格式
//! ```json
//! {
//!   "sessions": [
//!     {
//!       "id": "sess-1",
//!       "name": "my-server",
//!       "type": "remote",
//!       "host": "192.168.1.100",
//!       "port": 22,
//!       "username": "root",
//!       "keyPath": "~/.ssh/id_rsa"
//!     }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

/// 记录存储错误类型
#[derive(Debug, Error)]
pub enum RecordError {
    /// 文件读取失败
    #[error("读取会话记录失败: {0}")]
    ReadFailed(String),

    /// 文件写入失败
    #[error("写入会话记录失败: {0}")]
    WriteFailed(String),

    /// JSON 解析失败
    #[error("解析会话记录失败: {0}")]
    ParseFailed(String),
}

/// 会话类型
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    /// 本地终端
    #[default]
    Local,
    /// SSH 远程会话
    Remote,
}

/// 单条会话记录
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    /// 会话标识（由 UI 层分配）
    pub id: String,

    /// 显示名称
    #[serde(default)]
    pub name: String,

    /// 会话类型
    #[serde(rename = "type", default)]
    pub kind: SessionKind,

    /// 远程主机名或 IP
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// 远程端口（默认 22）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// 远程用户名
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// 私钥文件路径
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_path: Option<String>,

    /// 跳板机（上游未实现，仅保留字段）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jump_host: Option<String>,
}

impl SessionRecord {
    /// 创建本地会话记录
    pub fn local(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: format!("{}@{}", whoami::username(), local_hostname()),
            kind: SessionKind::Local,
            host: None,
            port: None,
            username: None,
            key_path: None,
            jump_host: None,
        }
    }

    /// 创建远程会话记录
    pub fn remote(id: impl Into<String>, host: impl Into<String>) -> Self {
        let host = host.into();
        Self {
            id: id.into(),
            name: host.clone(),
            kind: SessionKind::Remote,
            host: Some(host),
            port: None,
            username: None,
            key_path: None,
            jump_host: None,
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
}

fn local_hostname() -> String {
    whoami::fallible::hostname().unwrap_or_else(|_| "localhost".to_string())
}

/// 会话记录文件结构
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionRecordsFile {
    /// 会话记录列表
    #[serde(default)]
    pub sessions: Vec<SessionRecord>,
}

impl SessionRecordsFile {
    /// 创建空的记录文件
    pub fn new() -> Self {
        Self::default()
    }

    /// 按标识查找记录
    pub fn get(&self, id: &str) -> Option<&SessionRecord> {
        self.sessions.iter().find(|r| r.id == id)
    }

    /// 添加或替换记录
    pub fn upsert(&mut self, record: SessionRecord) {
        if let Some(existing) = self.sessions.iter_mut().find(|r| r.id == record.id) {
            *existing = record;
        } else {
            self.sessions.push(record);
        }
    }

    /// 移除记录
    pub fn remove(&mut self, id: &str) -> Option<SessionRecord> {
        let idx = self.sessions.iter().position(|r| r.id == id)?;
        Some(self.sessions.remove(idx))
    }
}

/// 会话记录存储
pub struct SessionRecordStore {
    /// 记录文件路径
    path: PathBuf,
}

impl SessionRecordStore {
    /// 使用默认路径创建
    pub fn new() -> Self {
        Self {
            path: Self::default_store_path(),
        }
    }

    /// 使用自定义路径创建
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    /// 默认记录文件路径
    pub fn default_store_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("termcast")
            .join("sessions.json")
    }

    /// 记录文件路径
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// 加载全部记录
    ///
    /// 文件不存在时返回空记录，不视为错误。
    pub fn load(&self) -> Result<SessionRecordsFile, RecordError> {
        if !self.path.exists() {
            tracing::info!("[RecordStore] 记录文件不存在，返回空记录: {:?}", self.path);
            return Ok(SessionRecordsFile::new());
        }

        let content =
            fs::read_to_string(&self.path).map_err(|e| RecordError::ReadFailed(e.to_string()))?;

        serde_json::from_str(&content).map_err(|e| RecordError::ParseFailed(e.to_string()))
    }

    /// 保存全部记录
    pub fn save(&self, records: &SessionRecordsFile) -> Result<(), RecordError> {
        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| RecordError::WriteFailed(e.to_string()))?;
            }
        }

        let content = serde_json::to_string_pretty(records)
            .map_err(|e| RecordError::ParseFailed(e.to_string()))?;

        fs::write(&self.path, content).map_err(|e| RecordError::WriteFailed(e.to_string()))?;

        tracing::info!("[RecordStore] 记录已保存: {:?}", self.path);
        Ok(())
    }

    /// 按标识读取单条记录
    pub fn get(&self, id: &str) -> Result<Option<SessionRecord>, RecordError> {
        Ok(self.load()?.get(id).cloned())
    }
}

impl Default for SessionRecordStore {
    fn default() -> Self {
        Self::new()
    }
}
