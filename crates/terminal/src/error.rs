//! 终端错误类型定义
//!
//! 错误分为两类面向用户的语义：配置错误（启动前即可判定，不发起任何 I/O）
//! 和传输错误（连接、认证、进程启动失败）。其余故障在数据路径内部降级吸收，
//! 不会通过本类型向调用方传播。

use thiserror::Error;

/// 终端会话错误
#[derive(Debug, Error)]
pub enum TerminalError {
    /// 会话配置无效（远程会话缺少主机/用户名/凭证等）
    #[error("会话配置无效: {0}")]
    InvalidConfig(String),

    /// 私钥文件不可读且没有密码兜底
    #[error("SSH 私钥不可用: {0}")]
    KeyUnavailable(String),

    /// 连接失败（网络不可达、被拒绝等）
    #[error("连接失败: {0}")]
    ConnectFailed(String),

    /// 连接或握手超时
    #[error("连接超时: {0}")]
    ConnectTimeout(String),

    /// 认证被远端拒绝
    #[error("认证失败: {0}")]
    AuthFailed(String),

    /// 本地 Shell 进程启动失败
    #[error("Shell 进程启动失败: {0}")]
    SpawnFailed(String),

    /// 传输通道已关闭
    #[error("通道已关闭")]
    ChannelClosed,

    /// 会话标识已被占用
    #[error("会话已存在: {0}")]
    DuplicateSession(String),

    /// 会话不存在
    #[error("会话不存在: {0}")]
    SessionNotFound(String),

    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),
}

impl TerminalError {
    /// 是否属于配置错误（在任何 I/O 发生之前即可判定）
    ///
    /// 用于用户诊断：配置错误提示用户修改会话设置，
    /// 传输错误提示检查网络或远端状态。
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig(_) | Self::KeyUnavailable(_) | Self::DuplicateSession(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_classification() {
        assert!(TerminalError::InvalidConfig("缺少主机".into()).is_config_error());
        assert!(TerminalError::KeyUnavailable("文件不存在".into()).is_config_error());
        assert!(!TerminalError::ConnectFailed("refused".into()).is_config_error());
        assert!(!TerminalError::AuthFailed("rejected".into()).is_config_error());
    }
}
