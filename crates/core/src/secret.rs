//! 密钥存储抽象
//!
//! 系统凭证库（如 macOS Keychain、Windows Credential Manager）的窄接口。
//! 终端核心只通过本 trait 读取密钥，密钥缺失是正常的非错误结果。
//!
//! ## 设计
//! - `SecretStore`：基础 trait（dyn 兼容，Send + Sync）
//! - `MemorySecretStore`：内存实现，用于测试和无凭证库环境

use parking_lot::Mutex;
use std::collections::HashMap;

/// GitHub 令牌在凭证库中的服务键
pub const GITHUB_TOKEN_KEY: &str = "termcast/github-token";

/// 密钥存储 trait
///
/// 由宿主应用桥接到系统凭证库。所有方法都不返回错误：
/// 读取失败视同缺失，写入失败只记录日志。
pub trait SecretStore: Send + Sync + 'static {
    /// 读取密钥，不存在时返回 None
    fn get(&self, service_key: &str) -> Option<String>;

    /// 写入密钥
    fn set(&self, service_key: &str, secret: &str);

    /// 删除密钥
    fn delete(&self, service_key: &str);
}

/// 内存密钥存储
///
/// 进程内 HashMap 实现，进程退出即丢失。
#[derive(Default)]
pub struct MemorySecretStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemorySecretStore {
    /// 创建空的内存存储
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建并预置单个密钥（测试辅助）
    pub fn with_secret(service_key: impl Into<String>, secret: impl Into<String>) -> Self {
        let store = Self::new();
        store.entries.lock().insert(service_key.into(), secret.into());
        store
    }
}

impl SecretStore for MemorySecretStore {
    fn get(&self, service_key: &str) -> Option<String> {
        self.entries.lock().get(service_key).cloned()
    }

    fn set(&self, service_key: &str, secret: &str) {
        self.entries
            .lock()
            .insert(service_key.to_string(), secret.to_string());
    }

    fn delete(&self, service_key: &str) {
        self.entries.lock().remove(service_key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemorySecretStore::new();
        assert!(store.get(GITHUB_TOKEN_KEY).is_none());

        store.set(GITHUB_TOKEN_KEY, "TOK123");
        assert_eq!(store.get(GITHUB_TOKEN_KEY).as_deref(), Some("TOK123"));

        store.delete(GITHUB_TOKEN_KEY);
        assert!(store.get(GITHUB_TOKEN_KEY).is_none());
    }

    #[test]
    fn test_with_secret() {
        let store = MemorySecretStore::with_secret("svc", "s3cret");
        assert_eq!(store.get("svc").as_deref(), Some("s3cret"));
    }
}
