//! 会话注册表
//!
//! 维护会话标识到会话核心的进程级映射。注册表只做归属管理，
//! 不参与会话内部的数据路径；同一标识同时至多对应一个会话。

use dashmap::DashMap;
use std::sync::Arc;

use crate::error::TerminalError;
use crate::session::SessionCore;

/// 会话注册表
///
/// 进程内单例，被所有宿主入口共享。
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<SessionCore>>,
}

impl SessionRegistry {
    /// 创建空注册表
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// 注册会话
    ///
    /// 标识已被占用时拒绝，既有会话不受影响。
    pub fn register(&self, session: Arc<SessionCore>) -> Result<(), TerminalError> {
        let id = session.id().to_string();
        match self.sessions.entry(id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                tracing::warn!("[SessionRegistry] 会话标识已被占用: {id}");
                Err(TerminalError::DuplicateSession(id))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(session);
                tracing::info!("[SessionRegistry] 会话已注册: {id}");
                Ok(())
            }
        }
    }

    /// 查找会话
    pub fn get(&self, id: &str) -> Result<Arc<SessionCore>, TerminalError> {
        self.sessions
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| TerminalError::SessionNotFound(id.to_string()))
    }

    /// 会话是否存在
    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    /// 销毁并移除会话
    ///
    /// 标识不存在时是空操作（UI 关闭与异步退出赛跑是正常现象）。
    pub fn destroy(&self, id: &str) {
        if let Some((_, session)) = self.sessions.remove(id) {
            session.destroy();
            tracing::info!("[SessionRegistry] 会话已移除: {id}");
        }
    }

    /// 销毁全部会话（应用退出时调用）
    pub fn destroy_all(&self) {
        let ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            self.destroy(&id);
        }
    }

    /// 当前会话数
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// 全部会话标识快照
    pub fn ids(&self) -> Vec<String> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connections::SessionConfig;
    use crate::emitter::{DynEmitter, NoOpEmitter};
    use crate::git_auth::GitAuthManager;
    use crate::session::SessionState;
    use crate::suggestion::NoSuggestionProvider;
    use termcast_core::secret::MemorySecretStore;

    fn make_session(id: &str) -> Arc<SessionCore> {
        SessionCore::new(
            SessionConfig::local(id),
            DynEmitter::new(NoOpEmitter),
            Arc::new(GitAuthManager::new(Arc::new(MemorySecretStore::new()))),
            Arc::new(NoSuggestionProvider),
        )
    }

    #[test]
    fn test_register_and_get() {
        let registry = SessionRegistry::new();
        registry.register(make_session("s1")).unwrap();

        assert!(registry.contains("s1"));
        assert_eq!(registry.get("s1").unwrap().id(), "s1");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_register_rejected() {
        let registry = SessionRegistry::new();
        registry.register(make_session("s1")).unwrap();

        let err = registry.register(make_session("s1")).unwrap_err();
        assert!(matches!(err, TerminalError::DuplicateSession(_)));
        // 既有会话不受影响
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_get_unknown_session() {
        let registry = SessionRegistry::new();
        assert!(matches!(
            registry.get("nope"),
            Err(TerminalError::SessionNotFound(_))
        ));
    }

    #[test]
    fn test_destroy_frees_identifier() {
        let registry = SessionRegistry::new();
        let session = make_session("s1");
        registry.register(Arc::clone(&session)).unwrap();

        registry.destroy("s1");
        assert!(!registry.contains("s1"));
        assert_eq!(session.state(), SessionState::Destroyed);

        // 销毁后标识可复用
        registry.register(make_session("s1")).unwrap();
    }

    #[test]
    fn test_destroy_unknown_is_noop() {
        let registry = SessionRegistry::new();
        registry.destroy("nope");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_destroy_all() {
        let registry = SessionRegistry::new();
        registry.register(make_session("a")).unwrap();
        registry.register(make_session("b")).unwrap();

        registry.destroy_all();
        assert!(registry.is_empty());
        assert!(registry.ids().is_empty());
    }
}
