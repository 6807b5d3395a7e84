//! Git 凭证注入
//!
//! 对识别出的 Git 网络操作命令做两种注入：
//! - 命令里带已知主机 HTTPS URL 时，把令牌改写进 URL 的 userinfo 段；
//! - 不带 URL 时，把会话标记为待自动填充，由提示观察器驱动交互注入。
//!
//! ## 主机匹配是刻意乐观的
//! `git pull` 这类命令不带远程 URL，在不执行副作用命令的前提下无法得知
//! 实际远程，因此任何匹配动词集的网络操作都按"可能指向已知主机"处理。
//! 误判无害：指向其他远程的命令不会产生已知主机的提示，观察器不会触发。
//!
//! 注入在任何环节拿不到令牌时都静默退化为原样透传，绝不阻塞用户输入。

use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

use termcast_core::secret::{SecretStore, GITHUB_TOKEN_KEY};

use crate::prompt_watcher::PromptEvent;

/// 凭证注入针对的 Git 托管域名
pub const KNOWN_HOST: &str = "github.com";

/// Git 网络操作动词（大小写不敏感，允许前导空白）
static GIT_COMMAND_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*git\s+(pull|fetch|clone|push|ls-remote)\b").expect("Git 命令模式非法")
});

/// 已知主机域名
static KNOWN_HOST_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"(?i){}", regex::escape(KNOWN_HOST))).expect("主机模式非法"));

/// 已知主机的 HTTPS URL（捕获协议段与其余部分）
static HTTPS_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)(https?://)({}/\S+)",
        regex::escape(KNOWN_HOST)
    ))
    .expect("HTTPS URL 模式非法")
});

/// 交互注入进度标志
///
/// 每个武装的会话持有一组；命令周期开始时整体复位。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PromptFlags {
    /// 用户名已发送
    pub username_sent: bool,
    /// 密码已发送
    pub password_sent: bool,
}

/// Git 凭证注入管理器
///
/// 进程内单例，被所有会话共享；按会话标识记录武装状态。
pub struct GitAuthManager {
    /// 密钥存储（系统凭证库的窄接口）
    secrets: Arc<dyn SecretStore>,
    /// 武装会话表（会话标识 → 注入进度）
    armed: DashMap<String, PromptFlags>,
}

impl GitAuthManager {
    /// 创建管理器
    pub fn new(secrets: Arc<dyn SecretStore>) -> Self {
        Self {
            secrets,
            armed: DashMap::new(),
        }
    }

    /// 是否为可能需要认证的 Git 网络操作命令
    pub fn is_git_command(&self, command: &str) -> bool {
        GIT_COMMAND_RE.is_match(command)
    }

    /// 命令是否可能涉及已知主机
    ///
    /// 显式提到域名，或属于网络操作动词集（乐观假设）。
    pub fn might_involve_known_host(&self, command: &str) -> bool {
        KNOWN_HOST_RE.is_match(command) || self.is_git_command(command)
    }

    /// 读取令牌，未配置时返回 None
    pub fn token(&self) -> Option<String> {
        self.secrets.get(GITHUB_TOKEN_KEY)
    }

    /// 对完成的命令执行注入决策
    ///
    /// 返回（可能被改写的）命令文本：
    /// - 无令牌：原样返回，不武装；
    /// - 带已知主机 HTTPS URL：改写为 `https://TOKEN@host/...`，不武装
    ///   （令牌随命令本身传输，无需等待提示）；
    /// - 主机相关但无 URL：武装会话并原样返回。
    pub fn inject(&self, command: &str, session_id: &str) -> String {
        let token = match self.token() {
            Some(token) => token,
            None => {
                tracing::debug!("[GitAuth] 未配置令牌，命令原样透传");
                return command.to_string();
            }
        };

        if !self.is_git_command(command) || !self.might_involve_known_host(command) {
            return command.to_string();
        }

        if HTTPS_URL_RE.is_match(command) {
            let rewritten = HTTPS_URL_RE
                .replace_all(command, |caps: &regex::Captures<'_>| {
                    format!("{}{}@{}", &caps[1], token, &caps[2])
                })
                .into_owned();
            tracing::info!("[GitAuth] 已将令牌写入命令 URL (会话: {session_id})");
            return rewritten;
        }

        self.armed.insert(session_id.to_string(), PromptFlags::default());
        tracing::info!("[GitAuth] 会话已武装等待凭证提示 (会话: {session_id})");
        command.to_string()
    }

    /// 会话是否处于待自动填充状态
    pub fn should_auto_fill(&self, session_id: &str) -> bool {
        self.armed.contains_key(session_id)
    }

    /// 新命令周期开始时复位注入进度（保持武装）
    pub fn reset_prompt_flags(&self, session_id: &str) {
        if let Some(mut flags) = self.armed.get_mut(session_id) {
            *flags = PromptFlags::default();
        }
    }

    /// 响应提示事件，返回应写入通道的密钥
    ///
    /// 已发送闩锁保证同一周期内每类提示至多发送一次；
    /// 密码发送后会话解除武装。已知主机约定同一令牌可同时充当
    /// 用户名和密码。
    pub fn handle_prompt(&self, session_id: &str, event: PromptEvent) -> Option<String> {
        let token = self.token()?;

        match event {
            PromptEvent::Username => {
                let mut flags = self.armed.get_mut(session_id)?;
                if flags.username_sent {
                    tracing::debug!("[GitAuth] 用户名已发送，跳过 (会话: {session_id})");
                    return None;
                }
                flags.username_sent = true;
                tracing::info!("[GitAuth] 以令牌应答用户名提示 (会话: {session_id})");
                Some(token)
            }
            PromptEvent::Password => {
                {
                    let mut flags = self.armed.get_mut(session_id)?;
                    if flags.password_sent {
                        tracing::debug!("[GitAuth] 密码已发送，跳过 (会话: {session_id})");
                        return None;
                    }
                    flags.password_sent = true;
                }
                // 密码发送即完成本周期，解除武装
                self.armed.remove(session_id);
                tracing::info!("[GitAuth] 以令牌应答密码提示并解除武装 (会话: {session_id})");
                Some(token)
            }
        }
    }

    /// 清除会话的武装状态（会话销毁或显式复位时调用）
    pub fn clear(&self, session_id: &str) {
        self.armed.remove(session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use termcast_core::secret::MemorySecretStore;

    fn manager_with_token(token: &str) -> GitAuthManager {
        GitAuthManager::new(Arc::new(MemorySecretStore::with_secret(
            GITHUB_TOKEN_KEY,
            token,
        )))
    }

    fn manager_without_token() -> GitAuthManager {
        GitAuthManager::new(Arc::new(MemorySecretStore::new()))
    }

    #[test]
    fn test_is_git_command() {
        let auth = manager_without_token();
        assert!(auth.is_git_command("git clone https://github.com/a/b.git"));
        assert!(auth.is_git_command("  GIT PULL origin main"));
        assert!(auth.is_git_command("git ls-remote"));
        assert!(!auth.is_git_command("git status"));
        assert!(!auth.is_git_command("echo git pull"));
    }

    #[test]
    fn test_might_involve_known_host_is_optimistic() {
        let auth = manager_without_token();
        // 显式域名
        assert!(auth.might_involve_known_host("curl https://github.com/x"));
        // 乐观假设：无 URL 的网络操作也算相关
        assert!(auth.might_involve_known_host("git pull"));
        assert!(!auth.might_involve_known_host("ls -la"));
    }

    #[test]
    fn test_url_injection_roundtrip() {
        let auth = manager_with_token("TOK123");
        let rewritten = auth.inject("git clone https://github.com/acme/widgets.git", "s1");
        assert_eq!(
            rewritten,
            "git clone https://TOK123@github.com/acme/widgets.git"
        );
        // URL 注入不需要武装
        assert!(!auth.should_auto_fill("s1"));
    }

    #[test]
    fn test_inject_without_token_passes_through() {
        let auth = manager_without_token();
        let command = "git clone https://github.com/acme/widgets.git";
        assert_eq!(auth.inject(command, "s1"), command);
        assert!(!auth.should_auto_fill("s1"));
    }

    #[test]
    fn test_inject_without_url_arms_session() {
        let auth = manager_with_token("TOK123");
        let command = "git pull";
        assert_eq!(auth.inject(command, "s1"), command);
        assert!(auth.should_auto_fill("s1"));
        assert!(!auth.should_auto_fill("s2"));
    }

    #[test]
    fn test_non_git_command_untouched() {
        let auth = manager_with_token("TOK123");
        let command = "cargo build --release";
        assert_eq!(auth.inject(command, "s1"), command);
        assert!(!auth.should_auto_fill("s1"));
    }

    #[test]
    fn test_prompt_latch_prevents_duplicate_send() {
        let auth = manager_with_token("TOK123");
        auth.inject("git pull", "s1");

        assert_eq!(
            auth.handle_prompt("s1", PromptEvent::Username).as_deref(),
            Some("TOK123")
        );
        // 同类提示重复匹配不再发送
        assert_eq!(auth.handle_prompt("s1", PromptEvent::Username), None);

        assert_eq!(
            auth.handle_prompt("s1", PromptEvent::Password).as_deref(),
            Some("TOK123")
        );
        // 密码发送后解除武装
        assert!(!auth.should_auto_fill("s1"));
        assert_eq!(auth.handle_prompt("s1", PromptEvent::Password), None);
    }

    #[test]
    fn test_unarmed_session_never_answers() {
        let auth = manager_with_token("TOK123");
        assert_eq!(auth.handle_prompt("s1", PromptEvent::Username), None);
    }

    #[test]
    fn test_reset_prompt_flags_keeps_armed() {
        let auth = manager_with_token("TOK123");
        auth.inject("git fetch", "s1");
        auth.handle_prompt("s1", PromptEvent::Username);
        auth.reset_prompt_flags("s1");

        // 复位后新周期可再次应答
        assert_eq!(
            auth.handle_prompt("s1", PromptEvent::Username).as_deref(),
            Some("TOK123")
        );
    }

    #[test]
    fn test_multiple_urls_all_rewritten() {
        let auth = manager_with_token("T");
        let rewritten = auth.inject(
            "git clone https://github.com/a/b.git https://github.com/c/d.git",
            "s1",
        );
        assert_eq!(
            rewritten,
            "git clone https://T@github.com/a/b.git https://T@github.com/c/d.git"
        );
    }
}
