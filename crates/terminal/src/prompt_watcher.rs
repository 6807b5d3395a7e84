//! 认证提示检测
//!
//! 在最近输出的滚动窗口内扫描 Git 对已知主机的用户名/密码提示。
//! 提示可能被任意拆块输出，因此匹配针对窗口而不是单个分块。
//!
//! ## 状态机
//! `idle → username-prompt-detected → password-prompt-detected → idle`
//!
//! 转移单向且带守卫：同一武装周期内每类提示只上报一次。
//! 密码注入完成后窗口被清空，避免陈旧文本重复命中。
//!
//! 未武装的会话不做任何扫描。

use once_cell::sync::Lazy;
use regex::Regex;

use crate::git_auth::KNOWN_HOST;

/// 滚动窗口上限（字符）
pub const ROLLING_WINDOW_MAX: usize = 1000;
/// 截断后保留的尾部长度
pub const ROLLING_WINDOW_KEEP: usize = 500;

/// 用户名提示模式（`Username for 'https://github.com':` 及其变体）
static USERNAME_PROMPT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r#"(?i)Username\s+for\s+['"]?https?://{}"#,
        regex::escape(KNOWN_HOST)
    ))
    .expect("用户名提示模式非法")
});

/// 密码提示模式
static PASSWORD_PROMPT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r#"(?i)Password\s+for\s+['"]?https?://{}"#,
        regex::escape(KNOWN_HOST)
    ))
    .expect("密码提示模式非法")
});

/// 提示检测阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptPhase {
    /// 空闲（未检测到提示）
    Idle,
    /// 已检测到用户名提示
    UsernameDetected,
    /// 已检测到密码提示
    PasswordDetected,
}

/// 提示事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptEvent {
    /// 用户名提示
    Username,
    /// 密码提示
    Password,
}

/// 认证提示观察器
///
/// 每个会话持有一个实例，由会话输出泵喂入分块。
pub struct PromptWatcher {
    /// 滚动输出窗口
    window: String,
    /// 是否武装（凭证注入器在识别到相关命令后武装）
    armed: bool,
    /// 当前阶段
    phase: PromptPhase,
}

impl PromptWatcher {
    /// 创建观察器（初始未武装）
    pub fn new() -> Self {
        Self {
            window: String::new(),
            armed: false,
            phase: PromptPhase::Idle,
        }
    }

    /// 武装观察器，开始为新的命令周期扫描
    ///
    /// 清空窗口并回到 Idle，上一周期的残留文本不参与匹配。
    pub fn arm(&mut self) {
        self.armed = true;
        self.phase = PromptPhase::Idle;
        self.window.clear();
    }

    /// 解除武装并停止扫描
    pub fn disarm(&mut self) {
        self.armed = false;
        self.phase = PromptPhase::Idle;
        self.window.clear();
    }

    /// 是否处于武装状态
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// 当前阶段
    pub fn phase(&self) -> PromptPhase {
        self.phase
    }

    /// 喂入输出分块并扫描提示
    ///
    /// 未武装时不扫描（也不累积窗口）。每类提示每个周期至多返回一次。
    pub fn scan(&mut self, chunk: &str) -> Option<PromptEvent> {
        if !self.armed {
            return None;
        }

        self.window.push_str(chunk);
        self.trim_window();

        match self.phase {
            PromptPhase::Idle => {
                if USERNAME_PROMPT_RE.is_match(&self.window) {
                    self.phase = PromptPhase::UsernameDetected;
                    tracing::debug!("[PromptWatcher] 检测到用户名提示");
                    return Some(PromptEvent::Username);
                }
                // 凭证助手可能跳过用户名直接要密码
                if PASSWORD_PROMPT_RE.is_match(&self.window) {
                    self.phase = PromptPhase::PasswordDetected;
                    tracing::debug!("[PromptWatcher] 检测到密码提示（无用户名阶段）");
                    return Some(PromptEvent::Password);
                }
                None
            }
            PromptPhase::UsernameDetected => {
                // 用户名已注入后的密码提示可能不带完整 URL，放宽匹配
                if PASSWORD_PROMPT_RE.is_match(&self.window)
                    || self.window.to_lowercase().contains("password")
                {
                    self.phase = PromptPhase::PasswordDetected;
                    tracing::debug!("[PromptWatcher] 检测到密码提示");
                    return Some(PromptEvent::Password);
                }
                None
            }
            PromptPhase::PasswordDetected => None,
        }
    }

    /// 密码注入完成的回调
    ///
    /// 回到 Idle 并清空窗口。
    pub fn password_injected(&mut self) {
        self.phase = PromptPhase::Idle;
        self.window.clear();
    }

    fn trim_window(&mut self) {
        if self.window.len() > ROLLING_WINDOW_MAX {
            let mut cut = self.window.len() - ROLLING_WINDOW_KEEP;
            while !self.window.is_char_boundary(cut) {
                cut += 1;
            }
            self.window.drain(..cut);
        }
    }
}

impl Default for PromptWatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unarmed_does_not_scan() {
        let mut watcher = PromptWatcher::new();
        assert_eq!(watcher.scan("Username for 'https://github.com':"), None);
        assert_eq!(watcher.phase(), PromptPhase::Idle);
    }

    #[test]
    fn test_prompt_sequence_fires_once_per_class() {
        let mut watcher = PromptWatcher::new();
        watcher.arm();

        assert_eq!(
            watcher.scan("Username for 'https://github.com':"),
            Some(PromptEvent::Username)
        );
        // 同一提示重复出现不再触发
        assert_eq!(watcher.scan("Username for 'https://github.com':"), None);

        assert_eq!(
            watcher.scan("Password for 'https://github.com':"),
            Some(PromptEvent::Password)
        );
        assert_eq!(watcher.scan("Password for 'https://github.com':"), None);

        watcher.password_injected();
        assert_eq!(watcher.phase(), PromptPhase::Idle);
    }

    #[test]
    fn test_prompt_split_across_chunks() {
        let mut watcher = PromptWatcher::new();
        watcher.arm();

        assert_eq!(watcher.scan("Username for 'http"), None);
        assert_eq!(
            watcher.scan("s://github.com':"),
            Some(PromptEvent::Username)
        );
    }

    #[test]
    fn test_lenient_password_after_username() {
        let mut watcher = PromptWatcher::new();
        watcher.arm();
        watcher.scan("Username for 'https://github.com':");
        // 用户名阶段之后，不带完整 URL 的密码提示也应命中
        assert_eq!(watcher.scan("\r\nPassword:"), Some(PromptEvent::Password));
    }

    #[test]
    fn test_rearm_clears_window() {
        let mut watcher = PromptWatcher::new();
        watcher.arm();
        watcher.scan("Username for 'https://github.com':");
        // 新命令周期重新武装后，旧窗口内容不应立即命中
        watcher.arm();
        assert_eq!(watcher.phase(), PromptPhase::Idle);
        assert_eq!(watcher.scan("正常输出，无提示"), None);
    }

    #[test]
    fn test_window_stays_bounded() {
        let mut watcher = PromptWatcher::new();
        watcher.arm();
        for _ in 0..100 {
            watcher.scan(&"x".repeat(100));
        }
        assert!(watcher.window.len() <= ROLLING_WINDOW_MAX);
    }

    #[test]
    fn test_disarm_stops_scanning() {
        let mut watcher = PromptWatcher::new();
        watcher.arm();
        watcher.disarm();
        assert_eq!(watcher.scan("Username for 'https://github.com':"), None);
    }
}
