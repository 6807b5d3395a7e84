//! 补全建议
//!
//! 三个来源按序合并：建议服务（前缀或近期命令像 URL 时）、
//! 内置常用命令、会话历史。去重、保持首次出现顺序、上限 10 条。
//!
//! 建议服务是尽力而为的外部协作方：网络错误、无凭证、响应畸形
//! 一律退化为空列表，绝不向调用方传播失败。

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 建议条数上限
pub const MAX_SUGGESTIONS: usize = 10;

/// 内置常用命令
pub const COMMON_COMMANDS: &[&str] = &[
    "git", "npm", "node", "cd", "ls", "pwd", "mkdir", "rm", "cp", "mv", "cat", "grep", "find",
    "ps", "kill", "echo", "export", "env", "ssh", "scp", "curl", "wget", "tar", "zip", "unzip",
    "python", "python3", "pip", "pip3", "java", "javac", "docker", "kubectl", "terraform",
    "ansible",
];

/// 暗示 URL 补全的命令动词
const URL_COMMAND_VERBS: &[&str] = &[
    "git clone", "git pull", "git fetch", "wget", "curl", "ssh", "scp",
];

/// URL 风格前缀（协议、git@、www.）
static URL_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(https?://|git@|www\.)").expect("URL 前缀模式非法"));

/// 常见顶级域名结尾
static TLD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\.(com|org|io|net|dev|edu|gov|co|uk|de|fr|jp|cn|rs)(/|$)")
        .expect("顶级域名模式非法")
});

/// `word.` 形式的域名开头
static DOMAIN_START_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\w-]+\.").expect("域名开头模式非法"));

/// 前缀是否像 URL/主机片段
pub fn is_urlish_prefix(prefix: &str) -> bool {
    URL_PREFIX_RE.is_match(prefix) || TLD_RE.is_match(prefix) || DOMAIN_START_RE.is_match(prefix)
}

/// 从历史中提取最近一条 URL 相关命令作为建议上下文
pub fn command_context(history: &[String]) -> Option<String> {
    let recent = history.last()?;
    let lower = recent.to_lowercase();
    URL_COMMAND_VERBS
        .iter()
        .any(|verb| lower.contains(verb))
        .then(|| recent.clone())
}

/// 链接建议服务 trait
///
/// 外部咨询服务的窄接口。实现方自行吸收一切失败并返回空列表。
#[async_trait]
pub trait LinkSuggestionProvider: Send + Sync + 'static {
    /// 获取链接建议（有序，可能为空）
    async fn get_link_suggestions(&self, prefix: &str, context: Option<&str>) -> Vec<String>;
}

/// 空建议服务（无凭证或测试环境）
pub struct NoSuggestionProvider;

#[async_trait]
impl LinkSuggestionProvider for NoSuggestionProvider {
    async fn get_link_suggestions(&self, _prefix: &str, _context: Option<&str>) -> Vec<String> {
        Vec::new()
    }
}

/// 建议服务请求体
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AdvisoryRequest<'a> {
    prefix: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<&'a str>,
}

/// 建议服务响应体
#[derive(Debug, Deserialize)]
struct AdvisoryResponse {
    #[serde(default)]
    suggestions: Vec<String>,
}

/// HTTP 建议服务客户端
///
/// 无 API 密钥时不发起请求，直接返回空列表。
pub struct AdvisoryClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl AdvisoryClient {
    /// 默认请求超时
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

    /// 创建客户端
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            http,
            endpoint: endpoint.into(),
            api_key,
        }
    }

    /// 是否配置了 API 密钥
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

#[async_trait]
impl LinkSuggestionProvider for AdvisoryClient {
    async fn get_link_suggestions(&self, prefix: &str, context: Option<&str>) -> Vec<String> {
        let api_key = match &self.api_key {
            Some(key) => key,
            None => return Vec::new(),
        };

        let request = AdvisoryRequest { prefix, context };
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await;

        let response = match response {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!("[Advisory] 建议服务请求失败: {e}");
                return Vec::new();
            }
        };

        if !response.status().is_success() {
            tracing::warn!("[Advisory] 建议服务返回状态 {}", response.status());
            return Vec::new();
        }

        match response.json::<AdvisoryResponse>().await {
            Ok(body) => body.suggestions,
            Err(e) => {
                tracing::warn!("[Advisory] 建议服务响应解析失败: {e}");
                Vec::new()
            }
        }
    }
}

/// 合并三个来源的建议
///
/// 顺序：服务建议 → 内置命令前缀匹配 → 历史前缀匹配。
/// 去重、排除与前缀完全相同的条目、截断到上限。
pub fn merge_suggestions(
    advisory: Vec<String>,
    prefix: &str,
    history: &[String],
) -> Vec<String> {
    let lower_prefix = prefix.to_lowercase();
    let mut merged: Vec<String> = Vec::new();

    let push_unique = |candidate: &str, merged: &mut Vec<String>| {
        if merged.len() >= MAX_SUGGESTIONS {
            return;
        }
        if candidate.to_lowercase() == lower_prefix {
            return;
        }
        if merged.iter().any(|existing| existing == candidate) {
            return;
        }
        merged.push(candidate.to_string());
    };

    for suggestion in &advisory {
        push_unique(suggestion, &mut merged);
    }

    for command in COMMON_COMMANDS {
        if command.to_lowercase().starts_with(&lower_prefix) {
            push_unique(command, &mut merged);
        }
    }

    for entry in history {
        if entry.to_lowercase().starts_with(&lower_prefix) {
            push_unique(entry, &mut merged);
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urlish_prefix_detection() {
        assert!(is_urlish_prefix("https://gith"));
        assert!(is_urlish_prefix("git@github.com:a/b.git"));
        assert!(is_urlish_prefix("www.example"));
        assert!(is_urlish_prefix("example.com/path"));
        assert!(is_urlish_prefix("raw.githubusercontent"));
        assert!(!is_urlish_prefix("git statu"));
        assert!(!is_urlish_prefix("ls"));
    }

    #[test]
    fn test_command_context_picks_url_commands() {
        let history = vec!["ls".to_string(), "git clone https://github.com/a/b".to_string()];
        assert_eq!(
            command_context(&history).as_deref(),
            Some("git clone https://github.com/a/b")
        );

        let history = vec!["git clone x".to_string(), "pwd".to_string()];
        // 只看最近一条
        assert_eq!(command_context(&history), None);
    }

    #[test]
    fn test_merge_order_and_dedup() {
        let history = vec!["git push origin main".to_string()];
        let advisory = vec!["git".to_string(), "github.com/acme".to_string()];
        let merged = merge_suggestions(advisory, "gi", &history);

        // 服务建议在前，重复的 "git" 只出现一次
        assert_eq!(
            merged,
            vec![
                "git".to_string(),
                "github.com/acme".to_string(),
                "git push origin main".to_string(),
            ]
        );
    }

    #[test]
    fn test_merge_excludes_exact_prefix() {
        let merged = merge_suggestions(vec![], "git", &[]);
        assert!(!merged.contains(&"git".to_string()));
    }

    #[test]
    fn test_merge_caps_at_limit() {
        let history: Vec<String> = (0..30).map(|i| format!("echo {i}")).collect();
        let merged = merge_suggestions(vec![], "echo", &history);
        assert_eq!(merged.len(), MAX_SUGGESTIONS);
    }

    #[tokio::test]
    async fn test_advisory_without_key_returns_empty() {
        let client = AdvisoryClient::new("https://advisory.invalid/v1/suggest", None);
        assert!(!client.has_api_key());
        let got = client.get_link_suggestions("github.co", None).await;
        assert!(got.is_empty());
    }

    #[tokio::test]
    async fn test_no_suggestion_provider() {
        let provider = NoSuggestionProvider;
        assert!(provider.get_link_suggestions("x", None).await.is_empty());
    }
}
