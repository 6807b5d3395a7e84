//! TermCast 核心基础模块
//!
//! 提供终端 crate 以及上层应用共享的基础能力，独立于任何 UI 框架。
//!
//! ## 模块结构
//! - `logger` - 日志初始化（tracing-subscriber）
//! - `record` - 会话记录持久化（JSON 配置文件）
//! - `secret` - 密钥存储抽象（系统凭证库的窄接口）

pub mod logger;
pub mod record;
pub mod secret;

pub use logger::init_tracing;
pub use record::{RecordError, SessionKind, SessionRecord, SessionRecordStore, SessionRecordsFile};
pub use secret::{MemorySecretStore, SecretStore, GITHUB_TOKEN_KEY};
