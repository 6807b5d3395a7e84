//! 事件发射器抽象
//!
//! 定义事件发射器 trait，将会话事件投递功能抽象化，
//! 使终端核心不直接依赖任何 UI 框架。
//!
//! ## 设计
//! - `SessionEventEmit`：基础 trait（dyn 兼容）
//! - `DynEmitter`：`Arc<dyn SessionEventEmit>` 的 newtype，可 Clone
//! - `ChannelEmitter`：把事件推入 tokio 通道，供测试和无界面宿主消费
//! - `NoOpEmitter`：丢弃所有事件（测试用）

use std::sync::Arc;

/// 基础事件发射 trait（dyn 兼容）
///
/// 宿主应用为自己的窗口句柄实现此 trait，把事件转发给渲染层。
pub trait SessionEventEmit: Send + Sync + 'static {
    /// 发射事件
    fn emit_event(&self, event: &str, payload: &serde_json::Value) -> Result<(), String>;
}

/// 动态事件发射器包装
///
/// 使用 `Arc<dyn SessionEventEmit>` 包装以获得 `Clone`，
/// 便于在会话核心与输出泵任务之间传递。
#[derive(Clone)]
pub struct DynEmitter(pub Arc<dyn SessionEventEmit>);

impl DynEmitter {
    /// 从实现了 SessionEventEmit 的类型创建
    pub fn new(emitter: impl SessionEventEmit) -> Self {
        Self(Arc::new(emitter))
    }
}

impl SessionEventEmit for DynEmitter {
    fn emit_event(&self, event: &str, payload: &serde_json::Value) -> Result<(), String> {
        self.0.emit_event(event, payload)
    }
}

/// 空事件发射器（用于测试）
#[derive(Debug, Clone)]
pub struct NoOpEmitter;

impl SessionEventEmit for NoOpEmitter {
    fn emit_event(&self, _event: &str, _payload: &serde_json::Value) -> Result<(), String> {
        Ok(())
    }
}

/// 通道事件发射器
///
/// 把 `(事件名, 负载)` 推入无界通道，由持有接收端的一方消费。
/// 接收端关闭后发射静默失败（会话收尾阶段常见，不是错误）。
#[derive(Clone)]
pub struct ChannelEmitter {
    tx: tokio::sync::mpsc::UnboundedSender<(String, serde_json::Value)>,
}

impl ChannelEmitter {
    /// 创建发射器和配对的接收端
    pub fn new() -> (
        Self,
        tokio::sync::mpsc::UnboundedReceiver<(String, serde_json::Value)>,
    ) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl SessionEventEmit for ChannelEmitter {
    fn emit_event(&self, event: &str, payload: &serde_json::Value) -> Result<(), String> {
        self.tx
            .send((event.to_string(), payload.clone()))
            .map_err(|_| "事件接收端已关闭".to_string())
    }
}
