//! 会话核心
//!
//! 编排单个终端会话的完整生命周期：按配置选择并打开传输适配器，
//! 把命令识别器、提示观察器和凭证注入器接入数据路径，维护命令历史，
//! 派生补全建议，并向 UI 层发布生命周期事件。
//!
//! ## 状态机
//! `created → starting → running → {exited | destroyed}`
//!
//! `start` 幂等（并发二次启动是空操作）；`destroy` 幂等且同步释放
//! 底层资源；会话未运行时 `write`/`resize` 静默丢弃，UI 与异步收尾
//! 赛跑是正常现象而非错误。

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::command_recognizer::CommandRecognizer;
use crate::connections::{
    ChannelAdapter, ChannelMsg, LocalPty, SSHOpts, SessionConfig, SshShellProc, TransportKind,
};
use crate::emitter::{DynEmitter, SessionEventEmit};
use crate::error::TerminalError;
use crate::events::SessionEvent;
use crate::git_auth::GitAuthManager;
use crate::prompt_watcher::{PromptEvent, PromptWatcher};
use crate::suggestion::{self, LinkSuggestionProvider};

/// 提示应答前的去抖延迟默认值
///
/// 留出远端提示自身的终端绘制时间，避免注入与绘制交错。
/// 这是启发式去抖而非正确性要求，可调。
pub const DEFAULT_PROMPT_DELAY: Duration = Duration::from_millis(150);

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// 已创建，尚未启动
    Created,
    /// 正在打开传输
    Starting,
    /// 运行中
    Running,
    /// 传输已退出
    Exited,
    /// 已销毁
    Destroyed,
}

/// 会话核心
///
/// 传输适配器由本实例独占；跨任务共享的内部状态（识别器、观察器、
/// 输入缓冲）都是会话私有的，不需要跨会话加锁。
pub struct SessionCore {
    config: SessionConfig,
    emitter: DynEmitter,
    git_auth: Arc<GitAuthManager>,
    suggestions: Arc<dyn LinkSuggestionProvider>,

    state: Mutex<SessionState>,
    adapter: Mutex<Option<Arc<ChannelAdapter>>>,
    recognizer: Mutex<CommandRecognizer>,
    watcher: Mutex<PromptWatcher>,
    /// 输入侧的行累积（用于在回车时取出完整命令做注入决策）
    input_buffer: Mutex<String>,
    /// 提示应答去抖延迟（可调）
    prompt_delay: Duration,
}

impl SessionCore {
    /// 创建会话核心（不发起任何 I/O）
    pub fn new(
        config: SessionConfig,
        emitter: DynEmitter,
        git_auth: Arc<GitAuthManager>,
        suggestions: Arc<dyn LinkSuggestionProvider>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            emitter,
            git_auth,
            suggestions,
            state: Mutex::new(SessionState::Created),
            adapter: Mutex::new(None),
            recognizer: Mutex::new(CommandRecognizer::new()),
            watcher: Mutex::new(PromptWatcher::new()),
            input_buffer: Mutex::new(String::new()),
            prompt_delay: DEFAULT_PROMPT_DELAY,
        })
    }

    /// 会话标识
    pub fn id(&self) -> &str {
        &self.config.id
    }

    /// 当前状态
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// 是否持有活跃传输
    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Running
    }

    /// 命令历史快照
    pub fn command_history(&self) -> Vec<String> {
        self.recognizer.lock().history()
    }

    /// 启动会话
    ///
    /// 幂等：非 Created 状态下直接返回。配置校验先于任何 I/O；
    /// 打开失败以 error 事件上报，会话保持非运行态，不自动重试。
    pub async fn start(
        self: &Arc<Self>,
        cols: u16,
        rows: u16,
        password: Option<String>,
    ) -> Result<(), TerminalError> {
        {
            let mut state = self.state.lock();
            if *state != SessionState::Created {
                tracing::debug!("[Session] 重复启动被忽略 (会话: {})", self.id());
                return Ok(());
            }
            *state = SessionState::Starting;
        }

        if let Err(e) = self.config.validate(password.is_some()) {
            self.abandon_start();
            self.emit(SessionEvent::Error(e.to_string()));
            return Err(e);
        }

        let opened = match self.config.kind {
            TransportKind::Local => {
                LocalPty::open(cols, rows).map(|(pty, rx)| (ChannelAdapter::Local(pty), rx))
            }
            TransportKind::Remote => {
                let opts = SSHOpts::from_config(&self.config, password);
                SshShellProc::open(opts, cols, rows)
                    .await
                    .map(|(ssh, rx)| (ChannelAdapter::Remote(ssh), rx))
            }
        };

        let (adapter, rx) = match opened {
            Ok(pair) => pair,
            Err(e) => {
                self.abandon_start();
                self.emit(SessionEvent::Error(e.to_string()));
                return Err(e);
            }
        };

        if self.install_adapter(adapter).is_none() {
            return Ok(());
        }
        tracing::info!("[Session] 会话已运行 (会话: {})", self.id());

        tokio::spawn(Arc::clone(self).pump_output(rx));
        Ok(())
    }

    /// 启动失败后回到 Created，允许调用方修正后重试
    ///
    /// 期间到达的 destroy 胜出，不被回滚覆盖。
    fn abandon_start(&self) {
        let mut state = self.state.lock();
        if *state == SessionState::Starting {
            *state = SessionState::Created;
        }
    }

    /// 安装已打开的传输并进入运行态
    ///
    /// 打开窗口可能长达连接超时，期间 destroy 可能已经到达：
    /// 状态不再是 Starting 时终止新传输并放弃安装，销毁语义胜出。
    /// 安装在状态锁内完成，destroy 不可能漏掉已安装的传输。
    fn install_adapter(&self, adapter: ChannelAdapter) -> Option<Arc<ChannelAdapter>> {
        let adapter = Arc::new(adapter);
        let mut state = self.state.lock();
        if *state != SessionState::Starting {
            drop(state);
            adapter.kill();
            tracing::info!(
                "[Session] 启动期间会话已销毁，释放新打开的传输 (会话: {})",
                self.id()
            );
            return None;
        }
        *self.adapter.lock() = Some(Arc::clone(&adapter));
        *state = SessionState::Running;
        Some(adapter)
    }

    /// 输出泵：把传输输出依序送入识别器、观察器和 UI
    ///
    /// 分块按传输到达顺序处理，除滚动窗口外不做任何缓冲或重排。
    async fn pump_output(self: Arc<Self>, mut rx: UnboundedReceiver<ChannelMsg>) {
        let mut sftp_announced = false;

        while let Some(msg) = rx.recv().await {
            match msg {
                ChannelMsg::Data(bytes) => {
                    let text = String::from_utf8_lossy(&bytes).into_owned();

                    // 命令识别基于回显输出：两种传输共用同一可靠信号
                    self.recognizer.lock().feed(&text);

                    let prompt = self.watcher.lock().scan(&text);
                    if let Some(event) = prompt {
                        Arc::clone(&self).spawn_prompt_response(event);
                    }

                    self.emit(SessionEvent::Data(bytes));
                }
                ChannelMsg::SftpReady => {
                    if !sftp_announced {
                        sftp_announced = true;
                        self.emit(SessionEvent::SftpReady);
                    }
                }
                ChannelMsg::Exit(status) => {
                    {
                        let mut state = self.state.lock();
                        if *state == SessionState::Destroyed {
                            break;
                        }
                        *state = SessionState::Exited;
                    }
                    self.adapter.lock().take();
                    self.emit(SessionEvent::Exit(status));
                    break;
                }
            }
        }
    }

    /// 延迟应答提示事件
    ///
    /// 注入的密钥不会作为 data 事件单独发布，只有远端回显（如有）
    /// 会经正常输出路径回流。
    fn spawn_prompt_response(self: Arc<Self>, event: PromptEvent) {
        let delay = self.prompt_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let secret = match self.git_auth.handle_prompt(self.id(), event) {
                Some(secret) => secret,
                None => return,
            };

            let adapter = match self.adapter.lock().clone() {
                Some(adapter) => adapter,
                None => return,
            };

            let mut payload = secret.into_bytes();
            payload.extend_from_slice(adapter.line_ending());
            if let Err(e) = adapter.write(&payload) {
                tracing::warn!("[Session] 提示应答写入失败: {e} (会话: {})", self.id());
                return;
            }

            if event == PromptEvent::Password {
                self.watcher.lock().password_injected();
            }
        });
    }

    /// 写入用户输入
    ///
    /// 回车时取出累积的完整命令交给凭证注入器决策；
    /// 命令被改写时替换数据中的命令文本后再转发。
    /// 非运行状态静默丢弃。
    pub fn write(&self, data: &str) -> Result<(), TerminalError> {
        if self.state() != SessionState::Running {
            tracing::debug!("[Session] 会话未运行，丢弃输入 (会话: {})", self.id());
            return Ok(());
        }

        let adapter = match self.adapter.lock().clone() {
            Some(adapter) => adapter,
            None => return Ok(()),
        };

        let outgoing = self.intercept_input(data);
        adapter.write(outgoing.as_bytes())
    }

    /// 输入侧拦截：累积行、识别命令边界、执行注入决策
    fn intercept_input(&self, data: &str) -> String {
        if !data.contains('\r') && !data.contains('\n') {
            // 未到行尾：只累积可打印字符，转义序列不进入缓冲
            let mut buffer = self.input_buffer.lock();
            let mut in_escape = false;
            for ch in data.chars() {
                match ch {
                    '\x1b' => in_escape = true,
                    _ if in_escape => {
                        if ch.is_ascii_alphabetic() || ch == '~' {
                            in_escape = false;
                        }
                    }
                    '\x08' | '\x7f' => {
                        buffer.pop();
                    }
                    c if c >= ' ' || c == '\t' => buffer.push(c),
                    _ => {}
                }
            }
            return data.to_string();
        }

        // 行尾：缓冲 + 本块首行即为候选命令（覆盖历史召回整行发送的情况）。
        // 先原样拼接再整体修剪，分块边界上的空格必须保留
        let mut buffer = self.input_buffer.lock();
        let first_line: &str = data
            .split(['\r', '\n'])
            .next()
            .unwrap_or_default();
        let joined = format!("{}{}", buffer.as_str(), first_line);
        let command = joined.trim().to_string();
        buffer.clear();
        drop(buffer);

        if command.is_empty() || !self.git_auth.is_git_command(&command) {
            return data.to_string();
        }

        let rewritten = self.git_auth.inject(&command, self.id());
        if self.git_auth.should_auto_fill(self.id()) {
            self.git_auth.reset_prompt_flags(self.id());
            self.watcher.lock().arm();
        }

        if rewritten != command {
            // URL 已内联令牌：替换数据中的命令文本
            data.replacen(&command, &rewritten, 1)
        } else {
            data.to_string()
        }
    }

    /// 调整终端尺寸（未运行时空操作）
    pub fn resize(&self, cols: u16, rows: u16) -> Result<(), TerminalError> {
        if self.state() != SessionState::Running {
            return Ok(());
        }
        match self.adapter.lock().clone() {
            Some(adapter) => adapter.resize(cols, rows),
            None => Ok(()),
        }
    }

    /// 派生补全建议
    ///
    /// 合并顺序：建议服务（前缀或近期命令像 URL 时）→ 内置命令 → 历史。
    /// 服务失败退化为空，永不向 UI 抛错。
    pub async fn get_suggestions(&self, prefix: &str) -> Vec<String> {
        let history = self.recognizer.lock().history();
        let context = suggestion::command_context(&history);

        let advisory = if suggestion::is_urlish_prefix(prefix) || context.is_some() {
            self.suggestions
                .get_link_suggestions(prefix, context.as_deref())
                .await
        } else {
            Vec::new()
        };

        suggestion::merge_suggestions(advisory, prefix, &history)
    }

    /// SFTP 子通道句柄（远程会话且子通道就绪后可用）
    pub fn sftp_handle(&self) -> Option<Arc<Mutex<Option<ssh2::Sftp>>>> {
        match self.adapter.lock().as_deref() {
            Some(ChannelAdapter::Remote(ssh)) => Some(ssh.sftp_handle()),
            _ => None,
        }
    }

    /// 销毁会话
    ///
    /// 幂等。终止传输并同步释放句柄；输出泵随通道关闭自行退出。
    pub fn destroy(&self) {
        {
            let mut state = self.state.lock();
            if *state == SessionState::Destroyed {
                return;
            }
            *state = SessionState::Destroyed;
        }

        if let Some(adapter) = self.adapter.lock().take() {
            adapter.kill();
        }
        self.git_auth.clear(self.id());
        self.watcher.lock().disarm();
        tracing::info!("[Session] 会话已销毁 (会话: {})", self.id());
    }

    fn emit(&self, event: SessionEvent) {
        let payload = event.payload(self.id());
        if let Err(e) = self.emitter.emit_event(event.name(), &payload) {
            tracing::debug!("[Session] 事件投递失败: {e} (会话: {})", self.id());
        }
    }
}
