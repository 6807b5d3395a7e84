//! SSH 远程连接
//!
//! 基于 ssh2 的交互式远程 Shell。libssh2 是阻塞式 API 且会话句柄
//! 不可跨线程共享，因此每个连接由一个专职工作线程独占会话：
//! 连接、认证、打开 Shell 通道都在该线程完成，之后循环轮询通道输出
//! 并处理来自会话核心的写入/调整尺寸/终止命令。
//!
//! SFTP 子通道走独立的阻塞连接：libssh2 的阻塞模式是会话级全局开关，
//! Shell 轮询要求主会话处于非阻塞模式，与消费方同享一个会话会让
//! SFTP 调用随机得到 WouldBlock。
//!
//! ## 认证顺序
//! 1. 配置了私钥时先尝试私钥；私钥不可读且无密码兜底时
//!    直接返回配置错误，不发起任何连接；
//! 2. 私钥失败或未配置时回退密码认证；
//! 3. 密码认证被拒时再尝试 keyboard-interactive（部分 sshd 只开放该方式）。

use parking_lot::Mutex;
use ssh2::{KeyboardInteractivePrompt, Prompt, Session, Sftp};
use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;

use crate::connections::session_config::SessionConfig;
use crate::connections::ChannelMsg;
use crate::error::TerminalError;
use crate::events::ExitStatus;

/// 默认 SSH 端口
pub const DEFAULT_SSH_PORT: u16 = 22;

/// 连接与握手超时
pub const SSH_CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

/// 输出轮询间隔（非阻塞读无数据时）
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// 读取缓冲区大小
const READ_BUF_SIZE: usize = 8192;

/// SSH 连接参数
#[derive(Debug, Clone)]
pub struct SSHOpts {
    /// 主机
    pub host: String,
    /// 端口
    pub port: u16,
    /// 用户名
    pub username: String,
    /// 私钥路径
    pub key_path: Option<PathBuf>,
    /// 密码（可作为主认证或私钥失败的兜底）
    pub password: Option<String>,
}

impl SSHOpts {
    /// 从会话配置构造
    ///
    /// 调用前配置应已通过 `SessionConfig::validate`。
    pub fn from_config(config: &SessionConfig, password: Option<String>) -> Self {
        Self {
            host: config.host.clone().unwrap_or_default(),
            port: config.port.unwrap_or(DEFAULT_SSH_PORT),
            username: config.username.clone().unwrap_or_default(),
            key_path: config.key_path.clone().map(PathBuf::from),
            password,
        }
    }

    /// 校验凭证材料
    ///
    /// 私钥与密码都缺失时是配置错误，绝不发起连接。
    pub fn validate(&self) -> Result<(), TerminalError> {
        if self.key_path.is_none() && self.password.is_none() {
            return Err(TerminalError::InvalidConfig(
                "远程会话需要私钥或密码至少一种凭证".into(),
            ));
        }
        Ok(())
    }
}

/// 工作线程命令
enum SshCommand {
    Write(Vec<u8>),
    Resize(u16, u16),
    Kill,
}

/// keyboard-interactive 应答器
///
/// 对非回显或文案含 password 的提示以密码应答，其余留空。
struct PasswordPrompter {
    password: String,
}

impl KeyboardInteractivePrompt for PasswordPrompter {
    fn prompt<'a>(
        &mut self,
        _username: &str,
        _instructions: &str,
        prompts: &[Prompt<'a>],
    ) -> Vec<String> {
        prompts
            .iter()
            .map(|p| {
                if !p.echo || p.text.to_lowercase().contains("password") {
                    self.password.clone()
                } else {
                    String::new()
                }
            })
            .collect()
    }
}

/// SSH 远程 Shell 进程
///
/// 对会话核心暴露与本地 PTY 一致的写入/调整尺寸/终止语义。
pub struct SshShellProc {
    cmd_tx: std_mpsc::Sender<SshCommand>,
    sftp: Arc<Mutex<Option<Sftp>>>,
}

impl SshShellProc {
    /// 建立连接并打开交互式 Shell
    ///
    /// 连接、认证在工作线程完成；本方法等待其结果后返回。
    /// SFTP 子通道尽力而为：失败只记录日志，不影响会话。
    pub async fn open(
        mut opts: SSHOpts,
        cols: u16,
        rows: u16,
    ) -> Result<(Self, UnboundedReceiver<ChannelMsg>), TerminalError> {
        opts.validate()?;

        // 私钥可读性前置检查：不可读且无密码兜底时，不发起任何连接
        if let Some(key_path) = opts.key_path.clone() {
            if let Err(e) = check_key_file(&key_path) {
                if opts.password.is_none() {
                    return Err(e);
                }
                tracing::warn!("[SSH] 私钥不可读，改用密码认证: {e}");
                opts.key_path = None;
            }
        }

        let (out_tx, out_rx) = unbounded_channel();
        let (cmd_tx, cmd_rx) = std_mpsc::channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        let sftp_slot = Arc::new(Mutex::new(None));

        let worker_slot = Arc::clone(&sftp_slot);
        std::thread::spawn(move || {
            Self::worker(opts, cols, rows, ready_tx, out_tx, cmd_rx, worker_slot);
        });

        ready_rx
            .await
            .map_err(|_| TerminalError::ConnectFailed("连接线程提前退出".into()))??;

        Ok((
            Self {
                cmd_tx,
                sftp: sftp_slot,
            },
            out_rx,
        ))
    }

    /// 写入输入字节
    pub fn write(&self, bytes: &[u8]) -> Result<(), TerminalError> {
        self.cmd_tx
            .send(SshCommand::Write(bytes.to_vec()))
            .map_err(|_| TerminalError::ChannelClosed)
    }

    /// 调整远程终端窗口尺寸
    pub fn resize(&self, cols: u16, rows: u16) -> Result<(), TerminalError> {
        self.cmd_tx
            .send(SshCommand::Resize(cols, rows))
            .map_err(|_| TerminalError::ChannelClosed)
    }

    /// 关闭 Shell 通道和底层连接
    pub fn kill(&self) {
        let _ = self.cmd_tx.send(SshCommand::Kill);
    }

    /// SFTP 子通道句柄
    ///
    /// 在 `SftpReady` 之前为 None。消费方通过互斥锁独占使用；
    /// 句柄挂在独立的阻塞连接上，Shell 侧的非阻塞轮询不影响它。
    pub fn sftp_handle(&self) -> Arc<Mutex<Option<Sftp>>> {
        Arc::clone(&self.sftp)
    }

    /// 工作线程主体：连接、认证、打开通道，然后进入轮询循环
    fn worker(
        opts: SSHOpts,
        cols: u16,
        rows: u16,
        ready_tx: oneshot::Sender<Result<(), TerminalError>>,
        out_tx: UnboundedSender<ChannelMsg>,
        cmd_rx: std_mpsc::Receiver<SshCommand>,
        sftp_slot: Arc<Mutex<Option<Sftp>>>,
    ) {
        let session = match Self::connect_and_auth(&opts) {
            Ok(session) => session,
            Err(e) => {
                let _ = ready_tx.send(Err(e));
                return;
            }
        };

        let mut channel = match Self::open_shell(&session, cols, rows) {
            Ok(channel) => channel,
            Err(e) => {
                let _ = ready_tx.send(Err(e));
                return;
            }
        };

        // SFTP 子通道：独立的阻塞连接，失败不致命。
        // 主会话即将切入非阻塞轮询，交出的句柄必须挂在不受其影响的会话上
        match Self::open_sftp(&opts) {
            Ok(sftp) => {
                *sftp_slot.lock() = Some(sftp);
                let _ = out_tx.send(ChannelMsg::SftpReady);
                tracing::info!("[SSH] SFTP 子通道已就绪");
            }
            Err(e) => {
                tracing::warn!("[SSH] SFTP 子通道打开失败（会话继续）: {e}");
            }
        }

        let _ = ready_tx.send(Ok(()));

        session.set_blocking(false);
        let mut buf = [0u8; READ_BUF_SIZE];

        'outer: loop {
            // 先处理积压的命令
            loop {
                match cmd_rx.try_recv() {
                    Ok(SshCommand::Write(bytes)) => {
                        session.set_blocking(true);
                        let result = std::io::Write::write_all(&mut channel, &bytes)
                            .and_then(|_| std::io::Write::flush(&mut channel));
                        session.set_blocking(false);
                        if let Err(e) = result {
                            tracing::warn!("[SSH] 写入失败: {e}");
                            break 'outer;
                        }
                    }
                    Ok(SshCommand::Resize(c, r)) => {
                        if let Err(e) =
                            channel.request_pty_size(u32::from(c), u32::from(r), None, None)
                        {
                            tracing::warn!("[SSH] 调整窗口尺寸失败: {e}");
                        }
                    }
                    Ok(SshCommand::Kill) => break 'outer,
                    Err(std_mpsc::TryRecvError::Empty) => break,
                    Err(std_mpsc::TryRecvError::Disconnected) => break 'outer,
                }
            }

            // Shell 输出（stream 0）
            let mut idle = true;
            match channel.read(&mut buf) {
                Ok(0) => {}
                Ok(n) => {
                    idle = false;
                    if out_tx.send(ChannelMsg::Data(buf[..n].to_vec())).is_err() {
                        break 'outer;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(e) => {
                    // 读路径故障：丢弃本次读取并记录，流继续
                    tracing::warn!("[SSH] 读取故障，丢弃本块: {e}");
                }
            }

            // stderr（stream 1）：Git 的认证提示常走这里
            match channel.stderr().read(&mut buf) {
                Ok(0) => {}
                Ok(n) => {
                    idle = false;
                    if out_tx.send(ChannelMsg::Data(buf[..n].to_vec())).is_err() {
                        break 'outer;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(e) => {
                    tracing::warn!("[SSH] stderr 读取故障，丢弃本块: {e}");
                }
            }

            if channel.eof() {
                break;
            }
            if idle {
                std::thread::sleep(POLL_INTERVAL);
            }
        }

        // 有界收尾：关闭通道、上报退出码，不等待对端确认
        session.set_blocking(true);
        let _ = channel.close();
        let _ = channel.wait_close();
        let code = channel.exit_status().unwrap_or(0);
        tracing::info!("[SSH] Shell 通道关闭，退出码 {code}");
        let _ = out_tx.send(ChannelMsg::Exit(ExitStatus::with_code(code)));
    }

    /// TCP 连接 + 握手 + 认证
    fn connect_and_auth(opts: &SSHOpts) -> Result<Session, TerminalError> {
        let addr = format!("{}:{}", opts.host, opts.port);
        let mut resolved = addr
            .to_socket_addrs()
            .map_err(|e| TerminalError::ConnectFailed(format!("解析主机失败: {e}")))?;
        let socket_addr = resolved
            .next()
            .ok_or_else(|| TerminalError::ConnectFailed(format!("无法解析主机: {addr}")))?;

        tracing::info!("[SSH] 连接 {}@{addr}", opts.username);

        let tcp = TcpStream::connect_timeout(&socket_addr, SSH_CONNECT_TIMEOUT).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                TerminalError::ConnectTimeout(addr.clone())
            } else {
                TerminalError::ConnectFailed(e.to_string())
            }
        })?;

        let mut session =
            Session::new().map_err(|e| TerminalError::ConnectFailed(e.to_string()))?;
        session.set_tcp_stream(tcp);
        session.set_timeout(SSH_CONNECT_TIMEOUT.as_millis() as u32);
        session
            .handshake()
            .map_err(|e| TerminalError::ConnectFailed(format!("握手失败: {e}")))?;

        Self::authenticate(&session, opts)?;

        if !session.authenticated() {
            return Err(TerminalError::AuthFailed("所有认证方式均被拒绝".into()));
        }

        tracing::info!("[SSH] 连接已建立并通过认证");
        Ok(session)
    }

    /// 按顺序尝试认证方式
    fn authenticate(session: &Session, opts: &SSHOpts) -> Result<(), TerminalError> {
        if let Some(key_path) = &opts.key_path {
            match Self::try_pubkey(session, &opts.username, key_path) {
                Ok(()) => return Ok(()),
                Err(e) if opts.password.is_some() => {
                    tracing::warn!("[SSH] 私钥认证失败，回退密码认证: {e}");
                }
                Err(e) => return Err(e),
            }
        }

        let password = opts
            .password
            .as_ref()
            .ok_or_else(|| TerminalError::AuthFailed("没有可用的认证方式".into()))?;

        if let Err(e) = session.userauth_password(&opts.username, password) {
            tracing::warn!("[SSH] 密码认证被拒，尝试 keyboard-interactive: {e}");
            let mut prompter = PasswordPrompter {
                password: password.clone(),
            };
            session
                .userauth_keyboard_interactive(&opts.username, &mut prompter)
                .map_err(|e| TerminalError::AuthFailed(e.to_string()))?;
        }

        Ok(())
    }

    /// 私钥认证
    ///
    /// 可读性已在 `open` 前置检查，这里只处理认证被拒。
    fn try_pubkey(
        session: &Session,
        username: &str,
        key_path: &Path,
    ) -> Result<(), TerminalError> {
        session
            .userauth_pubkey_file(username, None, key_path, None)
            .map_err(|e| TerminalError::AuthFailed(format!("私钥认证失败: {e}")))
    }

    /// 为 SFTP 建立独立的阻塞连接
    ///
    /// 返回的句柄内部持有自己的会话引用，局部 `Session` 丢弃后连接
    /// 仍然存活；Shell 侧的阻塞模式切换不会波及它。
    fn open_sftp(opts: &SSHOpts) -> Result<Sftp, TerminalError> {
        let session = Self::connect_and_auth(opts)?;
        session
            .sftp()
            .map_err(|e| TerminalError::ConnectFailed(format!("打开 SFTP 失败: {e}")))
    }

    /// 打开交互式 Shell 通道
    fn open_shell(
        session: &Session,
        cols: u16,
        rows: u16,
    ) -> Result<ssh2::Channel, TerminalError> {
        let mut channel = session
            .channel_session()
            .map_err(|e| TerminalError::ConnectFailed(format!("打开通道失败: {e}")))?;
        channel
            .request_pty(
                "xterm-256color",
                None,
                Some((u32::from(cols), u32::from(rows), 0, 0)),
            )
            .map_err(|e| TerminalError::ConnectFailed(format!("请求 PTY 失败: {e}")))?;
        channel
            .shell()
            .map_err(|e| TerminalError::ConnectFailed(format!("启动 Shell 失败: {e}")))?;
        Ok(channel)
    }
}

/// 私钥文件可读性检查
///
/// 缺失或为空视为密钥不可用（配置级错误），与认证被拒分开，
/// 便于面向用户的诊断。
fn check_key_file(key_path: &Path) -> Result<(), TerminalError> {
    if !key_path.exists() {
        return Err(TerminalError::KeyUnavailable(format!(
            "私钥文件不存在: {}",
            key_path.display()
        )));
    }
    let metadata_len = std::fs::metadata(key_path).map(|m| m.len()).unwrap_or(0);
    if metadata_len == 0 {
        return Err(TerminalError::KeyUnavailable(format!(
            "私钥文件为空: {}",
            key_path.display()
        )));
    }
    Ok(())
}
