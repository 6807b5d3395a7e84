//! 本地 PTY 连接
//!
//! 基于 portable-pty 拉起平台默认 Shell 并挂接伪终端。
//! 读取在专用线程进行，分块经无界通道交付；退出由独立的
//! 等待线程上报。写入端与调整尺寸的句柄由互斥锁保护。

use parking_lot::Mutex;
use portable_pty::{native_pty_system, ChildKiller, CommandBuilder, MasterPty, PtySize};
use std::io::{Read, Write};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::connections::ChannelMsg;
use crate::error::TerminalError;
use crate::events::ExitStatus;

/// 读取缓冲区大小
const READ_BUF_SIZE: usize = 4096;

/// 本地 PTY 连接
pub struct LocalPty {
    master: Mutex<Box<dyn MasterPty + Send>>,
    writer: Mutex<Box<dyn Write + Send>>,
    killer: Mutex<Box<dyn ChildKiller + Send + Sync>>,
}

impl LocalPty {
    /// 打开 PTY 并拉起 Shell
    ///
    /// 返回连接句柄和输出流接收端。
    pub fn open(cols: u16, rows: u16) -> Result<(Self, UnboundedReceiver<ChannelMsg>), TerminalError> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| TerminalError::SpawnFailed(e.to_string()))?;

        let cmd = default_shell_command();

        let mut child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| TerminalError::SpawnFailed(e.to_string()))?;
        // 子进程拉起后立即释放 slave 端，否则读端收不到 EOF
        drop(pair.slave);

        let killer = child.clone_killer();
        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| TerminalError::SpawnFailed(e.to_string()))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| TerminalError::SpawnFailed(e.to_string()))?;

        let (tx, rx) = unbounded_channel();

        let read_tx = tx.clone();
        std::thread::spawn(move || {
            let mut buf = [0u8; READ_BUF_SIZE];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if read_tx.send(ChannelMsg::Data(buf[..n].to_vec())).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::debug!("[LocalPty] 读取结束: {e}");
                        break;
                    }
                }
            }
        });

        std::thread::spawn(move || Self::wait_for_exit(&mut child, tx));

        Ok((
            Self {
                master: Mutex::new(pair.master),
                writer: Mutex::new(writer),
                killer: Mutex::new(killer),
            },
            rx,
        ))
    }

    fn wait_for_exit(
        child: &mut Box<dyn portable_pty::Child + Send + Sync>,
        tx: UnboundedSender<ChannelMsg>,
    ) {
        let code = match child.wait() {
            Ok(status) => status.exit_code() as i32,
            Err(e) => {
                tracing::warn!("[LocalPty] 等待子进程失败: {e}");
                -1
            }
        };
        tracing::info!("[LocalPty] Shell 退出，退出码 {code}");
        let _ = tx.send(ChannelMsg::Exit(ExitStatus::with_code(code)));
    }

    /// 写入输入字节
    pub fn write(&self, bytes: &[u8]) -> Result<(), TerminalError> {
        let mut writer = self.writer.lock();
        writer.write_all(bytes)?;
        writer.flush()?;
        Ok(())
    }

    /// 调整伪终端窗口尺寸
    pub fn resize(&self, cols: u16, rows: u16) -> Result<(), TerminalError> {
        self.master
            .lock()
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| TerminalError::SpawnFailed(e.to_string()))
    }

    /// 终止 Shell 进程
    pub fn kill(&self) {
        if let Err(e) = self.killer.lock().kill() {
            tracing::debug!("[LocalPty] 终止子进程失败（可能已退出）: {e}");
        }
    }
}

/// 平台默认 Shell 命令
///
/// Unix 优先 `$SHELL`，回退 `/bin/bash`；
/// Windows 使用 PowerShell，带保持会话常驻的参数。
fn default_shell_command() -> CommandBuilder {
    #[cfg(windows)]
    {
        let mut cmd = CommandBuilder::new("powershell.exe");
        cmd.args(["-NoLogo", "-NoExit"]);
        cmd
    }

    #[cfg(not(windows))]
    {
        let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/bash".to_string());
        let mut cmd = CommandBuilder::new(shell);
        if let Some(home) = dirs_home() {
            cmd.cwd(home);
        }
        cmd.env("TERM", "xterm-256color");
        cmd
    }
}

#[cfg(not(windows))]
fn dirs_home() -> Option<std::path::PathBuf> {
    std::env::var_os("HOME").map(std::path::PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawn_write_and_kill() {
        let (pty, mut rx) = LocalPty::open(80, 24).expect("打开 PTY 失败");

        pty.write(b"echo termcast-ok\n").unwrap();

        // Shell 回显应包含写入内容
        let mut seen = String::new();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        while tokio::time::Instant::now() < deadline {
            match tokio::time::timeout(Duration::from_secs(1), rx.recv()).await {
                Ok(Some(ChannelMsg::Data(bytes))) => {
                    seen.push_str(&String::from_utf8_lossy(&bytes));
                    if seen.contains("termcast-ok") {
                        break;
                    }
                }
                Ok(Some(_)) | Ok(None) => break,
                Err(_) => continue,
            }
        }
        assert!(seen.contains("termcast-ok"), "未观察到回显: {seen:?}");

        pty.resize(100, 40).unwrap();
        pty.kill();

        // 终止后应收到退出消息
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        let mut exited = false;
        while tokio::time::Instant::now() < deadline {
            match tokio::time::timeout(Duration::from_secs(1), rx.recv()).await {
                Ok(Some(ChannelMsg::Exit(_))) => {
                    exited = true;
                    break;
                }
                Ok(Some(_)) => continue,
                Ok(None) => break,
                Err(_) => continue,
            }
        }
        assert!(exited, "终止后未收到退出消息");
    }
}
