//! 命令边界识别与历史
//!
//! 从终端输出字节流中增量还原用户输入的逻辑命令行。
//! 识别基于回显输出而不是原始击键：远程会话的回显行为不可假设
//! 与本地输入一一对应，而回显是两种传输共有的可靠信号。
//!
//! 识别是启发式的尽力而为：转义序列（方向键、光标移动等）按状态机
//! 跳过而不是按字面累积，但无法覆盖所有 shell 的行编辑行为。

use std::collections::VecDeque;

/// 命令历史上限
pub const MAX_HISTORY: usize = 1000;

/// 累积缓冲区上限，超出后截断保留尾部
const MAX_BUFFER: usize = 200;
const BUFFER_KEEP: usize = 100;

/// 转义序列跳过状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EscapeState {
    /// 不在转义序列内
    None,
    /// 已读到 ESC
    Esc,
    /// CSI 序列（ESC [ ...），以 0x40..=0x7e 结束
    Csi,
    /// OSC 序列（ESC ] ...），以 BEL 或 ST 结束
    Osc,
    /// OSC 内读到 ESC，等待 ST 的反斜杠
    OscEsc,
}

/// 命令识别器
///
/// 每个会话持有一个实例。跨分块保持状态：
/// 拆成多块到达的命令与单块到达的命令识别结果一致。
pub struct CommandRecognizer {
    /// 当前未提交行的累积
    accumulator: String,
    /// 已完成命令历史（头部淘汰）
    history: VecDeque<String>,
    /// 转义序列状态
    escape: EscapeState,
}

impl CommandRecognizer {
    /// 创建识别器
    pub fn new() -> Self {
        Self {
            accumulator: String::new(),
            history: VecDeque::new(),
            escape: EscapeState::None,
        }
    }

    /// 喂入一个输出分块，返回本块内完成的命令
    pub fn feed(&mut self, chunk: &str) -> Vec<String> {
        let mut completed = Vec::new();
        for ch in chunk.chars() {
            if let Some(command) = self.feed_char(ch) {
                completed.push(command);
            }
        }
        completed
    }

    fn feed_char(&mut self, ch: char) -> Option<String> {
        // 转义序列优先于一切字符分类
        match self.escape {
            EscapeState::Esc => {
                self.escape = match ch {
                    '[' => EscapeState::Csi,
                    ']' => EscapeState::Osc,
                    // 单字符转义（ESC c 等），本字符即结束
                    _ => EscapeState::None,
                };
                return None;
            }
            EscapeState::Csi => {
                if ('\x40'..='\x7e').contains(&ch) {
                    self.escape = EscapeState::None;
                }
                return None;
            }
            EscapeState::Osc => {
                self.escape = match ch {
                    '\x07' => EscapeState::None,
                    '\x1b' => EscapeState::OscEsc,
                    _ => EscapeState::Osc,
                };
                return None;
            }
            EscapeState::OscEsc => {
                self.escape = if ch == '\\' {
                    EscapeState::None
                } else {
                    EscapeState::Osc
                };
                return None;
            }
            EscapeState::None => {}
        }

        match ch {
            '\r' | '\n' => {
                let command = self.accumulator.trim().to_string();
                self.accumulator.clear();
                if command.is_empty() {
                    None
                } else {
                    self.push_history(&command);
                    Some(command)
                }
            }
            '\x08' | '\x7f' => {
                self.accumulator.pop();
                None
            }
            '\x1b' => {
                self.escape = EscapeState::Esc;
                None
            }
            c if c >= ' ' || c == '\t' => {
                self.accumulator.push(c);
                if self.accumulator.len() > MAX_BUFFER {
                    let mut cut = self.accumulator.len() - BUFFER_KEEP;
                    while !self.accumulator.is_char_boundary(cut) {
                        cut += 1;
                    }
                    self.accumulator.drain(..cut);
                }
                None
            }
            // 其余控制字节对识别透明，仍会原样转发给输出消费者
            _ => None,
        }
    }

    /// 追加历史，抑制紧邻重复并执行头部淘汰
    pub fn push_history(&mut self, command: &str) {
        if command.is_empty() {
            return;
        }
        if self.history.back().map(String::as_str) == Some(command) {
            return;
        }
        self.history.push_back(command.to_string());
        while self.history.len() > MAX_HISTORY {
            self.history.pop_front();
        }
    }

    /// 当前累积的未提交行
    pub fn buffer(&self) -> &str {
        &self.accumulator
    }

    /// 清空累积缓冲区
    pub fn clear_buffer(&mut self) {
        self.accumulator.clear();
    }

    /// 历史快照（提交顺序）
    pub fn history(&self) -> Vec<String> {
        self.history.iter().cloned().collect()
    }

    /// 最近一条完成的命令
    pub fn last_command(&self) -> Option<&str> {
        self.history.back().map(String::as_str)
    }

    /// 历史条数
    pub fn history_len(&self) -> usize {
        self.history.len()
    }
}

impl Default for CommandRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_chunk_command() {
        let mut rec = CommandRecognizer::new();
        let done = rec.feed("git status\r");
        assert_eq!(done, vec!["git status".to_string()]);
        assert_eq!(rec.history(), vec!["git status".to_string()]);
    }

    #[test]
    fn test_chunk_boundary_recognition() {
        // 拆块与整块识别结果一致
        let mut split = CommandRecognizer::new();
        split.feed("gi");
        let done = split.feed("t status\r");
        assert_eq!(done, vec!["git status".to_string()]);

        let mut whole = CommandRecognizer::new();
        whole.feed("git status\r");
        assert_eq!(split.history(), whole.history());
    }

    #[test]
    fn test_backspace_edits_accumulator() {
        let mut rec = CommandRecognizer::new();
        rec.feed("lss\x08");
        assert_eq!(rec.buffer(), "ls");
        let done = rec.feed("\r");
        assert_eq!(done, vec!["ls".to_string()]);
    }

    #[test]
    fn test_backspace_on_empty_is_noop() {
        let mut rec = CommandRecognizer::new();
        rec.feed("\x08\x7f");
        assert_eq!(rec.buffer(), "");
    }

    #[test]
    fn test_adjacent_duplicate_suppressed() {
        let mut rec = CommandRecognizer::new();
        rec.feed("ls\r");
        rec.feed("ls\r");
        assert_eq!(rec.history_len(), 1);

        rec.feed("pwd\r");
        rec.feed("ls\r");
        // 非紧邻重复允许
        assert_eq!(
            rec.history(),
            vec!["ls".to_string(), "pwd".to_string(), "ls".to_string()]
        );
    }

    #[test]
    fn test_history_cap() {
        let mut rec = CommandRecognizer::new();
        for i in 0..(MAX_HISTORY + 50) {
            rec.feed(&format!("echo {i}\r"));
        }
        assert_eq!(rec.history_len(), MAX_HISTORY);
        // 保留的是最近 1000 条
        assert_eq!(rec.history()[0], "echo 50");
        assert_eq!(rec.last_command(), Some(format!("echo {}", MAX_HISTORY + 49).as_str()));
    }

    #[test]
    fn test_csi_sequence_skipped() {
        let mut rec = CommandRecognizer::new();
        // 上方向键序列不应累积为字面字符
        rec.feed("ls \x1b[A-la\r");
        assert_eq!(rec.history(), vec!["ls -la".to_string()]);
    }

    #[test]
    fn test_csi_sequence_split_across_chunks() {
        let mut rec = CommandRecognizer::new();
        rec.feed("ls\x1b[");
        rec.feed("1;2H -a\r");
        assert_eq!(rec.history(), vec!["ls -a".to_string()]);
    }

    #[test]
    fn test_osc_sequence_skipped() {
        let mut rec = CommandRecognizer::new();
        rec.feed("\x1b]0;window title\x07pwd\r");
        assert_eq!(rec.history(), vec!["pwd".to_string()]);
    }

    #[test]
    fn test_empty_line_not_recorded() {
        let mut rec = CommandRecognizer::new();
        rec.feed("\r\n   \r");
        assert_eq!(rec.history_len(), 0);
    }

    #[test]
    fn test_crlf_counts_once() {
        let mut rec = CommandRecognizer::new();
        let done = rec.feed("ls\r\n");
        assert_eq!(done, vec!["ls".to_string()]);
        assert_eq!(rec.history_len(), 1);
    }
}
