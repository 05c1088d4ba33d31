//! 提权命令执行：sudo -S 通过 stdin 传口令，pkexec 依赖系统策略授权

use super::credential::Secret;
use super::PrivilegeError;
use std::ffi::OsStr;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// apt 锁被占用时输出中的特征串
pub const LOCK_MARKER: &str = "Could not get lock";
pub const LOCK_MESSAGE: &str =
    "Another package manager is currently using apt. Please close it and try again.";
pub const UNKNOWN_FAILURE: &str = "Unknown error occurred during apt update.";
/// 未指定时使用的无输出失败信息
pub const SILENT_FAILURE: &str = "The command failed without printing any output.";

/// 失败信息最多保留的尾部行数
const TRAILING_LINES: usize = 20;

/// 成功命令的输出（stdout 与 stderr 按到达顺序合并）
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub text: String,
}

/// 从失败输出推导给用户看的信息；没有任何输出时返回 fallback
pub fn failure_message(output: &str, fallback: &str) -> String {
    if output.contains(LOCK_MARKER) {
        return LOCK_MESSAGE.to_string();
    }
    let lines: Vec<&str> = output.trim().lines().collect();
    let start = lines.len().saturating_sub(TRAILING_LINES);
    let tail = lines[start..].join("\n");
    let tail = tail.trim();
    if tail.is_empty() {
        fallback.to_string()
    } else {
        tail.to_string()
    }
}

/// 清理终端输出中的 ANSI 转义序列和控制字符
pub fn clean_terminal_output(input: &str) -> String {
    let mut result = String::new();
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\x1b' => {
                if chars.peek() == Some(&'[') {
                    chars.next();
                    while let Some(&next) = chars.peek() {
                        chars.next();
                        if next.is_ascii_alphabetic() {
                            break;
                        }
                    }
                }
            }
            c if c.is_control() && c != '\t' => {}
            _ => result.push(c),
        }
    }
    result
}

/// 在 PATH 中查找可执行文件；含 `/` 的名字按路径直接检查
pub fn find_in_path(name: &str, path_var: Option<&OsStr>) -> Option<PathBuf> {
    if name.contains('/') {
        let path = Path::new(name);
        return path.is_file().then(|| path.to_path_buf());
    }
    let path_var = path_var?;
    std::env::split_paths(path_var)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

/// 按行读取流，写入共享缓冲并转发给 UI
fn pump_lines(
    stream: Option<impl Read>,
    combined: &Mutex<Vec<String>>,
    tx: Option<&mpsc::UnboundedSender<String>>,
) {
    let mut reader = match stream {
        Some(reader) => reader,
        None => return,
    };
    let mut buffer = [0u8; 1024];
    let mut pending: Vec<u8> = Vec::new();

    let flush_line = |bytes: &[u8]| {
        let line = clean_terminal_output(&String::from_utf8_lossy(bytes));
        if line.trim().is_empty() {
            return;
        }
        if let Some(tx) = tx {
            let _ = tx.send(line.clone());
        }
        if let Ok(mut lines) = combined.lock() {
            lines.push(line);
        }
    };

    while let Ok(n) = reader.read(&mut buffer) {
        if n == 0 {
            break;
        }
        for &b in &buffer[..n] {
            // apt 的进度行用 \r 就地刷新，同样按行处理
            if b == b'\n' || b == b'\r' {
                flush_line(&pending);
                pending.clear();
            } else {
                pending.push(b);
            }
        }
    }
    if !pending.is_empty() {
        flush_line(&pending);
    }
}

/// 固定参数的提权命令，每次调用启动一个独立子进程
#[derive(Debug, Clone)]
pub struct PrivilegedCommand {
    argv: Vec<String>,
    silent_failure: String,
}

impl PrivilegedCommand {
    pub fn new(argv: Vec<String>) -> Self {
        Self {
            argv,
            silent_failure: SILENT_FAILURE.to_string(),
        }
    }

    /// 失败且没有任何输出时报告的信息
    pub fn with_silent_failure(mut self, message: impl Into<String>) -> Self {
        self.silent_failure = message.into();
        self
    }

    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or("")
    }

    /// sudo -S 形式：口令加换行写入 stdin 后关闭
    pub fn run_with_secret(
        &self,
        secret: &Secret,
        tx: Option<mpsc::UnboundedSender<String>>,
    ) -> Result<CommandOutput, PrivilegeError> {
        self.execute(Some(secret), tx)
    }

    /// pkexec 形式：无口令，提权工具缺失时直接报告
    pub fn run_with_policy(
        &self,
        tx: Option<mpsc::UnboundedSender<String>>,
    ) -> Result<CommandOutput, PrivilegeError> {
        let helper = self.program();
        if find_in_path(helper, std::env::var_os("PATH").as_deref()).is_none() {
            return Err(PrivilegeError::HelperMissing(helper.to_string()));
        }
        self.execute(None, tx)
    }

    fn execute(
        &self,
        secret: Option<&Secret>,
        tx: Option<mpsc::UnboundedSender<String>>,
    ) -> Result<CommandOutput, PrivilegeError> {
        use std::os::unix::process::CommandExt;

        let (program, args) = self.argv.split_first().ok_or_else(|| {
            PrivilegeError::WriteFailed(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty command",
            ))
        })?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(if secret.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        unsafe {
            cmd.pre_exec(|| {
                // 界面退出时子进程随之收到 SIGTERM
                libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM);
                Ok(())
            });
        }
        let mut child = cmd.spawn().map_err(PrivilegeError::WriteFailed)?;
        log::info!("started `{}` (pid {})", self.argv.join(" "), child.id());

        if let Some(secret) = secret {
            let written = match child.stdin.take() {
                Some(mut stdin) => {
                    writeln!(stdin, "{}", secret.expose()).and_then(|_| stdin.flush())
                }
                None => Err(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "stdin was not captured",
                )),
            };
            if let Err(e) = written {
                let _ = child.kill();
                let _ = child.wait();
                return Err(PrivilegeError::WriteFailed(e));
            }
        }

        let combined = Arc::new(Mutex::new(Vec::new()));
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let stdout_handle = {
            let combined = Arc::clone(&combined);
            let tx = tx.clone();
            std::thread::spawn(move || pump_lines(stdout, &combined, tx.as_ref()))
        };
        let stderr_handle = {
            let combined = Arc::clone(&combined);
            std::thread::spawn(move || pump_lines(stderr, &combined, tx.as_ref()))
        };
        let _ = stdout_handle.join();
        let _ = stderr_handle.join();

        let status = child.wait().map_err(|e| PrivilegeError::CommandFailed {
            message: e.to_string(),
        })?;
        let text = combined
            .lock()
            .map(|lines| lines.join("\n"))
            .unwrap_or_default();

        if status.success() {
            log::info!("`{}` finished", self.argv.join(" "));
            Ok(CommandOutput { text })
        } else {
            log::warn!("`{}` exited with {:?}", self.argv.join(" "), status.code());
            Err(PrivilegeError::CommandFailed {
                message: failure_message(&text, &self.silent_failure),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> PrivilegedCommand {
        PrivilegedCommand::new(vec!["sh".into(), "-c".into(), script.into()])
    }

    #[test]
    fn lock_marker_overrides_everything() {
        let output = "Reading package lists...\n\
            E: Could not get lock /var/lib/apt/lists/lock. It is held by process 1234\n\
            E: Unable to lock directory /var/lib/apt/lists/";
        assert_eq!(failure_message(output, UNKNOWN_FAILURE), LOCK_MESSAGE);
    }

    #[test]
    fn empty_output_falls_back_to_generic_message() {
        assert_eq!(failure_message("", UNKNOWN_FAILURE), UNKNOWN_FAILURE);
        assert_eq!(failure_message("  \n\n ", SILENT_FAILURE), SILENT_FAILURE);
    }

    #[test]
    fn failure_keeps_trailing_lines_only() {
        let output: String = (0..50).map(|i| format!("line {}\n", i)).collect();
        let message = failure_message(&output, UNKNOWN_FAILURE);
        assert!(message.starts_with("line 30"));
        assert!(message.ends_with("line 49"));
    }

    #[test]
    fn strips_ansi_sequences() {
        assert_eq!(clean_terminal_output("\x1b[1;31mE:\x1b[0m broken"), "E: broken");
    }

    #[test]
    fn secret_reaches_stdin_and_output_is_combined() {
        let secret = Secret::new("s3cret".into());
        let cmd = sh("read pw; [ \"$pw\" = s3cret ] || exit 9; echo out; echo err >&2");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let output = cmd.run_with_secret(&secret, Some(tx)).unwrap();
        assert!(output.text.contains("out"));
        assert!(output.text.contains("err"));

        let mut streamed = Vec::new();
        while let Ok(line) = rx.try_recv() {
            streamed.push(line);
        }
        assert_eq!(streamed.len(), 2);
    }

    #[test]
    fn lock_contention_is_classified() {
        let secret = Secret::new("pw".into());
        let cmd = sh("cat >/dev/null; echo 'E: Could not get lock /var/lib/apt/lists/lock' >&2; exit 100");
        match cmd.run_with_secret(&secret, None) {
            Err(PrivilegeError::CommandFailed { message }) => assert_eq!(message, LOCK_MESSAGE),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn silent_failure_uses_caller_message() {
        let secret = Secret::new("pw".into());
        let update = sh("exit 1").with_silent_failure(UNKNOWN_FAILURE);
        match update.run_with_secret(&secret, None) {
            Err(PrivilegeError::CommandFailed { message }) => assert_eq!(message, UNKNOWN_FAILURE),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn silent_policy_failure_does_not_mention_update() {
        // sh 作为提权工具，保证能在 PATH 中找到
        match sh("exit 1").run_with_policy(None) {
            Err(PrivilegeError::CommandFailed { message }) => {
                assert_eq!(message, SILENT_FAILURE);
                assert!(!message.contains("apt update"));
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn spawn_failure_is_a_write_failure() {
        let secret = Secret::new("pw".into());
        let cmd = PrivilegedCommand::new(vec!["/nonexistent/las-helper".into()]);
        assert!(matches!(
            cmd.run_with_secret(&secret, None),
            Err(PrivilegeError::WriteFailed(_))
        ));
    }

    #[test]
    fn missing_policy_helper_is_reported() {
        let cmd = PrivilegedCommand::new(vec!["las-no-such-helper".into(), "true".into()]);
        match cmd.run_with_policy(None) {
            Err(PrivilegeError::HelperMissing(name)) => assert_eq!(name, "las-no-such-helper"),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn path_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("pkexec");
        std::fs::write(&tool, "").unwrap();
        let path_var = std::env::join_paths([dir.path()]).unwrap();
        assert_eq!(find_in_path("pkexec", Some(&path_var)), Some(tool.clone()));
        assert_eq!(find_in_path("sudo", Some(&path_var)), None);
        assert_eq!(find_in_path(tool.to_str().unwrap(), None), Some(tool));
    }
}
