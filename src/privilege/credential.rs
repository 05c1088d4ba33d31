//! 口令输入框状态机与 sudo 口令探测

use crate::tui::input;
use std::fmt;
use std::io::Write;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use zeroize::{Zeroize, Zeroizing};

/// 最多允许输错的次数
pub const MAX_ATTEMPTS: u8 = 3;
/// 探测命令的超时时间
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

pub const LOCKOUT_TITLE: &str = "Wrong Password";
pub const LOCKOUT_DETAIL: &str = "You entered the wrong password three times.";

/// 输入缓冲的固定容量（字节）；不扩容，旧内容就不会残留在释放的内存里
pub const INPUT_CAPACITY: usize = 256;

/// 输错后左右抖动的水平偏移序列（每帧一项）
const SHAKE_PATTERN: [i16; 7] = [3, -3, 3, -3, 3, -3, 0];

/// 内存中的口令，drop 时清零，Debug 输出不含内容
pub struct Secret(Zeroizing<String>);

impl Secret {
    pub fn new(value: String) -> Self {
        Self(Zeroizing::new(value))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// 非破坏性的口令校验
pub trait CredentialProbe: Send + Sync {
    /// 任何异常都视为口令无效，不向调用方抛错
    fn verify(&self, secret: &Secret) -> bool;
}

/// `sudo -S -k -v`：只刷新凭证，不执行任何特权操作
pub struct SudoProbe {
    argv: Vec<String>,
    timeout: Duration,
}

impl SudoProbe {
    pub fn new() -> Self {
        Self::with_command(
            ["sudo", "-S", "-k", "-v"].iter().map(|s| s.to_string()).collect(),
            PROBE_TIMEOUT,
        )
    }

    pub fn with_command(argv: Vec<String>, timeout: Duration) -> Self {
        Self { argv, timeout }
    }
}

impl CredentialProbe for SudoProbe {
    fn verify(&self, secret: &Secret) -> bool {
        match run_probe(&self.argv, secret, self.timeout) {
            Ok(valid) => valid,
            Err(e) => {
                log::warn!("credential probe could not run: {}", e);
                false
            }
        }
    }
}

fn run_probe(argv: &[String], secret: &Secret, timeout: Duration) -> std::io::Result<bool> {
    let (program, args) = match argv.split_first() {
        Some(parts) => parts,
        None => return Ok(false),
    };
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;

    // stdin 在此作用域结束时关闭，sudo 才会继续
    let written = match child.stdin.take() {
        Some(mut stdin) => writeln!(stdin, "{}", secret.expose()).and_then(|_| stdin.flush()),
        None => Ok(()),
    };
    if let Err(e) = written {
        let _ = child.kill();
        let _ = child.wait();
        return Err(e);
    }

    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status.success());
        }
        if Instant::now() >= deadline {
            log::warn!("credential probe timed out after {:?}", timeout);
            let _ = child.kill();
            let _ = child.wait();
            return Ok(false);
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialState {
    Entering,
    Verifying,
    Accepted,
    LockedOut,
    Cancelled,
}

/// 一次校验结果交给状态机后的去向
#[derive(Debug)]
pub enum PromptOutcome {
    Accepted(Secret),
    Retry { remaining: u8 },
    LockedOut,
    /// 当前不在等待校验结果
    Ignored,
}

pub struct CredentialPrompt {
    input: Zeroizing<String>,
    cursor: usize,
    attempts: u8,
    state: CredentialState,
    shake_frame: Option<usize>,
}

impl CredentialPrompt {
    pub fn new() -> Self {
        Self {
            input: Zeroizing::new(String::with_capacity(INPUT_CAPACITY)),
            cursor: 0,
            attempts: 0,
            state: CredentialState::Entering,
            shake_frame: None,
        }
    }

    pub fn state(&self) -> CredentialState {
        self.state
    }

    pub fn attempts(&self) -> u8 {
        self.attempts
    }

    /// 掩码显示用的字符数
    pub fn masked_len(&self) -> usize {
        self.input.chars().count()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.input.is_empty()
    }

    /// 超出缓冲容量的字符被丢弃
    pub fn insert(&mut self, c: char) {
        if self.state == CredentialState::Entering
            && self.input.len() + c.len_utf8() <= self.input.capacity()
        {
            input::str_insert_char(&mut self.input, &mut self.cursor, c);
        }
    }

    pub fn delete_back(&mut self) {
        if self.state == CredentialState::Entering {
            input::str_delete_back(&mut self.input, &mut self.cursor);
        }
    }

    /// 提交当前输入，返回交给探测线程的口令；校验进行中时返回 None
    pub fn submit(&mut self) -> Option<Secret> {
        if self.state != CredentialState::Entering {
            return None;
        }
        self.state = CredentialState::Verifying;
        Some(Secret::new(self.input.as_str().to_string()))
    }

    /// 接收探测结果
    pub fn resolve(&mut self, valid: bool, secret: Secret) -> PromptOutcome {
        if self.state != CredentialState::Verifying {
            return PromptOutcome::Ignored;
        }
        self.clear_input();
        if valid {
            self.state = CredentialState::Accepted;
            return PromptOutcome::Accepted(secret);
        }
        drop(secret);
        self.attempts += 1;
        if self.attempts >= MAX_ATTEMPTS {
            self.state = CredentialState::LockedOut;
            self.shake_frame = None;
            PromptOutcome::LockedOut
        } else {
            self.state = CredentialState::Entering;
            self.shake_frame = Some(0);
            PromptOutcome::Retry {
                remaining: MAX_ATTEMPTS - self.attempts,
            }
        }
    }

    pub fn cancel(&mut self) -> bool {
        match self.state {
            CredentialState::Entering | CredentialState::Verifying => {
                self.clear_input();
                self.state = CredentialState::Cancelled;
                true
            }
            _ => false,
        }
    }

    /// 当前抖动帧的水平偏移
    pub fn shake_offset(&self) -> i16 {
        self.shake_frame
            .and_then(|i| SHAKE_PATTERN.get(i).copied())
            .unwrap_or(0)
    }

    pub fn advance_shake(&mut self) {
        if let Some(frame) = self.shake_frame {
            self.shake_frame = if frame + 1 < SHAKE_PATTERN.len() {
                Some(frame + 1)
            } else {
                None
            };
        }
    }

    fn clear_input(&mut self) {
        self.input.zeroize();
        self.cursor = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn type_str(prompt: &mut CredentialPrompt, s: &str) {
        for c in s.chars() {
            prompt.insert(c);
        }
    }

    fn attempt(prompt: &mut CredentialPrompt, secret: &str, valid: bool) -> PromptOutcome {
        type_str(prompt, secret);
        let submitted = prompt.submit().expect("prompt should accept a submission");
        assert_eq!(submitted.expose(), secret);
        prompt.resolve(valid, submitted)
    }

    #[test]
    fn accepted_on_second_attempt_proceeds() {
        let mut prompt = CredentialPrompt::new();
        assert!(matches!(
            attempt(&mut prompt, "wrong", false),
            PromptOutcome::Retry { remaining: 2 }
        ));
        match attempt(&mut prompt, "hunter2", true) {
            PromptOutcome::Accepted(secret) => assert_eq!(secret.expose(), "hunter2"),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(prompt.state(), CredentialState::Accepted);
        assert_eq!(prompt.attempts(), 1);
        assert!(prompt.is_empty());
    }

    #[test]
    fn three_rejections_lock_out() {
        let mut prompt = CredentialPrompt::new();
        assert!(matches!(attempt(&mut prompt, "a", false), PromptOutcome::Retry { .. }));
        assert!(matches!(attempt(&mut prompt, "b", false), PromptOutcome::Retry { .. }));
        assert!(matches!(attempt(&mut prompt, "c", false), PromptOutcome::LockedOut));
        assert_eq!(prompt.state(), CredentialState::LockedOut);
        assert_eq!(prompt.attempts(), MAX_ATTEMPTS);

        // 锁定后不再接受输入
        prompt.insert('x');
        assert!(prompt.is_empty());
        assert!(prompt.submit().is_none());
    }

    #[test]
    fn failed_attempt_clears_input_and_starts_shake() {
        let mut prompt = CredentialPrompt::new();
        attempt(&mut prompt, "nope", false);
        assert!(prompt.is_empty());
        assert_eq!(prompt.cursor(), 0);
        assert_eq!(prompt.attempts(), 1);
        assert_ne!(prompt.shake_offset(), 0);

        for _ in 0..SHAKE_PATTERN.len() {
            prompt.advance_shake();
        }
        assert_eq!(prompt.shake_offset(), 0);
    }

    #[test]
    fn submission_ignored_while_verifying() {
        let mut prompt = CredentialPrompt::new();
        type_str(&mut prompt, "pw");
        let first = prompt.submit();
        assert!(first.is_some());
        assert!(prompt.submit().is_none());
        prompt.insert('x');
        assert_eq!(prompt.masked_len(), 2);
    }

    #[test]
    fn stray_verdict_is_ignored() {
        let mut prompt = CredentialPrompt::new();
        let outcome = prompt.resolve(false, Secret::new("x".into()));
        assert!(matches!(outcome, PromptOutcome::Ignored));
        assert_eq!(prompt.attempts(), 0);
    }

    #[test]
    fn cancel_yields_no_secret() {
        let mut prompt = CredentialPrompt::new();
        type_str(&mut prompt, "secret");
        assert!(prompt.cancel());
        assert_eq!(prompt.state(), CredentialState::Cancelled);
        assert!(prompt.is_empty());
        assert!(prompt.submit().is_none());
    }

    #[test]
    fn input_buffer_never_grows() {
        let mut prompt = CredentialPrompt::new();
        let capacity = prompt.input.capacity();
        assert!(capacity >= INPUT_CAPACITY);
        for _ in 0..capacity + 10 {
            prompt.insert('é');
        }
        assert_eq!(prompt.input.capacity(), capacity);
        assert!(prompt.input.len() <= capacity);
        assert_eq!(prompt.masked_len(), capacity / 2);

        // 清空后容量保留，下一轮输入仍不扩容
        let secret = prompt.submit().unwrap();
        prompt.resolve(false, secret);
        assert!(prompt.is_empty());
        assert_eq!(prompt.input.capacity(), capacity);
    }

    #[test]
    fn secret_debug_is_redacted() {
        let secret = Secret::new("hunter2".into());
        assert!(!format!("{:?}", secret).contains("hunter2"));
    }

    #[test]
    fn probe_reports_exit_status() {
        let secret = Secret::new("letmein".into());
        let accept = SudoProbe::with_command(
            vec!["sh".into(), "-c".into(), "read pw; [ \"$pw\" = letmein ]".into()],
            PROBE_TIMEOUT,
        );
        assert!(accept.verify(&secret));

        let reject = SudoProbe::with_command(
            vec!["sh".into(), "-c".into(), "read pw; [ \"$pw\" = other ]".into()],
            PROBE_TIMEOUT,
        );
        assert!(!reject.verify(&secret));
    }

    #[test]
    fn probe_failures_count_as_invalid() {
        let secret = Secret::new("pw".into());
        let missing = SudoProbe::with_command(
            vec!["/nonexistent/las-probe".into()],
            PROBE_TIMEOUT,
        );
        assert!(!missing.verify(&secret));

        let slow = SudoProbe::with_command(
            vec!["sh".into(), "-c".into(), "sleep 5".into()],
            Duration::from_millis(200),
        );
        let started = Instant::now();
        assert!(!slow.verify(&secret));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    proptest! {
        #[test]
        fn attempts_never_exceed_maximum(verdicts in prop::collection::vec(any::<bool>(), 0..12)) {
            let mut prompt = CredentialPrompt::new();
            let mut lockouts = 0;
            for valid in verdicts {
                let before = prompt.attempts();
                prompt.insert('p');
                if let Some(secret) = prompt.submit() {
                    match prompt.resolve(valid, secret) {
                        PromptOutcome::LockedOut => lockouts += 1,
                        PromptOutcome::Retry { .. } => {
                            prop_assert_eq!(prompt.attempts(), before + 1);
                            prop_assert!(prompt.is_empty());
                        }
                        _ => {}
                    }
                }
                prop_assert!(prompt.attempts() <= MAX_ATTEMPTS);
            }
            prop_assert!(lockouts <= 1);
            prop_assert_eq!(lockouts == 1, prompt.state() == CredentialState::LockedOut);
        }
    }
}
