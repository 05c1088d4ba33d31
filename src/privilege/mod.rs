//! 提权相关：口令输入校验、sudo / pkexec 命令执行、伪进度条

pub mod credential;
pub mod progress;
pub mod runner;

pub use credential::{CredentialProbe, CredentialPrompt, PromptOutcome, Secret, SudoProbe};
pub use progress::{ProgressReflector, Tick};
pub use runner::PrivilegedCommand;

use std::io;
use thiserror::Error;

/// 提权命令失败的三类原因
#[derive(Debug, Error)]
pub enum PrivilegeError {
    /// 进程未能启动或口令未能写入 stdin，操作根本没有开始
    #[error("could not start the privileged command: {0}")]
    WriteFailed(#[source] io::Error),
    /// 进程已运行但以非零状态退出
    #[error("{message}")]
    CommandFailed { message: String },
    /// 系统中找不到提权工具
    #[error("`{0}` is not installed on this system, so the operation could not be attempted.")]
    HelperMissing(String),
}
