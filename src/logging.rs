//! 运行日志：终端被 TUI 占用，日志写入纯文本文件

use anyhow::Result;
use chrono::{DateTime, Local};
use env_logger::{Env, Target};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

/// 单行日志格式: `YYYY-MM-DD HH:MM:SS [LEVEL] message`
pub fn format_line(time: DateTime<Local>, level: log::Level, message: &str) -> String {
    format!("{} [{}] {}", time.format("%Y-%m-%d %H:%M:%S"), level, message)
}

/// 初始化文件日志，默认级别 info，可被 RUST_LOG 覆盖
pub fn init_file_logger(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;

    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .target(Target::Pipe(Box::new(file)))
        .format(|buf, record| {
            writeln!(
                buf,
                "{}",
                format_line(Local::now(), record.level(), &record.args().to_string())
            )
        })
        .try_init()?;

    log::info!("logger initialized at {}", path.display());
    Ok(())
}
