mod catalog;
mod config;
mod logging;
mod privilege;
mod sysinfo;
mod tui;

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = config::Config::load_or_default()?;

    // 日志不可用时仍然继续运行
    if let Err(e) = logging::init_file_logger(&config.log_file) {
        eprintln!("warning: logging disabled ({}): {}", config.log_file.display(), e);
    }
    log::info!("las v{} starting", env!("CARGO_PKG_VERSION"));

    tui::run(config).await?;

    Ok(())
}
