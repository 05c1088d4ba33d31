mod action;
pub mod input;
mod layout;
mod notice;
mod splash;
pub mod state;
mod store;
mod theme;

use crate::catalog::Catalog;
use crate::config::Config;
use crate::sysinfo::SystemInfo;
use anyhow::Result;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Frame, Terminal};
use state::{App, AppEvent, AppMode};
use std::io;
use std::time::Duration;
use tokio::sync::mpsc;

/// 事件轮询间隔，小于进度条的 50ms 节拍
const POLL_INTERVAL: Duration = Duration::from_millis(25);

pub async fn run(config: Config) -> Result<()> {
    let native_arch = tokio::task::spawn_blocking(SystemInfo::native_arch).await?;
    let catalog = Catalog::new(&config, &native_arch);

    // 终端初始化
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(config, catalog);

    let (tx, mut rx) = mpsc::channel(64);

    // 异步获取系统信息
    let tx_clone = tx.clone();
    tokio::spawn(async move {
        if let Ok(info) = tokio::task::spawn_blocking(SystemInfo::detect).await {
            let _ = tx_clone.send(AppEvent::SystemInfoDetected(info)).await;
        }
    });

    let result = event_loop(&mut terminal, &mut app, &tx, &mut rx);

    // 恢复终端
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    log::info!("las exiting");
    result
}

fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    tx: &mpsc::Sender<AppEvent>,
    rx: &mut mpsc::Receiver<AppEvent>,
) -> Result<()> {
    loop {
        // 动画节拍与搜索防抖
        splash::on_frame(app, tx);
        if app.mode == AppMode::Store {
            store::on_frame(app, tx);
        }

        terminal.draw(|f| ui(f, app))?;

        // 处理按键
        if event::poll(POLL_INTERVAL)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    handle_key(key, app, tx);
                }
            }
        }

        // 处理异步事件
        while let Ok(event) = rx.try_recv() {
            handle_event(event, app, tx);
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

fn handle_key(key: event::KeyEvent, app: &mut App, tx: &mpsc::Sender<AppEvent>) {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    // 提示框是模态的
    if app.current_notice().is_some() {
        if matches!(key.code, KeyCode::Enter | KeyCode::Esc | KeyCode::Char(' ')) {
            app.dismiss_notice();
        }
        return;
    }

    match app.mode {
        AppMode::Splash => splash::handle_splash_key(key, app, tx),
        AppMode::Store => store::handle_store_key(key, app, tx),
    }
}

fn handle_event(event: AppEvent, app: &mut App, tx: &mpsc::Sender<AppEvent>) {
    match event {
        AppEvent::SystemInfoDetected(info) => {
            log::info!("system: {} / {} / {}", info.distro, info.kernel, info.arch);
            app.system_info = Some(info);
        }
        AppEvent::CredentialChecked { secret, valid } => {
            splash::on_credential_checked(app, secret, valid, tx);
        }
        AppEvent::RefreshLine(line) => splash::on_refresh_line(app, line),
        AppEvent::RefreshSucceeded => log::info!("apt update finished"),
        AppEvent::SplashFailed(notice) => splash::on_splash_failed(app, notice),
        AppEvent::CatalogLoaded(result) => store::on_catalog_loaded(app, result, tx),
        AppEvent::ViewLoaded { seq, view, result } => {
            store::on_view_loaded(app, seq, view, result);
        }
        AppEvent::ActionLine(line) => action::on_action_line(app, line),
        AppEvent::ActionFinished { action, error } => {
            action::on_action_finished(app, action, error, tx);
        }
    }
}

/// 在阻塞线程池中执行任务，结果以事件发回；任务 panic 时用 on_panic 生成事件
pub(crate) fn spawn_worker<F, P>(tx: &mpsc::Sender<AppEvent>, on_panic: P, job: F)
where
    F: FnOnce() -> AppEvent + Send + 'static,
    P: FnOnce(String) -> AppEvent + Send + 'static,
{
    let tx = tx.clone();
    tokio::spawn(async move {
        let event = match tokio::task::spawn_blocking(job).await {
            Ok(event) => event,
            Err(e) => {
                log::error!("worker task failed: {}", e);
                on_panic(e.to_string())
            }
        };
        let _ = tx.send(event).await;
    });
}

/// 子进程输出行的转发线程；发送端全部 drop 后线程结束，
/// 工作线程 join 之后再发完成事件，保证输出行先于完成事件到达
pub(crate) fn spawn_line_forwarder(
    tx: &mpsc::Sender<AppEvent>,
    wrap: fn(String) -> AppEvent,
) -> (mpsc::UnboundedSender<String>, std::thread::JoinHandle<()>) {
    let (line_tx, mut line_rx) = mpsc::unbounded_channel();
    let tx = tx.clone();
    let handle = std::thread::spawn(move || {
        while let Some(line) = line_rx.blocking_recv() {
            if tx.blocking_send(wrap(line)).is_err() {
                break;
            }
        }
    });
    (line_tx, handle)
}

fn ui(f: &mut Frame, app: &App) {
    match app.mode {
        AppMode::Splash => splash::render_splash(f, app),
        AppMode::Store => store::render_store(f, app),
    }
    if let Some(current) = app.current_notice() {
        notice::render_notice(f, current, app.notices.len());
    }
}
