use super::input::render_masked_box;
use super::layout::{centered_rect, shift_rect};
use super::state::{App, AppEvent, AppMode, Notice, SplashPhase};
use super::theme::{BLUE, DIM, PINK};
use super::{spawn_line_forwarder, spawn_worker, store};
use crate::privilege::credential::{CredentialState, LOCKOUT_DETAIL, LOCKOUT_TITLE, MAX_ATTEMPTS};
use crate::privilege::progress::{ProgressPhase, TICK_INTERVAL};
use crate::privilege::runner::UNKNOWN_FAILURE;
use crate::privilege::{
    CredentialProbe, PrivilegeError, PrivilegedCommand, PromptOutcome, ProgressReflector, Secret,
    SudoProbe, Tick,
};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Margin, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Gauge, Paragraph},
    Frame,
};
use std::sync::atomic::Ordering;
use std::time::Instant;
use tokio::sync::mpsc;

const ASCII_LOGO: &str = r#"
██       █████   ███████
░██      ██░░░██ ██░░░░░
░██     ░██  ░██░██
░██     ░███████░░██████
░██     ░██░░░██ ░░░░░██
░██     ░██  ░██      ░██
░███████░██  ░██ ███████
░░░░░░░ ░░   ░░ ░░░░░░░  "#;

const SPINNER: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

const PROMPT_WIDTH: u16 = 54;
const PROMPT_HEIGHT: u16 = 9;

// ========== 按键 ==========

pub fn handle_splash_key(key: KeyEvent, app: &mut App, tx: &mpsc::Sender<AppEvent>) {
    if app.splash.phase != SplashPhase::Authenticating {
        return;
    }
    match key.code {
        KeyCode::Enter => submit_credential(app, tx),
        KeyCode::Esc => {
            if app.splash.prompt.cancel() {
                log::info!("authentication cancelled by user");
                app.should_quit = true;
            }
        }
        KeyCode::Backspace => app.splash.prompt.delete_back(),
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.splash.prompt.insert(c)
        }
        _ => {}
    }
}

/// 口令交给工作线程探测，UI 不等待
fn submit_credential(app: &mut App, tx: &mpsc::Sender<AppEvent>) {
    let Some(secret) = app.splash.prompt.submit() else {
        return;
    };
    app.splash.status = "Checking password...".to_string();
    spawn_worker(
        tx,
        |reason| AppEvent::SplashFailed(Notice::fatal("Error checking password", reason)),
        move || {
            let valid = SudoProbe::new().verify(&secret);
            AppEvent::CredentialChecked { secret, valid }
        },
    );
}

// ========== 事件 ==========

pub fn on_credential_checked(
    app: &mut App,
    secret: Secret,
    valid: bool,
    tx: &mpsc::Sender<AppEvent>,
) {
    match app.splash.prompt.resolve(valid, secret) {
        PromptOutcome::Accepted(secret) => {
            log::info!(
                "password accepted after {} failed attempt(s)",
                app.splash.prompt.attempts()
            );
            start_refresh(app, secret, tx);
        }
        PromptOutcome::Retry { remaining } => {
            log::warn!("password rejected, {} attempt(s) left", remaining);
            app.splash.status = "Waiting for authentication...".to_string();
        }
        PromptOutcome::LockedOut => {
            log::warn!("password rejected {} times, giving up", MAX_ATTEMPTS);
            app.splash.phase = SplashPhase::Failed;
            app.show_notice(Notice::fatal(LOCKOUT_TITLE, LOCKOUT_DETAIL));
        }
        PromptOutcome::Ignored => {}
    }
}

pub fn on_refresh_line(app: &mut App, line: String) {
    let line = line.trim();
    if !line.is_empty() {
        app.splash.status = line.to_string();
    }
}

pub fn on_splash_failed(app: &mut App, notice: Notice) {
    app.splash.phase = SplashPhase::Failed;
    app.show_notice(notice);
}

/// 启动 apt update，口令在命令结束后随闭包一起释放
fn start_refresh(app: &mut App, secret: Secret, tx: &mpsc::Sender<AppEvent>) {
    app.splash.phase = SplashPhase::Refreshing;
    app.splash.status = "Updating package lists...".to_string();
    app.splash.progress = ProgressReflector::new();
    app.splash.last_tick = Instant::now();

    let completed = app.splash.progress.completion_flag();
    let command = PrivilegedCommand::new(app.config.update_command.clone())
        .with_silent_failure(UNKNOWN_FAILURE);
    log::info!("refreshing package lists: {}", app.config.update_command.join(" "));

    let (line_tx, forwarder) = spawn_line_forwarder(tx, AppEvent::RefreshLine);

    spawn_worker(
        tx,
        |reason| AppEvent::SplashFailed(Notice::fatal("Error running apt update", reason)),
        move || {
            let result = command.run_with_secret(&secret, Some(line_tx));
            drop(secret);
            let _ = forwarder.join();
            match result {
                Ok(output) => {
                    log::debug!("apt update printed {} line(s)", output.text.lines().count());
                    completed.store(true, Ordering::SeqCst);
                    AppEvent::RefreshSucceeded
                }
                Err(PrivilegeError::WriteFailed(e)) => AppEvent::SplashFailed(Notice::fatal(
                    "Failed to send password to sudo",
                    e.to_string(),
                )),
                Err(PrivilegeError::CommandFailed { message }) => {
                    AppEvent::SplashFailed(Notice::fatal("apt update failed", message))
                }
                Err(e) => {
                    AppEvent::SplashFailed(Notice::fatal("Error running apt update", e.to_string()))
                }
            }
        },
    );
}

/// 每帧调用：推进进度条与抖动动画，进度走满后进入商店
pub fn on_frame(app: &mut App, tx: &mpsc::Sender<AppEvent>) {
    if app.mode != AppMode::Splash || app.splash.last_tick.elapsed() < TICK_INTERVAL {
        return;
    }
    app.splash.last_tick = Instant::now();
    app.splash.spinner = app.splash.spinner.wrapping_add(1);
    app.splash.prompt.advance_shake();

    if app.splash.phase == SplashPhase::Refreshing && app.splash.progress.tick() == Tick::Finished {
        log::info!("package lists refreshed, opening the store");
        app.mode = AppMode::Store;
        store::load_catalog(app, tx);
    }
}

// ========== 渲染 ==========

pub fn render_splash(f: &mut Frame, app: &App) {
    let area = f.area();

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));
    f.render_widget(block, area);

    let mut lines: Vec<Line> = Vec::new();
    for logo_line in ASCII_LOGO.lines() {
        lines.push(Line::from(Span::styled(
            logo_line.to_string(),
            Style::default().fg(PINK).add_modifier(Modifier::BOLD),
        )));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "Linux App Store",
        Style::default().fg(BLUE).add_modifier(Modifier::BOLD),
    )));
    lines.push(Line::from(""));

    let spinner = if app.splash.phase == SplashPhase::Failed {
        "✘"
    } else if app.splash.progress.phase() != ProgressPhase::Priming {
        "✔"
    } else {
        SPINNER[app.splash.spinner % SPINNER.len()]
    };
    lines.push(Line::from(vec![
        Span::styled(format!("{spinner} "), Style::default().fg(Color::Yellow)),
        Span::styled(app.splash.status.clone(), Style::default().fg(DIM)),
    ]));

    let content_height = lines.len() as u16;
    let inner = area.inner(Margin {
        horizontal: 2,
        vertical: 1,
    });
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(0),
            Constraint::Length(content_height),
            Constraint::Length(1),
            Constraint::Length(3),
            Constraint::Min(0),
        ])
        .split(inner);

    f.render_widget(
        Paragraph::new(lines).alignment(Alignment::Center),
        vertical[1],
    );

    let gauge_area = centered_rect(60, 3, vertical[3]);
    let progress = app.splash.progress.value();
    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::DarkGray)))
        .gauge_style(Style::default().fg(BLUE).bg(Color::Black))
        .ratio(progress)
        .label(format!("{:.0}%", progress * 100.0));
    f.render_widget(gauge, gauge_area);

    if app.splash.phase == SplashPhase::Authenticating {
        render_credential_prompt(f, app);
    }

    // 版本号
    let version = Paragraph::new(Span::styled(
        format!("las v{}  ", env!("CARGO_PKG_VERSION")),
        Style::default().fg(Color::DarkGray),
    ))
    .alignment(Alignment::Right);
    let bottom = Rect {
        y: area.y + area.height.saturating_sub(2),
        height: 1,
        ..inner
    };
    f.render_widget(version, bottom);
}

fn render_credential_prompt(f: &mut Frame, app: &App) {
    let area = f.area();
    let prompt = &app.splash.prompt;
    let popup = shift_rect(
        centered_rect(PROMPT_WIDTH, PROMPT_HEIGHT, area),
        prompt.shake_offset(),
        area,
    );
    f.render_widget(Clear, popup);

    let block = Block::default()
        .title(Span::styled(
            " Authentication required ",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));
    let inner = block.inner(popup);
    f.render_widget(block, popup);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(3),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Min(0),
        ])
        .split(inner.inner(Margin {
            horizontal: 1,
            vertical: 0,
        }));

    f.render_widget(
        Paragraph::new(Span::styled(
            "Enter your password to update package list:",
            Style::default().fg(Color::White),
        )),
        rows[0],
    );

    // 口令只以掩码显示，不回显任何字符
    let verifying = prompt.state() == CredentialState::Verifying;
    render_masked_box(f, prompt.masked_len(), prompt.cursor(), "🔒", !verifying, rows[1]);

    let status = if verifying {
        Span::styled("Checking...", Style::default().fg(DIM))
    } else if prompt.attempts() > 0 {
        let remaining = MAX_ATTEMPTS.saturating_sub(prompt.attempts());
        Span::styled(
            format!("Sorry, try again. {remaining} attempt(s) left."),
            Style::default().fg(Color::Red),
        )
    } else {
        Span::raw("")
    };
    f.render_widget(Paragraph::new(status), rows[2]);

    let hint = Line::from(vec![
        Span::styled("[Enter]", Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
        Span::styled(" OK   ", Style::default().fg(Color::White)),
        Span::styled("[Esc]", Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
        Span::styled(" Cancel", Style::default().fg(Color::White)),
    ]);
    f.render_widget(Paragraph::new(hint).alignment(Alignment::Center), rows[3]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::config::Config;
    use std::time::Duration;

    fn app_with_update(update_command: &[&str]) -> App {
        let config = Config {
            update_command: update_command.iter().map(|s| s.to_string()).collect(),
            application_dirs: vec![],
            ..Config::default()
        };
        let catalog = Catalog::new(&config, "amd64");
        App::new(config, catalog)
    }

    fn sh_update(script: &str) -> App {
        app_with_update(&["sh", "-c", script])
    }

    /// 模拟一次输入与提交，返回交给探测线程的口令
    fn submit(app: &mut App, password: &str) -> Secret {
        for c in password.chars() {
            app.splash.prompt.insert(c);
        }
        app.splash.prompt.submit().expect("prompt should accept a submission")
    }

    /// 让下一次 on_frame 推进一拍
    fn frame(app: &mut App, tx: &mpsc::Sender<AppEvent>) {
        app.splash.last_tick = Instant::now() - TICK_INTERVAL;
        on_frame(app, tx);
    }

    /// 收集事件直到刷新结束（成功或失败）
    async fn refresh_events(rx: &mut mpsc::Receiver<AppEvent>) -> Vec<AppEvent> {
        let collect = async {
            let mut events = Vec::new();
            loop {
                let event = rx.recv().await.expect("channel closed");
                let done = matches!(event, AppEvent::RefreshSucceeded | AppEvent::SplashFailed(_));
                events.push(event);
                if done {
                    return events;
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(10), collect)
            .await
            .expect("refresh never finished")
    }

    #[test]
    fn three_rejections_raise_one_fatal_notice() {
        let mut app = sh_update("exit 0");
        let (tx, _rx) = mpsc::channel(4);

        for round in 1..=MAX_ATTEMPTS {
            let secret = submit(&mut app, "wrong");
            on_credential_checked(&mut app, secret, false, &tx);
            if round < MAX_ATTEMPTS {
                assert_eq!(app.splash.phase, SplashPhase::Authenticating);
                assert!(app.notices.is_empty());
            }
        }

        assert_eq!(app.splash.phase, SplashPhase::Failed);
        assert_eq!(app.notices.len(), 1);
        let notice = app.current_notice().unwrap();
        assert_eq!(notice.title, LOCKOUT_TITLE);
        assert_eq!(notice.detail, LOCKOUT_DETAIL);
        assert!(notice.quit_on_dismiss);

        // 迟到的校验结果不会再产生提示
        on_credential_checked(&mut app, Secret::new("late".into()), false, &tx);
        assert_eq!(app.notices.len(), 1);

        app.dismiss_notice();
        assert!(app.should_quit);
    }

    #[test]
    fn keys_are_ignored_once_locked_out() {
        let mut app = sh_update("exit 0");
        let (tx, _rx) = mpsc::channel(4);
        app.splash.phase = SplashPhase::Failed;
        handle_splash_key(KeyEvent::new(KeyCode::Char('a'), KeyModifiers::NONE), &mut app, &tx);
        handle_splash_key(KeyEvent::new(KeyCode::Esc, KeyModifiers::NONE), &mut app, &tx);
        assert_eq!(app.splash.prompt.masked_len(), 0);
        assert!(!app.should_quit);
    }

    #[tokio::test]
    async fn accepted_password_refreshes_then_opens_store() {
        let mut app = sh_update("read pw; [ \"$pw\" = hunter2 ] || exit 1; echo 'Hit:1 http://deb.example stable InRelease'");
        let (tx, mut rx) = mpsc::channel(16);

        // 上一轮留下的进度不应延续
        app.splash.progress.tick();
        assert!(app.splash.progress.value() > 0.0);

        let secret = submit(&mut app, "hunter2");
        on_credential_checked(&mut app, secret, true, &tx);
        assert_eq!(app.splash.phase, SplashPhase::Refreshing);
        assert_eq!(app.splash.progress.value(), 0.0);
        assert_eq!(app.splash.progress.phase(), ProgressPhase::Priming);

        let events = refresh_events(&mut rx).await;
        assert!(matches!(events.last(), Some(AppEvent::RefreshSucceeded)));
        for event in events {
            if let AppEvent::RefreshLine(line) = event {
                on_refresh_line(&mut app, line);
            }
        }
        assert!(app.splash.status.starts_with("Hit:1"));

        let mut switches = 0;
        for _ in 0..100 {
            let before = app.mode;
            frame(&mut app, &tx);
            if before == AppMode::Splash && app.mode == AppMode::Store {
                switches += 1;
            }
        }
        assert_eq!(switches, 1);
        assert_eq!(app.mode, AppMode::Store);
        assert!(app.store.catalog_loading);
        assert!(app.notices.is_empty());
    }

    #[tokio::test]
    async fn store_opens_only_after_completion() {
        let mut app = sh_update("exit 0");
        let (tx, _rx) = mpsc::channel(16);
        app.splash.phase = SplashPhase::Refreshing;
        app.splash.progress = ProgressReflector::new();

        // 后台任务未完成时进度停在软上限
        for _ in 0..500 {
            frame(&mut app, &tx);
        }
        assert_eq!(app.mode, AppMode::Splash);
        assert!((app.splash.progress.value() - 0.8).abs() < 1e-9);
        assert!(!app.store.catalog_loading);

        app.splash.progress.completion_flag().store(true, Ordering::SeqCst);
        let mut frames = 0;
        while app.mode == AppMode::Splash {
            frame(&mut app, &tx);
            frames += 1;
            assert!(frames <= 10, "store never opened");
        }
        assert_eq!(app.splash.progress.value(), 1.0);
        assert!(app.store.catalog_loading);
    }

    #[tokio::test]
    async fn spawn_failure_reports_password_send_error() {
        let mut app = app_with_update(&["/nonexistent/las-apt-get", "update"]);
        let (tx, mut rx) = mpsc::channel(16);
        let secret = submit(&mut app, "pw");
        on_credential_checked(&mut app, secret, true, &tx);

        let events = refresh_events(&mut rx).await;
        match events.last() {
            Some(AppEvent::SplashFailed(notice)) => {
                assert_eq!(notice.title, "Failed to send password to sudo");
                assert!(notice.quit_on_dismiss);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn failed_update_reports_output_after_all_lines() {
        let mut app = sh_update(
            "cat >/dev/null; echo 'Reading package lists...'; echo 'E: The repository is not signed.' >&2; exit 100",
        );
        let (tx, mut rx) = mpsc::channel(16);
        let secret = submit(&mut app, "pw");
        on_credential_checked(&mut app, secret, true, &tx);

        let events = refresh_events(&mut rx).await;
        let lines = events
            .iter()
            .filter(|e| matches!(e, AppEvent::RefreshLine(_)))
            .count();
        assert_eq!(lines, 2);
        assert!(rx.try_recv().is_err());

        let notice = match events.into_iter().last() {
            Some(AppEvent::SplashFailed(notice)) => notice,
            other => panic!("unexpected event: {:?}", other),
        };
        assert_eq!(notice.title, "apt update failed");
        assert!(notice.detail.contains("E: The repository is not signed."));

        on_splash_failed(&mut app, notice);
        assert_eq!(app.splash.phase, SplashPhase::Failed);
        app.dismiss_notice();
        assert!(app.should_quit);
    }

    #[tokio::test]
    async fn silent_update_failure_uses_generic_message() {
        let mut app = sh_update("cat >/dev/null; exit 1");
        let (tx, mut rx) = mpsc::channel(16);
        let secret = submit(&mut app, "pw");
        on_credential_checked(&mut app, secret, true, &tx);

        match refresh_events(&mut rx).await.pop() {
            Some(AppEvent::SplashFailed(notice)) => {
                assert_eq!(notice.title, "apt update failed");
                assert_eq!(notice.detail, UNKNOWN_FAILURE);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
