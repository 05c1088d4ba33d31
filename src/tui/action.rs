//! 安装 / 卸载 / 全部升级：经策略提权工具在后台执行，互不阻塞

use super::state::{App, AppEvent, Notice};
use super::{spawn_line_forwarder, spawn_worker, store};
use crate::catalog::PackageAction;
use crate::privilege::PrivilegedCommand;
use tokio::sync::mpsc;

/// 立即返回；同一个包重复请求会各自执行一次
pub fn request_action(app: &mut App, action: PackageAction, tx: &mpsc::Sender<AppEvent>) {
    let command = PrivilegedCommand::new(action.argv(&app.config.escalation_helper));
    let catalog = app.catalog.clone();

    log::info!("requested: {}", action.label());
    app.store.running_actions += 1;
    app.store.push_activity(format!("▶ {}", action.label()));

    let (line_tx, forwarder) = spawn_line_forwarder(tx, AppEvent::ActionLine);

    let crashed = action.clone();
    spawn_worker(
        tx,
        move |reason| AppEvent::ActionFinished {
            error: Some(Notice::new(crashed.failure_title(), reason)),
            action: crashed,
        },
        move || {
            let result = command.run_with_policy(Some(line_tx));
            let _ = forwarder.join();
            let error = match result {
                Ok(output) => {
                    log::debug!("{}: {} line(s) of output", action.label(), output.text.lines().count());
                    // 包状态已变化，重新读取数据库
                    if let Err(e) = catalog.refresh() {
                        log::warn!("catalog refresh after `{}` failed: {}", action.label(), e);
                    }
                    None
                }
                Err(e) => Some(Notice::new(action.failure_title(), e.to_string())),
            };
            AppEvent::ActionFinished { action, error }
        },
    );
}

pub fn on_action_line(app: &mut App, line: String) {
    if !line.trim().is_empty() {
        app.store.push_activity(format!("  {}", line));
    }
}

pub fn on_action_finished(
    app: &mut App,
    action: PackageAction,
    error: Option<Notice>,
    tx: &mpsc::Sender<AppEvent>,
) {
    app.store.running_actions = app.store.running_actions.saturating_sub(1);
    match error {
        None => {
            log::info!("{} finished", action.label());
            app.store.push_activity(format!("✔ {}", action.label()));
            store::reload_current_view(app, tx);
        }
        Some(notice) => {
            app.store.push_activity(format!("✘ {}", action.label()));
            app.show_notice(notice);
        }
    }
}
