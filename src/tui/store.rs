use super::action;
use super::input::{self, render_input_box};
use super::layout::{render_footer, render_header, render_scrollable_content};
use super::spawn_worker;
use super::state::{App, AppEvent, StoreState, StoreTab};
use super::theme::{BLUE, BRIGHT_WHITE, DESC_DIM, DIM, OK_GREEN, DANGER, PINK, SEL_BG};
use crate::catalog::{CatalogView, PackageAction, PackageRecord};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    layout::{Constraint, Direction, Layout, Margin, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState, Tabs},
    Frame,
};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use unicode_width::UnicodeWidthStr;

/// 搜索防抖间隔
pub const SEARCH_DEBOUNCE: Duration = Duration::from_millis(250);

// ========== 数据加载 ==========

/// 加载包数据库；首次失败后切换视图或按 F5 会再次尝试
pub fn load_catalog(app: &mut App, tx: &mpsc::Sender<AppEvent>) {
    if app.store.catalog_loading {
        return;
    }
    app.store.catalog_loading = true;
    app.store.loading = true;
    let catalog = app.catalog.clone();
    spawn_worker(
        tx,
        |reason| AppEvent::CatalogLoaded(Err(reason)),
        move || AppEvent::CatalogLoaded(catalog.refresh().map_err(|e| e.to_string())),
    );
}

pub fn on_catalog_loaded(app: &mut App, result: Result<(), String>, tx: &mpsc::Sender<AppEvent>) {
    app.store.catalog_loading = false;
    match result {
        Ok(()) => {
            app.store.catalog_ready = true;
            reload_current_view(app, tx);
        }
        Err(reason) => {
            log::warn!("package catalog unavailable: {}", reason);
            app.store.loading = false;
            app.show_notice(super::state::Notice::new(
                "Could not load the package catalog",
                reason,
            ));
        }
    }
}

/// 重新查询当前视图（分类列表页无需查询）
pub fn reload_current_view(app: &mut App, tx: &mpsc::Sender<AppEvent>) {
    match app.store.view.clone() {
        Some(view) => query_view(app, view, tx),
        None => app.store.loading = false,
    }
}

/// 在工作线程中查询；包数据库未就绪时记下视图并（重新）加载，完成后再查
pub fn query_view(app: &mut App, view: CatalogView, tx: &mpsc::Sender<AppEvent>) {
    if !app.store.catalog_ready {
        app.store.view = Some(view);
        load_catalog(app, tx);
        return;
    }
    let seq = app.store.begin_query(view.clone());
    let catalog = app.catalog.clone();
    let failed_view = view.clone();
    spawn_worker(
        tx,
        move |reason| AppEvent::ViewLoaded {
            seq,
            view: failed_view,
            result: Err(reason),
        },
        move || {
            let result = catalog.query(&view).map_err(|e| e.to_string());
            AppEvent::ViewLoaded { seq, view, result }
        },
    );
}

pub fn on_view_loaded(
    app: &mut App,
    seq: u64,
    view: CatalogView,
    result: Result<Vec<PackageRecord>, String>,
) {
    match result {
        Ok(records) => {
            let count = records.len();
            if app.store.apply_results(seq, records) {
                log::debug!("{} loaded with {} package(s)", view.title(), count);
            }
        }
        Err(reason) => {
            if seq == app.store.query_seq {
                app.store.loading = false;
                app.store.records.clear();
                app.show_notice(super::state::Notice::new(
                    format!("Could not load {}", view.title()),
                    reason,
                ));
            }
        }
    }
}

/// 每帧调用：防抖到期后执行搜索
pub fn on_frame(app: &mut App, tx: &mpsc::Sender<AppEvent>) {
    if let Some(scheduled) = app.store.search_scheduled {
        if scheduled.elapsed() >= SEARCH_DEBOUNCE {
            app.store.search_scheduled = None;
            run_search(app, tx);
        }
    }
}

fn run_search(app: &mut App, tx: &mpsc::Sender<AppEvent>) {
    let view = app.store.view_for_search();
    app.store.selected = 0;
    query_view(app, view, tx);
}

fn switch_tab(app: &mut App, tab: StoreTab, tx: &mpsc::Sender<AppEvent>) {
    match app.store.select_tab(tab) {
        Some(view) => query_view(app, view, tx),
        None => app.store.loading = false,
    }
}

// ========== 按键 ==========

pub fn handle_store_key(key: KeyEvent, app: &mut App, tx: &mpsc::Sender<AppEvent>) {
    if app.store.search_focused {
        handle_search_key(key, app, tx);
        return;
    }

    match key.code {
        KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Char('/') => app.store.search_focused = true,
        KeyCode::Tab => {
            let tab = app.store.tab.next();
            switch_tab(app, tab, tx);
        }
        KeyCode::BackTab => {
            let tab = app.store.tab.prev();
            switch_tab(app, tab, tx);
        }
        KeyCode::Char(c @ '1'..='4') => {
            let index = (c as u8 - b'1') as usize;
            switch_tab(app, StoreTab::ALL[index], tx);
        }
        KeyCode::Up | KeyCode::Char('k') => move_selection(app, -1),
        KeyCode::Down | KeyCode::Char('j') => move_selection(app, 1),
        KeyCode::PageUp => move_selection(app, -10),
        KeyCode::PageDown => move_selection(app, 10),
        KeyCode::Home => move_selection(app, isize::MIN / 2),
        KeyCode::End => move_selection(app, isize::MAX / 2),
        KeyCode::Enter => {
            if app.store.view.is_none() {
                let names = app.catalog.category_names();
                if let Some(name) = names.get(app.store.category_selected) {
                    app.store.selected = 0;
                    query_view(app, CatalogView::Category(name.clone()), tx);
                }
            }
        }
        KeyCode::Char('i') => {
            if let Some(record) = app.store.selected_record() {
                if !record.installed {
                    let action = PackageAction::Install(record.name.clone());
                    action::request_action(app, action, tx);
                }
            }
        }
        KeyCode::Char('r') => {
            if let Some(record) = app.store.selected_record() {
                if record.installed {
                    let action = PackageAction::Remove(record.name.clone());
                    action::request_action(app, action, tx);
                }
            }
        }
        KeyCode::Char('u') => action::request_action(app, PackageAction::UpgradeAll, tx),
        KeyCode::F(5) => {
            if app.store.catalog_ready {
                reload_current_view(app, tx);
            } else {
                load_catalog(app, tx);
            }
        }
        KeyCode::Esc => go_back(app, tx),
        _ => {}
    }
}

fn handle_search_key(key: KeyEvent, app: &mut App, tx: &mpsc::Sender<AppEvent>) {
    if key.code == KeyCode::Enter {
        app.store.search_focused = false;
        app.store.search_scheduled = None;
        run_search(app, tx);
        return;
    }

    let store = &mut app.store;
    match key.code {
        KeyCode::Esc => store.search_focused = false,
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            input::str_insert_char(&mut store.search, &mut store.search_cursor, c);
            store.search_scheduled = Some(Instant::now());
        }
        KeyCode::Backspace => {
            input::str_delete_back(&mut store.search, &mut store.search_cursor);
            store.search_scheduled = Some(Instant::now());
        }
        KeyCode::Delete => {
            input::str_delete_forward(&mut store.search, &mut store.search_cursor);
            store.search_scheduled = Some(Instant::now());
        }
        KeyCode::Left => store.search_cursor = store.search_cursor.saturating_sub(1),
        KeyCode::Right => {
            store.search_cursor = (store.search_cursor + 1).min(store.search.chars().count())
        }
        KeyCode::Home => store.search_cursor = 0,
        KeyCode::End => store.search_cursor = store.search.chars().count(),
        _ => {}
    }
}

/// Esc：分类详情回到分类列表，搜索结果回到首页
fn go_back(app: &mut App, tx: &mpsc::Sender<AppEvent>) {
    match app.store.view {
        Some(CatalogView::Category(_)) => {
            app.store.view = None;
            app.store.records.clear();
            app.store.loading = false;
            // 丢弃尚未返回的分类查询结果
            app.store.query_seq += 1;
        }
        Some(CatalogView::Search(_)) => switch_tab(app, StoreTab::Featured, tx),
        _ => {}
    }
}

fn move_selection(app: &mut App, delta: isize) {
    let (current, len) = if app.store.view.is_none() {
        (app.store.category_selected, app.catalog.category_names().len())
    } else {
        (app.store.selected, app.store.records.len())
    };
    if len == 0 {
        return;
    }
    let next = (current as isize).saturating_add(delta).clamp(0, len as isize - 1) as usize;
    if app.store.view.is_none() {
        app.store.category_selected = next;
    } else {
        app.store.selected = next;
    }
}

// ========== 渲染 ==========

pub fn render_store(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(f.area());

    let title = match &app.system_info {
        Some(info) => format!(
            "LAS · Linux App Store  |  {}  |  {}  |  {}",
            info.distro, info.kernel, info.arch
        ),
        None => "LAS · Linux App Store".to_string(),
    };
    render_header(f, &title, chunks[0]);

    render_tab_bar(f, app, chunks[1]);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(chunks[2]);

    if app.store.view.is_none() {
        render_category_list(f, app, body[0]);
    } else {
        render_package_list(f, app, body[0]);
    }

    let side = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(10)])
        .split(body[1]);
    let detail = detail_lines(app);
    render_scrollable_content(f, "Details", &detail, 0, false, side[0]);

    let activity: Vec<Line> = app
        .store
        .activity
        .iter()
        .map(|line| Line::from(Span::styled(line.clone(), Style::default().fg(DIM))))
        .collect();
    render_scrollable_content(f, "Activity", &activity, app.store.activity_scroll, false, side[1]);

    render_footer(f, &footer_text(app), chunks[3]);
}

fn render_tab_bar(f: &mut Frame, app: &App, area: Rect) {
    let row = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(0), Constraint::Length(42)])
        .split(area);

    let titles: Vec<Line> = StoreTab::ALL
        .iter()
        .enumerate()
        .map(|(i, tab)| Line::from(format!(" {} {} ", i + 1, tab.title())))
        .collect();
    let tabs = Tabs::new(titles)
        .select(app.store.tab.index())
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::DarkGray)),
        )
        .style(Style::default().fg(Color::White))
        .highlight_style(Style::default().fg(PINK).add_modifier(Modifier::BOLD))
        .divider("│");
    f.render_widget(tabs, row[0]);

    render_input_box(
        f,
        &app.store.search,
        app.store.search_cursor,
        "🔍",
        app.store.search_focused,
        row[1],
    );
}

fn list_block(title: String, focused: bool) -> Block<'static> {
    let border_color = if focused { Color::Yellow } else { Color::DarkGray };
    Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
}

fn render_category_list(f: &mut Frame, app: &App, area: Rect) {
    let block = list_block(" Categories ".to_string(), !app.store.search_focused);
    let inner = block.inner(area);
    f.render_widget(block, area);
    let padded = inner.inner(Margin {
        horizontal: 1,
        vertical: 0,
    });

    let lines: Vec<Line> = app
        .catalog
        .category_names()
        .into_iter()
        .enumerate()
        .map(|(i, name)| {
            if i == app.store.category_selected {
                let bg = Style::default().bg(SEL_BG);
                Line::from(vec![
                    Span::styled("► ", bg.fg(BRIGHT_WHITE).add_modifier(Modifier::BOLD)),
                    Span::styled(name, bg.fg(PINK).add_modifier(Modifier::BOLD)),
                ])
            } else {
                Line::from(vec![
                    Span::raw("  "),
                    Span::styled(name, Style::default().fg(PINK)),
                ])
            }
        })
        .collect();
    f.render_widget(Paragraph::new(lines), padded);
}

fn render_package_list(f: &mut Frame, app: &App, area: Rect) {
    let store = &app.store;
    let title = match &store.view {
        Some(view) if !store.loading => format!(" {} ({}) ", view.title(), store.records.len()),
        Some(view) => format!(" {} ", view.title()),
        None => String::new(),
    };
    let focused = !store.search_focused;
    let block = list_block(title, focused);
    let inner = block.inner(area);
    f.render_widget(block, area);

    // 内部水平边距
    let padded = inner.inner(Margin {
        horizontal: 1,
        vertical: 0,
    });

    if store.records.is_empty() {
        let text = list_placeholder(store);
        let empty = Paragraph::new(Line::from(Span::styled(
            text,
            Style::default().fg(Color::DarkGray),
        )));
        f.render_widget(empty, padded);
        return;
    }

    // 每个包占 2 行（名称 + 摘要）
    let item_height = 2usize;
    let visible_items = ((padded.height as usize) / item_height).max(1);
    let selected = store.selected;
    let scroll = if selected >= visible_items {
        selected - visible_items + 1
    } else {
        0
    };

    let mut lines: Vec<Line> = Vec::new();
    for (i, pkg) in store.records.iter().enumerate().skip(scroll).take(visible_items) {
        let is_selected = i == selected && focused;
        let marker = if is_selected { "► " } else { "  " };
        let (badge, badge_color) = if pkg.upgradable {
            (" [update]", DANGER)
        } else if pkg.installed {
            (" [installed]", OK_GREEN)
        } else {
            ("", DIM)
        };

        // 第一行：包名 + 版本 + 状态
        let base = if is_selected {
            Style::default().bg(SEL_BG)
        } else {
            Style::default()
        };
        let name_style = if is_selected {
            base.fg(BRIGHT_WHITE).add_modifier(Modifier::BOLD)
        } else {
            base.fg(BLUE)
        };
        lines.push(Line::from(vec![
            Span::styled(marker.to_string(), base.fg(BRIGHT_WHITE).add_modifier(Modifier::BOLD)),
            Span::styled(pkg.name.clone(), name_style),
            Span::styled(format!(" {}", pkg.version_label()), base.fg(Color::White)),
            Span::styled(badge.to_string(), base.fg(badge_color)),
        ]));

        // 第二行：摘要（缩进）
        let desc = if pkg.description.is_empty() {
            "(no description)".to_string()
        } else {
            pkg.description.clone()
        };
        let desc_style = if is_selected {
            base.fg(DESC_DIM)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        lines.push(Line::from(Span::styled(format!("    {}", desc), desc_style)));
    }

    f.render_widget(Paragraph::new(lines), padded);

    // 滚动条
    if store.records.len() > visible_items {
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .begin_symbol(Some("↑"))
            .end_symbol(Some("↓"));
        let mut scrollbar_state = ScrollbarState::new(store.records.len()).position(scroll);
        f.render_stateful_widget(
            scrollbar,
            area.inner(Margin {
                horizontal: 0,
                vertical: 1,
            }),
            &mut scrollbar_state,
        );
    }
}

fn detail_lines(app: &App) -> Vec<Line<'static>> {
    let Some(pkg) = app.store.selected_record() else {
        return vec![Line::from(Span::styled(
            "Select a package to see its details",
            Style::default().fg(Color::DarkGray),
        ))];
    };

    let mut lines = vec![
        Line::from(Span::styled(
            pkg.name.clone(),
            Style::default().fg(BRIGHT_WHITE).add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(pkg.description.clone(), Style::default().fg(DESC_DIM))),
        Line::from(""),
        field_line("Status", pkg.status_label()),
        field_line("Version", &pkg.version_label()),
        field_line("Size", &pkg.size_label()),
        field_line("Section", pkg.base_section()),
        field_line("Architecture", &pkg.arch),
        field_line("Icon", &app.catalog.icon_for(&pkg.name)),
    ];
    if let Some(homepage) = &pkg.homepage {
        lines.push(field_line("Homepage", homepage));
    }
    if !pkg.depends.is_empty() {
        lines.push(field_line("Depends", &pkg.depends.join(", ")));
    }
    if !pkg.long_description.is_empty() {
        lines.push(Line::from(""));
        for text in pkg.long_description.lines() {
            lines.push(Line::from(Span::styled(
                text.to_string(),
                Style::default().fg(Color::White),
            )));
        }
    }
    lines
}

/// 详情行: "标签:  值"，标签按显示宽度对齐
fn field_line(label: &str, value: &str) -> Line<'static> {
    const LABEL_WIDTH: usize = 14;
    let pad = LABEL_WIDTH.saturating_sub(UnicodeWidthStr::width(label) + 1);
    Line::from(vec![
        Span::styled(
            format!("{label}:{}", " ".repeat(pad + 1)),
            Style::default().fg(PINK).add_modifier(Modifier::BOLD),
        ),
        Span::styled(value.to_string(), Style::default().fg(Color::White)),
    ])
}

fn list_placeholder(store: &StoreState) -> &'static str {
    if store.catalog_loading {
        "Loading package catalog..."
    } else if !store.catalog_ready {
        "Package catalog unavailable (F5: Retry)"
    } else if store.loading {
        "Loading..."
    } else {
        "No packages found"
    }
}

fn footer_text(app: &App) -> String {
    let keys = if app.store.search_focused {
        "Type to search | Enter: Search now | Esc: Done"
    } else if !app.store.catalog_ready && !app.store.catalog_loading {
        "F5: Retry | Tab: Switch tab | q: Quit"
    } else if app.store.view.is_none() {
        "↑↓: Select | Enter: Open | Tab: Switch tab | /: Search | q: Quit"
    } else {
        "↑↓: Select | i: Install | r: Remove | u: Upgrade all | Tab: Switch tab | /: Search | Esc: Back | q: Quit"
    };
    match app.store.running_actions {
        0 => keys.to_string(),
        n => format!("{keys}   ⏳ {n} running"),
    }
}
