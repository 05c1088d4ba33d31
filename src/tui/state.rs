use crate::catalog::{Catalog, CatalogView, PackageAction, PackageRecord};
use crate::config::Config;
use crate::privilege::{CredentialPrompt, ProgressReflector, Secret};
use crate::sysinfo::SystemInfo;
use std::collections::VecDeque;
use std::time::Instant;

/// 活动日志最多保留的行数
const ACTIVITY_LIMIT: usize = 500;

// ========== 枚举 ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    Splash,
    Store,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplashPhase {
    Authenticating,
    Refreshing,
    /// 已弹出不可恢复的错误，关闭后退出
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreTab {
    Featured,
    Categories,
    Installed,
    Updates,
}

impl StoreTab {
    pub const ALL: [StoreTab; 4] = [
        StoreTab::Featured,
        StoreTab::Categories,
        StoreTab::Installed,
        StoreTab::Updates,
    ];

    pub fn title(self) -> &'static str {
        match self {
            StoreTab::Featured => "Featured",
            StoreTab::Categories => "Categories",
            StoreTab::Installed => "Installed",
            StoreTab::Updates => "Updates",
        }
    }

    pub fn index(self) -> usize {
        Self::ALL.iter().position(|t| *t == self).unwrap_or(0)
    }

    pub fn next(self) -> Self {
        Self::ALL[(self.index() + 1) % Self::ALL.len()]
    }

    pub fn prev(self) -> Self {
        Self::ALL[(self.index() + Self::ALL.len() - 1) % Self::ALL.len()]
    }

    /// Categories 页先显示分类列表，没有对应的查询
    pub fn default_view(self) -> Option<CatalogView> {
        match self {
            StoreTab::Featured => Some(CatalogView::Featured),
            StoreTab::Categories => None,
            StoreTab::Installed => Some(CatalogView::Installed),
            StoreTab::Updates => Some(CatalogView::Updates),
        }
    }
}

/// 模态提示框
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub detail: String,
    pub quit_on_dismiss: bool,
}

impl Notice {
    pub fn new(title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            detail: detail.into(),
            quit_on_dismiss: false,
        }
    }

    /// 关闭后退出程序
    pub fn fatal(title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            quit_on_dismiss: true,
            ..Self::new(title, detail)
        }
    }
}

// ========== 事件 ==========

/// 工作线程发回 UI 循环的消息；只有 UI 循环修改 App
#[derive(Debug)]
pub enum AppEvent {
    SystemInfoDetected(SystemInfo),
    CredentialChecked { secret: Secret, valid: bool },
    RefreshLine(String),
    RefreshSucceeded,
    SplashFailed(Notice),
    CatalogLoaded(Result<(), String>),
    ViewLoaded {
        seq: u64,
        view: CatalogView,
        result: Result<Vec<PackageRecord>, String>,
    },
    ActionLine(String),
    ActionFinished {
        action: PackageAction,
        error: Option<Notice>,
    },
}

// ========== 子状态结构体 ==========

pub struct SplashState {
    pub phase: SplashPhase,
    pub prompt: CredentialPrompt,
    pub progress: ProgressReflector,
    pub last_tick: Instant,
    pub spinner: usize,
    pub status: String,
}

impl SplashState {
    pub fn new() -> Self {
        Self {
            phase: SplashPhase::Authenticating,
            prompt: CredentialPrompt::new(),
            progress: ProgressReflector::new(),
            last_tick: Instant::now(),
            spinner: 0,
            status: "Waiting for authentication...".to_string(),
        }
    }
}

pub struct StoreState {
    pub tab: StoreTab,
    /// None 表示正在浏览分类列表
    pub view: Option<CatalogView>,
    pub records: Vec<PackageRecord>,
    pub selected: usize,
    pub category_selected: usize,
    pub search: String,
    pub search_cursor: usize,
    pub search_focused: bool,
    pub search_scheduled: Option<Instant>,
    pub query_seq: u64,
    pub loading: bool,
    pub catalog_ready: bool,
    /// 包数据库正在后台加载
    pub catalog_loading: bool,
    pub activity: Vec<String>,
    pub activity_scroll: usize,
    pub running_actions: usize,
}

impl StoreState {
    pub fn new() -> Self {
        Self {
            tab: StoreTab::Featured,
            view: Some(CatalogView::Featured),
            records: Vec::new(),
            selected: 0,
            category_selected: 0,
            search: String::new(),
            search_cursor: 0,
            search_focused: false,
            search_scheduled: None,
            query_seq: 0,
            loading: true,
            catalog_ready: false,
            catalog_loading: false,
            activity: Vec::new(),
            activity_scroll: 0,
            running_actions: 0,
        }
    }

    pub fn selected_record(&self) -> Option<&PackageRecord> {
        if self.view.is_none() {
            return None;
        }
        self.records.get(self.selected)
    }

    /// 切换标签页，清空搜索；返回需要加载的视图
    pub fn select_tab(&mut self, tab: StoreTab) -> Option<CatalogView> {
        self.tab = tab;
        self.search.clear();
        self.search_cursor = 0;
        self.search_scheduled = None;
        self.records.clear();
        self.selected = 0;
        self.view = tab.default_view();
        self.view.clone()
    }

    /// 根据搜索框生成视图；空查询回到 Featured 首页
    pub fn view_for_search(&mut self) -> CatalogView {
        let view = CatalogView::from_query(&self.search);
        if view == CatalogView::Featured {
            self.tab = StoreTab::Featured;
        }
        self.view = Some(view.clone());
        view
    }

    /// 开始一次查询，返回序号；旧序号的结果会被丢弃
    pub fn begin_query(&mut self, view: CatalogView) -> u64 {
        self.query_seq += 1;
        self.loading = true;
        self.view = Some(view);
        self.query_seq
    }

    /// 应用查询结果，过期结果返回 false
    pub fn apply_results(&mut self, seq: u64, records: Vec<PackageRecord>) -> bool {
        if seq != self.query_seq {
            return false;
        }
        self.loading = false;
        self.records = records;
        if self.selected >= self.records.len() {
            self.selected = self.records.len().saturating_sub(1);
        }
        true
    }

    pub fn push_activity(&mut self, line: String) {
        self.activity.push(line);
        if self.activity.len() > ACTIVITY_LIMIT {
            let overflow = self.activity.len() - ACTIVITY_LIMIT;
            self.activity.drain(..overflow);
        }
        self.activity_scroll = self.activity.len().saturating_sub(1);
    }
}

// ========== App ==========

pub struct App {
    pub mode: AppMode,
    pub config: Config,
    pub catalog: Catalog,
    pub system_info: Option<SystemInfo>,
    pub notices: VecDeque<Notice>,
    pub should_quit: bool,
    // 子状态
    pub splash: SplashState,
    pub store: StoreState,
}

impl App {
    pub fn new(config: Config, catalog: Catalog) -> Self {
        Self {
            mode: AppMode::Splash,
            config,
            catalog,
            system_info: None,
            notices: VecDeque::new(),
            should_quit: false,
            splash: SplashState::new(),
            store: StoreState::new(),
        }
    }

    pub fn show_notice(&mut self, notice: Notice) {
        log::warn!("notice: {} - {}", notice.title, notice.detail);
        self.notices.push_back(notice);
    }

    pub fn current_notice(&self) -> Option<&Notice> {
        self.notices.front()
    }

    /// 关闭当前提示框；致命提示关闭后请求退出
    pub fn dismiss_notice(&mut self) {
        if let Some(notice) = self.notices.pop_front() {
            if notice.quit_on_dismiss {
                self.should_quit = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str) -> PackageRecord {
        PackageRecord {
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn empty_search_resets_to_featured() {
        let mut store = StoreState::new();
        store.select_tab(StoreTab::Installed);
        store.search = "   ".to_string();
        assert_eq!(store.view_for_search(), CatalogView::Featured);
        assert_eq!(store.tab, StoreTab::Featured);

        store.search = "gimp".to_string();
        assert_eq!(store.view_for_search(), CatalogView::Search("gimp".into()));
    }

    #[test]
    fn stale_results_are_dropped() {
        let mut store = StoreState::new();
        let first = store.begin_query(CatalogView::Installed);
        let second = store.begin_query(CatalogView::Updates);
        assert!(!store.apply_results(first, vec![record("old")]));
        assert!(store.loading);
        assert!(store.apply_results(second, vec![record("new")]));
        assert!(!store.loading);
        assert_eq!(store.records[0].name, "new");
        assert_eq!(store.view, Some(CatalogView::Updates));
    }

    #[test]
    fn selection_clamped_to_new_results() {
        let mut store = StoreState::new();
        store.selected = 5;
        let seq = store.begin_query(CatalogView::Featured);
        store.apply_results(seq, vec![record("a"), record("b")]);
        assert_eq!(store.selected, 1);
        assert_eq!(store.selected_record().map(|r| r.name.as_str()), Some("b"));
    }

    #[test]
    fn categories_tab_has_no_query() {
        let mut store = StoreState::new();
        assert_eq!(store.select_tab(StoreTab::Categories), None);
        assert!(store.selected_record().is_none());
        assert_eq!(StoreTab::Featured.prev(), StoreTab::Updates);
        assert_eq!(StoreTab::Updates.next(), StoreTab::Featured);
    }

    #[test]
    fn activity_log_is_bounded() {
        let mut store = StoreState::new();
        for i in 0..(ACTIVITY_LIMIT + 10) {
            store.push_activity(format!("line {}", i));
        }
        assert_eq!(store.activity.len(), ACTIVITY_LIMIT);
        assert_eq!(store.activity[0], "line 10");
    }

    #[test]
    fn fatal_notice_requests_quit() {
        let config = Config::default();
        let catalog = Catalog::new(&config, "amd64");
        let mut app = App::new(config, catalog);
        app.show_notice(Notice::new("Install failed", "boom"));
        app.show_notice(Notice::fatal("Wrong Password", "three times"));

        app.dismiss_notice();
        assert!(!app.should_quit);
        assert_eq!(app.current_notice().map(|n| n.title.as_str()), Some("Wrong Password"));
        app.dismiss_notice();
        assert!(app.should_quit);
        assert!(app.current_notice().is_none());
    }
}
