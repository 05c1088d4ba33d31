//! 软件目录：对 apt / dpkg 包数据库的封装

pub mod cache;
pub mod icons;
pub mod parser;
pub mod types;

pub use cache::AptCache;
pub use icons::IconResolver;
pub use types::{CatalogView, PackageAction, PackageRecord};

use crate::config::{CategoryConfig, Config};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("the package catalog has not been loaded yet")]
    NotLoaded,
    #[error("`{command}` failed: {source}")]
    Command {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("unknown category `{0}`")]
    UnknownCategory(String),
}

/// 全进程共享的包数据库句柄；所有读写都经由同一把锁串行执行
#[derive(Clone)]
pub struct Catalog {
    cache: Arc<Mutex<AptCache>>,
    icons: Arc<OnceLock<IconResolver>>,
    featured: Arc<Vec<String>>,
    categories: Arc<Vec<CategoryConfig>>,
    application_dirs: Arc<Vec<PathBuf>>,
    icon_aliases: Arc<BTreeMap<String, String>>,
    search_limit: usize,
}

impl Catalog {
    pub fn new(config: &Config, native_arch: &str) -> Self {
        Self::with_cache(AptCache::new(native_arch), config)
    }

    pub fn with_cache(cache: AptCache, config: &Config) -> Self {
        Self {
            cache: Arc::new(Mutex::new(cache)),
            icons: Arc::new(OnceLock::new()),
            featured: Arc::new(config.featured.clone()),
            categories: Arc::new(config.categories.clone()),
            application_dirs: Arc::new(config.application_dirs.clone()),
            icon_aliases: Arc::new(config.icon_aliases.clone()),
            search_limit: config.search_limit,
        }
    }

    /// 在锁内执行一次操作；锁在任何返回路径上都会释放
    pub fn with_locked<T>(
        &self,
        f: impl FnOnce(&mut AptCache) -> Result<T, CatalogError>,
    ) -> Result<T, CatalogError> {
        // 某个工作线程 panic 后锁被标记为 poisoned，数据仍然可用
        let mut guard = self
            .cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }

    /// 阻塞调用，必须在工作线程中执行
    pub fn refresh(&self) -> Result<(), CatalogError> {
        self.with_locked(|cache| cache.refresh())?;
        self.icons();
        Ok(())
    }

    pub fn category_names(&self) -> Vec<String> {
        self.categories.iter().map(|c| c.name.clone()).collect()
    }

    /// 阻塞调用，必须在工作线程中执行
    pub fn query(&self, view: &CatalogView) -> Result<Vec<PackageRecord>, CatalogError> {
        match view {
            CatalogView::Featured => self.with_locked(|cache| cache.featured(&self.featured)),
            CatalogView::Category(name) => {
                let category = self
                    .categories
                    .iter()
                    .find(|c| &c.name == name)
                    .ok_or_else(|| CatalogError::UnknownCategory(name.clone()))?;
                self.with_locked(|cache| cache.category(category, self.search_limit))
            }
            CatalogView::Installed => self.with_locked(|cache| cache.installed()),
            CatalogView::Updates => self.with_locked(|cache| cache.upgradable()),
            CatalogView::Search(query) => {
                self.with_locked(|cache| cache.search(query, self.search_limit))
            }
        }
    }

    /// 首次调用时扫描 desktop entry
    pub fn icons(&self) -> &IconResolver {
        self.icons.get_or_init(|| {
            IconResolver::scan(&self.application_dirs, (*self.icon_aliases).clone())
        })
    }

    /// 图标索引未建好时返回通用图标，不阻塞 UI
    pub fn icon_for(&self, package: &str) -> String {
        match self.icons.get() {
            Some(icons) => icons.resolve(package),
            None => icons::FALLBACK_ICON.to_string(),
        }
    }
}
