//! Catalog 数据类型定义

/// 包数据库中的一条记录（只读展示）
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PackageRecord {
    pub name: String,
    pub arch: String,
    /// 已安装时为已安装版本，否则为仓库候选版本
    pub version: String,
    /// 可升级时的目标版本
    pub candidate_version: Option<String>,
    pub installed: bool,
    pub upgradable: bool,
    pub section: String,
    pub description: String,
    pub long_description: String,
    pub installed_size_kib: Option<u64>,
    pub depends: Vec<String>,
    pub homepage: Option<String>,
}

impl PackageRecord {
    pub fn status_label(&self) -> &'static str {
        if self.upgradable {
            "Update available"
        } else if self.installed {
            "Installed"
        } else {
            "Not installed"
        }
    }

    pub fn version_label(&self) -> String {
        match (&self.candidate_version, self.upgradable) {
            (Some(candidate), true) => format!("{} → {}", self.version, candidate),
            _ => self.version.clone(),
        }
    }

    pub fn size_label(&self) -> String {
        self.installed_size_kib
            .map(format_size)
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// section 去掉 contrib/ non-free/ 前缀
    pub fn base_section(&self) -> &str {
        self.section.rsplit('/').next().unwrap_or(&self.section)
    }
}

/// Installed-Size 以 KiB 计
pub fn format_size(kib: u64) -> String {
    const MIB: u64 = 1024;
    const GIB: u64 = 1024 * 1024;
    if kib < MIB {
        format!("{} kB", kib)
    } else if kib < GIB {
        format!("{:.1} MB", kib as f64 / MIB as f64)
    } else {
        format!("{:.2} GB", kib as f64 / GIB as f64)
    }
}

/// 商店浏览视图
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogView {
    Featured,
    Category(String),
    Installed,
    Updates,
    Search(String),
}

impl CatalogView {
    /// 空查询回到首页而不是显示空结果
    pub fn from_query(query: &str) -> Self {
        let query = query.trim();
        if query.is_empty() {
            CatalogView::Featured
        } else {
            CatalogView::Search(query.to_string())
        }
    }

    pub fn title(&self) -> String {
        match self {
            CatalogView::Featured => "Featured".to_string(),
            CatalogView::Category(name) => name.clone(),
            CatalogView::Installed => "Installed".to_string(),
            CatalogView::Updates => "Updates".to_string(),
            CatalogView::Search(query) => format!("Search: {}", query),
        }
    }
}

/// 写操作，统一走策略提权工具
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageAction {
    Install(String),
    Remove(String),
    UpgradeAll,
}

impl PackageAction {
    pub fn argv(&self, helper: &str) -> Vec<String> {
        let mut argv = vec![helper.to_string(), "apt-get".to_string()];
        match self {
            PackageAction::Install(name) => {
                argv.extend(["install".to_string(), "-y".to_string(), name.clone()])
            }
            PackageAction::Remove(name) => {
                argv.extend(["remove".to_string(), "-y".to_string(), name.clone()])
            }
            PackageAction::UpgradeAll => {
                argv.extend(["upgrade".to_string(), "-y".to_string()])
            }
        }
        argv
    }

    pub fn label(&self) -> String {
        match self {
            PackageAction::Install(name) => format!("Install {}", name),
            PackageAction::Remove(name) => format!("Remove {}", name),
            PackageAction::UpgradeAll => "Upgrade all".to_string(),
        }
    }

    pub fn failure_title(&self) -> &'static str {
        match self {
            PackageAction::Install(_) => "Install failed",
            PackageAction::Remove(_) => "Remove failed",
            PackageAction::UpgradeAll => "Upgrade failed",
        }
    }
}
