//! 按约定从 desktop entry 解析包的图标名
//!
//! 查找顺序：精确 desktop id → 规范化包名 → 别名表 → 通用可执行文件图标。

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

pub const FALLBACK_ICON: &str = "application-x-executable";

/// 规范化时去掉的常见后缀
const STRIP_SUFFIXES: &[&str] = &["-stable", "-bin", "-esr", "-browser"];

/// 读取 `[Desktop Entry]` 组中的 `Icon=`
pub fn parse_desktop_icon(content: &str) -> Option<String> {
    let mut in_entry = false;
    for line in content.lines() {
        let line = line.trim();
        if line.starts_with('[') {
            in_entry = line == "[Desktop Entry]";
            continue;
        }
        if !in_entry {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            if key.trim() == "Icon" && !value.trim().is_empty() {
                return Some(value.trim().to_string());
            }
        }
    }
    None
}

pub fn normalize_name(name: &str) -> String {
    let mut normalized = name.trim().to_lowercase().replace('_', "-");
    for suffix in STRIP_SUFFIXES {
        if let Some(stripped) = normalized.strip_suffix(suffix) {
            if !stripped.is_empty() {
                normalized = stripped.to_string();
            }
        }
    }
    normalized
}

#[derive(Debug, Clone, Default)]
pub struct IconResolver {
    /// desktop id → Icon
    by_id: HashMap<String, String>,
    /// 小写 id 与反向域名 id 的最后一段 → Icon
    by_normalized: HashMap<String, String>,
    aliases: BTreeMap<String, String>,
}

impl IconResolver {
    pub fn from_entries(
        entries: impl IntoIterator<Item = (String, String)>,
        aliases: BTreeMap<String, String>,
    ) -> Self {
        let mut by_id = HashMap::new();
        let mut by_normalized = HashMap::new();
        for (id, icon) in entries {
            let lower = id.to_lowercase();
            if let Some(last) = lower.rsplit('.').next() {
                by_normalized.entry(last.to_string()).or_insert_with(|| icon.clone());
            }
            by_normalized.entry(lower).or_insert_with(|| icon.clone());
            by_id.entry(id).or_insert(icon);
        }
        Self { by_id, by_normalized, aliases }
    }

    /// 扫描目录中的 *.desktop，靠前的目录优先
    pub fn scan(dirs: &[PathBuf], aliases: BTreeMap<String, String>) -> Self {
        let mut entries = Vec::new();
        for dir in dirs {
            entries.extend(read_dir_entries(dir));
        }
        log::info!("icon index built from {} desktop entries", entries.len());
        Self::from_entries(entries, aliases)
    }

    pub fn resolve(&self, package: &str) -> String {
        if let Some(icon) = self.by_id.get(package) {
            return icon.clone();
        }
        if let Some(icon) = self.by_normalized.get(&normalize_name(package)) {
            return icon.clone();
        }
        if let Some(icon) = self
            .aliases
            .get(package)
            .and_then(|id| self.by_id.get(id).or_else(|| self.by_normalized.get(&id.to_lowercase())))
        {
            return icon.clone();
        }
        FALLBACK_ICON.to_string()
    }
}

fn read_dir_entries(dir: &Path) -> Vec<(String, String)> {
    let read_dir = match fs::read_dir(dir) {
        Ok(read_dir) => read_dir,
        Err(_) => return Vec::new(),
    };
    let mut entries: Vec<(String, String)> = read_dir
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "desktop"))
        .filter_map(|path| {
            let id = path.file_stem()?.to_str()?.to_string();
            let content = fs::read_to_string(&path).ok()?;
            Some((id, parse_desktop_icon(&content)?))
        })
        .collect();
    entries.sort();
    entries
}
