//! 包数据库客户端：shell 出 apt / dpkg，解析结果常驻内存
//!
//! 该客户端不可并发使用，只能通过 [`super::Catalog`] 的互斥锁访问。

use super::parser::{self, DPKG_QUERY_FORMAT};
use super::types::PackageRecord;
use super::CatalogError;
use crate::config::CategoryConfig;
use std::collections::{HashMap, HashSet};
use std::time::Instant;

fn read_command(program: &str, args: &[&str]) -> Result<String, CatalogError> {
    duct::cmd(program, args)
        .stderr_null()
        .read()
        .map_err(|source| CatalogError::Command {
            command: format!("{} {}", program, args.join(" ")),
            source,
        })
}

#[derive(Debug, Default)]
pub struct AptCache {
    records: Vec<PackageRecord>,
    native_arch: String,
    loaded: bool,
}

impl AptCache {
    pub fn new(native_arch: &str) -> Self {
        Self {
            records: Vec::new(),
            native_arch: native_arch.to_string(),
            loaded: false,
        }
    }

    /// 重新读取仓库索引、已安装状态与可升级列表
    pub fn refresh(&mut self) -> Result<(), CatalogError> {
        let started = Instant::now();
        let available = read_command("apt-cache", &["dumpavail"])?;
        let status = read_command("dpkg-query", &["-W", "-f", DPKG_QUERY_FORMAT])?;
        // apt list 在管道中会往 stderr 打印 CLI 不稳定警告，已丢弃
        let upgradable = read_command("apt", &["list", "--upgradable"]).unwrap_or_else(|e| {
            log::warn!("could not list upgradable packages: {}", e);
            String::new()
        });
        self.load(&available, &status, &upgradable);
        log::info!(
            "catalog refreshed: {} records ({} installed) in {:?}",
            self.records.len(),
            self.records.iter().filter(|r| r.installed).count(),
            started.elapsed()
        );
        Ok(())
    }

    /// 合并三份输出
    pub fn load(&mut self, available: &str, status: &str, upgradable: &str) {
        let mut records: Vec<PackageRecord> = Vec::new();
        let mut index: HashMap<(String, String), usize> = HashMap::new();

        for stanza in parser::parse_stanzas(available) {
            if let Some(record) = parser::record_from_stanza(&stanza) {
                let key = (record.name.clone(), record.arch.clone());
                // dumpavail 中同名同架构以第一条（最高优先级）为准
                if !index.contains_key(&key) {
                    index.insert(key, records.len());
                    records.push(record);
                }
            }
        }

        for installed in parser::parse_dpkg_status(status) {
            let key = (installed.name.clone(), installed.arch.clone());
            match index.get(&key) {
                Some(&i) => {
                    let record = &mut records[i];
                    record.installed = true;
                    record.version = installed.version;
                    if installed.installed_size_kib.is_some() {
                        record.installed_size_kib = installed.installed_size_kib;
                    }
                }
                None => {
                    // 本地安装但仓库中已不存在
                    index.insert(key, records.len());
                    records.push(installed);
                }
            }
        }

        for entry in parser::parse_upgradable(upgradable) {
            let key = (entry.name.clone(), entry.arch.clone());
            if let Some(&i) = index.get(&key) {
                records[i].upgradable = true;
                records[i].candidate_version = Some(entry.candidate);
            }
        }

        self.records = records;
        self.loaded = true;
    }

    fn records(&self) -> Result<&[PackageRecord], CatalogError> {
        if self.loaded {
            Ok(&self.records)
        } else {
            Err(CatalogError::NotLoaded)
        }
    }

    /// 首页推荐：保持配置顺序，未知包名跳过
    pub fn featured(&self, names: &[String]) -> Result<Vec<PackageRecord>, CatalogError> {
        let records = self.records()?;
        let mut seen = HashSet::new();
        Ok(names
            .iter()
            .filter(|name| seen.insert(name.as_str()))
            .filter_map(|name| self.lookup(records, name))
            .cloned()
            .collect())
    }

    /// 分类：先列配置中的包名，再按 section 前缀补充
    pub fn category(
        &self,
        category: &CategoryConfig,
        limit: usize,
    ) -> Result<Vec<PackageRecord>, CatalogError> {
        let records = self.records()?;
        let mut result: Vec<&PackageRecord> = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();

        for name in &category.packages {
            if let Some(record) = self.lookup(records, name) {
                if seen.insert(record.name.as_str()) {
                    result.push(record);
                }
            }
        }

        let mut by_section: Vec<&PackageRecord> = records
            .iter()
            .filter(|r| {
                category
                    .sections
                    .iter()
                    .any(|s| r.base_section().starts_with(s.as_str()))
            })
            .collect();
        by_section = dedupe_by_arch(by_section, &self.native_arch);
        by_section.sort_by(|a, b| a.name.cmp(&b.name));
        for record in by_section {
            if seen.insert(record.name.as_str()) {
                result.push(record);
            }
        }

        result.truncate(limit);
        Ok(result.into_iter().cloned().collect())
    }

    pub fn installed(&self) -> Result<Vec<PackageRecord>, CatalogError> {
        let records = self.records()?;
        let mut installed = dedupe_by_arch(
            records.iter().filter(|r| r.installed).collect(),
            &self.native_arch,
        );
        installed.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(installed.into_iter().cloned().collect())
    }

    pub fn upgradable(&self) -> Result<Vec<PackageRecord>, CatalogError> {
        let records = self.records()?;
        let mut upgradable: Vec<&PackageRecord> =
            records.iter().filter(|r| r.upgradable).collect();
        upgradable.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.arch.cmp(&b.arch)));
        Ok(upgradable.into_iter().cloned().collect())
    }

    /// 名称精确 > 前缀 > 包含 > 描述包含
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<PackageRecord>, CatalogError> {
        let records = self.records()?;
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }

        let matches: Vec<&PackageRecord> = records
            .iter()
            .filter(|r| match_rank(r, &needle).is_some())
            .collect();
        let mut ranked: Vec<(u8, &PackageRecord)> = dedupe_by_arch(matches, &self.native_arch)
            .into_iter()
            .filter_map(|r| match_rank(r, &needle).map(|rank| (rank, r)))
            .collect();
        ranked.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.name.cmp(&b.1.name)));
        ranked.truncate(limit);
        Ok(ranked.into_iter().map(|(_, r)| r.clone()).collect())
    }

    fn lookup<'a>(&self, records: &'a [PackageRecord], name: &str) -> Option<&'a PackageRecord> {
        let candidates: Vec<&PackageRecord> = records.iter().filter(|r| r.name == name).collect();
        dedupe_by_arch(candidates, &self.native_arch).into_iter().next()
    }
}

fn match_rank(record: &PackageRecord, needle: &str) -> Option<u8> {
    let name = record.name.to_lowercase();
    if name == needle {
        Some(0)
    } else if name.starts_with(needle) {
        Some(1)
    } else if name.contains(needle) {
        Some(2)
    } else if record.description.to_lowercase().contains(needle) {
        Some(3)
    } else {
        None
    }
}

fn arch_preference(arch: &str, native: &str) -> u8 {
    if arch == native {
        0
    } else if arch == "all" {
        1
    } else {
        2
    }
}

/// 多架构同名包只保留一条：本机架构 > all > 先出现者，保持首次出现顺序
pub fn dedupe_by_arch<'a>(records: Vec<&'a PackageRecord>, native: &str) -> Vec<&'a PackageRecord> {
    let mut order: Vec<&str> = Vec::new();
    let mut best: HashMap<&str, &'a PackageRecord> = HashMap::new();

    for record in records {
        match best.get(record.name.as_str()) {
            Some(current)
                if arch_preference(&current.arch, native)
                    <= arch_preference(&record.arch, native) => {}
            Some(_) => {
                best.insert(record.name.as_str(), record);
            }
            None => {
                order.push(record.name.as_str());
                best.insert(record.name.as_str(), record);
            }
        }
    }

    order.into_iter().filter_map(|name| best.get(name).copied()).collect()
}
