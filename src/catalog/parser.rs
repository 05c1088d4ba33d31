//! apt / dpkg 输出解析函数

use super::types::PackageRecord;

/// deb822 段落中的一个字段
pub type Field = (String, String);

/// 解析 `apt-cache dumpavail` 之类的 deb822 文本，空行分段，续行以空格开头
pub fn parse_stanzas(output: &str) -> Vec<Vec<Field>> {
    let mut stanzas = Vec::new();
    let mut fields: Vec<Field> = Vec::new();

    for line in output.lines() {
        if line.trim().is_empty() {
            if !fields.is_empty() {
                stanzas.push(std::mem::take(&mut fields));
            }
            continue;
        }
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some(last) = fields.last_mut() {
                last.1.push('\n');
                last.1.push_str(line.trim());
            }
            continue;
        }
        if let Some(colon) = line.find(':') {
            let key = line[..colon].trim();
            let val = line[colon + 1..].trim();
            if !key.is_empty() {
                fields.push((key.to_string(), val.to_string()));
            }
        }
    }
    if !fields.is_empty() {
        stanzas.push(fields);
    }
    stanzas
}

/// `Depends` 字段只保留包名（替代依赖取第一个）
pub fn parse_depends(value: &str) -> Vec<String> {
    value
        .split(',')
        .filter_map(|dep| {
            let first = dep.split('|').next()?.trim();
            let name = first
                .split(|c: char| c.is_whitespace() || c == '(' || c == '[')
                .next()?
                .split(':')
                .next()?;
            if name.is_empty() {
                None
            } else {
                Some(name.to_string())
            }
        })
        .collect()
}

/// 段落 → PackageRecord，缺少 Package 字段时返回 None
pub fn record_from_stanza(fields: &[Field]) -> Option<PackageRecord> {
    let mut record = PackageRecord::default();

    for (key, val) in fields {
        match key.as_str() {
            "Package" => record.name = val.clone(),
            "Architecture" => record.arch = val.clone(),
            "Version" => record.version = val.clone(),
            "Section" => record.section = val.clone(),
            "Installed-Size" => record.installed_size_kib = val.trim().parse().ok(),
            "Depends" | "Pre-Depends" => record.depends.extend(parse_depends(val)),
            "Homepage" => record.homepage = Some(val.clone()),
            "Description" | "Description-en" => {
                let mut lines = val.lines();
                record.description = lines.next().unwrap_or("").trim().to_string();
                // 续行中单独的 "." 表示空行
                record.long_description = lines
                    .map(|l| if l.trim() == "." { "" } else { l })
                    .collect::<Vec<_>>()
                    .join("\n");
            }
            _ => {}
        }
    }

    if record.name.is_empty() {
        None
    } else {
        Some(record)
    }
}

/// dpkg-query 输出格式，字段以 tab 分隔
pub const DPKG_QUERY_FORMAT: &str = "${Package}\t${Architecture}\t${Version}\t${db:Status-Abbrev}\t${Installed-Size}\t${Section}\t${binary:Summary}\n";

/// 解析 dpkg-query -W 输出，只保留状态为 `ii` 的包
pub fn parse_dpkg_status(output: &str) -> Vec<PackageRecord> {
    output
        .lines()
        .filter_map(|line| {
            let cols: Vec<&str> = line.split('\t').collect();
            if cols.len() < 4 {
                return None;
            }
            if !cols[3].trim_end().starts_with("ii") {
                return None;
            }
            Some(PackageRecord {
                name: cols[0].to_string(),
                arch: cols[1].to_string(),
                version: cols[2].to_string(),
                installed: true,
                installed_size_kib: cols.get(4).and_then(|s| s.trim().parse().ok()),
                section: cols.get(5).unwrap_or(&"").to_string(),
                description: cols.get(6).unwrap_or(&"").to_string(),
                ..Default::default()
            })
        })
        .collect()
}

/// `apt list --upgradable` 中的一行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeEntry {
    pub name: String,
    pub arch: String,
    pub candidate: String,
}

/// 解析 `apt list --upgradable`
///
/// 典型行：`firefox-esr/stable-security 115.9.0esr-1~deb12u1 amd64 [upgradable from: 115.8.0esr-1~deb12u1]`
pub fn parse_upgradable(output: &str) -> Vec<UpgradeEntry> {
    output
        .lines()
        .filter_map(|line| {
            let (name, rest) = line.trim().split_once('/')?;
            let mut parts = rest.split_whitespace();
            let _suite = parts.next()?;
            let candidate = parts.next()?;
            let arch = parts.next()?;
            Some(UpgradeEntry {
                name: name.to_string(),
                arch: arch.to_string(),
                candidate: candidate.to_string(),
            })
        })
        .collect()
}
