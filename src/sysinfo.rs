use std::fs;

/// 系统环境信息，显示在商店页头；本机架构用于多架构去重
#[derive(Debug, Clone)]
pub struct SystemInfo {
    pub kernel: String,
    pub distro: String,
    pub arch: String,
}

impl SystemInfo {
    /// 自动检测系统环境信息（阻塞，在工作线程中调用）
    pub fn detect() -> Self {
        Self {
            kernel: Self::run_cmd("uname", &["-r"]).unwrap_or_else(|| "unknown".to_string()),
            distro: Self::get_distro(),
            arch: Self::native_arch(),
        }
    }

    fn run_cmd(cmd: &str, args: &[&str]) -> Option<String> {
        duct::cmd(cmd, args)
            .stderr_null()
            .read()
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    fn get_distro() -> String {
        fs::read_to_string("/etc/os-release")
            .ok()
            .and_then(|content| parse_os_release(&content))
            .unwrap_or_else(|| "Linux".to_string())
    }

    /// dpkg 的架构名；dpkg 不可用时按编译目标推断
    pub fn native_arch() -> String {
        Self::run_cmd("dpkg", &["--print-architecture"])
            .unwrap_or_else(|| debian_arch(std::env::consts::ARCH).to_string())
    }
}

/// 取 PRETTY_NAME，没有时退回 NAME
pub fn parse_os_release(content: &str) -> Option<String> {
    let mut name = None;
    for line in content.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"').to_string();
        match key.trim() {
            "PRETTY_NAME" if !value.is_empty() => return Some(value),
            "NAME" if !value.is_empty() => name = Some(value),
            _ => {}
        }
    }
    name
}

fn debian_arch(rust_arch: &str) -> &str {
    match rust_arch {
        "x86_64" => "amd64",
        "x86" => "i386",
        "aarch64" => "arm64",
        "arm" => "armhf",
        "powerpc64" => "ppc64el",
        other => other,
    }
}
