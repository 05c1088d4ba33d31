use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// 商店分类：按包名列表 + Debian section 前缀聚合
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryConfig {
    pub name: String,
    #[serde(default)]
    pub packages: Vec<String>,
    #[serde(default)]
    pub sections: Vec<String>,
}

impl CategoryConfig {
    fn new(name: &str, packages: &[&str], sections: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            packages: packages.iter().map(|s| s.to_string()).collect(),
            sections: sections.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 启动时以 sudo -S 执行的刷新命令
    pub update_command: Vec<String>,
    /// 安装 / 卸载 / 升级使用的策略提权工具（无需口令）
    pub escalation_helper: String,
    pub log_file: PathBuf,
    pub featured: Vec<String>,
    pub categories: Vec<CategoryConfig>,
    /// 包名 → desktop id
    pub icon_aliases: BTreeMap<String, String>,
    pub application_dirs: Vec<PathBuf>,
    pub search_limit: usize,
}

fn home_dir() -> PathBuf {
    PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".to_string()))
}

impl Default for Config {
    fn default() -> Self {
        let home = home_dir();
        let icon_aliases = [
            ("google-chrome-stable", "google-chrome"),
            ("code", "visual-studio-code"),
            ("libreoffice-writer", "libreoffice-writer"),
            ("vlc", "vlc"),
            ("gnome-terminal", "org.gnome.Terminal"),
            ("nautilus", "org.gnome.Nautilus"),
            ("gedit", "org.gnome.gedit"),
            ("thunderbird", "thunderbird"),
            ("obs-studio", "com.obsproject.Studio"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            update_command: ["sudo", "-S", "apt-get", "update"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            escalation_helper: "pkexec".to_string(),
            log_file: home.join(".local/state/las/las.log"),
            featured: [
                "firefox-esr",
                "firefox",
                "vlc",
                "gimp",
                "libreoffice-writer",
                "thunderbird",
                "inkscape",
                "obs-studio",
                "keepassxc",
                "htop",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            categories: vec![
                CategoryConfig::new(
                    "Internet",
                    &["firefox-esr", "firefox", "thunderbird", "transmission-gtk", "filezilla"],
                    &["web", "net", "mail"],
                ),
                CategoryConfig::new(
                    "Multimedia",
                    &["vlc", "audacity", "obs-studio", "mpv", "rhythmbox"],
                    &["sound", "video"],
                ),
                CategoryConfig::new(
                    "Graphics",
                    &["gimp", "inkscape", "krita", "blender"],
                    &["graphics"],
                ),
                CategoryConfig::new(
                    "Office",
                    &["libreoffice-writer", "libreoffice-calc", "evince"],
                    &["editors", "text"],
                ),
                CategoryConfig::new(
                    "Development",
                    &["git", "build-essential", "geany", "meld"],
                    &["devel", "vcs"],
                ),
                CategoryConfig::new(
                    "Games",
                    &["supertuxkart", "0ad", "aisleriot"],
                    &["games"],
                ),
                CategoryConfig::new(
                    "System",
                    &["htop", "gparted", "keepassxc", "timeshift"],
                    &["admin", "utils"],
                ),
            ],
            icon_aliases,
            application_dirs: vec![
                PathBuf::from("/usr/share/applications"),
                PathBuf::from("/usr/local/share/applications"),
                home.join(".local/share/applications"),
                PathBuf::from("/var/lib/flatpak/exports/share/applications"),
            ],
            search_limit: 200,
        }
    }
}

impl Config {
    pub fn config_path() -> PathBuf {
        home_dir().join(".config/las/config.toml")
    }

    pub fn load_or_default() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.escalation_helper, "pkexec");
        assert_eq!(config.update_command, vec!["sudo", "-S", "apt-get", "update"]);
        assert!(config.categories.iter().any(|c| c.name == "Graphics"));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
featured = ["vim"]
search_limit = 5

[[categories]]
name = "Editors"
packages = ["vim", "emacs"]
"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.featured, vec!["vim"]);
        assert_eq!(config.search_limit, 5);
        assert_eq!(config.categories.len(), 1);
        assert!(config.categories[0].sections.is_empty());
        assert_eq!(config.escalation_helper, "pkexec");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "search_limit = \"lots\"").unwrap();
        assert!(Config::load_from(&path).is_err());
    }
}
