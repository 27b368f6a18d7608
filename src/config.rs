//! On-disk configuration, `config.yml` under the acibuild home directory.

use crate::constants::{
    DEFAULT_BUILDER_IMAGE, DEFAULT_COMPRESSION_BLOCK_SIZE, DEFAULT_COMPRESSION_CONCURRENCY,
};
use crate::error::{ErrorFieldExt, ErrorKind, Result, ResultExt};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "config.yml";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Directory the config was loaded from
    #[serde(skip)]
    pub path: PathBuf,
    /// When set, targets live in `<targetWorkDir>/<image short name>`
    pub target_work_dir: Option<PathBuf>,
    pub default_builder_image: String,
    pub parallel_build: bool,
    /// Allow plain http for latest-version discovery
    pub insecure_discovery: bool,
    pub rkt: RktConfig,
    pub sign: SignConfig,
    pub push: PushConfig,
    pub compression: CompressionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            target_work_dir: None,
            default_builder_image: DEFAULT_BUILDER_IMAGE.to_string(),
            parallel_build: true,
            insecure_discovery: false,
            rkt: RktConfig::default(),
            sign: SignConfig::default(),
            push: PushConfig::default(),
            compression: CompressionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RktConfig {
    pub path: PathBuf,
    pub global_args: Vec<String>,
}

impl Default for RktConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("rkt"),
            global_args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SignConfig {
    pub gpg: PathBuf,
    pub key_id: Option<String>,
    pub homedir: Option<PathBuf>,
}

impl Default for SignConfig {
    fn default() -> Self {
        Self {
            gpg: PathBuf::from("gpg"),
            key_id: None,
            homedir: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PushConfig {
    /// External command receiving the image, its signature and the image name
    pub command: Option<PathBuf>,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompressionConfig {
    pub block_size: usize,
    pub concurrency: usize,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_COMPRESSION_BLOCK_SIZE,
            concurrency: DEFAULT_COMPRESSION_CONCURRENCY,
        }
    }
}

impl Config {
    /// Load `<home>/config.yml`. A missing file yields the defaults.
    pub fn load(home: &Path) -> Result<Self> {
        let file = home.join(CONFIG_FILE);
        let mut config = if file.exists() {
            let content = std::fs::read_to_string(&file)
                .err_ctx(ErrorKind::Config, "Failed to read configuration")
                .field("path", file.display())?;
            Self::parse(&content).field("path", file.display())?
        } else {
            Self::default()
        };
        config.path = home.to_path_buf();
        tracing::debug!(path = %home.display(), "Home folder");
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).err_ctx(ErrorKind::Config, "Invalid configuration")
    }
}

/// Home directory: explicit flag or `ACIBUILD_HOME`, then the invoking sudo user's
/// `~/.config/acibuild`, then `$HOME/.config/acibuild`.
pub fn resolve_home(explicit: Option<PathBuf>) -> PathBuf {
    if let Some(home) = explicit {
        return home;
    }
    let user_home = std::env::var("SUDO_USER")
        .ok()
        .filter(|u| !u.is_empty())
        .and_then(|user| sudo_user_home(&user))
        .or_else(|| std::env::var("HOME").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("/root"));
    user_home.join(".config").join("acibuild")
}

fn sudo_user_home(user: &str) -> Option<PathBuf> {
    let output = std::process::Command::new("getent")
        .args(["passwd", user])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8_lossy(&output.stdout)
        .trim()
        .split(':')
        .nth(5)
        .filter(|h| !h.is_empty())
        .map(PathBuf::from)
}
