use std::{fs, path::Path, path::PathBuf, time::Duration};

use color_eyre::{
    Result,
    eyre::{WrapErr as _, eyre},
};
use serde::{Deserialize, Serialize};

use crate::{MediaGenError, preprocess::ImageToolKind};

pub const VIDEO_API_KEY_VAR: &str = "AIHUBMIX_API_KEY";
pub const OPENROUTER_API_KEY_VAR: &str = "OPENROUTER_API_KEY";

pub const DEFAULT_VIDEO_BASE_URL: &str = "https://aihubmix.com";
pub const DEFAULT_OPENROUTER_BASE_URL: &str = "https://openrouter.ai";

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20 * 60);

const SETTINGS_FILE: &str = "mediagen.ron";

/// Reads a bearer token from the environment. Unset and empty count as missing.
pub fn api_key(var: &'static str) -> Result<String> {
    Ok(api_key_from(var, std::env::var(var).ok())?)
}

pub fn api_key_from(var: &'static str, value: Option<String>) -> Result<String, MediaGenError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or(MediaGenError::MissingCredential { var })
}

/// Optional overrides read from `mediagen.ron` in the local config dir.
///
/// Every field may be left out; the accessors fall back to the built-in defaults.
/// ```text
/// (
///     video_base_url: Some("https://aihubmix.com"),
///     poll_interval_secs: Some(5),
/// )
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    pub video_base_url: Option<String>,
    pub openrouter_base_url: Option<String>,
    pub poll_interval_secs: Option<u64>,
    pub timeout_secs: Option<u64>,
    pub image_tool: Option<ImageToolKind>,
}

impl Settings {
    pub fn load() -> Result<Self> {
        let path = settings_path()?;
        if !path.exists() {
            Ok(Self::default())
        } else {
            Self::load_from(&path)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let src = fs::read_to_string(path)?;
        ron::from_str(&src).wrap_err_with(|| format!("parsing {}", path.display()))
    }

    pub fn video_base_url(&self) -> &str {
        self.video_base_url
            .as_deref()
            .unwrap_or(DEFAULT_VIDEO_BASE_URL)
    }

    pub fn openrouter_base_url(&self) -> &str {
        self.openrouter_base_url
            .as_deref()
            .unwrap_or(DEFAULT_OPENROUTER_BASE_URL)
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_POLL_INTERVAL)
    }

    pub fn image_tool(&self) -> ImageToolKind {
        self.image_tool.unwrap_or_default()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT)
    }
}

pub fn settings_path() -> Result<PathBuf> {
    Ok(dirs::config_local_dir()
        .ok_or(eyre!("Couldn't get config dir"))?
        .join(SETTINGS_FILE))
}

/// Looks `name` up in an alias table, passing unknown names through unchanged.
pub fn resolve_alias(table: &[(&str, &str)], name: &str) -> String {
    table
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, id)| id.to_string())
        .unwrap_or_else(|| name.to_string())
}
