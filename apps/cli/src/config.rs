use std::{collections::HashMap, fs, path::Path};

use anyhow::Context;
use client_core::{DEFAULT_API_URL, DEFAULT_SITE_URL};
use url::Url;

pub const SETTINGS_FILE: &str = "dreamdecode.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_url: String,
    /// Origin used for share links.
    pub site_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.into(),
            site_url: DEFAULT_SITE_URL.into(),
        }
    }
}

impl Settings {
    pub fn site_url(&self) -> anyhow::Result<Url> {
        Url::parse(self.site_url.trim())
            .with_context(|| format!("invalid site url '{}'", self.site_url))
    }
}

/// Values passed on the command line; they win over file and environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub api_url: Option<String>,
    pub site_url: Option<String>,
}

pub fn load_settings(overrides: Overrides) -> Settings {
    load_settings_from(
        Path::new(SETTINGS_FILE),
        |key| std::env::var(key).ok(),
        overrides,
    )
}

pub fn load_settings_from(
    path: &Path,
    env: impl Fn(&str) -> Option<String>,
    overrides: Overrides,
) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<HashMap<String, String>>(&raw) {
            Ok(file_cfg) => {
                if let Some(v) = file_cfg.get("api_url") {
                    settings.api_url = v.clone();
                }
                if let Some(v) = file_cfg.get("site_url") {
                    settings.site_url = v.clone();
                }
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "ignoring unreadable settings file");
            }
        }
    }

    if let Some(v) = env("DREAMDECODE_API_URL") {
        settings.api_url = v;
    }
    if let Some(v) = env("DREAMDECODE_SITE_URL") {
        settings.site_url = v;
    }

    if let Some(v) = overrides.api_url {
        settings.api_url = v;
    }
    if let Some(v) = overrides.site_url {
        settings.site_url = v;
    }

    settings
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
