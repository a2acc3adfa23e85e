use std::{collections::HashMap, fs, path::Path};

use anyhow::Context;
use serde::Deserialize;
use url::Url;

pub const SETTINGS_FILE: &str = "dev_server.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    pub bind_addr: String,
    /// Origin of the form site; checkout returns land on `<frontend_url>/reveal`.
    pub frontend_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8000".into(),
            frontend_url: "http://localhost:5173".into(),
        }
    }
}

impl Settings {
    pub fn frontend_url(&self) -> anyhow::Result<Url> {
        Url::parse(self.frontend_url.trim())
            .with_context(|| format!("invalid frontend url '{}'", self.frontend_url))
    }
}

pub fn load_settings() -> Settings {
    load_settings_from(Path::new(SETTINGS_FILE), |key| std::env::var(key).ok())
}

/// Defaults, then the TOML file, then environment variables.
pub fn load_settings_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<HashMap<String, String>>(&raw) {
            Ok(file_cfg) => {
                if let Some(v) = file_cfg.get("bind_addr") {
                    settings.bind_addr = v.clone();
                }
                if let Some(v) = file_cfg.get("frontend_url") {
                    settings.frontend_url = v.clone();
                }
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "ignoring unreadable settings file");
            }
        }
    }

    if let Some(v) = env("DEV_SERVER_BIND") {
        settings.bind_addr = v;
    }
    if let Some(v) = env("FRONTEND_URL") {
        settings.frontend_url = v;
    }
    if let Some(v) = env("DEV_SERVER_FRONTEND_URL") {
        settings.frontend_url = v;
    }

    settings
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
