use std::path::PathBuf;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::annotate::settings::AnnotateSettings;
use crate::annotate::settings_store;

pub const SETTINGS_FILE_NAME: &str = "settings.json";

/// Application level settings for the annotation tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub debug_logging: bool,
    /// Log to this file instead of stderr.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    /// Annotation settings file; defaults to the one next to the executable.
    #[serde(default)]
    pub annotate_settings: Option<PathBuf>,
}

impl Settings {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path).unwrap_or_default();
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(&content).with_context(|| format!("parse settings file {path}"))
    }

    pub fn save(&self, path: &str) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// `settings.json` under the user's config directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs_next::config_dir().map(|dir| dir.join("annotation_authoring").join(SETTINGS_FILE_NAME))
    }

    pub fn load_annotate_settings(&self) -> anyhow::Result<AnnotateSettings> {
        match &self.annotate_settings {
            Some(path) => Ok(settings_store::load_from_path(path)?.unwrap_or_default()),
            None => settings_store::load(),
        }
    }
}
