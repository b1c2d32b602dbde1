use crate::annotate::settings::AnnotateSettings;
use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};

pub const ANNOTATE_SETTINGS_FILE_NAME: &str = "annotate_settings.json";

pub fn settings_path_from_exe_path(exe_path: &Path) -> Result<PathBuf> {
    let parent = exe_path
        .parent()
        .ok_or_else(|| anyhow!("executable path has no parent: {}", exe_path.display()))?;
    Ok(parent.join(ANNOTATE_SETTINGS_FILE_NAME))
}

pub fn resolve_settings_path() -> Result<PathBuf> {
    let exe_path = std::env::current_exe().context("resolve current executable")?;
    settings_path_from_exe_path(&exe_path)
}

/// Settings next to the executable, or defaults when there is no file yet.
pub fn load() -> Result<AnnotateSettings> {
    Ok(load_dedicated()?.unwrap_or_default())
}

pub fn load_dedicated() -> Result<Option<AnnotateSettings>> {
    let path = resolve_settings_path()?;
    load_from_path(&path)
}

pub fn save(settings: &AnnotateSettings) -> Result<PathBuf> {
    let path = resolve_settings_path()?;
    save_to_path(&path, settings)?;
    Ok(path)
}

pub fn load_from_path(path: &Path) -> Result<Option<AnnotateSettings>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("read annotate settings file {}", path.display()))?;

    if content.trim().is_empty() {
        return Ok(Some(AnnotateSettings::default()));
    }

    let mut loaded: AnnotateSettings = serde_json::from_str(&content)
        .with_context(|| format!("deserialize annotate settings file {}", path.display()))?;
    if loaded.sanitize() {
        tracing::warn!(path = %path.display(), "annotate settings contained invalid values");
    }
    Ok(Some(loaded))
}

pub fn save_to_path(path: &Path, settings: &AnnotateSettings) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create annotate settings folder {}", parent.display()))?;
    }

    let mut sanitized = settings.clone();
    sanitized.sanitize();
    let json =
        serde_json::to_string_pretty(&sanitized).context("serialize annotate settings")?;
    std::fs::write(path, json)
        .with_context(|| format!("write annotate settings file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_path_is_resolved_next_to_executable() {
        let exe = Path::new("/opt/atlas/bin/annotation_authoring");
        let path = settings_path_from_exe_path(exe).expect("path");
        assert_eq!(
            path,
            Path::new("/opt/atlas/bin").join(ANNOTATE_SETTINGS_FILE_NAME)
        );
    }

    #[test]
    fn load_returns_none_when_file_is_missing() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join(ANNOTATE_SETTINGS_FILE_NAME);
        assert_eq!(load_from_path(&path).expect("load"), None);
    }

    #[test]
    fn empty_file_loads_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join(ANNOTATE_SETTINGS_FILE_NAME);
        std::fs::write(&path, "  \n").expect("write");
        assert_eq!(
            load_from_path(&path).expect("load"),
            Some(AnnotateSettings::default())
        );
    }

    #[test]
    fn save_then_load_roundtrip_creates_parent_folder() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("nested").join(ANNOTATE_SETTINGS_FILE_NAME);

        let settings = AnnotateSettings {
            undo_capacity: 12,
            polyhedron_depth_mm: 5.5,
            ..AnnotateSettings::default()
        };
        save_to_path(&path, &settings).expect("save");

        assert_eq!(load_from_path(&path).expect("load"), Some(settings));
    }

    #[test]
    fn malformed_file_reports_path() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join(ANNOTATE_SETTINGS_FILE_NAME);
        std::fs::write(&path, "{ not json").expect("write");

        let err = load_from_path(&path).expect_err("malformed");
        assert!(format!("{err:#}").contains(ANNOTATE_SETTINGS_FILE_NAME));
    }
}
