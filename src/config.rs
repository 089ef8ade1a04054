use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::session::EDITABLE_WIDTH;
use crate::state::{ButtonLabels, SaveOptions};

/// Overrides the work directory for transform and crop results.
pub const WORK_DIR_ENV: &str = "MANIPULATOR_WORK_DIR";

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
/// Persisted editor settings.
pub struct AppConfig {
    pub window_width: Option<f32>,
    pub window_height: Option<f32>,
    pub work_dir: Option<PathBuf>,
    pub editable_width: u32,
    pub square_aspect: bool,
    pub save_options: SaveOptions,
    pub labels: ButtonLabels,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            window_width: None,
            window_height: None,
            work_dir: None,
            editable_width: EDITABLE_WIDTH,
            square_aspect: false,
            save_options: SaveOptions::default(),
            labels: ButtonLabels::default(),
        }
    }
}

impl AppConfig {
    /// Returns the user config file path, if a config directory is available.
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("manipulator").join("config.toml"))
    }

    /// Loads config from disk, falling back to defaults on any error.
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };
        let Ok(contents) = std::fs::read_to_string(&path) else {
            return Self::default();
        };
        Self::parse(&contents)
    }

    fn parse(contents: &str) -> Self {
        match toml::from_str(contents) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(%err, "ignoring unreadable config");
                Self::default()
            }
        }
    }

    /// Writes config to disk, ignoring filesystem/serialization errors.
    pub fn save(&self) {
        let Some(path) = Self::config_path() else {
            return;
        };
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Ok(s) = toml::to_string_pretty(self) {
            let _ = std::fs::write(&path, s);
        }
    }

    /// Work directory: environment override, then config, then the documents folder.
    pub fn resolve_work_dir(&self) -> PathBuf {
        resolve_work_dir(std::env::var_os(WORK_DIR_ENV).map(PathBuf::from), self)
    }
}

fn resolve_work_dir(env_override: Option<PathBuf>, config: &AppConfig) -> PathBuf {
    env_override
        .filter(|p| !p.as_os_str().is_empty())
        .or_else(|| config.work_dir.clone())
        .or_else(|| dirs::document_dir().map(|d| d.join("manipulator")))
        .unwrap_or_else(|| std::env::temp_dir().join("manipulator"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SaveFormat;

    #[test]
    fn partial_config_keeps_defaults_for_missing_fields() {
        let config = AppConfig::parse(
            r#"
            square_aspect = true

            [save_options]
            format = "jpeg"
            compress = 0.8

            [labels]
            done = "Fertig"
            "#,
        );
        assert!(config.square_aspect);
        assert_eq!(config.save_options.format, SaveFormat::Jpeg);
        assert_eq!(config.save_options.compress, 0.8);
        assert!(!config.save_options.base64);
        assert_eq!(config.labels.done, "Fertig");
        assert_eq!(config.labels.crop, "Crop");
        assert_eq!(config.editable_width, EDITABLE_WIDTH);
    }

    #[test]
    fn unreadable_config_falls_back_to_defaults() {
        let config = AppConfig::parse("editable_width = \"wide\"");
        assert_eq!(config.editable_width, EDITABLE_WIDTH);
    }

    #[test]
    fn config_round_trips_through_toml() {
        let mut config = AppConfig::default();
        config.window_width = Some(900.0);
        config.work_dir = Some(PathBuf::from("/tmp/edits"));
        let text = toml::to_string_pretty(&config).unwrap();
        let back = AppConfig::parse(&text);
        assert_eq!(back.window_width, Some(900.0));
        assert_eq!(back.work_dir, Some(PathBuf::from("/tmp/edits")));
    }

    #[test]
    fn work_dir_prefers_env_then_config() {
        let mut config = AppConfig::default();
        config.work_dir = Some(PathBuf::from("/from/config"));
        assert_eq!(
            resolve_work_dir(Some(PathBuf::from("/from/env")), &config),
            PathBuf::from("/from/env")
        );
        assert_eq!(resolve_work_dir(None, &config), PathBuf::from("/from/config"));
        assert_eq!(
            resolve_work_dir(Some(PathBuf::new()), &config),
            PathBuf::from("/from/config")
        );
    }
}
