//! Application settings management

use crate::PathManager;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Application settings stored in settings.toml
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Node ceiling per conversation; unlimited when absent
    pub max_turns: Option<usize>,
    /// Model viewports in display order (e.g., ["claude-sonnet", "gpt-4o"]).
    /// More than one entry enables multi-model mode.
    #[serde(default)]
    pub models: Vec<String>,
    /// Whether messages from earlier turns on the pathway start out shown
    #[serde(default)]
    pub show_previous: bool,
    /// tracing filter directive used when RUST_LOG is unset
    pub log_filter: Option<String>,
}

impl Settings {
    /// Load settings from the settings file, or return defaults if not found
    pub fn load() -> Self {
        PathManager::settings_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default()
    }

    /// Load settings from `path`; a missing or unparseable file yields defaults
    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = fs::read_to_string(path) else {
            return Self::default();
        };

        toml::from_str(&content).unwrap_or_default()
    }

    /// Save settings to the settings file
    pub fn save(&self) -> Result<(), String> {
        let path = PathManager::settings_path().ok_or("Could not determine settings path")?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config dir: {}", e))?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize settings: {}", e))?;
        fs::write(path, content).map_err(|e| format!("Failed to write settings: {}", e))?;
        Ok(())
    }

    /// More than one configured model means one viewport per model
    pub fn is_multi_model(&self) -> bool {
        self.models.len() > 1
    }
}
