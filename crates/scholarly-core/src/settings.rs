use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Result, anyhow};

pub const DEFAULT_SERVER_URL: &str = "http://localhost:8000";
pub const SERVER_URL_ENV: &str = "SCHOLARLY_SERVER_URL";

pub const MIN_SPLIT_RATIO: f32 = 0.2;
pub const MAX_SPLIT_RATIO: f32 = 0.8;

/// Models the backend accepts as a per-message override
pub fn available_models() -> Vec<String> {
    vec![
        "gemini-3-pro-preview".to_string(),
        "gemini-2.5-pro".to_string(),
        "gemini-2.5-flash".to_string(),
    ]
}

/// UI preferences persisted across runs.
///
/// Loaded once at startup; every setter writes the file straight back.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub server_url: Option<String>,
    #[serde(default = "default_model")]
    pub selected_model: String,
    #[serde(default = "default_split_ratio")]
    pub split_ratio: f32,
    #[serde(default)]
    pub sidebar_collapsed: bool,
    #[serde(default)]
    pub last_project: Option<String>,

    #[serde(skip)]
    path: Option<PathBuf>,
}

fn default_model() -> String {
    available_models().remove(0)
}

fn default_split_ratio() -> f32 {
    0.5
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: None,
            selected_model: default_model(),
            split_ratio: default_split_ratio(),
            sidebar_collapsed: false,
            last_project: None,
            path: None,
        }
    }
}

impl Settings {
    /// Load from the user config directory, falling back to defaults when the
    /// file is missing or unreadable.
    pub fn load() -> Self {
        match Self::get_settings_path() {
            Ok(path) => Self::load_from(&path),
            Err(e) => {
                tracing::warn!("settings disabled: {}", e);
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Self {
        let mut settings = match Self::read(path) {
            Ok(Some(settings)) => settings,
            Ok(None) => Self::default(),
            Err(e) => {
                tracing::warn!(path = %path.display(), "ignoring unreadable settings: {}", e);
                Self::default()
            }
        };
        settings.split_ratio = clamp_ratio(settings.split_ratio);
        settings.path = Some(path.to_path_buf());
        settings
    }

    fn read(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&content)?;
        Ok(Some(settings))
    }

    pub fn save(&self) -> Result<()> {
        let path = self
            .path
            .as_ref()
            .ok_or_else(|| anyhow!("Settings have no backing file"))?;

        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Server URL: environment first, then the settings file, then the default.
    pub fn server_url(&self) -> String {
        std::env::var(SERVER_URL_ENV)
            .ok()
            .filter(|url| !url.trim().is_empty())
            .or_else(|| self.server_url.clone())
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string())
    }

    pub fn set_split_ratio(&mut self, ratio: f32) -> Result<()> {
        let ratio = clamp_ratio(ratio);
        if (ratio - self.split_ratio).abs() < f32::EPSILON {
            return Ok(());
        }
        self.split_ratio = ratio;
        self.save()
    }

    pub fn set_sidebar_collapsed(&mut self, collapsed: bool) -> Result<()> {
        if self.sidebar_collapsed == collapsed {
            return Ok(());
        }
        self.sidebar_collapsed = collapsed;
        self.save()
    }

    pub fn set_selected_model(&mut self, model: &str) -> Result<()> {
        if self.selected_model == model {
            return Ok(());
        }
        self.selected_model = model.to_string();
        self.save()
    }

    pub fn set_last_project(&mut self, project_id: Option<&str>) -> Result<()> {
        if self.last_project.as_deref() == project_id {
            return Ok(());
        }
        self.last_project = project_id.map(str::to_string);
        self.save()
    }

    fn get_settings_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("scholarly").join("settings.json"))
    }
}

fn clamp_ratio(ratio: f32) -> f32 {
    if ratio.is_nan() {
        return default_split_ratio();
    }
    ratio.clamp(MIN_SPLIT_RATIO, MAX_SPLIT_RATIO)
}
