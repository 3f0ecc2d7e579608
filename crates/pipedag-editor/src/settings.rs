use pipedag_core::Vec2;
use pipedag_graph::LayoutConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to access settings file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse settings: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorSettings {
    pub interaction: InteractionSettings,
    pub canvas: CanvasSettings,
    pub layout: LayoutSettings,
    pub sync: SyncSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionSettings {
    /// Window in which a second click on the same step counts as a double click.
    pub double_click_timeout_ms: u64,
    /// Pixels per line for wheel events reported in line or page units.
    pub scroll_line_height: f64,
    pub wheel_zoom_divisor: f64,
    /// Scale change applied by the zoom in/out buttons.
    pub zoom_step: f64,
}

impl Default for InteractionSettings {
    fn default() -> Self {
        Self {
            double_click_timeout_ms: 300,
            scroll_line_height: 16.0,
            wheel_zoom_divisor: 3000.0,
            zoom_step: 0.25,
        }
    }
}

impl InteractionSettings {
    pub fn double_click_timeout(&self) -> Duration {
        Duration::from_millis(self.double_click_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasSettings {
    pub step_width: f64,
    pub step_height: f64,
    pub initial_offset: Vec2,
}

impl Default for CanvasSettings {
    fn default() -> Self {
        Self {
            step_width: 190.0,
            step_height: 105.0,
            initial_offset: Vec2::new(-1.0, -1.0),
        }
    }
}

impl CanvasSettings {
    pub fn step_size(&self) -> Vec2 {
        Vec2::new(self.step_width, self.step_height)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutSettings {
    pub spacing_factor: f64,
    pub grid_margin: f64,
    pub top_margin_factor: f64,
}

impl Default for LayoutSettings {
    fn default() -> Self {
        Self {
            spacing_factor: 0.7,
            grid_margin: 20.0,
            top_margin_factor: 4.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub base_url: String,
    pub save_indicator_delay_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            save_indicator_delay_ms: 100,
            request_timeout_secs: 30,
        }
    }
}

impl SyncSettings {
    pub fn save_indicator_delay(&self) -> Duration {
        Duration::from_millis(self.save_indicator_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

impl EditorSettings {
    /// `<config dir>/pipedag/settings.json`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("pipedag").join("settings.json"))
    }

    /// Reads settings from `path`; a missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            tracing::info!("Settings file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let settings = serde_json::from_str(&content)?;
        tracing::info!("Settings loaded from {:?}", path);
        Ok(settings)
    }

    /// Loads from the default location, falling back to defaults on any error.
    pub fn load() -> Self {
        let Some(path) = Self::default_path() else {
            return Self::default();
        };
        match Self::load_from(&path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::error!("Failed to load settings: {}", e);
                Self::default()
            }
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn layout_config(&self) -> LayoutConfig {
        LayoutConfig {
            step_size: self.canvas.step_size(),
            spacing_factor: self.layout.spacing_factor,
            margin_left: self.layout.grid_margin,
            margin_top: self.layout.grid_margin * self.layout.top_margin_factor,
        }
    }
}
