//! Viewer settings and the persisted state blob.
//!
//! Settings, key bindings and bookmarks are saved together as one JSON
//! document: a file under the user config directory on native targets and a
//! localStorage entry in the browser.

use serde::{Deserialize, Serialize};

use crate::bookmarks::BookmarkList;
use crate::constants::{DEFAULT_BRUSH_SIZE, DEFAULT_TRACE_WIDTH, POINTS_PLOTTED_LIMIT};
use crate::keybindings::KeyBindings;
use crate::registry::MultiUser;

/// Log level setting for the viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn name(&self) -> &'static str {
        match self {
            LogLevel::Error => "Error",
            LogLevel::Warn => "Warn",
            LogLevel::Info => "Info",
            LogLevel::Debug => "Debug",
            LogLevel::Trace => "Trace",
        }
    }

    /// Convert to log crate's LevelFilter.
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Current persisted-state format version.
/// Increment this when making breaking changes to the format.
pub const CONFIG_VERSION: u32 = 1;

/// User-adjustable viewer behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerSettings {
    /// Colour-blind friendly intensity gradient
    pub colorblind: bool,

    /// Show hover labels for points
    pub show_tooltips: bool,

    /// "Jump" goes to the most intense untraced point instead of the next bookmark
    pub jump_to_untraced: bool,

    /// Width of the mz guard band
    pub trace_width: f64,

    /// Segmentation brush size
    pub brush_size: f64,

    /// Maximum points requested and drawn per view
    pub detail_points: usize,

    /// Scale point heights logarithmically
    pub use_log_height: bool,

    /// Log verbosity
    pub log_level: LogLevel,

    /// Id partition when several annotators share one file
    pub multi_user: Option<MultiUser>,
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self {
            colorblind: false,
            show_tooltips: true,
            jump_to_untraced: true,
            trace_width: DEFAULT_TRACE_WIDTH,
            brush_size: DEFAULT_BRUSH_SIZE,
            detail_points: POINTS_PLOTTED_LIMIT,
            use_log_height: false,
            log_level: LogLevel::default(),
            multi_user: None,
        }
    }
}

/// Everything the viewer keeps between sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    /// Version of the format
    pub version: u32,

    #[serde(default)]
    pub settings: ViewerSettings,

    #[serde(default)]
    pub keybindings: KeyBindings,

    #[serde(default)]
    pub bookmarks: BookmarkList,
}

impl Default for PersistedState {
    fn default() -> Self {
        Self::new()
    }
}

impl PersistedState {
    pub fn new() -> Self {
        Self {
            version: CONFIG_VERSION,
            settings: ViewerSettings::default(),
            keybindings: KeyBindings::default(),
            bookmarks: BookmarkList::new(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parse, rejecting files written by a newer version.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let state: Self = serde_json::from_str(json)?;
        if state.version > CONFIG_VERSION {
            return Err(ConfigError::VersionTooNew {
                file_version: state.version,
                supported_version: CONFIG_VERSION,
            });
        }
        Ok(state)
    }

    pub fn default_filename() -> &'static str {
        "msviz-state.json"
    }

    /// `<config dir>/msviz/msviz-state.json`, falling back to `~/.config`.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn default_path() -> Option<std::path::PathBuf> {
        if let Some(config_dir) = dirs::config_dir() {
            Some(config_dir.join("msviz").join(Self::default_filename()))
        } else {
            dirs::home_dir().map(|home| {
                home.join(".config")
                    .join("msviz")
                    .join(Self::default_filename())
            })
        }
    }

    /// Load from the default path. Missing or unreadable files give `None`.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn load_from_default_path() -> Option<Self> {
        let path = Self::default_path()?;
        if !path.exists() {
            log::debug!("No saved state at {:?}", path);
            return None;
        }

        match std::fs::read_to_string(&path) {
            Ok(json) => match Self::from_json(&json) {
                Ok(state) => {
                    log::info!("Loaded viewer state from {:?}", path);
                    Some(state)
                }
                Err(e) => {
                    log::warn!("Failed to parse viewer state {:?}: {}", path, e);
                    None
                }
            },
            Err(e) => {
                log::warn!("Failed to read viewer state {:?}: {}", path, e);
                None
            }
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub fn save_to_default_path(&self) -> Result<(), ConfigError> {
        let path = Self::default_path().ok_or_else(|| {
            ConfigError::IoError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Could not determine config directory",
            ))
        })?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(&path, self.to_json()?)?;
        log::info!("Saved viewer state to {:?}", path);
        Ok(())
    }

    #[cfg(target_arch = "wasm32")]
    const LOCALSTORAGE_KEY: &'static str = "msviz-state";

    #[cfg(target_arch = "wasm32")]
    pub fn load_from_local_storage() -> Option<Self> {
        let window = web_sys::window()?;
        let storage = window.local_storage().ok()??;

        match storage.get_item(Self::LOCALSTORAGE_KEY) {
            Ok(Some(json)) => match Self::from_json(&json) {
                Ok(state) => {
                    log::info!("Loaded viewer state from localStorage");
                    Some(state)
                }
                Err(e) => {
                    log::warn!("Failed to parse viewer state from localStorage: {}", e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                log::warn!("Failed to read from localStorage: {:?}", e);
                None
            }
        }
    }

    #[cfg(target_arch = "wasm32")]
    pub fn save_to_local_storage(&self) -> Result<(), ConfigError> {
        let window = web_sys::window()
            .ok_or_else(|| ConfigError::StorageError("No window object available".to_string()))?;
        let storage = window
            .local_storage()
            .map_err(|e| ConfigError::StorageError(format!("localStorage access error: {:?}", e)))?
            .ok_or_else(|| ConfigError::StorageError("localStorage not available".to_string()))?;

        storage
            .set_item(Self::LOCALSTORAGE_KEY, &self.to_json()?)
            .map_err(|e| {
                ConfigError::StorageError(format!("Failed to save to localStorage: {:?}", e))
            })?;
        log::info!("Saved viewer state to localStorage");
        Ok(())
    }
}

/// Errors that can occur when loading or saving persisted state.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to parse viewer state: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error(
        "Viewer state version {file_version} is newer than supported version {supported_version}"
    )]
    VersionTooNew {
        file_version: u32,
        supported_version: u32,
    },

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// localStorage in the browser
    #[error("Storage error: {0}")]
    StorageError(String),
}
