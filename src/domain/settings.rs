use crate::domain::config::ScanDefaults;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_false")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_true")]
    pub show_file_line: bool,
    #[serde(default = "default_false")]
    pub show_thread_ids: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_false")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_false(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_true(),
            show_thread_ids: default_false(),
            show_target: default_true(),
            ansi_colors: default_false(),
            rotation: default_rotation(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "ble_scan_bridge".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

/// Front-end control pins of a board with an external PA/LNA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaLnaPins {
    /// Input with pull-up; lets a coprocessor force the LNA off.
    pub crx_pin: u8,
    /// Chip select, driven to `csd_active`.
    pub csd_pin: u8,
    pub csd_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardSettings {
    #[serde(default = "default_true")]
    pub coded_phy_supported: bool,
    #[serde(default)]
    pub pa_lna: Option<PaLnaPins>,
}

impl Default for BoardSettings {
    fn default() -> Self {
        Self {
            coded_phy_supported: default_true(),
            pa_lna: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // Logging Settings
    #[serde(default)]
    pub log_settings: LogSettings,

    // Board capabilities
    #[serde(default)]
    pub board: BoardSettings,

    // Scan configuration applied at boot, before the host sends any command
    #[serde(default)]
    pub scan_defaults: ScanDefaults,

    // Deferred-execution queue depth
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    // Simulated radio: how long one scan window lasts before a timeout
    #[serde(default = "default_scan_window_ms")]
    pub scan_window_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_settings: LogSettings::default(),
            board: BoardSettings::default(),
            scan_defaults: ScanDefaults::default(),
            queue_capacity: default_queue_capacity(),
            scan_window_ms: default_scan_window_ms(),
        }
    }
}

fn default_queue_capacity() -> usize {
    32
}
fn default_scan_window_ms() -> u64 {
    1000
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        let settings = Self::load_from_file(&settings_path).unwrap_or_default();

        Ok(Self {
            settings,
            settings_path,
        })
    }

    /// Load from an explicit path, falling back to defaults when it is missing or invalid.
    pub fn from_path(settings_path: PathBuf) -> Self {
        let settings = match Self::load_from_file(&settings_path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::debug!("Using default settings ({}): {}", settings_path.display(), e);
                Settings::default()
            }
        };

        Self {
            settings,
            settings_path,
        }
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("BleScanBridge");
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &PathBuf) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn path(&self) -> &PathBuf {
        &self.settings_path
    }
}
