use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;

use crate::*;

const CONFIG_FILE_NAME: &str = "config.json";

/// Geometry used when laying out parsed chains and palette drops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Horizontal gap between consecutive steps.
    pub step_gap: f32,
    /// Vertical distance between members of a group.
    pub row_height: f32,
    pub group_padding_x: f32,
    pub group_padding_y: f32,
    pub node_padding_x: f32,
    pub min_node_width: f32,
    pub node_height: f32,
    pub min_group_width: f32,
    /// Size of a group dropped from the palette.
    pub palette_group_width: f32,
    pub palette_group_height: f32,
    /// Average rendered glyph width used for text metrics.
    pub char_width: f32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            step_gap: 70.0,
            row_height: 80.0,
            group_padding_x: 32.0,
            group_padding_y: 16.0,
            node_padding_x: 26.0,
            min_node_width: 65.0,
            node_height: 65.0,
            min_group_width: 150.0,
            palette_group_width: 153.0,
            palette_group_height: 150.0,
            char_width: 7.34,
        }
    }
}

impl LayoutConfig {
    /// Rendered width of `text` in whole pixels.
    pub fn text_width(&self, text: &str) -> f32 {
        (text.chars().count() as f32 * self.char_width).ceil()
    }
}

/// Timings of an editing session, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Quiet period before a graph change is serialized.
    pub debounce_ms: u64,
    /// Initialization time after which a loader may be shown.
    pub loader_delay_ms: u64,
    /// How long the session stays in the formatting state.
    pub format_cooldown_ms: u64,
    pub connect_notice_ms: u64,
    pub format_notice_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            loader_delay_ms: 200,
            format_cooldown_ms: 300,
            connect_notice_ms: 1500,
            format_notice_ms: 3000,
        }
    }
}

impl SessionConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn loader_delay(&self) -> Duration {
        Duration::from_millis(self.loader_delay_ms)
    }

    pub fn format_cooldown(&self) -> Duration {
        Duration::from_millis(self.format_cooldown_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    pub layout: LayoutConfig,
    pub session: SessionConfig,
}

impl EditorConfig {
    /// Reads `path`, or the per-user config file when no path is given, then
    /// applies `DAGEDIT_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(path) if path.is_file() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read '{}'", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse config '{}'", path.display()))
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let millis = |key: &str, current: u64| {
            lookup(key)
                .and_then(|value| value.trim().parse().ok())
                .unwrap_or(current)
        };

        self.session.debounce_ms = millis("DAGEDIT_DEBOUNCE_MS", self.session.debounce_ms);
        self.session.loader_delay_ms =
            millis("DAGEDIT_LOADER_DELAY_MS", self.session.loader_delay_ms);
        self.session.format_cooldown_ms =
            millis("DAGEDIT_FORMAT_COOLDOWN_MS", self.session.format_cooldown_ms);

        if let Some(width) = lookup("DAGEDIT_CHAR_WIDTH").and_then(|v| v.trim().parse().ok()) {
            self.layout.char_width = width;
        }
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("dev", "dagedit", "dagedit")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn text_width_rounds_up() {
        let layout = LayoutConfig::default();
        assert_eq!(layout.text_width(""), 0.0);
        assert_eq!(layout.text_width("1"), 8.0);
        assert_eq!(layout.text_width("abcdefghij"), 74.0);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(&path, r#"{"session": {"debounce_ms": 50}}"#).unwrap();

        let config = EditorConfig::from_file(&path).unwrap();
        assert_eq!(config.session.debounce_ms, 50);
        assert_eq!(config.session.loader_delay_ms, 200);
        assert_eq!(config.layout, LayoutConfig::default());
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = EditorConfig::default();
        config.apply_env(|key| match key {
            "DAGEDIT_DEBOUNCE_MS" => Some("120".to_string()),
            "DAGEDIT_LOADER_DELAY_MS" => Some("not a number".to_string()),
            "DAGEDIT_CHAR_WIDTH" => Some("8".to_string()),
            _ => None,
        });

        assert_eq!(config.session.debounce_ms, 120);
        assert_eq!(config.session.loader_delay_ms, 200);
        assert_eq!(config.layout.char_width, 8.0);
    }

    #[test]
    fn missing_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        assert!(EditorConfig::from_file(&temp_dir.path().join("absent.json")).is_err());
    }
}
