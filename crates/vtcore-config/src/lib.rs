//! Configuration loading for a host binary wiring up the engine: discovers
//! and parses an optional `vtcore.toml` supplying defaults for
//! [`vtcore_geometry::ViewportConfig`] fields and a `[log] level` string
//! (§10.4). Grounded on the teacher's `core-config::discover`/`apply_context`
//! split: parse failures fall back to built-in defaults rather than
//! aborting, and a context-application step re-derives anything that depends
//! on runtime information the file can't know about ahead of time.

use std::fs;
use std::path::PathBuf;

use anyhow::Result;
use serde::Deserialize;
use tracing::{info, warn};
use vtcore_geometry::{GeometryError, ViewportConfig};

#[derive(Debug, Deserialize, Clone)]
pub struct ViewportSection {
    #[serde(default = "ViewportSection::default_height")]
    pub height: usize,
    #[serde(default)]
    pub top_threshold: usize,
    #[serde(default)]
    pub bottom_threshold: usize,
    #[serde(default = "ViewportSection::default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default)]
    pub initial_index: usize,
    #[serde(default = "ViewportSection::default_bounding")]
    pub bounding_area_before: usize,
    #[serde(default = "ViewportSection::default_bounding")]
    pub bounding_area_after: usize,
}

impl ViewportSection {
    const fn default_height() -> usize {
        20
    }
    const fn default_chunk_size() -> usize {
        100
    }
    const fn default_bounding() -> usize {
        200
    }
}

impl Default for ViewportSection {
    fn default() -> Self {
        Self {
            height: Self::default_height(),
            top_threshold: 0,
            bottom_threshold: 0,
            chunk_size: Self::default_chunk_size(),
            initial_index: 0,
            bounding_area_before: Self::default_bounding(),
            bounding_area_after: Self::default_bounding(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSection {
    #[serde(default = "LogSection::default_level")]
    pub level: String,
}

impl LogSection {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

/// Selection mode recognized by the config file (§6 "Configuration options
/// recognized"). The engine itself is agnostic to this value; it exists so a
/// host binary can read one knob instead of three booleans.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    #[default]
    None,
    Single,
    Multiple,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SelectionSection {
    #[serde(default)]
    pub mode: SelectionMode,
    #[serde(default)]
    pub cascading: bool,
}

impl Default for SelectionSection {
    fn default() -> Self {
        Self {
            mode: SelectionMode::default(),
            cascading: false,
        }
    }
}

/// Raw deserialized shape of `vtcore.toml`. Unknown fields are ignored so the
/// file format can grow without breaking older hosts.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct ConfigFile {
    #[serde(default)]
    pub viewport: ViewportSection,
    #[serde(default)]
    pub log: LogSection,
    #[serde(default)]
    pub selection: SelectionSection,
}

/// Loaded configuration plus the derived, construction-ready
/// [`ViewportConfig`]. `raw` retains the unparsed file contents (when one was
/// found) purely for diagnostics, mirroring the teacher's `Config::raw`.
#[derive(Debug, Clone)]
pub struct Config {
    pub raw: Option<String>,
    pub file: ConfigFile,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            raw: None,
            file: ConfigFile::default(),
        }
    }
}

/// Best-effort config path following local-file-then-XDG-dir search, same
/// shape as the teacher's `discover`.
pub fn discover() -> PathBuf {
    let local = PathBuf::from("vtcore.toml");
    if local.exists() {
        return local;
    }
    if let Some(dir) = dirs::config_dir() {
        return dir.join("vtcore").join("vtcore.toml");
    }
    PathBuf::from("vtcore.toml")
}

/// Loads and parses `path` (or the result of [`discover`] when `None`).
/// A missing file or a parse failure both fall back to [`Config::default`]
/// rather than returning an error: a malformed config must never prevent the
/// engine from starting (§7: nothing in this library's error taxonomy is
/// fatal).
pub fn load_from(path: Option<PathBuf>) -> Result<Config> {
    let path = path.unwrap_or_else(discover);
    let Ok(content) = fs::read_to_string(&path) else {
        return Ok(Config::default());
    };
    match toml::from_str::<ConfigFile>(&content) {
        Ok(file) => Ok(Config {
            raw: Some(content),
            file,
        }),
        Err(err) => {
            warn!(target: "vtcore::config", path = %path.display(), error = %err, "vtcore.toml parse failed, using defaults");
            Ok(Config::default())
        }
    }
}

/// Runtime context a host can supply to re-derive values that the file
/// cannot know ahead of time. Here that's just the terminal's current row
/// count, which bounds `height`; unlike the teacher's scroll-margin clamp
/// this has nothing else to fold in, but the same `apply_context`-shaped
/// hook is kept so a host can re-clamp on resize without re-reading the
/// file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigContext {
    pub terminal_rows: u16,
}

impl ConfigContext {
    pub fn new(terminal_rows: u16) -> Self {
        Self { terminal_rows }
    }
}

impl Config {
    /// Builds the [`ViewportConfig`] this file describes, clamping `height`
    /// against `ctx.terminal_rows` when that's smaller than the configured
    /// value (a host with a short terminal should not build a viewport
    /// taller than the screen it will render into).
    pub fn viewport_config(&self, ctx: ConfigContext) -> Result<ViewportConfig, GeometryError> {
        let section = &self.file.viewport;
        let available_rows = ctx.terminal_rows as usize;
        let height = if available_rows == 0 {
            section.height
        } else {
            section.height.min(available_rows)
        };
        if height != section.height {
            info!(
                target: "vtcore::config",
                configured = section.height,
                clamped = height,
                terminal_rows = ctx.terminal_rows,
                "viewport_height_clamped_to_terminal"
            );
        }
        let top_threshold = section.top_threshold.min(height.saturating_sub(1));
        let bottom_threshold = section.bottom_threshold.min(height.saturating_sub(1));
        ViewportConfig::new(
            height,
            top_threshold,
            bottom_threshold,
            section.chunk_size,
            section.initial_index,
            section.bounding_area_before,
            section.bounding_area_after,
        )
    }

    pub fn log_level(&self) -> &str {
        &self.file.log.level
    }

    pub fn selection_mode(&self) -> SelectionMode {
        self.file.selection.mode
    }

    pub fn cascading_selection(&self) -> bool {
        self.file.selection.cascading
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_when_file_missing() {
        let cfg = load_from(Some(PathBuf::from("__nonexistent_vtcore_cfg__.toml"))).unwrap();
        assert_eq!(cfg.file.viewport.height, 20);
        assert_eq!(cfg.file.viewport.chunk_size, 100);
        assert_eq!(cfg.log_level(), "info");
    }

    #[test]
    fn parses_viewport_section() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            tmp.path(),
            "[viewport]\nheight = 30\nchunk_size = 50\nbounding_area_before = 100\nbounding_area_after = 100\n",
        )
        .unwrap();
        let cfg = load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert_eq!(cfg.file.viewport.height, 30);
        assert_eq!(cfg.file.viewport.chunk_size, 50);
        let viewport = cfg.viewport_config(ConfigContext::new(0)).unwrap();
        assert_eq!(viewport.height, 30);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), "not valid = [[[ toml").unwrap();
        let cfg = load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert_eq!(cfg.file.viewport.height, 20);
    }

    #[test]
    fn viewport_height_clamped_to_short_terminal() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), "[viewport]\nheight = 50\n").unwrap();
        let cfg = load_from(Some(tmp.path().to_path_buf())).unwrap();
        let viewport = cfg.viewport_config(ConfigContext::new(10)).unwrap();
        assert_eq!(viewport.height, 10);
    }

    #[test]
    fn thresholds_parse_and_are_validated_by_geometry() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            tmp.path(),
            "[viewport]\nheight = 5\ntop_threshold = 1\nbottom_threshold = 1\n",
        )
        .unwrap();
        let cfg = load_from(Some(tmp.path().to_path_buf())).unwrap();
        let viewport = cfg.viewport_config(ConfigContext::new(0)).unwrap();
        assert_eq!(viewport.top_threshold, 1);
        assert_eq!(viewport.bottom_threshold, 1);
    }

    #[test]
    fn selection_section_parses() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            tmp.path(),
            "[selection]\nmode = \"multiple\"\ncascading = true\n",
        )
        .unwrap();
        let cfg = load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert_eq!(cfg.selection_mode(), SelectionMode::Multiple);
        assert!(cfg.cascading_selection());
    }
}
