// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use rook_platform::WindowSpec;
use rook_render::RenderSettings;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const DEFAULT_CONFIG: &str = "rook.toml";

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct WindowCfg {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub resizable: bool,
}

impl Default for WindowCfg {
    fn default() -> Self {
        WindowCfg {
            title: "rook".to_string(),
            width: 800,
            height: 600,
            resizable: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RenderCfg {
    pub frames_in_flight: usize,
    pub clear_color: [f32; 4],
    pub validation: bool,
    pub shader_dir: Option<PathBuf>,
}

impl Default for RenderCfg {
    fn default() -> Self {
        RenderCfg {
            frames_in_flight: 2,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            validation: true,
            shader_dir: None,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
#[serde(default)]
pub struct AppCfg {
    pub window: WindowCfg,
    pub render: RenderCfg,
}

impl AppCfg {
    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn window_spec(&self) -> WindowSpec {
        WindowSpec {
            title: self.window.title.clone(),
            width: self.window.width,
            height: self.window.height,
            resizable: self.window.resizable,
        }
    }

    /// Command-line overrides win over the file.
    pub fn render_settings(&self, frames_in_flight: Option<usize>, no_validation: bool) -> RenderSettings {
        RenderSettings {
            app_name: self.window.title.clone(),
            frames_in_flight: frames_in_flight
                .unwrap_or(self.render.frames_in_flight)
                .max(1),
            clear_color: self.render.clear_color,
            validation: self.render.validation && !no_validation,
            shader_dir: self.render.shader_dir.clone(),
            ..RenderSettings::default()
        }
    }
}

/// An explicit path must load. The default file is optional and a broken one only warns.
pub fn load_cfg(explicit: Option<&Path>) -> Result<AppCfg> {
    if let Some(path) = explicit {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        return AppCfg::parse(&text).with_context(|| format!("parsing config {}", path.display()));
    }

    match fs::read_to_string(DEFAULT_CONFIG) {
        Ok(text) => AppCfg::parse(&text).or_else(|e| {
            warn!("{DEFAULT_CONFIG}: {e}; using defaults");
            Ok(AppCfg::default())
        }),
        Err(_) => {
            debug!("no {DEFAULT_CONFIG}, using defaults");
            Ok(AppCfg::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        assert_eq!(AppCfg::parse("").unwrap(), AppCfg::default());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = AppCfg::parse(
            r#"
            [window]
            title = "board"
            width = 1024

            [render]
            frames_in_flight = 3
            "#,
        )
        .unwrap();
        assert_eq!(cfg.window.title, "board");
        assert_eq!(cfg.window.width, 1024);
        assert_eq!(cfg.window.height, 600);
        assert!(cfg.window.resizable);
        assert_eq!(cfg.render.frames_in_flight, 3);
        assert_eq!(cfg.render.clear_color, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(cfg.render.shader_dir, None);
    }

    #[test]
    fn full_file() {
        let cfg = AppCfg::parse(
            r#"
            [window]
            title = "rook"
            width = 640
            height = 640
            resizable = false

            [render]
            frames_in_flight = 1
            clear_color = [0.1, 0.2, 0.3, 1.0]
            validation = false
            shader_dir = "assets/shaders"
            "#,
        )
        .unwrap();
        assert!(!cfg.window.resizable);
        assert_eq!(cfg.render.clear_color, [0.1, 0.2, 0.3, 1.0]);
        assert!(!cfg.render.validation);
        assert_eq!(cfg.render.shader_dir, Some(PathBuf::from("assets/shaders")));
    }

    #[test]
    fn wrong_type_is_an_error() {
        assert!(AppCfg::parse("[render]\nframes_in_flight = \"two\"").is_err());
    }

    #[test]
    fn overrides_and_clamping() {
        let mut cfg = AppCfg::default();
        cfg.render.frames_in_flight = 0;

        let s = cfg.render_settings(None, false);
        assert_eq!(s.frames_in_flight, 1);
        assert!(s.validation);
        assert_eq!(s.app_name, "rook");

        let s = cfg.render_settings(Some(4), true);
        assert_eq!(s.frames_in_flight, 4);
        assert!(!s.validation);
        assert_eq!(s.draw.vertex_count, 3);
    }

    #[test]
    fn window_spec_mirrors_section() {
        let spec = AppCfg::default().window_spec();
        assert_eq!((spec.width, spec.height), (800, 600));
        assert_eq!(spec.title, "rook");
    }

    #[test]
    fn explicit_missing_file_is_fatal() {
        let missing = std::env::temp_dir().join("rook-no-such-config.toml");
        assert!(load_cfg(Some(&missing)).is_err());
    }
}
