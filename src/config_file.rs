//! Locating and loading `face.toml`.
//!
//! The file lives in `~/.config/weather-face/` (or `$XDG_CONFIG_HOME`). A
//! missing file means compiled defaults; a broken file is reported and also
//! falls back to defaults, so the face always has a layout.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::FaceConfig;
use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// `$XDG_CONFIG_HOME/weather-face`, else `$HOME/.config/weather-face`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        let mut p = PathBuf::from(xdg);
        p.push("weather-face");
        return p;
    }
    let mut p = home_dir();
    p.push(".config");
    p.push("weather-face");
    p
}

pub fn face_toml_path() -> PathBuf {
    config_dir().join("face.toml")
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ---------------------------------------------------------------------------
// File I/O
// ---------------------------------------------------------------------------

/// Write `default_content` to `path` unless the file already exists. Returns
/// whether a file was written.
pub fn ensure_default_toml(path: &Path, default_content: &str) -> Result<bool, ConfigError> {
    if path.exists() {
        return Ok(false);
    }
    let io_err = |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    std::fs::write(path, default_content).map_err(io_err)?;
    info!(target: "face", path = %path.display(), "wrote default face config");
    Ok(true)
}

pub fn load_config(path: &Path) -> Result<FaceConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(FaceConfig::from_toml(&content)?)
}

/// Load `path`, falling back to defaults when it is missing or invalid.
pub fn load_or_default(path: &Path) -> FaceConfig {
    if !path.exists() {
        return FaceConfig::default();
    }
    match load_config(path) {
        Ok(config) => {
            info!(target: "face", path = %path.display(), "loaded face config");
            config
        }
        Err(e) => {
            warn!(target: "face", "{e}; using default layout");
            FaceConfig::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Default TOML template
// ---------------------------------------------------------------------------

const HEADER: &str = "\
# weather-face layout and colours.
# Any missing value uses the compiled default; delete a line to reset it.
# [round] applies to round screens, [rectangular] to everything else.
# Offsets are baselines in pixels from the top; colours are 0.0-1.0.

";

/// The compiled defaults as an editable TOML file.
pub fn default_toml_content() -> String {
    format!("{HEADER}{}", FaceConfig::default().to_toml())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_path_ends_with_face_toml() {
        let path = face_toml_path();
        let path_str = path.to_string_lossy();
        assert!(
            path_str.ends_with("weather-face/face.toml"),
            "got: {path_str}"
        );
    }

    #[test]
    fn default_content_parses_to_defaults() {
        let parsed = FaceConfig::from_toml(&default_toml_content()).expect("default parses");
        assert_eq!(parsed, FaceConfig::default());
        let table: toml::Table = toml::from_str(&default_toml_content()).expect("table");
        for section in ["round", "rectangular", "colors"] {
            assert!(table.contains_key(section), "missing [{section}]");
        }
    }

    #[test]
    fn ensure_default_creates_then_preserves() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("face.toml");

        assert!(ensure_default_toml(&path, "[round]\nicon_size = 60\n").expect("write"));
        assert!(!ensure_default_toml(&path, "# other\n").expect("exists"));
        let content = std::fs::read_to_string(&path).expect("read");
        assert!(content.contains("icon_size = 60"));
        assert_eq!(load_config(&path).expect("load").round.icon_size, 60);
    }

    #[test]
    fn missing_file_is_an_io_error_and_defaults_are_used() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("absent.toml");
        assert!(matches!(load_config(&path), Err(ConfigError::Io { .. })));
        assert_eq!(load_or_default(&path), FaceConfig::default());
    }

    #[test]
    fn broken_file_is_a_parse_error_and_defaults_are_used() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("face.toml");
        std::fs::write(&path, "[round\nicon_size = ").expect("write");
        assert!(matches!(load_config(&path), Err(ConfigError::Parse(_))));
        assert_eq!(load_or_default(&path), FaceConfig::default());
    }
}
