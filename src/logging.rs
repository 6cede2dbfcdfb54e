//! Logging initialisation for weather-face.
//!
//! With `WEATHER_FACE_LOG=1`, structured logs are also written to
//! `weather-face/weather-face.log` in the OS data directory. stderr output is
//! always on and filtered by `RUST_LOG`. Without `RUST_LOG`, link and sync
//! events (`bridge`, `transport`, `companion`, `timezone`) log at `info` while
//! the per-second `scheduler` target stays at `warn`.
//!
//! Keep the returned guard alive for the whole process so buffered lines are
//! flushed on exit.

use std::path::PathBuf;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub struct LogGuard {
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

pub const LOG_ENV: &str = "WEATHER_FACE_LOG";
pub const LOG_FILE: &str = "weather-face.log";

/// Install the global subscriber. Call once from `main`.
pub fn init() -> LogGuard {
    let file_guard = if std::env::var(LOG_ENV).as_deref() == Ok("1") {
        let dir = log_dir().unwrap_or_else(|| PathBuf::from("/tmp"));
        let _ = std::fs::create_dir_all(&dir);
        let file_appender = tracing_appender::rolling::never(&dir, LOG_FILE);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

        tracing_subscriber::registry()
            .with(default_filter("info"))
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(file_layer)
            .init();

        tracing::info!(target: "face", dir = %dir.display(), "file logging enabled");
        Some(guard)
    } else {
        tracing_subscriber::registry()
            .with(default_filter("warn"))
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();

        None
    };

    LogGuard {
        _file_guard: file_guard,
    }
}

/// Per-target levels applied on top of the base level.
const TARGET_LEVELS: &[(&str, &str)] = &[
    ("bridge", "info"),
    ("transport", "info"),
    ("companion", "info"),
    ("timezone", "info"),
    ("scheduler", "warn"),
];

/// `EnvFilter` directives for `level` plus the face's per-target levels.
pub fn default_directives(level: &str) -> String {
    TARGET_LEVELS
        .iter()
        .fold(level.to_string(), |mut acc, (target, target_level)| {
            acc.push_str(&format!(",{target}={target_level}"));
            acc
        })
}

fn default_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)))
}

/// `$XDG_DATA_HOME/weather-face`, else the platform's per-user log location.
pub fn log_dir() -> Option<PathBuf> {
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        let mut p = PathBuf::from(xdg);
        p.push("weather-face");
        return Some(p);
    }
    let home = std::env::var("HOME").ok()?;
    let mut p = PathBuf::from(home);
    #[cfg(target_os = "macos")]
    {
        p.push("Library");
        p.push("Logs");
    }
    #[cfg(not(target_os = "macos"))]
    {
        p.push(".local");
        p.push("share");
    }
    p.push("weather-face");
    Some(p)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_start_with_the_base_level() {
        let directives = default_directives("warn");
        assert!(directives.starts_with("warn,"));
        for target in ["bridge=info", "transport=info", "scheduler=warn"] {
            assert!(directives.split(',').any(|d| d == target), "{target} missing");
        }
    }

    #[test]
    fn directives_parse_as_a_filter() {
        for level in ["warn", "info", "debug"] {
            let directives = default_directives(level);
            assert!(EnvFilter::try_new(&directives).is_ok(), "{directives}");
        }
    }

    #[test]
    fn log_dir_ends_in_the_app_folder() {
        if let Some(dir) = log_dir() {
            assert_eq!(dir.file_name().and_then(|n| n.to_str()), Some("weather-face"));
        }
    }
}
