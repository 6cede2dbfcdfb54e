//! Time sources.
//!
//! [`Clock`] supplies epoch milliseconds for tick alignment; [`WallClock`]
//! turns them into local time in the current IANA zone.

use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, NaiveDateTime, Utc};
use chrono_tz::Tz;
use tracing::warn;

pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    pub fn new(millis: i64) -> Self {
        Self {
            millis: AtomicI64::new(millis),
        }
    }

    pub fn set(&self, millis: i64) {
        self.millis.store(millis, Ordering::SeqCst);
    }

    pub fn advance(&self, millis: i64) {
        self.millis.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.millis.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// WallClock
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WallClock {
    tz: Tz,
}

impl Default for WallClock {
    fn default() -> Self {
        Self { tz: Tz::UTC }
    }
}

impl WallClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    /// Start in the host's zone, or UTC when it cannot be determined.
    pub fn from_system() -> Self {
        let mut clock = Self::default();
        if let Some(id) = system_timezone_id() {
            clock.set_zone_id(&id);
        }
        clock
    }

    pub fn zone(&self) -> Tz {
        self.tz
    }

    /// Switch zones. Unknown ids leave the current zone in place.
    pub fn set_zone_id(&mut self, id: &str) -> bool {
        match id.parse::<Tz>() {
            Ok(tz) => {
                self.tz = tz;
                true
            }
            Err(e) => {
                warn!(target: "timezone", zone = id, "unknown timezone: {e}");
                false
            }
        }
    }

    pub fn local_time(&self, millis: i64) -> NaiveDateTime {
        DateTime::from_timestamp_millis(millis)
            .unwrap_or_default()
            .with_timezone(&self.tz)
            .naive_local()
    }
}

// ---------------------------------------------------------------------------
// System zone detection
// ---------------------------------------------------------------------------

const LOCALTIME: &str = "/etc/localtime";
const TIMEZONE_FILE: &str = "/etc/timezone";

/// The host's IANA zone id: `$TZ`, then the `/etc/localtime` symlink target,
/// then `/etc/timezone`.
pub fn system_timezone_id() -> Option<String> {
    if let Ok(tz) = std::env::var("TZ") {
        let tz = tz.trim_start_matches(':').trim();
        if !tz.is_empty() {
            return Some(tz.to_string());
        }
    }
    if let Some(id) = zone_from_link(Path::new(LOCALTIME)) {
        return Some(id);
    }
    std::fs::read_to_string(TIMEZONE_FILE)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn zone_from_link(path: &Path) -> Option<String> {
    let target = std::fs::read_link(path).ok()?;
    zone_from_zoneinfo_path(&target.to_string_lossy())
}

/// `/usr/share/zoneinfo/Europe/Paris` → `Europe/Paris`.
pub fn zone_from_zoneinfo_path(path: &str) -> Option<String> {
    let (_, id) = path.split_once("zoneinfo/")?;
    (!id.is_empty()).then(|| id.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
