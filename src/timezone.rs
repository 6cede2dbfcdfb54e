//! Timezone-change subscription.
//!
//! While visible the engine holds a registration; a change of the host zone
//! is posted as `HostEvent::TimezoneChanged`. Registering twice or
//! unregistering while not registered are both no-ops.

use std::ffi::OsStr;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{info, warn};

use crate::clock::system_timezone_id;
use crate::engine::{EngineMessage, HostEvent};
use crate::mailbox::Mailbox;

pub trait TimezoneSubscription: Send {
    fn register(&mut self);
    fn unregister(&mut self);
    fn is_registered(&self) -> bool;
    /// The host's zone id right now.
    fn current_zone(&self) -> Option<String>;
}

// ---------------------------------------------------------------------------
// TimezoneWatcher
// ---------------------------------------------------------------------------

const ZONE_DIR: &str = "/etc";
const ZONE_FILES: [&str; 2] = ["localtime", "timezone"];

/// Watches `/etc/localtime` and `/etc/timezone` through their parent
/// directory, since both are replaced rather than edited in place.
pub struct TimezoneWatcher {
    mailbox: Arc<dyn Mailbox>,
    watcher: Option<RecommendedWatcher>,
}

impl TimezoneWatcher {
    pub fn new(mailbox: Arc<dyn Mailbox>) -> Self {
        Self {
            mailbox,
            watcher: None,
        }
    }

    fn spawn(&self) -> notify::Result<RecommendedWatcher> {
        let mailbox = Arc::clone(&self.mailbox);
        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    if !matches!(
                        event.kind,
                        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                    ) {
                        return;
                    }
                    let affects_zone = event.paths.iter().any(|p| {
                        p.file_name()
                            .and_then(OsStr::to_str)
                            .is_some_and(|name| ZONE_FILES.contains(&name))
                    });
                    if !affects_zone {
                        return;
                    }
                    if let Some(id) = system_timezone_id() {
                        info!(target: "timezone", zone = %id, "host timezone changed");
                        mailbox.post(EngineMessage::Host(HostEvent::TimezoneChanged(id)));
                    }
                }
                Err(e) => warn!(target: "timezone", "watch error: {e}"),
            }
        })?;
        watcher.watch(Path::new(ZONE_DIR), RecursiveMode::NonRecursive)?;
        Ok(watcher)
    }
}

impl TimezoneSubscription for TimezoneWatcher {
    fn register(&mut self) {
        if self.watcher.is_some() {
            return;
        }
        match self.spawn() {
            Ok(w) => self.watcher = Some(w),
            Err(e) => warn!(target: "timezone", "cannot watch {ZONE_DIR}: {e}"),
        }
    }

    fn unregister(&mut self) {
        self.watcher = None;
    }

    fn is_registered(&self) -> bool {
        self.watcher.is_some()
    }

    fn current_zone(&self) -> Option<String> {
        system_timezone_id()
    }
}

// ---------------------------------------------------------------------------
// FixedTimezone
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct FixedState {
    zone: Option<String>,
    registered: bool,
    registrations: usize,
    unregistrations: usize,
}

/// Subscription with a settable zone and no watcher. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct FixedTimezone {
    inner: Arc<Mutex<FixedState>>,
}

impl FixedTimezone {
    pub fn new(zone: &str) -> Self {
        let tz = Self::default();
        tz.set_zone(zone);
        tz
    }

    pub fn set_zone(&self, zone: &str) {
        self.state().zone = Some(zone.to_string());
    }

    /// Number of effective register calls.
    pub fn registrations(&self) -> usize {
        self.state().registrations
    }

    pub fn unregistrations(&self) -> usize {
        self.state().unregistrations
    }

    fn state(&self) -> MutexGuard<'_, FixedState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TimezoneSubscription for FixedTimezone {
    fn register(&mut self) {
        let mut s = self.state();
        if !s.registered {
            s.registered = true;
            s.registrations += 1;
        }
    }

    fn unregister(&mut self) {
        let mut s = self.state();
        if s.registered {
            s.registered = false;
            s.unregistrations += 1;
        }
    }

    fn is_registered(&self) -> bool {
        self.state().registered
    }

    fn current_zone(&self) -> Option<String> {
        self.state().zone.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_is_idempotent() {
        let mut tz = FixedTimezone::new("Europe/Paris");
        tz.register();
        tz.register();
        assert!(tz.is_registered());
        assert_eq!(tz.registrations(), 1);

        tz.unregister();
        tz.unregister();
        assert!(!tz.is_registered());
        assert_eq!(tz.unregistrations(), 1);
    }

    #[test]
    fn unregister_without_register_is_a_no_op() {
        let mut tz = FixedTimezone::default();
        tz.unregister();
        assert_eq!(tz.unregistrations(), 0);
        assert_eq!(tz.current_zone(), None);
    }
}
