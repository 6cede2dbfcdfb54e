//! The face engine: single owner of display state.
//!
//! Every mutation arrives as an [`EngineMessage`] on one thread, whether it
//! comes from the host (visibility, ambient, taps, timezone), the timer, or
//! the companion link. Redraws are coalesced: any number of invalidations
//! between two frames produce a single frame request.
//!
//! After `destroy` the engine is dead and every later message is dropped, so
//! timer ticks and link callbacks that were already in flight are harmless.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::bridge::weather_updates;
use crate::canvas::Canvas;
use crate::clock::{Clock, WallClock};
use crate::config::{FaceConfig, SurfaceShape};
use crate::icons::IconSource;
use crate::protocol::{DataEvent, DataEventBatch};
use crate::render::{Bounds, FaceStyle, draw_face};
use crate::scheduler::RenderScheduler;
use crate::state::{DisplayState, WeatherSnapshot};
use crate::state_machine::bridge_sm::SyncBridge;
use crate::timer::TimerHost;
use crate::timezone::TimezoneSubscription;
use crate::transport::LinkStatus;
use crate::weather::WeatherUpdate;

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapPhase {
    Touch,
    Cancel,
    Tap,
}

/// What the display reported during capability negotiation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisplayCapabilities {
    pub low_bit_ambient: bool,
}

/// Callbacks from the host surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    Visible(bool),
    AmbientChanged(bool),
    Tap(TapPhase),
    TimezoneChanged(String),
    PropertiesNegotiated(DisplayCapabilities),
    ShapeReported(SurfaceShape),
    /// Once-a-minute tick the host delivers in ambient mode.
    TimeTick,
}

#[derive(Debug, Clone)]
pub enum EngineMessage {
    Host(HostEvent),
    Tick { generation: u64 },
    DataChanged(DataEventBatch),
    Connection(LinkStatus),
    Destroy,
}

/// Platform collaborators handed to the engine at construction.
pub struct HostServices {
    pub clock: Arc<dyn Clock>,
    pub timer: Box<dyn TimerHost>,
    pub timezone: Box<dyn TimezoneSubscription>,
    pub icons: Box<dyn IconSource>,
}

// ---------------------------------------------------------------------------
// FaceEngine
// ---------------------------------------------------------------------------

pub struct FaceEngine {
    config: FaceConfig,
    style: FaceStyle,
    state: DisplayState,
    /// Last applied update; icons are re-derived from it when the shape
    /// changes the icon size.
    last_weather: Option<WeatherUpdate>,
    scheduler: RenderScheduler,
    wall: WallClock,
    timezone: Box<dyn TimezoneSubscription>,
    icons: Box<dyn IconSource>,
    bridge: Option<SyncBridge>,
    dirty: bool,
    frame_pending: bool,
    frame_requests: u64,
    alive: bool,
}

impl FaceEngine {
    pub fn new(config: FaceConfig, shape: SurfaceShape, services: HostServices) -> Self {
        let HostServices {
            clock,
            timer,
            timezone,
            icons,
        } = services;

        let mut wall = WallClock::default();
        if let Some(id) = timezone.current_zone() {
            wall.set_zone_id(&id);
        }
        let style = FaceStyle::resolve(&config, shape);

        Self {
            config,
            style,
            state: DisplayState::default(),
            last_weather: None,
            scheduler: RenderScheduler::new(timer, clock),
            wall,
            timezone,
            icons,
            bridge: None,
            dirty: false,
            frame_pending: false,
            frame_requests: 0,
            alive: true,
        }
    }

    pub fn attach_bridge(&mut self, bridge: SyncBridge) {
        self.bridge = Some(bridge);
    }

    /// Apply one queued message.
    pub fn dispatch(&mut self, msg: EngineMessage) {
        if !self.alive {
            trace!(target: "face", ?msg, "engine destroyed; message dropped");
            return;
        }
        match msg {
            EngineMessage::Host(event) => self.handle_host_event(event),
            EngineMessage::Tick { generation } => self.on_tick(generation),
            EngineMessage::DataChanged(batch) => {
                self.on_data_changed(&batch);
            }
            EngineMessage::Connection(status) => self.on_connection(&status),
            EngineMessage::Destroy => self.destroy(),
        }
    }

    pub fn handle_host_event(&mut self, event: HostEvent) {
        if !self.alive {
            return;
        }
        match event {
            HostEvent::Visible(visible) => {
                self.scheduler.set_visible(visible);
                if visible {
                    self.timezone.register();
                    if let Some(id) = self.timezone.current_zone() {
                        self.wall.set_zone_id(&id);
                    }
                    self.mark_dirty();
                } else {
                    self.timezone.unregister();
                }
                self.scheduler.update_timer(self.state.ambient);
            }
            HostEvent::AmbientChanged(ambient) => {
                if ambient == self.state.ambient {
                    return;
                }
                debug!(target: "face", ambient, "ambient mode changed");
                self.state.ambient = ambient;
                self.refresh_paints();
                self.mark_dirty();
                self.scheduler.update_timer(ambient);
            }
            HostEvent::Tap(TapPhase::Tap) => {
                self.state.tap_toggle = !self.state.tap_toggle;
                self.mark_dirty();
            }
            HostEvent::Tap(TapPhase::Touch | TapPhase::Cancel) => {}
            HostEvent::TimezoneChanged(id) => {
                if !self.timezone.is_registered() {
                    debug!(target: "timezone", zone = %id, "not subscribed; ignoring");
                    return;
                }
                if self.wall.set_zone_id(&id) {
                    info!(target: "timezone", zone = %id, "wall clock moved");
                    self.mark_dirty();
                }
            }
            HostEvent::PropertiesNegotiated(caps) => {
                self.state.low_bit_ambient = caps.low_bit_ambient;
                self.refresh_paints();
            }
            HostEvent::ShapeReported(shape) => {
                self.style = FaceStyle::resolve(&self.config, shape);
                self.refresh_paints();
                if let Some(update) = self.last_weather {
                    let snapshot = self.snapshot(&update);
                    self.state.apply_weather(snapshot);
                }
                self.mark_dirty();
            }
            HostEvent::TimeTick => self.mark_dirty(),
        }
    }

    fn on_tick(&mut self, generation: u64) {
        if self.scheduler.on_tick(generation, self.state.ambient) {
            self.mark_dirty();
        }
    }

    /// Apply every decodable `/weather` update in `events`, in order. Returns
    /// how many were applied; one redraw is requested if any were.
    pub fn on_data_changed(&mut self, events: &[DataEvent]) -> usize {
        if !self.alive {
            return 0;
        }
        let mut applied = 0;
        for result in weather_updates(events) {
            match result {
                Ok(update) => {
                    info!(
                        target: "bridge",
                        high = update.high,
                        low = update.low,
                        condition = update.condition_code,
                        "weather update"
                    );
                    let snapshot = self.snapshot(&update);
                    self.state.apply_weather(snapshot);
                    self.last_weather = Some(update);
                    applied += 1;
                }
                Err(e) => warn!(target: "bridge", "discarding weather update: {e}"),
            }
        }
        if applied > 0 {
            self.mark_dirty();
        }
        applied
    }

    pub fn on_connection(&mut self, status: &LinkStatus) {
        if !self.alive {
            return;
        }
        if let Some(bridge) = self.bridge.as_mut() {
            bridge.on_link_status(status);
        }
    }

    /// Draw the current frame and clear the dirty flag.
    pub fn render(&mut self, canvas: &mut dyn Canvas, bounds: Bounds) {
        if !self.alive {
            return;
        }
        let now = self
            .wall
            .local_time(self.scheduler.clock().now_millis());
        draw_face(canvas, bounds, &self.state, &self.style, now);
        self.dirty = false;
    }

    /// Cancel the timer, drop the timezone subscription, stop the bridge.
    pub fn destroy(&mut self) {
        if !self.alive {
            return;
        }
        self.scheduler.shutdown();
        self.timezone.unregister();
        if let Some(bridge) = self.bridge.as_mut() {
            bridge.shutdown();
        }
        self.alive = false;
        info!(target: "face", "engine destroyed");
    }

    /// Consume the pending frame request, if any.
    pub fn take_frame_request(&mut self) -> bool {
        std::mem::take(&mut self.frame_pending)
    }

    /// Total frame requests issued so far.
    pub fn frame_requests(&self) -> u64 {
        self.frame_requests
    }

    pub fn state(&self) -> &DisplayState {
        &self.state
    }

    pub fn style(&self) -> &FaceStyle {
        &self.style
    }

    pub fn wall_clock(&self) -> &WallClock {
        &self.wall
    }

    pub fn scheduler(&self) -> &RenderScheduler {
        &self.scheduler
    }

    pub fn bridge(&self) -> Option<&SyncBridge> {
        self.bridge.as_ref()
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    // Only the clean-to-dirty edge requests a frame.
    fn mark_dirty(&mut self) {
        if !self.dirty {
            self.dirty = true;
            self.frame_pending = true;
            self.frame_requests += 1;
        }
    }

    fn refresh_paints(&mut self) {
        self.style.paints.set_anti_alias(self.state.anti_alias());
    }

    fn snapshot(&self, update: &WeatherUpdate) -> WeatherSnapshot {
        WeatherSnapshot::derive(update, self.icons.as_ref(), self.style.layout.icon_size)
    }
}

// ---------------------------------------------------------------------------
// drive
// ---------------------------------------------------------------------------

/// Run `engine` off `rx` until it is destroyed or every sender is gone.
///
/// Messages are drained in batches; `on_frame` runs at most once per batch,
/// and only if the batch left a frame request behind.
pub async fn drive<F>(
    engine: &mut FaceEngine,
    rx: &mut mpsc::UnboundedReceiver<EngineMessage>,
    mut on_frame: F,
) where
    F: FnMut(&mut FaceEngine),
{
    loop {
        if engine.take_frame_request() && engine.is_alive() {
            on_frame(engine);
        }
        if !engine.is_alive() {
            break;
        }
        let Some(first) = rx.recv().await else {
            break;
        };
        engine.dispatch(first);
        while let Ok(msg) = rx.try_recv() {
            engine.dispatch(msg);
        }
    }
    debug!(target: "face", "engine loop finished");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
