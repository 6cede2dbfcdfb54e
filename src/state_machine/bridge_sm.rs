//! Sync bridge lifecycle.
//!
//! Hierarchy:
//! ```text
//! Disconnected → Connecting → Online (superstate)
//!                                ├── Connected
//!                                └── Listening  [entry: subscribe + request, exit: stop forwarder]
//! ```
//!
//! Link loss from any online state returns to `Disconnected`. The bridge
//! never reconnects on its own; the link reports when it is back.

use std::sync::Arc;

use statig::prelude::*;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::bridge::{publish_weather_request, spawn_forwarder};
use crate::mailbox::Mailbox;
use crate::transport::{DataChannel, LinkStatus};

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum BridgeEvent {
    /// The link started connecting.
    Connecting,
    /// The link is up.
    Connected,
    /// Start listening for weather and ask for a fresh reading.
    Listen,
    Suspended,
    Failed(String),
    /// The engine is being destroyed.
    Shutdown,
}

/// Coarse bridge state for logging and the simulator overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgePhase {
    Disconnected,
    Connecting,
    Connected,
    Listening,
}

// ---------------------------------------------------------------------------
// Shared storage
// ---------------------------------------------------------------------------

/// Resources shared by all bridge states. `forwarder` is `Some` only while
/// listening.
pub struct BridgeLink {
    channel: Arc<dyn DataChannel>,
    runtime: Handle,
    mailbox: Arc<dyn Mailbox>,
    forwarder: Option<JoinHandle<()>>,
    pub requests_sent: u64,
    /// Diagnostics only; replies are never matched against it.
    pub last_request_id: Option<Uuid>,
}

impl BridgeLink {
    pub fn new(channel: Arc<dyn DataChannel>, runtime: Handle, mailbox: Arc<dyn Mailbox>) -> Self {
        Self {
            channel,
            runtime,
            mailbox,
            forwarder: None,
            requests_sent: 0,
            last_request_id: None,
        }
    }

    pub fn phase(state: &State) -> BridgePhase {
        match state {
            State::Disconnected {} => BridgePhase::Disconnected,
            State::Connecting {} => BridgePhase::Connecting,
            State::Connected {} => BridgePhase::Connected,
            State::Listening {} => BridgePhase::Listening,
        }
    }
}

// ---------------------------------------------------------------------------
// State machine implementation
// ---------------------------------------------------------------------------

#[state_machine(
    initial = "State::disconnected()",
    state(derive(Debug, Clone, PartialEq))
)]
impl BridgeLink {
    #[superstate]
    fn online(&mut self, event: &BridgeEvent) -> Outcome<State> {
        match event {
            BridgeEvent::Suspended => {
                info!(target: "bridge", "link suspended");
                Transition(State::disconnected())
            }
            BridgeEvent::Failed(reason) => {
                warn!(target: "bridge", %reason, "link failed");
                Transition(State::disconnected())
            }
            BridgeEvent::Connecting => Transition(State::connecting()),
            BridgeEvent::Shutdown => Transition(State::disconnected()),
            BridgeEvent::Connected | BridgeEvent::Listen => Handled,
        }
    }

    #[state]
    fn disconnected(&mut self, event: &BridgeEvent) -> Outcome<State> {
        match event {
            BridgeEvent::Connecting => Transition(State::connecting()),
            BridgeEvent::Connected => Transition(State::connected()),
            _ => Handled,
        }
    }

    #[state]
    fn connecting(&mut self, event: &BridgeEvent) -> Outcome<State> {
        match event {
            BridgeEvent::Connected => Transition(State::connected()),
            BridgeEvent::Suspended | BridgeEvent::Shutdown => Transition(State::disconnected()),
            BridgeEvent::Failed(reason) => {
                warn!(target: "bridge", %reason, "connect failed");
                Transition(State::disconnected())
            }
            BridgeEvent::Connecting | BridgeEvent::Listen => Handled,
        }
    }

    /// Link is up; waiting for the listener to be installed.
    #[state(superstate = "online", entry_action = "enter_connected")]
    fn connected(&mut self, event: &BridgeEvent) -> Outcome<State> {
        match event {
            BridgeEvent::Listen => Transition(State::listening()),
            _ => Super,
        }
    }

    #[state(
        superstate = "online",
        entry_action = "enter_listening",
        exit_action = "exit_listening"
    )]
    fn listening(&mut self, event: &BridgeEvent) -> Outcome<State> {
        match event {
            BridgeEvent::Listen => Handled,
            _ => Super,
        }
    }

    // ------------------------------------------------------------------
    // Entry / exit actions
    // ------------------------------------------------------------------

    #[action]
    fn enter_connected(&mut self) {
        info!(target: "bridge", "link connected");
    }

    /// Subscribe before publishing so a fast reply cannot be missed.
    #[action]
    fn enter_listening(&mut self) {
        self.forwarder = Some(spawn_forwarder(
            &self.runtime,
            &self.channel,
            Arc::clone(&self.mailbox),
        ));
        let request = publish_weather_request(&self.channel, &self.runtime);
        self.requests_sent += 1;
        self.last_request_id = Some(request.uuid);
        info!(target: "bridge", id = %request.uuid, "listening for weather");
    }

    #[action]
    fn exit_listening(&mut self) {
        if let Some(task) = self.forwarder.take() {
            task.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// SyncBridge
// ---------------------------------------------------------------------------

/// The bridge as the engine sees it: feed it link statuses, read its phase.
pub struct SyncBridge {
    machine: StateMachine<BridgeLink>,
}

impl SyncBridge {
    pub fn new(channel: Arc<dyn DataChannel>, runtime: Handle, mailbox: Arc<dyn Mailbox>) -> Self {
        Self {
            machine: BridgeLink::new(channel, runtime, mailbox).state_machine(),
        }
    }

    pub fn on_link_status(&mut self, status: &LinkStatus) {
        let event = match status {
            LinkStatus::Disconnected | LinkStatus::Suspended => BridgeEvent::Suspended,
            LinkStatus::Connecting => BridgeEvent::Connecting,
            LinkStatus::Connected => BridgeEvent::Connected,
            LinkStatus::Failed(reason) => BridgeEvent::Failed(reason.clone()),
        };
        self.machine.handle(&event);
        if self.phase() == BridgePhase::Connected {
            self.machine.handle(&BridgeEvent::Listen);
        }
    }

    pub fn phase(&self) -> BridgePhase {
        BridgeLink::phase(self.machine.state())
    }

    pub fn requests_sent(&self) -> u64 {
        self.machine.requests_sent
    }

    pub fn last_request_id(&self) -> Option<Uuid> {
        self.machine.last_request_id
    }

    pub fn shutdown(&mut self) {
        self.machine.handle(&BridgeEvent::Shutdown);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineMessage;
    use crate::protocol::{DataEvent, UUID_KEY, WEATHER_PATH};
    use crate::transport::loopback::{LoopbackEndpoint, loopback_pair};
    use crate::weather::WeatherUpdate;
    use tokio::sync::mpsc;

    fn bridge() -> (
        SyncBridge,
        LoopbackEndpoint,
        LoopbackEndpoint,
        mpsc::UnboundedReceiver<EngineMessage>,
    ) {
        let (face, companion) = loopback_pair();
        let (tx, rx) = mpsc::unbounded_channel();
        let bridge = SyncBridge::new(Arc::new(face.clone()), Handle::current(), Arc::new(tx));
        (bridge, face, companion, rx)
    }

    #[tokio::test]
    async fn connect_installs_listener_then_publishes_one_request() {
        let (mut bridge, face, companion, mut rx) = bridge();
        let mut companion_rx = companion.subscribe();
        assert_eq!(bridge.phase(), BridgePhase::Disconnected);

        face.connect();
        bridge.on_link_status(&LinkStatus::Connecting);
        assert_eq!(bridge.phase(), BridgePhase::Connecting);
        bridge.on_link_status(&LinkStatus::Connected);
        assert_eq!(bridge.phase(), BridgePhase::Listening);
        assert_eq!(bridge.requests_sent(), 1);

        let batch = companion_rx.recv().await.expect("request");
        let id = bridge.last_request_id().expect("id").to_string();
        assert_eq!(batch[0].data.get_string(UUID_KEY), Some(id.as_str()));

        let update = WeatherUpdate {
            high: 75,
            low: 58,
            condition_code: 802,
        };
        companion
            .send_events(vec![DataEvent::changed(WEATHER_PATH, update.to_data_map())])
            .expect("reply");
        match rx.recv().await {
            Some(EngineMessage::DataChanged(events)) => assert_eq!(events.len(), 1),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn link_loss_returns_to_disconnected_and_reconnect_requests_again() {
        let (mut bridge, face, _companion, _rx) = bridge();
        face.connect();
        bridge.on_link_status(&LinkStatus::Connected);
        let first = bridge.last_request_id();

        bridge.on_link_status(&LinkStatus::Failed("out of range".into()));
        assert_eq!(bridge.phase(), BridgePhase::Disconnected);
        bridge.on_link_status(&LinkStatus::Suspended);
        assert_eq!(bridge.phase(), BridgePhase::Disconnected);

        bridge.on_link_status(&LinkStatus::Connected);
        assert_eq!(bridge.phase(), BridgePhase::Listening);
        assert_eq!(bridge.requests_sent(), 2);
        assert_ne!(bridge.last_request_id(), first);
    }

    #[tokio::test]
    async fn failed_publish_still_reaches_listening() {
        // Link reported connected to the bridge but the transport refuses.
        let (mut bridge, _face, _companion, _rx) = bridge();
        bridge.on_link_status(&LinkStatus::Connected);
        assert_eq!(bridge.phase(), BridgePhase::Listening);
        assert_eq!(bridge.requests_sent(), 1);
    }

    #[tokio::test]
    async fn shutdown_stops_forwarding() {
        let (mut bridge, face, companion, mut rx) = bridge();
        face.connect();
        bridge.on_link_status(&LinkStatus::Connected);
        bridge.shutdown();
        assert_eq!(bridge.phase(), BridgePhase::Disconnected);

        tokio::task::yield_now().await;
        let _ = companion.send_events(vec![DataEvent::deleted(WEATHER_PATH)]);
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
    }
}
