//! Face side of the companion link.
//!
//! Inbound: filter change batches down to weather updates. Outbound: publish
//! a fresh weather request. Link state is watched by a monitor task that
//! forwards every status to the engine; the lifecycle itself lives in
//! `state_machine::bridge_sm`.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::engine::EngineMessage;
use crate::error::DecodeError;
use crate::mailbox::Mailbox;
use crate::protocol::{DataEvent, WEATHER_PATH};
use crate::transport::DataChannel;
use crate::weather::{WeatherRequest, WeatherUpdate};

/// Decode every changed `/weather` item in `events`, in order. Deletions are
/// skipped silently and other paths are logged and skipped.
pub fn weather_updates(events: &[DataEvent]) -> Vec<Result<WeatherUpdate, DecodeError>> {
    events
        .iter()
        .filter(|event| event.is_changed())
        .filter(|event| {
            let ours = event.path == WEATHER_PATH;
            if !ours {
                debug!(target: "bridge", path = %event.path, "ignoring data item");
            }
            ours
        })
        .map(|event| WeatherUpdate::decode(&event.data))
        .collect()
}

/// Publish one request with a fresh id. The put runs on `runtime`; its
/// outcome is only logged.
pub fn publish_weather_request(channel: &Arc<dyn DataChannel>, runtime: &Handle) -> WeatherRequest {
    let request = WeatherRequest::fresh();
    let put = channel.put_data_item(WEATHER_PATH, request.to_data_map());
    let id = request.uuid;
    runtime.spawn(async move {
        match put.await {
            Ok(()) => info!(target: "bridge", %id, "weather request sent"),
            Err(e) => warn!(target: "bridge", %id, "weather request not sent: {e}"),
        }
    });
    request
}

/// Forward the link status to the engine: the current value first, then
/// every change.
pub fn spawn_link_monitor(
    runtime: &Handle,
    channel: &Arc<dyn DataChannel>,
    mailbox: Arc<dyn Mailbox>,
) -> JoinHandle<()> {
    let mut status = channel.link_status();
    runtime.spawn(async move {
        loop {
            let current = status.borrow_and_update().clone();
            if !mailbox.post(EngineMessage::Connection(current)) {
                break;
            }
            if status.changed().await.is_err() {
                break;
            }
        }
    })
}

/// Spawn the task that hands inbound batches to the engine.
pub fn spawn_forwarder(
    runtime: &Handle,
    channel: &Arc<dyn DataChannel>,
    mailbox: Arc<dyn Mailbox>,
) -> JoinHandle<()> {
    use tokio::sync::broadcast::error::RecvError;

    let mut inbound = channel.subscribe();
    runtime.spawn(async move {
        loop {
            match inbound.recv().await {
                Ok(batch) => {
                    if !mailbox.post(EngineMessage::DataChanged(batch)) {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(target: "bridge", skipped, "inbound batches dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::DataMap;
    use crate::transport::LinkStatus;
    use crate::transport::loopback::loopback_pair;
    use tokio::sync::mpsc;

    fn update(high: i32) -> WeatherUpdate {
        WeatherUpdate {
            high,
            low: 40,
            condition_code: 500,
        }
    }

    #[test]
    fn only_changed_weather_items_are_decoded() {
        let events = vec![
            DataEvent::deleted(WEATHER_PATH),
            DataEvent::changed("/other", update(1).to_data_map()),
            DataEvent::changed(WEATHER_PATH, update(70).to_data_map()),
            DataEvent::changed(WEATHER_PATH, DataMap::new()),
            DataEvent::changed(WEATHER_PATH, update(72).to_data_map()),
        ];
        let decoded = weather_updates(&events);
        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded[0], Ok(update(70)));
        assert!(decoded[1].is_err());
        assert_eq!(decoded[2], Ok(update(72)));
    }

    #[tokio::test]
    async fn monitor_reports_initial_and_changed_status() {
        let (face, _companion) = loopback_pair();
        let channel: Arc<dyn DataChannel> = Arc::new(face.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _monitor = spawn_link_monitor(&Handle::current(), &channel, Arc::new(tx));

        match rx.recv().await {
            Some(EngineMessage::Connection(status)) => assert_eq!(status, LinkStatus::Disconnected),
            other => panic!("unexpected {other:?}"),
        }
        face.connect();
        match rx.recv().await {
            Some(EngineMessage::Connection(status)) => assert_eq!(status, LinkStatus::Connected),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn published_request_reaches_companion() {
        let (face, companion) = loopback_pair();
        face.connect();
        let mut companion_rx = companion.subscribe();
        let channel: Arc<dyn DataChannel> = Arc::new(face);

        let request = publish_weather_request(&channel, &Handle::current());
        let batch = companion_rx.recv().await.expect("request delivered");
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].path, WEATHER_PATH);
        assert_eq!(
            batch[0].data.get_string(crate::protocol::UUID_KEY),
            Some(request.uuid.to_string().as_str())
        );
    }
}
