//! In-process link: two endpoints sharing one connection state.
//!
//! A put on one endpoint becomes a `Changed` event on the other endpoint
//! only, never on the sender. The simulator wires the face to the companion
//! through a pair; tests drive the link state directly.

use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::{self, BoxFuture};
use tokio::sync::{broadcast, watch};
use tracing::debug;

use super::{DataChannel, INBOUND_CAPACITY, LinkStatus};
use crate::error::TransportError;
use crate::protocol::{DataEvent, DataEventBatch, DataMap};

#[derive(Clone)]
pub struct LoopbackEndpoint {
    name: &'static str,
    inbox: broadcast::Sender<DataEventBatch>,
    peer: broadcast::Sender<DataEventBatch>,
    link: Arc<watch::Sender<LinkStatus>>,
}

/// Create two connected-to-each-other endpoints. The link starts
/// `Disconnected`.
pub fn loopback_pair() -> (LoopbackEndpoint, LoopbackEndpoint) {
    let (face_tx, _) = broadcast::channel(INBOUND_CAPACITY);
    let (companion_tx, _) = broadcast::channel(INBOUND_CAPACITY);
    let (link, _) = watch::channel(LinkStatus::Disconnected);
    let link = Arc::new(link);
    (
        LoopbackEndpoint {
            name: "face",
            inbox: face_tx.clone(),
            peer: companion_tx.clone(),
            link: Arc::clone(&link),
        },
        LoopbackEndpoint {
            name: "companion",
            inbox: companion_tx,
            peer: face_tx,
            link,
        },
    )
}

impl LoopbackEndpoint {
    pub fn set_status(&self, status: LinkStatus) {
        debug!(target: "transport", endpoint = self.name, ?status, "loopback link");
        self.link.send_replace(status);
    }

    pub fn connect(&self) {
        self.set_status(LinkStatus::Connected);
    }

    pub fn suspend(&self) {
        self.set_status(LinkStatus::Suspended);
    }

    pub fn fail(&self, reason: impl Into<String>) {
        self.set_status(LinkStatus::Failed(reason.into()));
    }

    pub fn status(&self) -> LinkStatus {
        self.link.borrow().clone()
    }

    /// Deliver an arbitrary batch to the peer, bypassing the put path. Used
    /// to replay deletions or foreign paths.
    pub fn send_events(&self, batch: DataEventBatch) -> Result<(), TransportError> {
        if !self.status().is_connected() {
            return Err(TransportError::NotConnected);
        }
        // No subscribers on the other side is not a failure; the item is
        // simply not observed.
        let _ = self.peer.send(batch);
        Ok(())
    }
}

impl DataChannel for LoopbackEndpoint {
    fn put_data_item(
        &self,
        path: &str,
        data: DataMap,
    ) -> BoxFuture<'static, Result<(), TransportError>> {
        let result = self.send_events(vec![DataEvent::changed(path, data)]);
        future::ready(result).boxed()
    }

    fn subscribe(&self) -> broadcast::Receiver<DataEventBatch> {
        self.inbox.subscribe()
    }

    fn link_status(&self) -> watch::Receiver<LinkStatus> {
        self.link.subscribe()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::WEATHER_PATH;

    fn payload() -> DataMap {
        let mut map = DataMap::new();
        map.put_int("high", 70);
        map
    }

    #[tokio::test]
    async fn put_reaches_peer_only() {
        let (face, companion) = loopback_pair();
        face.connect();
        let mut face_rx = face.subscribe();
        let mut companion_rx = companion.subscribe();

        face.put_data_item(WEATHER_PATH, payload())
            .await
            .expect("put");

        let batch = companion_rx.recv().await.expect("delivered");
        assert_eq!(batch, vec![DataEvent::changed(WEATHER_PATH, payload())]);
        assert!(face_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn put_while_disconnected_fails() {
        let (face, companion) = loopback_pair();
        let mut companion_rx = companion.subscribe();
        let err = face
            .put_data_item(WEATHER_PATH, payload())
            .await
            .expect_err("link down");
        assert_eq!(err, TransportError::NotConnected);

        face.connect();
        face.suspend();
        assert!(face.put_data_item(WEATHER_PATH, payload()).await.is_err());
        assert!(companion_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn put_without_subscribers_still_succeeds() {
        let (face, _companion) = loopback_pair();
        face.connect();
        assert!(face.put_data_item(WEATHER_PATH, payload()).await.is_ok());
    }

    #[test]
    fn both_ends_observe_one_link() {
        let (face, companion) = loopback_pair();
        let status = face.link_status();
        companion.fail("radio off");
        assert_eq!(*status.borrow(), LinkStatus::Failed("radio off".into()));
        assert_eq!(face.status(), companion.status());
    }
}
