//! The key/value link between the face and its companion.
//!
//! Delivery is at-least-once and asynchronous: puts resolve once the item is
//! handed to the link, change notifications arrive in batches on a broadcast
//! channel, and connection state is observable through a watch channel.

pub mod loopback;
pub mod ws;

use futures_util::future::BoxFuture;
use tokio::sync::{broadcast, watch};

use crate::error::TransportError;
use crate::protocol::{DataEventBatch, DataMap};

/// Connection state of the link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkStatus {
    Disconnected,
    Connecting,
    Connected,
    Suspended,
    Failed(String),
}

impl LinkStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, LinkStatus::Connected)
    }
}

pub trait DataChannel: Send + Sync {
    /// Publish `data` at `path`.
    fn put_data_item(
        &self,
        path: &str,
        data: DataMap,
    ) -> BoxFuture<'static, Result<(), TransportError>>;

    /// Receive change batches from now on.
    fn subscribe(&self) -> broadcast::Receiver<DataEventBatch>;

    fn link_status(&self) -> watch::Receiver<LinkStatus>;
}

/// Capacity of inbound batch queues; a lagging subscriber skips ahead.
pub const INBOUND_CAPACITY: usize = 64;
