//! WebSocket link to a companion relay.
//!
//! Runs a reconnecting client task on the tokio runtime. Puts are sent as
//! `{"type":"put",...}` frames and acknowledged once written to the socket;
//! `{"type":"data_changed",...}` frames from the relay are broadcast to
//! subscribers. The link status follows the socket.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{self, BoxFuture};
use futures_util::{FutureExt, SinkExt, StreamExt};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use super::{DataChannel, INBOUND_CAPACITY, LinkStatus};
use crate::error::TransportError;
use crate::protocol::{DataEventBatch, DataMap, Frame};

const RECONNECT_DELAY: Duration = Duration::from_secs(3);

struct Outbound {
    json: String,
    ack: oneshot::Sender<Result<(), TransportError>>,
}

pub struct WsChannel {
    url: String,
    outbound: mpsc::UnboundedSender<Outbound>,
    inbound: broadcast::Sender<DataEventBatch>,
    link: Arc<watch::Sender<LinkStatus>>,
    task: JoinHandle<()>,
}

impl WsChannel {
    /// Start the client task for `url` on `runtime`.
    pub fn spawn(runtime: &Handle, url: impl Into<String>) -> Arc<Self> {
        let url = url.into();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (inbound, _) = broadcast::channel(INBOUND_CAPACITY);
        let (link, _) = watch::channel(LinkStatus::Disconnected);
        let link = Arc::new(link);

        let task = runtime.spawn(client_loop(
            url.clone(),
            outbound_rx,
            inbound.clone(),
            Arc::clone(&link),
        ));

        Arc::new(Self {
            url,
            outbound,
            inbound,
            link,
            task,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Drop for WsChannel {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl DataChannel for WsChannel {
    fn put_data_item(
        &self,
        path: &str,
        data: DataMap,
    ) -> BoxFuture<'static, Result<(), TransportError>> {
        if !self.link.borrow().is_connected() {
            return future::ready(Err(TransportError::NotConnected)).boxed();
        }
        let json = Frame::Put {
            path: path.to_string(),
            data,
        }
        .to_json();
        let (ack, ack_rx) = oneshot::channel();
        if self.outbound.send(Outbound { json, ack }).is_err() {
            return future::ready(Err(TransportError::Closed)).boxed();
        }
        async move { ack_rx.await.unwrap_or(Err(TransportError::Closed)) }.boxed()
    }

    fn subscribe(&self) -> broadcast::Receiver<DataEventBatch> {
        self.inbound.subscribe()
    }

    fn link_status(&self) -> watch::Receiver<LinkStatus> {
        self.link.subscribe()
    }
}

// ---------------------------------------------------------------------------
// Client task
// ---------------------------------------------------------------------------

async fn client_loop(
    url: String,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    inbound: broadcast::Sender<DataEventBatch>,
    link: Arc<watch::Sender<LinkStatus>>,
) {
    loop {
        link.send_replace(LinkStatus::Connecting);

        match connect_async(url.as_str()).await {
            Ok((ws_stream, _response)) => {
                link.send_replace(LinkStatus::Connected);
                info!(target: "transport", url = %url, "companion relay connected");

                let (mut write, mut read) = ws_stream.split();

                loop {
                    tokio::select! {
                        msg_result = read.next() => {
                            match msg_result {
                                Some(Ok(Message::Text(text))) => {
                                    handle_text(&inbound, &text);
                                }
                                Some(Ok(Message::Ping(data))) => {
                                    let _ = write.send(Message::Pong(data)).await;
                                }
                                Some(Ok(Message::Close(_))) | None => {
                                    info!(target: "transport", url = %url, "relay closed the connection");
                                    link.send_replace(LinkStatus::Suspended);
                                    break;
                                }
                                Some(Err(e)) => {
                                    error!(target: "transport", url = %url, "WebSocket error: {e}");
                                    link.send_replace(LinkStatus::Failed(e.to_string()));
                                    break;
                                }
                                _ => {}
                            }
                        }

                        Some(out) = outbound_rx.recv() => {
                            let result = write
                                .send(Message::Text(out.json.into()))
                                .await
                                .map_err(|e| TransportError::Send(e.to_string()));
                            let failed = result.is_err();
                            let _ = out.ack.send(result);
                            if failed {
                                error!(target: "transport", url = %url, "outbound send failed");
                                link.send_replace(LinkStatus::Suspended);
                                break;
                            }
                        }
                    }
                }
            }
            Err(e) => {
                warn!(target: "transport", url = %url, "connect failed: {e}; retrying in 3s");
                link.send_replace(LinkStatus::Failed(format!("connect failed: {e}")));
            }
        }

        let rejected = reject_pending(&mut outbound_rx);
        if rejected > 0 {
            debug!(target: "transport", rejected, "puts raced the disconnect");
        }

        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

/// Fail every queued put with `NotConnected`. Returns how many there were.
fn reject_pending(outbound_rx: &mut mpsc::UnboundedReceiver<Outbound>) -> usize {
    let mut rejected = 0;
    while let Ok(out) = outbound_rx.try_recv() {
        let _ = out.ack.send(Err(TransportError::NotConnected));
        rejected += 1;
    }
    rejected
}

fn handle_text(inbound: &broadcast::Sender<DataEventBatch>, text: &str) {
    match serde_json::from_str::<Frame>(text) {
        Ok(Frame::DataChanged { events }) => {
            debug!(target: "transport", count = events.len(), "inbound batch");
            let _ = inbound.send(events);
        }
        Ok(Frame::Put { path, .. }) => {
            debug!(target: "transport", path = %path, "ignoring put frame from relay");
        }
        Err(e) => warn!(target: "transport", "unparseable relay frame: {e}"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
