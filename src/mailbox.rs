//! Posting messages onto the thread that owns the engine.
//!
//! Timer tasks, the bridge forwarder, the link monitor and the timezone
//! watcher never touch engine state; they only post here.

use std::sync::Mutex;

use tokio::sync::mpsc;
use winit::event_loop::EventLoopProxy;

use crate::engine::EngineMessage;

pub trait Mailbox: Send + Sync {
    /// Queue a message. Returns `false` once the receiving side is gone.
    fn post(&self, msg: EngineMessage) -> bool;
}

impl Mailbox for mpsc::UnboundedSender<EngineMessage> {
    fn post(&self, msg: EngineMessage) -> bool {
        self.send(msg).is_ok()
    }
}

/// Mailbox backed by the winit event loop; messages arrive as user events.
pub struct ProxyMailbox {
    proxy: Mutex<EventLoopProxy<EngineMessage>>,
}

impl ProxyMailbox {
    pub fn new(proxy: EventLoopProxy<EngineMessage>) -> Self {
        Self {
            proxy: Mutex::new(proxy),
        }
    }
}

impl Mailbox for ProxyMailbox {
    fn post(&self, msg: EngineMessage) -> bool {
        match self.proxy.lock() {
            Ok(proxy) => proxy.send_event(msg).is_ok(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn posting_after_receiver_drop_reports_failure() {
        let (tx, rx) = mpsc::unbounded_channel();
        assert!(tx.post(EngineMessage::Destroy));
        drop(rx);
        assert!(!tx.post(EngineMessage::Destroy));
    }
}
