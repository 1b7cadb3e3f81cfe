//! ---
//! ems_section: "02-messaging-ipc-data-model"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Publish transports and delivery primitives."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::{Ack, DeliveryGuarantee, LinkEvent, MessagingError, PublishedMessage, Result};

/// Publish/subscribe transport consumed by the publish loop.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish the broker session; resolves once the session is usable.
    async fn connect(&self) -> Result<()>;
    /// Hand one message to the transport.
    async fn publish(
        &self,
        topic: &str,
        payload: Bytes,
        qos: DeliveryGuarantee,
        retain: bool,
    ) -> Result<Ack>;
    /// Release the session.
    async fn disconnect(&self) -> Result<()>;
    /// Subscribe to connection changes that happen after `connect` returned.
    fn link_events(&self) -> broadcast::Receiver<LinkEvent>;
    /// Human-readable transport name for logging.
    fn name(&self) -> &'static str;
}

#[derive(Default)]
struct Faults {
    refuse_connect: AtomicBool,
    failing_publishes: AtomicUsize,
}

/// In-memory transport that records every publish request.
///
/// Connect refusal and publish failures can be injected to exercise the
/// error paths of callers.
#[derive(Clone)]
pub struct InMemoryTransport {
    published: Arc<Mutex<VecDeque<PublishedMessage>>>,
    connected: Arc<AtomicBool>,
    faults: Arc<Faults>,
    link: broadcast::Sender<LinkEvent>,
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        let (link, _) = broadcast::channel(16);
        Self {
            published: Arc::new(Mutex::new(VecDeque::new())),
            connected: Arc::new(AtomicBool::new(false)),
            faults: Arc::new(Faults::default()),
            link,
        }
    }
}

impl InMemoryTransport {
    /// Create a new in-memory transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `connect` calls fail.
    pub fn refuse_connect(&self, refuse: bool) {
        self.faults.refuse_connect.store(refuse, Ordering::SeqCst);
    }

    /// Make the next `count` publish calls fail.
    pub fn fail_next_publishes(&self, count: usize) {
        self.faults.failing_publishes.store(count, Ordering::SeqCst);
    }

    /// Emit a link event as if the broker session changed.
    pub fn emit(&self, event: LinkEvent) {
        let _ = self.link.send(event);
    }

    /// Whether the transport currently holds a session.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Pop the oldest recorded publish.
    pub fn recv(&self) -> Option<PublishedMessage> {
        self.published.lock().pop_front()
    }

    /// Copy of every recorded publish, oldest first.
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().iter().cloned().collect()
    }

    /// Recorded publishes addressed to `topic`.
    pub fn published_on(&self, topic: &str) -> Vec<PublishedMessage> {
        self.published
            .lock()
            .iter()
            .filter(|message| message.topic == topic)
            .cloned()
            .collect()
    }

    fn take_publish_fault(&self) -> bool {
        self.faults
            .failing_publishes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok()
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn connect(&self) -> Result<()> {
        if self.faults.refuse_connect.load(Ordering::SeqCst) {
            return Err(MessagingError::Connection("connection refused".into()));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Bytes,
        qos: DeliveryGuarantee,
        retain: bool,
    ) -> Result<Ack> {
        if !self.is_connected() {
            return Err(MessagingError::NotConnected);
        }
        if self.take_publish_fault() {
            return Err(MessagingError::Publish {
                topic: topic.to_owned(),
                reason: "injected failure".into(),
            });
        }
        let bytes = payload.len();
        self.published.lock().push_back(PublishedMessage {
            topic: topic.to_owned(),
            payload,
            qos,
            retain,
        });
        Ok(Ack {
            topic: topic.to_owned(),
            bytes,
        })
    }

    async fn disconnect(&self) -> Result<()> {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return Err(MessagingError::NotConnected);
        }
        Ok(())
    }

    fn link_events(&self) -> broadcast::Receiver<LinkEvent> {
        self.link.subscribe()
    }

    fn name(&self) -> &'static str {
        "in_memory"
    }
}
