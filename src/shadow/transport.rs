//! Messaging transport seam and an in-memory implementation.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use super::topic::topic_matches;
use crate::Result;

/// Callback invoked for every inbound message matching a subscription. It may
/// run on a transport-owned thread, concurrently with publishes.
pub type InboundHandler = Arc<dyn Fn(&str, &[u8]) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectInfo {
    pub client_id: String,
    pub server: String,
    pub keep_alive: Duration,
}

/// At-least-once delivery settings for one publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishOptions {
    pub qos: u8,
    pub retry_limit: u32,
    pub retry_interval: Duration,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            qos: 1,
            retry_limit: 10,
            retry_interval: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishStatus {
    Acknowledged,
    /// Handed off, acknowledgement not yet seen.
    Pending,
}

pub trait Transport: Send + Sync {
    fn connect(&self, info: &ConnectInfo) -> Result<()>;
    fn subscribe(&self, filters: &[String], handler: InboundHandler) -> Result<()>;
    fn publish(&self, topic: &str, payload: &[u8], options: PublishOptions)
        -> Result<PublishStatus>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl PublishedMessage {
    pub fn payload_str(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

#[derive(Default)]
struct LoopbackInner {
    connected: Option<ConnectInfo>,
    filters: Vec<String>,
    handler: Option<InboundHandler>,
    published: Vec<PublishedMessage>,
}

/// Transport with no broker behind it. Publishes are recorded and
/// acknowledged at once; `deliver` injects inbound traffic.
#[derive(Clone, Default)]
pub struct LoopbackTransport {
    inner: Arc<Mutex<LoopbackInner>>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.lock().published.clone()
    }

    pub fn take_published(&self) -> Vec<PublishedMessage> {
        std::mem::take(&mut self.lock().published)
    }

    pub fn connect_info(&self) -> Option<ConnectInfo> {
        self.lock().connected.clone()
    }

    pub fn filters(&self) -> Vec<String> {
        self.lock().filters.clone()
    }

    /// Hand `payload` to the subscriber if `topic` matches one of its filters.
    /// Returns whether it was delivered.
    pub fn deliver(&self, topic: &str, payload: &[u8]) -> bool {
        let handler = {
            let inner = self.lock();
            if !inner.filters.iter().any(|f| topic_matches(f, topic)) {
                return false;
            }
            inner.handler.clone()
        };
        match handler {
            Some(handler) => {
                handler(topic, payload);
                true
            }
            None => false,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LoopbackInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Transport for LoopbackTransport {
    fn connect(&self, info: &ConnectInfo) -> Result<()> {
        log::debug!("loopback connect as {}", info.client_id);
        self.lock().connected = Some(info.clone());
        Ok(())
    }

    fn subscribe(&self, filters: &[String], handler: InboundHandler) -> Result<()> {
        let mut inner = self.lock();
        inner.filters.extend(filters.iter().cloned());
        inner.handler = Some(handler);
        Ok(())
    }

    fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        _options: PublishOptions,
    ) -> Result<PublishStatus> {
        self.lock().published.push(PublishedMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        });
        Ok(PublishStatus::Acknowledged)
    }
}
