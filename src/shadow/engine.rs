//! Cloud sync: turns queued intents into shadow publishes and applies peer
//! shadow documents to the directory.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread;
use std::time::Duration;

use super::payload::{self, DecodeError, Reported};
use super::topic::{ShadowPath, TopicScheme};
use super::transport::{ConnectInfo, InboundHandler, PublishOptions, PublishStatus, Transport};
use crate::{
    dispatch::{PublishIntent, PublishQueue},
    state::NodeState,
    Result, MAX_THING, MY_THING,
};

/// Pause after each publish.
pub const DEFAULT_PUBLISH_GAP: Duration = Duration::from_millis(100);
/// How long one dequeue waits before rechecking the running flag.
const IDLE_POLL: Duration = Duration::from_millis(200);

/// A ready-to-send publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// What `handle_inbound` did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundOutcome {
    /// `fields` directory fields of `thing` were written.
    Applied { thing: u8, fields: usize },
    /// Our own shadow coming back; never applied.
    OwnShadow,
    /// Topic outside the grammar or a sub-path we do not track.
    Ignored,
    /// Envelope failed to decode; nothing written.
    Rejected,
}

pub struct CloudSync {
    state: NodeState,
    topics: TopicScheme,
    transport: Arc<dyn Transport>,
    options: PublishOptions,
    publish_gap: Duration,
}

impl CloudSync {
    pub fn new(state: NodeState, topics: TopicScheme, transport: Arc<dyn Transport>) -> Self {
        Self {
            state,
            topics,
            transport,
            options: PublishOptions::default(),
            publish_gap: DEFAULT_PUBLISH_GAP,
        }
    }

    pub fn with_publish_gap(mut self, gap: Duration) -> Self {
        self.publish_gap = gap;
        self
    }

    pub fn with_options(mut self, options: PublishOptions) -> Self {
        self.options = options;
        self
    }

    pub fn topics(&self) -> &TopicScheme {
        &self.topics
    }

    /// Connect, then subscribe to peer documents. A failed connect still
    /// attempts the subscribe; the first error is returned for reporting.
    pub fn connect_and_subscribe(self: &Arc<Self>, info: &ConnectInfo) -> Result<()> {
        let connected = self.transport.connect(info);
        if let Err(err) = &connected {
            log::warn!("connect as {} failed: {err}", info.client_id);
        } else {
            log::info!("connected as {}", info.client_id);
        }
        let filters = self.topics.subscriptions();
        let subscribed = self.transport.subscribe(&filters, self.inbound_handler());
        match &subscribed {
            Ok(()) => log::info!("subscribed to {}", filters.join(", ")),
            Err(err) => log::warn!("subscribe failed: {err}"),
        }
        connected.and(subscribed)
    }

    /// Queue the IP announcement and one shadow get per thing.
    pub fn bootstrap(&self, queue: &PublishQueue) {
        queue.send(PublishIntent::Ip);
        for thing in 0..=MAX_THING {
            queue.send(PublishIntent::Get(thing));
        }
    }

    pub fn outbound_for(&self, intent: PublishIntent) -> Result<Outbound> {
        let record = self.state.directory.mine();
        let topic = match intent {
            PublishIntent::Get(thing) => self.topics.get_topic(thing),
            _ => self.topics.update_topic(MY_THING),
        };
        let payload = payload::encode_intent(intent, &record)?;
        Ok(Outbound { topic, payload })
    }

    pub fn dispatch(&self, intent: PublishIntent) -> Result<PublishStatus> {
        let outbound = self.outbound_for(intent)?;
        let status = self
            .transport
            .publish(&outbound.topic, &outbound.payload, self.options)?;
        log::debug!("published {intent} to {} ({status:?})", outbound.topic);
        Ok(status)
    }

    /// Drain `queue` in arrival order until `running` clears. Publish failures
    /// are logged and the loop moves on.
    pub fn run_dispatch_loop(&self, queue: &PublishQueue, running: &AtomicBool) {
        while running.load(Ordering::SeqCst) {
            let Some(intent) = queue.recv_timeout(IDLE_POLL) else {
                continue;
            };
            if let Err(err) = self.dispatch(intent) {
                log::warn!("publish {intent} failed: {err}");
            }
            thread::sleep(self.publish_gap);
        }
        log::debug!("dispatch loop stopped");
    }

    /// Apply one inbound shadow message. Never fails: anything unusable is
    /// logged and leaves the directory untouched.
    pub fn handle_inbound(&self, topic: &str, body: &[u8]) -> InboundOutcome {
        let Some(inbound) = self.topics.parse(topic) else {
            log::trace!("ignoring message on {topic}");
            return InboundOutcome::Ignored;
        };
        let decoded: std::result::Result<Reported, DecodeError> = match &inbound.path {
            ShadowPath::GetAccepted | ShadowPath::UpdateDocuments if inbound.thing == MY_THING => {
                return InboundOutcome::OwnShadow;
            }
            ShadowPath::GetAccepted => payload::decode_get_accepted(body),
            ShadowPath::UpdateDocuments => payload::decode_update_documents(body),
            ShadowPath::Other(_) => return InboundOutcome::Ignored,
        };
        let reported = match decoded {
            Ok(reported) => reported,
            Err(err) => {
                log::debug!("rejecting document on {topic}: {err}");
                return InboundOutcome::Rejected;
            }
        };

        let thing = inbound.thing;
        let mut fields = 0;
        for value in reported.field_values() {
            match self.state.directory.write_field(thing, value) {
                Ok(()) => fields += 1,
                Err(err) => log::warn!("write to thing {thing} failed: {err}"),
            }
        }

        if inbound.path == ShadowPath::UpdateDocuments {
            if self.state.print_all() {
                if let Some(record) = self.state.directory.read(thing) {
                    self.state.console.line(record.summary_line());
                }
            }
            if self.state.selected.get() == thing {
                self.state.refresh.signal();
            }
        }
        InboundOutcome::Applied { thing, fields }
    }

    pub fn inbound_handler(self: &Arc<Self>) -> InboundHandler {
        let engine = Arc::clone(self);
        Arc::new(move |topic: &str, body: &[u8]| {
            engine.handle_inbound(topic, body);
        })
    }
}

/// Spawn the dispatch thread draining `queue`.
pub fn spawn_dispatcher(
    engine: Arc<CloudSync>,
    queue: PublishQueue,
    running: Arc<AtomicBool>,
) -> Result<thread::JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("cloud-sync".into())
        .spawn(move || engine.run_dispatch_loop(&queue, &running))?;
    Ok(handle)
}
