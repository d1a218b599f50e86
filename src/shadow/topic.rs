//! Shadow topic grammar: `<root>/Thing_<NN>/shadow/{update|get}` outbound and
//! `<root>/Thing_<NN>/shadow/<path>` inbound.

use crate::{directory::thing_name, MAX_THING};

pub const DEFAULT_TOPIC_ROOT: &str = "$aws/things";
const THING_PREFIX: &str = "Thing_";

/// Sub-path of an inbound shadow topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShadowPath {
    GetAccepted,
    UpdateDocuments,
    Other(String),
}

impl ShadowPath {
    fn from_suffix(suffix: &str) -> Self {
        match suffix {
            "get/accepted" => ShadowPath::GetAccepted,
            "update/documents" => ShadowPath::UpdateDocuments,
            other => ShadowPath::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundTopic {
    pub thing: u8,
    pub path: ShadowPath,
}

/// Builds and parses topics under one root prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicScheme {
    root: String,
}

impl Default for TopicScheme {
    fn default() -> Self {
        Self::new(DEFAULT_TOPIC_ROOT)
    }
}

impl TopicScheme {
    pub fn new(root: impl Into<String>) -> Self {
        let root: String = root.into();
        Self {
            root: root.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn thing_root(&self, thing: u8) -> String {
        format!("{}/{}", self.root, thing_name(thing))
    }

    pub fn update_topic(&self, thing: u8) -> String {
        format!("{}/shadow/update", self.thing_root(thing))
    }

    pub fn get_topic(&self, thing: u8) -> String {
        format!("{}/shadow/get", self.thing_root(thing))
    }

    /// Wildcard filters covering every peer's documents and get replies.
    pub fn subscriptions(&self) -> Vec<String> {
        vec![
            format!("{}/+/shadow/update/documents", self.root),
            format!("{}/+/shadow/get/accepted", self.root),
        ]
    }

    /// Split an inbound topic into thing number and sub-path. Topics outside
    /// the root, with a malformed thing segment, or naming a thing past
    /// `MAX_THING` yield `None`.
    pub fn parse(&self, topic: &str) -> Option<InboundTopic> {
        let rest = topic.strip_prefix(self.root.as_str())?.strip_prefix('/')?;
        let (thing_segment, rest) = rest.split_once('/')?;
        let digits = thing_segment.strip_prefix(THING_PREFIX)?;
        if digits.is_empty() || digits.len() > 2 || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let thing: u8 = digits.parse().ok()?;
        if thing > MAX_THING {
            return None;
        }
        let suffix = rest.strip_prefix("shadow/")?;
        Some(InboundTopic {
            thing,
            path: ShadowPath::from_suffix(suffix),
        })
    }
}

/// MQTT filter match with `+` (one level) and `#` (remaining levels).
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');
    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}
