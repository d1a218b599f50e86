//! Device-shadow synchronization: topic grammar, document bodies, the
//! transport seam and the sync engine that ties them to the directory.

pub mod bridge;
pub mod engine;
pub mod payload;
pub mod topic;
pub mod transport;

pub use bridge::SerialBridge;
pub use engine::{CloudSync, InboundOutcome, Outbound};
pub use payload::{DecodeError, Reported};
pub use topic::{InboundTopic, ShadowPath, TopicScheme};
pub use transport::{
    ConnectInfo, InboundHandler, LoopbackTransport, PublishOptions, PublishStatus, Transport,
};
