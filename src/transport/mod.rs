//! Transport module - named-channel messaging consumed by the dispatcher.
//!
//! The real network layer lives outside this crate. It only has to provide
//! unicast/broadcast/list sends on a named channel, per-channel inbound
//! handlers, and a few facts about the local instance. [`LoopbackNetwork`]
//! is an in-memory implementation built on tokio channels.

mod loopback;

use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

pub use loopback::{LoopbackEndpoint, LoopbackNetwork, SendTarget, SentMessage};

use crate::error::Result;
use crate::spawn::ObjectRegistry;

/// Network identity of a connected instance.
pub type ClientId = u64;

/// Client id the server (or host) always has.
pub const SERVER_CLIENT_ID: ClientId = 0;

/// Reliability tier requested for a send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DeliveryMode {
    #[default]
    Reliable,
    Unreliable,
}

/// Receives frames for one named channel.
pub trait MessageHandler: Send + Sync {
    /// Called once per inbound message.
    ///
    /// `transport` is the endpoint that received the message and `objects`
    /// the caller's spawned objects, so the handler can resolve and invoke
    /// the target without owning either.
    fn on_message(
        &self,
        transport: &dyn Transport,
        objects: &mut dyn ObjectRegistry,
        sender: ClientId,
        payload: &[u8],
    );
}

/// Named-channel transport.
pub trait Transport: Send + Sync {
    fn send_unicast(&self, channel: &str, recipient: ClientId, payload: Bytes, delivery: DeliveryMode) -> Result<()>;

    /// Send to every connected client (the host included, a dedicated server excluded).
    fn send_broadcast(&self, channel: &str, payload: Bytes, delivery: DeliveryMode) -> Result<()>;

    fn send_to_list(
        &self,
        channel: &str,
        recipients: &[ClientId],
        payload: Bytes,
        delivery: DeliveryMode,
    ) -> Result<()>;

    /// Install the handler for `channel`, replacing any previous one.
    fn register_handler(&self, channel: &str, handler: Arc<dyn MessageHandler>);

    fn unregister_handler(&self, channel: &str);

    /// True while listening (server/host) or connected (client).
    fn is_active(&self) -> bool;

    fn local_id(&self) -> ClientId;

    /// True on the server or host.
    fn is_authority(&self) -> bool;
}
