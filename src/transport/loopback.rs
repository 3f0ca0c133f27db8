//! In-memory transport.
//!
//! A [`LoopbackNetwork`] connects any number of endpoints in one process.
//! Each endpoint owns an unbounded tokio mpsc inbox; sends route envelopes
//! into the recipients' inboxes and inbound messages are handed to channel
//! handlers when the endpoint is polled.
//!
//! ```
//! use netcode_rpc::transport::{LoopbackNetwork, Transport, SERVER_CLIENT_ID};
//!
//! let net = LoopbackNetwork::new();
//! let server = net.start_server();
//! let client = net.connect_client();
//!
//! assert!(server.is_authority());
//! assert_eq!(server.local_id(), SERVER_CLIENT_ID);
//! assert!(!client.is_authority());
//! assert_eq!(client.local_id(), 1);
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tokio::sync::mpsc;

use super::{ClientId, DeliveryMode, MessageHandler, Transport, SERVER_CLIENT_ID};
use crate::error::{RpcError, Result};
use crate::spawn::ObjectRegistry;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Message in flight.
#[derive(Debug)]
struct Envelope {
    channel: String,
    sender: ClientId,
    payload: Bytes,
}

/// Recipient selection of a recorded send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendTarget {
    Unicast(ClientId),
    Broadcast,
    List(Vec<ClientId>),
}

/// A send recorded by the endpoint that made it.
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub channel: String,
    pub target: SendTarget,
    pub payload: Bytes,
    pub delivery: DeliveryMode,
}

struct Peer {
    tx: mpsc::UnboundedSender<Envelope>,
    receives_broadcast: bool,
}

struct Hub {
    peers: HashMap<ClientId, Peer>,
    next_client_id: ClientId,
}

/// Shared in-memory network.
#[derive(Clone)]
pub struct LoopbackNetwork {
    hub: Arc<Mutex<Hub>>,
    record_sends: bool,
}

impl Default for LoopbackNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self {
            hub: Arc::new(Mutex::new(Hub {
                peers: HashMap::new(),
                next_client_id: SERVER_CLIENT_ID + 1,
            })),
            record_sends: false,
        }
    }

    /// Endpoints attached from now on keep a log of their sends.
    ///
    /// The log grows until drained with [`LoopbackEndpoint::take_sent`].
    pub fn with_send_log(mut self) -> Self {
        self.record_sends = true;
        self
    }

    /// Start a dedicated server. It does not receive broadcasts.
    pub fn start_server(&self) -> Arc<LoopbackEndpoint> {
        self.attach(SERVER_CLIENT_ID, true, false)
    }

    /// Start a host: a server that is also a client.
    pub fn start_host(&self) -> Arc<LoopbackEndpoint> {
        self.attach(SERVER_CLIENT_ID, true, true)
    }

    /// Connect a new client with the next free id.
    pub fn connect_client(&self) -> Arc<LoopbackEndpoint> {
        let id = {
            let mut hub = lock(&self.hub);
            let id = hub.next_client_id;
            hub.next_client_id += 1;
            id
        };
        self.attach(id, false, true)
    }

    /// Ids of all attached endpoints.
    pub fn connected_ids(&self) -> Vec<ClientId> {
        let mut ids: Vec<_> = lock(&self.hub).peers.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    fn attach(&self, id: ClientId, authority: bool, receives_broadcast: bool) -> Arc<LoopbackEndpoint> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.hub).peers.insert(
            id,
            Peer {
                tx,
                receives_broadcast,
            },
        );
        tracing::debug!(id, authority, "Loopback endpoint attached");

        Arc::new(LoopbackEndpoint {
            id,
            authority,
            network: self.clone(),
            handlers: Mutex::new(HashMap::new()),
            inbox: tokio::sync::Mutex::new(rx),
            active: AtomicBool::new(true),
            sent: self.record_sends.then(|| Mutex::new(Vec::new())),
        })
    }

    fn detach(&self, id: ClientId) {
        lock(&self.hub).peers.remove(&id);
    }

    fn route(&self, sender: ClientId, channel: &str, target: &SendTarget, payload: &Bytes) -> Result<()> {
        let hub = lock(&self.hub);
        let deliver = |peer: &Peer| {
            let envelope = Envelope {
                channel: channel.to_string(),
                sender,
                payload: payload.clone(),
            };
            // A closed inbox means the endpoint was dropped without shutdown
            if peer.tx.send(envelope).is_err() {
                tracing::debug!(channel, "Dropped message for closed endpoint");
            }
        };

        match target {
            SendTarget::Unicast(id) => {
                let peer = hub
                    .peers
                    .get(id)
                    .ok_or_else(|| RpcError::Transport(format!("Client {} is not connected", id)))?;
                deliver(peer);
            }
            SendTarget::Broadcast => hub.peers.values().filter(|p| p.receives_broadcast).for_each(deliver),
            SendTarget::List(ids) => {
                for id in ids {
                    match hub.peers.get(id) {
                        Some(peer) => deliver(peer),
                        None => tracing::warn!(channel, client = *id, "Skipping disconnected recipient"),
                    }
                }
            }
        }
        Ok(())
    }
}

/// One instance attached to a [`LoopbackNetwork`].
pub struct LoopbackEndpoint {
    id: ClientId,
    authority: bool,
    network: LoopbackNetwork,
    handlers: Mutex<HashMap<String, Arc<dyn MessageHandler>>>,
    inbox: tokio::sync::Mutex<mpsc::UnboundedReceiver<Envelope>>,
    active: AtomicBool,
    /// `None` unless the network was built with a send log.
    sent: Option<Mutex<Vec<SentMessage>>>,
}

impl LoopbackEndpoint {
    /// Stop listening/disconnect. Further sends fail.
    pub fn shutdown(&self) {
        if self.active.swap(false, Ordering::AcqRel) {
            self.network.detach(self.id);
            tracing::debug!(id = self.id, "Loopback endpoint shut down");
        }
    }

    /// Deliver every queued message to its channel handler.
    ///
    /// Returns the number of messages taken from the inbox, handled or not.
    pub fn poll(&self, objects: &mut dyn ObjectRegistry) -> usize {
        let mut handled = 0;
        loop {
            let next = match self.inbox.try_lock() {
                Ok(mut rx) => rx.try_recv().ok(),
                Err(_) => None,
            };
            let Some(envelope) = next else {
                return handled;
            };
            self.dispatch(envelope, objects);
            handled += 1;
        }
    }

    /// Wait for the next message and deliver it.
    ///
    /// Returns `false` once the inbox is closed.
    pub async fn poll_next(&self, objects: &mut dyn ObjectRegistry) -> bool {
        let next = self.inbox.lock().await.recv().await;
        match next {
            Some(envelope) => {
                self.dispatch(envelope, objects);
                true
            }
            None => false,
        }
    }

    fn dispatch(&self, envelope: Envelope, objects: &mut dyn ObjectRegistry) {
        let handler = lock(&self.handlers).get(&envelope.channel).cloned();
        match handler {
            Some(handler) => handler.on_message(self, objects, envelope.sender, &envelope.payload),
            None => tracing::warn!(
                channel = %envelope.channel,
                sender = envelope.sender,
                "No handler registered for channel"
            ),
        }
    }

    /// Copy of every logged send. Empty without a send log.
    pub fn sent_messages(&self) -> Vec<SentMessage> {
        self.sent.as_ref().map(|log| lock(log).clone()).unwrap_or_default()
    }

    /// Drain the send log.
    pub fn take_sent(&self) -> Vec<SentMessage> {
        self.sent
            .as_ref()
            .map(|log| std::mem::take(&mut *lock(log)))
            .unwrap_or_default()
    }

    pub fn has_handler(&self, channel: &str) -> bool {
        lock(&self.handlers).contains_key(channel)
    }

    /// Channels with a handler, sorted.
    pub fn handler_channels(&self) -> Vec<String> {
        let mut channels: Vec<_> = lock(&self.handlers).keys().cloned().collect();
        channels.sort();
        channels
    }

    fn send(&self, channel: &str, target: SendTarget, payload: Bytes, delivery: DeliveryMode) -> Result<()> {
        if !self.is_active() {
            return Err(RpcError::Transport(format!(
                "Endpoint {} is not connected",
                self.id
            )));
        }

        self.network.route(self.id, channel, &target, &payload)?;
        tracing::trace!(channel, ?target, len = payload.len(), "Sent");
        if let Some(log) = &self.sent {
            lock(log).push(SentMessage {
                channel: channel.to_string(),
                target,
                payload,
                delivery,
            });
        }
        Ok(())
    }
}

impl Transport for LoopbackEndpoint {
    fn send_unicast(&self, channel: &str, recipient: ClientId, payload: Bytes, delivery: DeliveryMode) -> Result<()> {
        self.send(channel, SendTarget::Unicast(recipient), payload, delivery)
    }

    fn send_broadcast(&self, channel: &str, payload: Bytes, delivery: DeliveryMode) -> Result<()> {
        self.send(channel, SendTarget::Broadcast, payload, delivery)
    }

    fn send_to_list(
        &self,
        channel: &str,
        recipients: &[ClientId],
        payload: Bytes,
        delivery: DeliveryMode,
    ) -> Result<()> {
        self.send(channel, SendTarget::List(recipients.to_vec()), payload, delivery)
    }

    fn register_handler(&self, channel: &str, handler: Arc<dyn MessageHandler>) {
        tracing::debug!(channel, id = self.id, "Registering channel handler");
        lock(&self.handlers).insert(channel.to_string(), handler);
    }

    fn unregister_handler(&self, channel: &str) {
        tracing::debug!(channel, id = self.id, "Unregistering channel handler");
        lock(&self.handlers).remove(channel);
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn local_id(&self) -> ClientId {
        self.id
    }

    fn is_authority(&self) -> bool {
        self.authority
    }
}

impl Drop for LoopbackEndpoint {
    fn drop(&mut self) {
        self.shutdown();
    }
}
