//! Registration of procedures and channel lifecycle.
//!
//! A [`NetcodeValidator`] belongs to one registrant identity. It classifies
//! the methods of the behaviour types it is given, installs the valid ones
//! in its procedure table, and keeps one named channel per patched type
//! attached to the transport while the transport runs.
//!
//! # Example
//!
//! ```
//! use netcode_rpc::classifier::RpcAttribute;
//! use netcode_rpc::codec::{Args, Parameter};
//! use netcode_rpc::handler::CallInfo;
//! use netcode_rpc::spawn::NetworkBehaviour;
//! use netcode_rpc::validator::{BehaviourType, MethodDecl, NetcodeValidator, ValidatorRegistry};
//!
//! #[derive(Default)]
//! struct Bell { rung: u32 }
//! impl NetworkBehaviour for Bell {}
//!
//! let registry = ValidatorRegistry::new();
//! let mut validator = NetcodeValidator::builder("com.example.bells")
//!     .register(&registry)
//!     .unwrap();
//!
//! let report = validator
//!     .patch(
//!         BehaviourType::new::<Bell>("Bell").method(
//!             MethodDecl::new("RingServerRpc", |b: &mut Bell, _: Args, _: &CallInfo| b.rung += 1)
//!                 .with_marker(RpcAttribute::server().require_ownership(false)),
//!         ),
//!     )
//!     .unwrap();
//! assert_eq!(report.installed, vec!["RingServerRpc"]);
//! assert_eq!(validator.channels(), vec!["Net.Bell"]);
//! ```

use std::any::TypeId;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::classifier::{classify, Classification, InvalidReason, RpcAttribute};
use crate::codec::{Args, Parameter};
use crate::config::ValidatorConfig;
use crate::error::{RpcError, Result};
use crate::handler::{
    CallInfo, CallOutcome, Dispatcher, ProcedureBody, ProcedureDescriptor, ProcedureEntry, ProcedureLookup,
    ProcedureTable, TypedBody,
};
use crate::spawn::{BehaviourRef, NetworkBehaviour, ObjectRegistry};
use crate::transport::{ClientId, MessageHandler, Transport, SERVER_CLIENT_ID};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Registrant bookkeeping
// ============================================================================

#[derive(Debug, Default)]
struct RegistryState {
    /// `None` accepts any non-empty identity.
    known: Option<HashSet<String>>,
    active: HashSet<String>,
}

/// Tracks which registrant identities currently have a live validator.
///
/// Cheap to clone; clones share state.
#[derive(Debug, Clone, Default)]
pub struct ValidatorRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only accept the given identities.
    pub fn with_known_registrants<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            state: Arc::new(Mutex::new(RegistryState {
                known: Some(ids.into_iter().map(Into::into).collect()),
                active: HashSet::new(),
            })),
        }
    }

    pub fn is_registered(&self, id: &str) -> bool {
        lock(&self.state).active.contains(id)
    }

    fn claim(&self, id: &str) -> Result<()> {
        let mut state = lock(&self.state);
        let known = !id.is_empty() && state.known.as_ref().map_or(true, |k| k.contains(id));
        if !known {
            return Err(RpcError::UnknownRegistrant(id.to_string()));
        }
        if !state.active.insert(id.to_string()) {
            return Err(RpcError::AlreadyRegistered(id.to_string()));
        }
        Ok(())
    }

    fn release(&self, id: &str) {
        lock(&self.state).active.remove(id);
    }
}

// ============================================================================
// Type and method declarations
// ============================================================================

/// One method offered for classification.
pub struct MethodDecl {
    name: String,
    attribute: Option<RpcAttribute>,
    parameters: Vec<Parameter>,
    body: Arc<dyn ProcedureBody>,
}

impl MethodDecl {
    /// Declare a method with its body. Parameters and marker are added with
    /// the builder methods.
    pub fn new<B, F>(name: impl Into<String>, body: F) -> Self
    where
        B: NetworkBehaviour,
        F: Fn(&mut B, Args, &CallInfo) + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            attribute: None,
            parameters: Vec::new(),
            body: Arc::new(TypedBody::new(body)),
        }
    }

    /// Mark as a server procedure that requires ownership.
    pub fn server_rpc(self) -> Self {
        self.with_marker(RpcAttribute::server())
    }

    /// Mark as a client procedure.
    pub fn client_rpc(self) -> Self {
        self.with_marker(RpcAttribute::client())
    }

    pub fn with_marker(mut self, attribute: RpcAttribute) -> Self {
        self.attribute = Some(attribute);
        self
    }

    pub fn param(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for MethodDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDecl")
            .field("name", &self.name)
            .field("attribute", &self.attribute)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Base {
    NetworkBehaviour,
    Other(String),
}

/// A behaviour type and the methods it declares.
#[derive(Debug)]
pub struct BehaviourType {
    name: String,
    type_id: TypeId,
    base: Base,
    methods: Vec<MethodDecl>,
}

impl BehaviourType {
    /// Type deriving directly from the networked behaviour.
    pub fn new<B: NetworkBehaviour>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_id: TypeId::of::<B>(),
            base: Base::NetworkBehaviour,
            methods: Vec::new(),
        }
    }

    /// Type whose immediate base is another type. Such types are not patched.
    pub fn derived<B: NetworkBehaviour>(name: impl Into<String>, base: impl Into<String>) -> Self {
        Self {
            base: Base::Other(base.into()),
            ..Self::new::<B>(name)
        }
    }

    pub fn method(mut self, method: MethodDecl) -> Self {
        self.methods.push(method);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_network_behaviour(&self) -> bool {
        self.base == Base::NetworkBehaviour
    }
}

/// Channel opened for one patched type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelBinding {
    pub type_name: String,
    pub channel: String,
}

/// What [`NetcodeValidator::patch`] did with one type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchReport {
    pub type_name: String,
    pub channel: String,
    /// Methods now routed through the dispatcher.
    pub installed: Vec<String>,
    /// Methods refused by the classifier.
    pub rejected: Vec<(String, InvalidReason)>,
    /// Ordinary methods left alone.
    pub skipped: Vec<String>,
}

// ============================================================================
// Validator
// ============================================================================

struct ValidatorShared {
    config: ValidatorConfig,
    table: RwLock<ProcedureTable>,
    last_sender: AtomicU64,
}

impl ProcedureLookup for ValidatorShared {
    fn lookup(&self, owner: TypeId, method: &str) -> Option<ProcedureEntry> {
        read(&self.table).lookup(owner, method)
    }

    fn type_name(&self, owner: TypeId) -> Option<String> {
        read(&self.table).type_name(owner)
    }
}

impl ValidatorShared {
    fn dispatcher<'t>(&'t self, transport: Option<&'t dyn Transport>) -> Dispatcher<'t> {
        Dispatcher::new(transport, &self.config).with_last_sender(&self.last_sender)
    }
}

/// Channel handler shared by every type a validator patched.
struct InboundHandler {
    shared: Arc<ValidatorShared>,
}

impl MessageHandler for InboundHandler {
    fn on_message(
        &self,
        transport: &dyn Transport,
        objects: &mut dyn ObjectRegistry,
        sender: ClientId,
        payload: &[u8],
    ) {
        // Failures are already logged by the dispatcher
        let _ = self
            .shared
            .dispatcher(Some(transport))
            .receive(&*self.shared, objects, sender, payload);
    }
}

/// Builder for [`NetcodeValidator`].
pub struct ValidatorBuilder {
    registrant: String,
    config: ValidatorConfig,
}

impl ValidatorBuilder {
    fn new(registrant: impl Into<String>) -> Self {
        Self {
            registrant: registrant.into(),
            config: ValidatorConfig::default(),
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ValidatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Channel prefix (default `"Net"`).
    pub fn channel_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.channel_prefix = prefix.into();
        self
    }

    /// Scratch size for self-describing parameters (default 1024).
    pub fn scratch_buffer_size(mut self, size: usize) -> Self {
        self.config.scratch_buffer_size = size;
        self
    }

    /// Initial frame bytes reserved per parameter (default 128).
    pub fn frame_bytes_per_parameter(mut self, size: usize) -> Self {
        self.config.frame_bytes_per_parameter = size;
        self
    }

    /// Claim the registrant identity and build the validator.
    ///
    /// # Errors
    ///
    /// [`RpcError::UnknownRegistrant`] if the identity is empty or not known
    /// to `registry`, [`RpcError::AlreadyRegistered`] if it already has a
    /// live validator.
    pub fn register(self, registry: &ValidatorRegistry) -> Result<NetcodeValidator> {
        registry.claim(&self.registrant)?;
        tracing::debug!(registrant = %self.registrant, "Validator registered");

        Ok(NetcodeValidator {
            registrant: self.registrant,
            registry: registry.clone(),
            shared: Arc::new(ValidatorShared {
                config: self.config,
                table: RwLock::new(ProcedureTable::new()),
                last_sender: AtomicU64::new(SERVER_CLIENT_ID),
            }),
            channels: Vec::new(),
            transport: None,
            released: false,
        })
    }
}

/// Procedure registration for one registrant.
pub struct NetcodeValidator {
    registrant: String,
    registry: ValidatorRegistry,
    shared: Arc<ValidatorShared>,
    channels: Vec<ChannelBinding>,
    transport: Option<Arc<dyn Transport>>,
    released: bool,
}

impl NetcodeValidator {
    pub fn builder(registrant: impl Into<String>) -> ValidatorBuilder {
        ValidatorBuilder::new(registrant)
    }

    /// Register with the default configuration.
    pub fn new(registrant: impl Into<String>, registry: &ValidatorRegistry) -> Result<Self> {
        Self::builder(registrant).register(registry)
    }

    pub fn registrant(&self) -> &str {
        &self.registrant
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.shared.config
    }

    /// Classify and install the procedures of one type.
    ///
    /// # Errors
    ///
    /// [`RpcError::NotNetworkBehaviour`] if the type's immediate base is not
    /// the networked behaviour. Invalid methods are logged and reported but
    /// do not fail the call.
    pub fn patch(&mut self, ty: BehaviourType) -> Result<PatchReport> {
        if !ty.is_network_behaviour() {
            return Err(RpcError::NotNetworkBehaviour(ty.name));
        }

        let channel = self.bind_channel(&ty.name);
        let mut report = PatchReport {
            type_name: ty.name.clone(),
            channel,
            installed: Vec::new(),
            rejected: Vec::new(),
            skipped: Vec::new(),
        };

        let mut table = write(&self.shared.table);
        for method in ty.methods {
            match classify(&method.name, method.attribute.as_ref()) {
                Classification::NotAProcedure => report.skipped.push(method.name),
                Classification::Invalid(reason) => {
                    let err = RpcError::InvalidProcedure {
                        type_name: ty.name.clone(),
                        method: method.name.clone(),
                        reason,
                    };
                    tracing::error!("{}", err);
                    report.rejected.push((method.name, reason));
                }
                Classification::Valid(role) => {
                    tracing::info!("Patching {}.{} as {}", ty.name, method.name, role);
                    report.installed.push(method.name.clone());
                    table.insert(
                        ty.type_id,
                        ProcedureEntry {
                            descriptor: Arc::new(ProcedureDescriptor::new(
                                ty.name.as_str(),
                                method.name,
                                method.parameters,
                                method.attribute,
                            )),
                            body: method.body,
                        },
                    );
                }
            }
        }
        Ok(report)
    }

    /// Patch every type deriving directly from the networked behaviour.
    /// Other types are skipped.
    pub fn patch_all<I>(&mut self, types: I) -> Vec<PatchReport>
    where
        I: IntoIterator<Item = BehaviourType>,
    {
        types
            .into_iter()
            .filter(BehaviourType::is_network_behaviour)
            .filter_map(|ty| self.patch(ty).ok())
            .collect()
    }

    fn bind_channel(&mut self, type_name: &str) -> String {
        let channel = self.shared.config.channel_name(type_name);
        if self.channels.iter().any(|b| b.channel == channel) {
            return channel;
        }

        self.channels.push(ChannelBinding {
            type_name: type_name.to_string(),
            channel: channel.clone(),
        });
        if let Some(transport) = self.transport.as_deref() {
            transport.register_handler(&channel, self.inbound_handler());
        }
        channel
    }

    fn inbound_handler(&self) -> Arc<dyn MessageHandler> {
        Arc::new(InboundHandler {
            shared: self.shared.clone(),
        })
    }

    /// Host lifecycle: the transport started. Opens every channel.
    pub fn transport_started(&mut self, transport: Arc<dyn Transport>) {
        let handler = self.inbound_handler();
        for binding in &self.channels {
            transport.register_handler(&binding.channel, handler.clone());
        }
        tracing::debug!(registrant = %self.registrant, channels = self.channels.len(), "Channels opened");
        self.transport = Some(transport);
    }

    /// Host lifecycle: the transport is stopping. Closes every channel.
    pub fn transport_stopped(&mut self) {
        if let Some(transport) = self.transport.take() {
            Self::close_channels(&*transport, &self.channels);
        }
    }

    fn close_channels(transport: &dyn Transport, channels: &[ChannelBinding]) {
        if !transport.is_active() {
            tracing::debug!("Transport already inactive, skipping channel teardown");
            return;
        }
        for binding in channels {
            transport.unregister_handler(&binding.channel);
        }
    }

    /// Call a procedure from local code.
    ///
    /// Returns [`CallOutcome::Transmitted`] when a frame was sent. Rejected
    /// calls are logged and returned as errors; they never panic.
    pub fn call(
        &self,
        objects: &mut dyn ObjectRegistry,
        target: BehaviourRef,
        method: &str,
        args: Args,
    ) -> Result<CallOutcome> {
        self.shared
            .dispatcher(self.transport.as_deref())
            .call(&*self.shared, objects, target, method, args)
    }

    /// Handle a frame delivered outside the channel handlers.
    pub fn receive(&self, objects: &mut dyn ObjectRegistry, sender: ClientId, payload: &[u8]) -> Result<CallOutcome> {
        self.shared
            .dispatcher(self.transport.as_deref())
            .receive(&*self.shared, objects, sender, payload)
    }

    /// Sender of the most recent accepted frame, or the server id.
    pub fn last_sender_id(&self) -> ClientId {
        self.shared.last_sender.load(Ordering::Acquire)
    }

    /// Release every installed procedure. Channels stay bound.
    pub fn unpatch_self(&mut self) {
        write(&self.shared.table).clear();
        tracing::debug!(registrant = %self.registrant, "Unpatched");
    }

    /// Channel names, in patch order.
    pub fn channels(&self) -> Vec<String> {
        self.channels.iter().map(|b| b.channel.clone()).collect()
    }

    pub fn channel_bindings(&self) -> &[ChannelBinding] {
        &self.channels
    }

    /// All installed procedures, sorted by `"Type.Method"`.
    pub fn procedures(&self) -> Vec<Arc<ProcedureDescriptor>> {
        read(&self.shared.table).descriptors()
    }

    pub fn procedure_count(&self) -> usize {
        read(&self.shared.table).len()
    }

    /// Close channels, release procedures and give up the registrant identity.
    pub fn dispose(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        if let Some(transport) = self.transport.take() {
            Self::close_channels(&*transport, &self.channels);
        }
        write(&self.shared.table).clear();
        self.registry.release(&self.registrant);
        tracing::debug!(registrant = %self.registrant, "Validator disposed");
    }
}

impl Drop for NetcodeValidator {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for NetcodeValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetcodeValidator")
            .field("registrant", &self.registrant)
            .field("channels", &self.channels)
            .field("procedures", &self.procedure_count())
            .field("transport", &self.transport.is_some())
            .finish()
    }
}
