//! Error types for netcode-rpc.

use thiserror::Error;

use crate::classifier::InvalidReason;
use crate::transport::ClientId;

/// Main error type for registration, codec and dispatch operations.
///
/// Registration errors are returned to the caller. Everything that happens
/// while a call is intercepted or a frame is received is logged and carried
/// back as a value instead, so one bad frame never aborts the host.
#[derive(Debug, Error)]
pub enum RpcError {
    /// MsgPack serialization error (opaque parameter strategy).
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error (opaque parameter strategy).
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// JSON error while loading configuration.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed frame or payload.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A read ran past the end of the buffer.
    #[error("Buffer truncated: needed {needed} bytes at offset {offset}, {available} available")]
    Truncated {
        needed: usize,
        offset: usize,
        available: usize,
    },

    /// A write exceeded a fixed-size scratch buffer.
    #[error("Buffer overflow: {needed} bytes needed, capacity is {capacity}")]
    BufferOverflow { needed: usize, capacity: usize },

    /// Parameter type has neither codec strategy.
    #[error("Parameter ({type_name} {name}) is neither NetworkSerializable nor serde-serializable")]
    NotSerializable {
        type_name: &'static str,
        name: String,
    },

    /// Supplied argument does not have the declared parameter type.
    #[error("Argument {index} ({name}) is not a {expected}")]
    ArgumentTypeMismatch {
        index: usize,
        name: String,
        expected: &'static str,
    },

    /// Caller supplied the wrong number of arguments.
    #[error("Procedure {method} takes {expected} arguments but {supplied} were supplied")]
    ArgumentCount {
        method: String,
        supplied: usize,
        expected: usize,
    },

    /// Frame parameter count differs from the resolved method's arity.
    #[error("Received RPC {method} with {sent} parameters but the method declares {expected}")]
    InconsistentParameterCount {
        method: String,
        sent: i32,
        expected: usize,
    },

    /// Transport is not listening or connected.
    #[error("Behaviour {behaviour_id} on object {object_id} tried to send an RPC but the transport is not active")]
    TransportInactive { object_id: u64, behaviour_id: u16 },

    /// Transport refused a send.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Ownership-gated server procedure called by someone other than the owner.
    #[error("{caller} tried to run ServerRpc {method} but is not the owner of object {object_id}")]
    NotOwner {
        caller: String,
        method: String,
        object_id: u64,
    },

    /// Client procedure invoked locally on a non-authority instance.
    #[error("Tried to run ClientRpc {0} but this instance is neither server nor host; only call client procedures from the server")]
    ClientRpcFromClient(String),

    /// Client procedure arrived from a peer other than the server.
    #[error("Received message to run ClientRpc {method} from Client {sender}; only the server may send client procedures")]
    ClientRpcFromNonServer { method: String, sender: ClientId },

    /// Server procedure arrived on a non-authority instance.
    #[error("Received message to run ServerRpc {type_name}.{method} but this instance is a client")]
    ServerRpcOnClient { type_name: String, method: String },

    /// Intercepted method has no role marker.
    #[error("RPC method {0} is intercepted but lacks a role marker")]
    MethodPatchedButLacksAttributes(String),

    /// Intercepted method without role marker was invoked from the network.
    #[error("RPC method {0} is intercepted and received a network call but lacks a role marker")]
    MethodPatchedAndNetworkCalledButLacksAttributes(String),

    /// Frame targets an object id that is not spawned.
    #[error("RPC targeted object {0} which is not in the spawned objects list; spawn it before calling RPCs")]
    RpcCalledBeforeObjectSpawned(u64),

    /// Object already carries as many behaviours as a wire id can address.
    #[error("Object {object_id} cannot take more than 65536 behaviours")]
    TooManyBehaviours { object_id: u64 },

    /// Object has no behaviour at the given order index.
    #[error("Object {object_id} has no behaviour at index {behaviour_id}")]
    BehaviourNotFound { object_id: u64, behaviour_id: u16 },

    /// Frame names a method the behaviour's type does not have.
    #[error("Behaviour {behaviour_id} received RPC {method} but that method doesn't exist on {type_name}")]
    NetworkCalledNonExistentMethod {
        behaviour_id: u16,
        method: String,
        type_name: String,
    },

    /// Local call names a method that is not a registered procedure.
    #[error("Method {method} on {type_name} is not a registered procedure")]
    UnknownProcedure { type_name: String, method: String },

    /// Procedure body was bound to a different behaviour type.
    #[error("Procedure body expects behaviour {expected} but target is {found}")]
    BehaviourTypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// Method has a malformed role marker / suffix combination.
    #[error("Can't patch method {type_name}.{method}: {reason}")]
    InvalidProcedure {
        type_name: String,
        method: String,
        reason: InvalidReason,
    },

    /// Registrant identity already has a live validator.
    #[error("Can't register {0} until the other validator for it is disposed")]
    AlreadyRegistered(String),

    /// Registrant identity is empty or not known to the host.
    #[error("Can't register {0:?} because the host doesn't know it")]
    UnknownRegistrant(String),

    /// Type handed to `patch` does not derive directly from the networked behaviour.
    #[error("Tried to patch type {0} that doesn't derive directly from NetworkBehaviour")]
    NotNetworkBehaviour(String),
}

/// Result type alias using RpcError.
pub type Result<T> = std::result::Result<T, RpcError>;

/// Caller label used in ownership errors.
pub(crate) fn caller_label(sender: Option<ClientId>) -> String {
    match sender {
        None => "We".to_string(),
        Some(id) => format!("Client {}", id),
    }
}
