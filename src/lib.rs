//! # netcode-rpc
//!
//! Runtime RPC interception and dispatch for networked behaviours.
//!
//! Behaviour types declare methods; methods whose name ends in `ServerRpc`
//! or `ClientRpc` and carry the matching role marker become remote
//! procedures. Calling one from local code encodes its arguments into a
//! frame and sends it instead of running the body. When the frame arrives
//! on the other side, the same interception point decodes the arguments and
//! lets the body run there.
//!
//! ## Layout
//!
//! - [`classifier`] - suffix/marker rules deciding what is a procedure
//! - [`codec`] - per-parameter serialization strategies
//! - [`protocol`] - byte buffers and the frame layout
//! - [`handler`] - procedure table, invocation context, dispatcher
//! - [`transport`] - transport abstraction and an in-memory loopback
//! - [`spawn`] - spawned objects, behaviours and ownership
//! - [`validator`] - registration, channels and lifecycle
//!
//! ## Example
//!
//! ```
//! use netcode_rpc::classifier::RpcAttribute;
//! use netcode_rpc::codec::{Args, Parameter};
//! use netcode_rpc::handler::{CallInfo, CallOutcome};
//! use netcode_rpc::spawn::{BehaviourRef, NetworkBehaviour, NetworkObject, SpawnManager};
//! use netcode_rpc::transport::LoopbackNetwork;
//! use netcode_rpc::validator::{BehaviourType, MethodDecl};
//! use netcode_rpc::{NetcodeValidator, ValidatorRegistry};
//!
//! #[derive(Default)]
//! struct Door { open: bool }
//! impl NetworkBehaviour for Door {}
//!
//! fn door_type() -> BehaviourType {
//!     BehaviourType::new::<Door>("Door").method(
//!         MethodDecl::new("OpenServerRpc", |d: &mut Door, mut a: Args, _: &CallInfo| {
//!             d.open = a.take::<bool>(0).unwrap_or_default();
//!         })
//!         .with_marker(RpcAttribute::server().require_ownership(false))
//!         .param(Parameter::of::<bool>("open")),
//!     )
//! }
//!
//! let net = LoopbackNetwork::new();
//! let server = net.start_server();
//! let client = net.connect_client();
//!
//! // Each side runs its own validator against its own registry
//! let (server_registry, client_registry) = (ValidatorRegistry::new(), ValidatorRegistry::new());
//! let mut on_server = NetcodeValidator::new("doors", &server_registry).unwrap();
//! let mut on_client = NetcodeValidator::new("doors", &client_registry).unwrap();
//! on_server.patch(door_type()).unwrap();
//! on_client.patch(door_type()).unwrap();
//! on_server.transport_started(server.clone());
//! on_client.transport_started(client.clone());
//!
//! let mut server_world = SpawnManager::new();
//! server_world.spawn(NetworkObject::new(1).with_behaviour(Door::default()));
//! let mut client_world = SpawnManager::new();
//! client_world.spawn(NetworkObject::new(1).with_behaviour(Door::default()));
//!
//! let door = BehaviourRef::new(1, 0);
//! let outcome = on_client
//!     .call(&mut client_world, door, "OpenServerRpc", Args::new().with(true))
//!     .unwrap();
//! assert_eq!(outcome, CallOutcome::Transmitted);
//! assert!(!client_world.get::<Door>(door).unwrap().open);
//!
//! server.poll(&mut server_world);
//! assert!(server_world.get::<Door>(door).unwrap().open);
//! ```

pub mod classifier;
pub mod codec;
pub mod config;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod spawn;
pub mod transport;
pub mod validator;

pub use config::ValidatorConfig;
pub use error::{Result, RpcError};
pub use handler::{CallOutcome, ClientRpcParams};
pub use validator::{NetcodeValidator, ValidatorRegistry};
