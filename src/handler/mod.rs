//! Handler module - procedure table and call dispatch.
//!
//! Provides:
//! - [`ProcedureTable`] - maps `(behaviour type, method)` to descriptor and body
//! - [`InvocationContext`] - call-scoped origin of an intercepted call
//! - [`Dispatcher`] - the interception point for local calls and received frames
//!
//! # Example
//!
//! ```
//! use std::any::TypeId;
//! use std::sync::Arc;
//!
//! use netcode_rpc::classifier::RpcAttribute;
//! use netcode_rpc::codec::{Args, Parameter};
//! use netcode_rpc::handler::{CallInfo, ProcedureDescriptor, ProcedureEntry, ProcedureTable, TypedBody};
//! use netcode_rpc::spawn::NetworkBehaviour;
//!
//! #[derive(Default)]
//! struct Score { points: i32 }
//! impl NetworkBehaviour for Score {}
//!
//! let mut table = ProcedureTable::new();
//! table.insert(TypeId::of::<Score>(), ProcedureEntry {
//!     descriptor: Arc::new(ProcedureDescriptor::new(
//!         "Score",
//!         "AddServerRpc",
//!         vec![Parameter::of::<i32>("n")],
//!         Some(RpcAttribute::server()),
//!     )),
//!     body: Arc::new(TypedBody::new(|s: &mut Score, mut args: Args, _: &CallInfo| {
//!         s.points += args.take::<i32>(0).unwrap_or_default();
//!     })),
//! });
//! assert_eq!(table.len(), 1);
//! ```

mod context;
mod dispatch;
mod registry;

pub use context::{Arrival, CallInfo, InvocationContext, Origin};
pub use dispatch::{CallOutcome, Dispatcher, Intercept};
pub use registry::{
    ClientRpcParams, ProcedureBody, ProcedureDescriptor, ProcedureEntry, ProcedureLookup, ProcedureTable,
    TypedBody,
};
