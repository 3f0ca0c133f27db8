//! Procedure table.
//!
//! Maps `(behaviour type, method name)` to the classified descriptor and the
//! body that runs when a call is allowed to proceed.

use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::CallInfo;
use crate::classifier::{Role, RpcAttribute};
use crate::codec::{Args, ParamCodec, Parameter, RpcArgument};
use crate::error::{RpcError, Result};
use crate::spawn::NetworkBehaviour;
use crate::transport::{ClientId, DeliveryMode};

/// Trait for procedure bodies.
pub trait ProcedureBody: Send + Sync + 'static {
    /// Run the body against a behaviour with decoded arguments.
    fn call(&self, behaviour: &mut dyn NetworkBehaviour, args: Args, info: &CallInfo) -> Result<()>;
}

/// Wrapper that downcasts the behaviour before calling the body.
pub struct TypedBody<B, F>
where
    B: NetworkBehaviour,
    F: Fn(&mut B, Args, &CallInfo) + Send + Sync + 'static,
{
    body: F,
    _phantom: PhantomData<fn(&mut B)>,
}

impl<B, F> TypedBody<B, F>
where
    B: NetworkBehaviour,
    F: Fn(&mut B, Args, &CallInfo) + Send + Sync + 'static,
{
    pub fn new(body: F) -> Self {
        Self {
            body,
            _phantom: PhantomData,
        }
    }
}

impl<B, F> ProcedureBody for TypedBody<B, F>
where
    B: NetworkBehaviour,
    F: Fn(&mut B, Args, &CallInfo) + Send + Sync + 'static,
{
    fn call(&self, behaviour: &mut dyn NetworkBehaviour, args: Args, info: &CallInfo) -> Result<()> {
        let found = behaviour.type_name();
        let target = behaviour
            .as_any_mut()
            .downcast_mut::<B>()
            .ok_or(RpcError::BehaviourTypeMismatch {
                expected: type_name::<B>(),
                found,
            })?;
        (self.body)(target, args, info);
        Ok(())
    }
}

/// Identity and metadata of one procedure.
#[derive(Debug, Clone)]
pub struct ProcedureDescriptor {
    pub owning_type: String,
    pub method_name: String,
    pub parameters: Vec<Parameter>,
    /// `None` only for methods intercepted without a role marker.
    pub attribute: Option<RpcAttribute>,
}

impl ProcedureDescriptor {
    pub fn new(
        owning_type: impl Into<String>,
        method_name: impl Into<String>,
        parameters: Vec<Parameter>,
        attribute: Option<RpcAttribute>,
    ) -> Self {
        Self {
            owning_type: owning_type.into(),
            method_name: method_name.into(),
            parameters,
            attribute,
        }
    }

    pub fn role(&self) -> Option<Role> {
        self.attribute.as_ref().map(RpcAttribute::role)
    }

    pub fn requires_ownership(&self) -> bool {
        self.attribute.as_ref().is_some_and(RpcAttribute::requires_ownership)
    }

    pub fn delivery(&self) -> DeliveryMode {
        self.attribute
            .as_ref()
            .map(RpcAttribute::delivery_mode)
            .unwrap_or_default()
    }

    #[inline]
    pub fn arity(&self) -> usize {
        self.parameters.len()
    }

    /// `"Type.Method"`.
    pub fn identity(&self) -> String {
        format!("{}.{}", self.owning_type, self.method_name)
    }

    /// True if the last parameter is a [`ClientRpcParams`].
    pub fn has_client_rpc_params(&self) -> bool {
        self.parameters.last().is_some_and(Parameter::is::<ClientRpcParams>)
    }
}

/// Descriptor plus body, cheap to clone out of the table.
#[derive(Clone)]
pub struct ProcedureEntry {
    pub descriptor: Arc<ProcedureDescriptor>,
    pub body: Arc<dyn ProcedureBody>,
}

impl fmt::Debug for ProcedureEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcedureEntry")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// Source of procedure entries for the dispatcher.
pub trait ProcedureLookup {
    fn lookup(&self, owner: TypeId, method: &str) -> Option<ProcedureEntry>;

    /// Registered name of a behaviour type.
    fn type_name(&self, owner: TypeId) -> Option<String>;
}

#[derive(Debug)]
struct TypeEntry {
    name: String,
    methods: HashMap<String, ProcedureEntry>,
}

/// Registered procedures grouped by owning type.
#[derive(Debug, Default)]
pub struct ProcedureTable {
    types: HashMap<TypeId, TypeEntry>,
}

impl ProcedureTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a procedure, replacing one with the same name on the same type.
    pub fn insert(&mut self, owner: TypeId, entry: ProcedureEntry) {
        let type_entry = self.types.entry(owner).or_insert_with(|| TypeEntry {
            name: entry.descriptor.owning_type.clone(),
            methods: HashMap::new(),
        });
        type_entry
            .methods
            .insert(entry.descriptor.method_name.clone(), entry);
    }

    pub fn contains_type(&self, owner: TypeId) -> bool {
        self.types.contains_key(&owner)
    }

    /// Registered type names, sorted.
    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.types.values().map(|t| t.name.clone()).collect();
        names.sort();
        names
    }

    /// All descriptors, sorted by identity.
    pub fn descriptors(&self) -> Vec<Arc<ProcedureDescriptor>> {
        let mut all: Vec<_> = self
            .types
            .values()
            .flat_map(|t| t.methods.values().map(|e| e.descriptor.clone()))
            .collect();
        all.sort_by_key(|d| d.identity());
        all
    }

    /// Number of procedures.
    pub fn len(&self) -> usize {
        self.types.values().map(|t| t.methods.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn clear(&mut self) {
        self.types.clear();
    }
}

impl ProcedureLookup for ProcedureTable {
    fn lookup(&self, owner: TypeId, method: &str) -> Option<ProcedureEntry> {
        self.types.get(&owner)?.methods.get(method).cloned()
    }

    fn type_name(&self, owner: TypeId) -> Option<String> {
        self.types.get(&owner).map(|t| t.name.clone())
    }
}

/// Optional trailing parameter of a client procedure.
///
/// With `target_client_ids` set, the call goes only to those clients
/// instead of being broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRpcParams {
    pub target_client_ids: Option<Vec<ClientId>>,
}

impl ClientRpcParams {
    pub fn to_clients(ids: impl IntoIterator<Item = ClientId>) -> Self {
        Self {
            target_client_ids: Some(ids.into_iter().collect()),
        }
    }
}

impl RpcArgument for ClientRpcParams {
    fn param_codec() -> Option<ParamCodec> {
        Some(ParamCodec::opaque::<ClientRpcParams>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spawn::BehaviourRef;

    #[derive(Default)]
    struct Counter {
        total: i32,
    }
    impl NetworkBehaviour for Counter {}

    struct Other;
    impl NetworkBehaviour for Other {}

    fn add_entry() -> ProcedureEntry {
        ProcedureEntry {
            descriptor: Arc::new(ProcedureDescriptor::new(
                "Counter",
                "AddServerRpc",
                vec![Parameter::of::<i32>("n")],
                Some(RpcAttribute::server().require_ownership(false)),
            )),
            body: Arc::new(TypedBody::new(|c: &mut Counter, mut args: Args, _: &CallInfo| {
                c.total += args.take::<i32>(0).unwrap_or_default();
            })),
        }
    }

    fn info() -> CallInfo {
        CallInfo {
            target: BehaviourRef::new(1, 0),
            sender: 2,
        }
    }

    #[test]
    fn test_typed_body_runs() {
        let entry = add_entry();
        let mut counter = Counter::default();
        entry
            .body
            .call(&mut counter, Args::new().with(5i32), &info())
            .unwrap();
        assert_eq!(counter.total, 5);
    }

    #[test]
    fn test_typed_body_wrong_behaviour() {
        let entry = add_entry();
        let err = entry.body.call(&mut Other, Args::new().with(1i32), &info()).unwrap_err();
        assert!(matches!(err, RpcError::BehaviourTypeMismatch { .. }));
    }

    #[test]
    fn test_table_lookup() {
        let mut table = ProcedureTable::new();
        table.insert(TypeId::of::<Counter>(), add_entry());

        assert_eq!(table.len(), 1);
        assert!(table.contains_type(TypeId::of::<Counter>()));
        assert_eq!(table.type_names(), vec!["Counter"]);
        assert_eq!(table.type_name(TypeId::of::<Counter>()).as_deref(), Some("Counter"));

        let found = table.lookup(TypeId::of::<Counter>(), "AddServerRpc").unwrap();
        assert_eq!(found.descriptor.identity(), "Counter.AddServerRpc");
        assert!(table.lookup(TypeId::of::<Counter>(), "Missing").is_none());
        assert!(table.lookup(TypeId::of::<Other>(), "AddServerRpc").is_none());

        table.clear();
        assert!(table.is_empty());
    }

    #[test]
    fn test_descriptor_accessors() {
        let d = ProcedureDescriptor::new(
            "Door",
            "OpenClientRpc",
            vec![Parameter::of::<bool>("wide"), Parameter::of::<ClientRpcParams>("rpc_params")],
            Some(RpcAttribute::client().delivery(DeliveryMode::Unreliable)),
        );
        assert_eq!(d.role(), Some(Role::Client));
        assert!(!d.requires_ownership());
        assert_eq!(d.delivery(), DeliveryMode::Unreliable);
        assert_eq!(d.arity(), 2);
        assert!(d.has_client_rpc_params());

        let bare = ProcedureDescriptor::new("Door", "Knock", vec![], None);
        assert_eq!(bare.role(), None);
        assert_eq!(bare.delivery(), DeliveryMode::Reliable);
        assert!(!bare.has_client_rpc_params());
    }
}
