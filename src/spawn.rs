//! Networked objects and their behaviours.
//!
//! The dispatcher only needs to find a behaviour by `(object id, order
//! index)` and know who owns the object; [`ObjectRegistry`] is that seam.
//! [`SpawnManager`] is a plain in-memory implementation.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

use crate::error::{RpcError, Result};
use crate::transport::{ClientId, SERVER_CLIENT_ID};

/// Upcast helper so behaviours can be downcast to their concrete type.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A component attached to a networked object that can declare procedures.
pub trait NetworkBehaviour: AsAny + Send {
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Concrete type of a behaviour behind a trait object.
pub fn behaviour_type_id(behaviour: &dyn NetworkBehaviour) -> TypeId {
    behaviour.as_any().type_id()
}

/// Address of one behaviour: object id plus order index on the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BehaviourRef {
    pub object_id: u64,
    pub behaviour_id: u16,
}

impl BehaviourRef {
    pub fn new(object_id: u64, behaviour_id: u16) -> Self {
        Self {
            object_id,
            behaviour_id,
        }
    }
}

impl fmt::Display for BehaviourRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.object_id, self.behaviour_id)
    }
}

/// Lookup of spawned objects used by the dispatcher.
pub trait ObjectRegistry {
    fn is_spawned(&self, object_id: u64) -> bool;

    fn owner_of(&self, object_id: u64) -> Option<ClientId>;

    fn behaviour(&self, target: BehaviourRef) -> Option<&dyn NetworkBehaviour>;

    fn behaviour_mut(&mut self, target: BehaviourRef) -> Option<&mut (dyn NetworkBehaviour + 'static)>;
}

/// A spawned object with its ordered behaviours.
pub struct NetworkObject {
    id: u64,
    owner: ClientId,
    behaviours: Vec<Box<dyn NetworkBehaviour>>,
}

impl NetworkObject {
    /// New object owned by the server.
    pub fn new(id: u64) -> Self {
        Self::with_owner(id, SERVER_CLIENT_ID)
    }

    pub fn with_owner(id: u64, owner: ClientId) -> Self {
        Self {
            id,
            owner,
            behaviours: Vec::new(),
        }
    }

    /// Attach a behaviour and return its order index.
    ///
    /// The index is the behaviour id used on the wire, so every peer must
    /// attach behaviours in the same order.
    ///
    /// # Errors
    ///
    /// [`RpcError::TooManyBehaviours`] once every `u16` index is taken.
    pub fn add_behaviour<B: NetworkBehaviour>(&mut self, behaviour: B) -> Result<u16> {
        let index = u16::try_from(self.behaviours.len())
            .map_err(|_| RpcError::TooManyBehaviours { object_id: self.id })?;
        self.behaviours.push(Box::new(behaviour));
        Ok(index)
    }

    /// Builder form of [`NetworkObject::add_behaviour`]. A behaviour past the
    /// index limit is logged and dropped.
    pub fn with_behaviour<B: NetworkBehaviour>(mut self, behaviour: B) -> Self {
        if let Err(e) = self.add_behaviour(behaviour) {
            tracing::error!("{}", e);
        }
        self
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn owner(&self) -> ClientId {
        self.owner
    }

    #[inline]
    pub fn behaviour_count(&self) -> usize {
        self.behaviours.len()
    }

    /// Order index of the first behaviour of type `B`.
    pub fn index_of<B: NetworkBehaviour>(&self) -> Option<u16> {
        self.behaviours
            .iter()
            .position(|b| b.as_ref().as_any().is::<B>())
            .and_then(|i| u16::try_from(i).ok())
    }

    pub fn behaviour_at(&self, index: u16) -> Option<&dyn NetworkBehaviour> {
        self.behaviours.get(index as usize).map(|b| b.as_ref())
    }

    pub fn behaviour_at_mut(&mut self, index: u16) -> Option<&mut (dyn NetworkBehaviour + 'static)> {
        self.behaviours.get_mut(index as usize).map(|b| b.as_mut())
    }

    /// Behaviour at `index` as `B`.
    pub fn get<B: NetworkBehaviour>(&self, index: u16) -> Option<&B> {
        self.behaviour_at(index)?.as_any().downcast_ref::<B>()
    }

    pub fn get_mut<B: NetworkBehaviour>(&mut self, index: u16) -> Option<&mut B> {
        self.behaviour_at_mut(index)?.as_any_mut().downcast_mut::<B>()
    }
}

impl fmt::Debug for NetworkObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkObject")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field(
                "behaviours",
                &self.behaviours.iter().map(|b| b.type_name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// In-memory spawned object table.
#[derive(Debug, Default)]
pub struct SpawnManager {
    objects: HashMap<u64, NetworkObject>,
}

impl SpawnManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn an object, replacing any object with the same id.
    pub fn spawn(&mut self, object: NetworkObject) -> Option<NetworkObject> {
        tracing::debug!(object = object.id, owner = object.owner, "Spawned");
        self.objects.insert(object.id, object)
    }

    pub fn despawn(&mut self, object_id: u64) -> Option<NetworkObject> {
        let removed = self.objects.remove(&object_id);
        if removed.is_some() {
            tracing::debug!(object = object_id, "Despawned");
        }
        removed
    }

    /// Give ownership of an object to `owner`. Returns `false` if not spawned.
    pub fn change_ownership(&mut self, object_id: u64, owner: ClientId) -> bool {
        match self.objects.get_mut(&object_id) {
            Some(object) => {
                tracing::debug!(object = object_id, from = object.owner, to = owner, "Ownership changed");
                object.owner = owner;
                true
            }
            None => false,
        }
    }

    pub fn object(&self, object_id: u64) -> Option<&NetworkObject> {
        self.objects.get(&object_id)
    }

    pub fn object_mut(&mut self, object_id: u64) -> Option<&mut NetworkObject> {
        self.objects.get_mut(&object_id)
    }

    /// Typed access to a behaviour.
    pub fn get<B: NetworkBehaviour>(&self, target: BehaviourRef) -> Option<&B> {
        self.objects.get(&target.object_id)?.get::<B>(target.behaviour_id)
    }

    pub fn get_mut<B: NetworkBehaviour>(&mut self, target: BehaviourRef) -> Option<&mut B> {
        self.objects.get_mut(&target.object_id)?.get_mut::<B>(target.behaviour_id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl ObjectRegistry for SpawnManager {
    fn is_spawned(&self, object_id: u64) -> bool {
        self.objects.contains_key(&object_id)
    }

    fn owner_of(&self, object_id: u64) -> Option<ClientId> {
        self.objects.get(&object_id).map(NetworkObject::owner)
    }

    fn behaviour(&self, target: BehaviourRef) -> Option<&dyn NetworkBehaviour> {
        self.objects.get(&target.object_id)?.behaviour_at(target.behaviour_id)
    }

    fn behaviour_mut(&mut self, target: BehaviourRef) -> Option<&mut (dyn NetworkBehaviour + 'static)> {
        self.objects.get_mut(&target.object_id)?.behaviour_at_mut(target.behaviour_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Door {
        open: bool,
    }
    impl NetworkBehaviour for Door {}

    #[derive(Default)]
    struct Lamp;
    impl NetworkBehaviour for Lamp {}

    #[test]
    fn test_behaviour_indices_follow_insertion_order() {
        let mut obj = NetworkObject::new(1);
        assert_eq!(obj.add_behaviour(Door::default()).unwrap(), 0);
        assert_eq!(obj.add_behaviour(Lamp).unwrap(), 1);
        assert_eq!(obj.behaviour_count(), 2);
        assert_eq!(obj.index_of::<Lamp>(), Some(1));
        assert_eq!(obj.index_of::<Door>(), Some(0));
    }

    #[test]
    fn test_behaviour_index_limit() {
        let mut obj = NetworkObject::new(4);
        for _ in 0..=u16::MAX {
            obj.add_behaviour(Lamp).unwrap();
        }
        assert_eq!(obj.behaviour_count(), u16::MAX as usize + 1);

        let err = obj.add_behaviour(Door::default()).unwrap_err();
        assert!(matches!(err, RpcError::TooManyBehaviours { object_id: 4 }));
        assert_eq!(obj.index_of::<Door>(), None);

        let obj = obj.with_behaviour(Door::default());
        assert_eq!(obj.behaviour_count(), u16::MAX as usize + 1);
    }

    #[test]
    fn test_typed_access() {
        let mut spawned = SpawnManager::new();
        spawned.spawn(NetworkObject::with_owner(5, 2).with_behaviour(Door::default()));

        let at = BehaviourRef::new(5, 0);
        spawned.get_mut::<Door>(at).unwrap().open = true;
        assert!(spawned.get::<Door>(at).unwrap().open);
        assert!(spawned.get::<Lamp>(at).is_none());
        assert!(spawned.get::<Door>(BehaviourRef::new(5, 1)).is_none());
    }

    #[test]
    fn test_registry_view() {
        let mut spawned = SpawnManager::new();
        spawned.spawn(NetworkObject::with_owner(9, 3).with_behaviour(Lamp));

        let registry: &mut dyn ObjectRegistry = &mut spawned;
        assert!(registry.is_spawned(9));
        assert!(!registry.is_spawned(10));
        assert_eq!(registry.owner_of(9), Some(3));

        let b = registry.behaviour(BehaviourRef::new(9, 0)).unwrap();
        assert_eq!(behaviour_type_id(b), TypeId::of::<Lamp>());
        assert!(b.type_name().ends_with("Lamp"));
    }

    #[test]
    fn test_ownership_and_despawn() {
        let mut spawned = SpawnManager::new();
        spawned.spawn(NetworkObject::new(1));
        assert_eq!(spawned.owner_of(1), Some(SERVER_CLIENT_ID));

        assert!(spawned.change_ownership(1, 4));
        assert_eq!(spawned.owner_of(1), Some(4));
        assert!(!spawned.change_ownership(2, 4));

        assert!(spawned.despawn(1).is_some());
        assert!(spawned.is_empty());
        assert!(spawned.despawn(1).is_none());
    }
}
