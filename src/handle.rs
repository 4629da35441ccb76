//! Handle registry.
//!
//! Opaque integer IDs stand in for engine objects. Every kind of object lives
//! in its own generation-counted arena ([`slotmap::SlotMap`]): a freed slot is
//! reused immediately, but with a bumped generation, so an ID that outlived
//! its object is always reported as [`HostError::InvalidHandle`] instead of
//! aliasing whatever now occupies the slot.
//!
//! Top-level objects (params blocks, scenes, sessions) are stored in a
//! [`Registry`], which is shared between client threads and guarded by a
//! table-wide `parking_lot::RwLock`. Scene-local objects (meshes, objects,
//! shaders, lights) live in plain `SlotMap`s inside the scene and are reached
//! through [`ArenaExt`] once the scene has been resolved.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use slotmap::{Key, KeyData, SlotMap};

use crate::error::{HostError, HostResult};

slotmap::new_key_type! {
    /// ID of a [`SceneParams`](crate::params::SceneParams) block.
    pub struct SceneParamsId;
    /// ID of a [`SessionParams`](crate::params::SessionParams) block.
    pub struct SessionParamsId;
    /// ID of a scene.
    pub struct SceneId;
    /// ID of a session.
    pub struct SessionId;
    /// Scene-local mesh ID.
    pub struct MeshId;
    /// Scene-local object ID.
    pub struct ObjectId;
    /// Scene-local shader ID.
    pub struct ShaderId;
    /// Scene-local light ID.
    pub struct LightId;
}

/// The kinds of objects addressable through handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    Client,
    SceneParams,
    SessionParams,
    Scene,
    Session,
    Mesh,
    Object,
    Shader,
    ShaderNode,
    Light,
    ClippingPlane,
    Device,
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Client => "client",
            Self::SceneParams => "scene params",
            Self::SessionParams => "session params",
            Self::Scene => "scene",
            Self::Session => "session",
            Self::Mesh => "mesh",
            Self::Object => "object",
            Self::Shader => "shader",
            Self::ShaderNode => "shader node",
            Self::Light => "light",
            Self::ClippingPlane => "clipping plane",
            Self::Device => "device",
        };
        f.write_str(name)
    }
}

/// Conversion between typed keys and the raw integers used at the boundary.
///
/// The raw value packs slot index and generation, so it round-trips exactly.
pub trait RawHandle: Key {
    /// Raw integer form of this handle.
    fn raw(self) -> u64 {
        self.data().as_ffi()
    }

    /// Rebuilds a handle from its raw integer form.
    ///
    /// Any integer is accepted; unknown values simply fail lookup.
    fn from_raw(raw: u64) -> Self {
        KeyData::from_ffi(raw).into()
    }
}

impl<K: Key> RawHandle for K {}

/// Monotonically assigned client identity. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u32);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client#{}", self.0)
    }
}

/// A registry entry tagged with the client that created it.
#[derive(Debug)]
pub struct Owned<T> {
    pub owner: ClientId,
    pub value: T,
}

impl<T> std::ops::Deref for Owned<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

/// Thread-safe table of heap-owned objects of one kind.
///
/// Lookups hand out `Arc` clones, so a caller keeps its object alive even if
/// another thread destroys the handle concurrently; the handle itself becomes
/// invalid immediately.
pub struct Registry<K: Key, T> {
    kind: HandleKind,
    slots: RwLock<SlotMap<K, Arc<Owned<T>>>>,
}

impl<K: Key, T> Registry<K, T> {
    /// Creates an empty registry for `kind`.
    pub fn new(kind: HandleKind) -> Self {
        Self {
            kind,
            slots: RwLock::new(SlotMap::with_key()),
        }
    }

    /// The kind of object stored here.
    pub fn kind(&self) -> HandleKind {
        self.kind
    }

    /// Stores `value` and returns its new handle.
    pub fn insert(&self, owner: ClientId, value: T) -> K {
        let key = self.slots.write().insert(Arc::new(Owned { owner, value }));
        log::trace!("Registry[{}]: created {:?} for {}", self.kind, key, owner);
        key
    }

    /// Builds a value that needs to know its own handle, then stores it.
    pub fn insert_with_key(&self, owner: ClientId, build: impl FnOnce(K) -> T) -> K {
        let key = self
            .slots
            .write()
            .insert_with_key(|key| Arc::new(Owned { owner, value: build(key) }));
        log::trace!("Registry[{}]: created {:?} for {}", self.kind, key, owner);
        key
    }

    /// Like [`insert_with_key`](Self::insert_with_key) for values whose
    /// construction can fail. Nothing is stored on failure.
    pub fn try_insert_with_key(
        &self,
        owner: ClientId,
        build: impl FnOnce(K) -> HostResult<T>,
    ) -> HostResult<K> {
        let key = self.slots.write().try_insert_with_key(|key| {
            build(key).map(|value| Arc::new(Owned { owner, value }))
        })?;
        log::trace!("Registry[{}]: created {:?} for {}", self.kind, key, owner);
        Ok(key)
    }

    /// Resolves `key` regardless of owner.
    pub fn get(&self, key: K) -> HostResult<Arc<Owned<T>>> {
        self.slots
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| HostError::invalid(self.kind, key.data().as_ffi()))
    }

    /// Resolves `key` on behalf of `owner`.
    ///
    /// A handle that belongs to another client is reported as invalid, so
    /// clients cannot observe or touch each other's objects.
    pub fn get_owned(&self, owner: ClientId, key: K) -> HostResult<Arc<Owned<T>>> {
        let entry = self.get(key)?;
        if entry.owner != owner {
            return Err(HostError::invalid(self.kind, key.data().as_ffi()));
        }
        Ok(entry)
    }

    /// Removes `key` on behalf of `owner`, returning the entry.
    pub fn remove(&self, owner: ClientId, key: K) -> HostResult<Arc<Owned<T>>> {
        let mut slots = self.slots.write();
        match slots.get(key) {
            Some(entry) if entry.owner == owner => {}
            _ => return Err(HostError::invalid(self.kind, key.data().as_ffi())),
        }
        let removed = slots
            .remove(key)
            .ok_or_else(|| HostError::invalid(self.kind, key.data().as_ffi()))?;
        log::trace!("Registry[{}]: destroyed {:?}", self.kind, key);
        Ok(removed)
    }

    /// Whether `key` currently resolves.
    pub fn contains(&self, key: K) -> bool {
        self.slots.read().contains_key(key)
    }

    /// Handles currently owned by `owner`.
    pub fn keys_owned_by(&self, owner: ClientId) -> Vec<K> {
        self.slots
            .read()
            .iter()
            .filter(|(_, entry)| entry.owner == owner)
            .map(|(key, _)| key)
            .collect()
    }

    /// Number of live handles.
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    /// Whether the registry holds no handles.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every entry, returning them for teardown.
    pub fn drain(&self) -> Vec<Arc<Owned<T>>> {
        self.slots.write().drain().map(|(_, entry)| entry).collect()
    }
}

/// Checked lookups into scene-local arenas.
pub trait ArenaExt<K: Key, V> {
    fn lookup(&self, kind: HandleKind, key: K) -> HostResult<&V>;
    fn lookup_mut(&mut self, kind: HandleKind, key: K) -> HostResult<&mut V>;
}

impl<K: Key, V> ArenaExt<K, V> for SlotMap<K, V> {
    fn lookup(&self, kind: HandleKind, key: K) -> HostResult<&V> {
        self.get(key)
            .ok_or_else(|| HostError::invalid(kind, key.data().as_ffi()))
    }

    fn lookup_mut(&mut self, kind: HandleKind, key: K) -> HostResult<&mut V> {
        self.get_mut(key)
            .ok_or_else(|| HostError::invalid(kind, key.data().as_ffi()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: ClientId = ClientId(1);
    const BOB: ClientId = ClientId(2);

    #[test]
    fn test_get_until_destroy() {
        let registry = Registry::<SceneId, u32>::new(HandleKind::Scene);
        let id = registry.insert(ALICE, 42);

        assert_eq!(registry.get(id).unwrap().value, 42);
        registry.remove(ALICE, id).unwrap();
        assert_eq!(
            registry.get(id).unwrap_err(),
            HostError::invalid(HandleKind::Scene, id.raw())
        );
    }

    #[test]
    fn test_stale_handle_does_not_alias_reused_slot() {
        let registry = Registry::<SceneId, &str>::new(HandleKind::Scene);
        let old = registry.insert(ALICE, "old");
        registry.remove(ALICE, old).unwrap();

        let new = registry.insert(ALICE, "new");
        assert_ne!(old, new);
        assert!(registry.get(old).is_err());
        assert_eq!(registry.get(new).unwrap().value, "new");
    }

    #[test]
    fn test_raw_round_trip() {
        let registry = Registry::<SessionId, ()>::new(HandleKind::Session);
        let id = registry.insert(ALICE, ());
        assert_eq!(SessionId::from_raw(id.raw()), id);
        assert!(registry.get(SessionId::from_raw(0xdead_beef)).is_err());
    }

    #[test]
    fn test_foreign_owner_is_rejected() {
        let registry = Registry::<SceneId, u8>::new(HandleKind::Scene);
        let id = registry.insert(ALICE, 1);

        assert!(registry.get_owned(BOB, id).is_err());
        assert!(registry.remove(BOB, id).is_err());
        assert!(registry.contains(id));
        assert_eq!(registry.keys_owned_by(ALICE), vec![id]);
        assert!(registry.keys_owned_by(BOB).is_empty());
    }

    #[test]
    fn test_arena_lookup() {
        let mut arena = SlotMap::<MeshId, u32>::with_key();
        let id = arena.insert(5);
        *arena.lookup_mut(HandleKind::Mesh, id).unwrap() += 1;
        assert_eq!(*arena.lookup(HandleKind::Mesh, id).unwrap(), 6);
        arena.remove(id);
        assert!(arena.lookup(HandleKind::Mesh, id).is_err());
    }

    #[test]
    fn test_concurrent_inserts() {
        let registry = Arc::new(Registry::<SceneId, usize>::new(HandleKind::Scene));
        let threads: Vec<_> = (0..4)
            .map(|t| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    (0..100)
                        .map(|i| registry.insert(ClientId(t), i))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let ids: Vec<_> = threads
            .into_iter()
            .flat_map(|t| t.join().unwrap())
            .collect();
        assert_eq!(registry.len(), 400);
        assert!(ids.iter().all(|id| registry.contains(*id)));
    }
}
