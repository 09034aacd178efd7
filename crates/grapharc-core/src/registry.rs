//! Type registry for polymorphic loading.
//!
//! Every concrete type that may be materialised from a stream is registered
//! under a [`StableId`] derived from its tag string. The id is a pure
//! function of the tag, so it is identical across builds, platforms, and
//! process runs.

use crate::error::{Error, Result};
use crate::identity::Slot;
use crate::object::{self, Object, Polymorphic};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use tracing::debug;

/// Build-independent 64-bit type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StableId(u64);

impl StableId {
    /// Derive the identifier for `tag`: the first eight bytes of its BLAKE3
    /// digest, read big-endian.
    pub fn of(tag: &str) -> Self {
        let digest = blake3::hash(tag.as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest.as_bytes()[..8]);
        Self(u64::from_be_bytes(head))
    }

    /// Wraps a raw identifier read from a stream
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw value as written on the wire
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for StableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Everything the archive needs to know about a registered type
#[derive(Clone, Copy)]
pub struct TypeDescriptor {
    id: StableId,
    tag: &'static str,
    create: fn() -> Box<dyn Object>,
    create_shared: fn() -> (Rc<RefCell<dyn Object>>, Slot),
}

fn create_boxed<T: Polymorphic>() -> Box<dyn Object> {
    Box::<T>::default()
}

fn create_shared<T: Polymorphic>() -> (Rc<RefCell<dyn Object>>, Slot) {
    let (concrete, slot) = object::retain_concrete(T::default());
    let erased: Rc<RefCell<dyn Object>> = concrete;
    (erased, slot)
}

impl TypeDescriptor {
    /// Descriptor for the polymorphic type `T`
    pub fn of<T: Polymorphic>() -> Self {
        Self {
            id: StableId::of(T::TAG),
            tag: T::TAG,
            create: create_boxed::<T>,
            create_shared: create_shared::<T>,
        }
    }

    /// Stable identifier of the type
    pub fn id(&self) -> StableId {
        self.id
    }

    /// Tag string the identifier was derived from
    pub fn tag(&self) -> &'static str {
        self.tag
    }

    /// Default-construct a fresh instance behind a `Box`
    pub fn create(&self) -> Box<dyn Object> {
        (self.create)()
    }

    /// Default-construct a fresh instance behind an `Rc<RefCell<_>>`,
    /// along with a handle-table slot holding its concrete and `dyn Object`
    /// views
    pub fn create_shared(&self) -> (Rc<RefCell<dyn Object>>, Slot) {
        (self.create_shared)()
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("id", &self.id)
            .field("tag", &self.tag)
            .finish()
    }
}

impl PartialEq for TypeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.tag == other.tag
    }
}

impl Eq for TypeDescriptor {}

static GLOBAL: Lazy<TypeRegistry> = Lazy::new(TypeRegistry::new);

/// Map from [`StableId`] to [`TypeDescriptor`]
#[derive(Default)]
pub struct TypeRegistry {
    entries: RwLock<HashMap<StableId, TypeDescriptor>>,
}

impl TypeRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry used by archives that were not handed one
    pub fn global() -> &'static TypeRegistry {
        &GLOBAL
    }

    /// Register `T` under its tag.
    ///
    /// Registering the same type twice is a no-op.
    pub fn register<T: Polymorphic>(&self) -> Result<TypeDescriptor> {
        let descriptor = TypeDescriptor::of::<T>();
        self.register_descriptor(descriptor)?;
        Ok(descriptor)
    }

    /// Register a prepared descriptor.
    ///
    /// Fails if a different tag already owns the same stable identifier.
    pub fn register_descriptor(&self, descriptor: TypeDescriptor) -> Result<()> {
        let mut entries = self.entries.write();
        if let Some(existing) = entries.get(&descriptor.id) {
            if existing.tag == descriptor.tag {
                return Ok(());
            }
            return Err(Error::TypeCollision {
                id: descriptor.id.get(),
                existing: existing.tag,
                incoming: descriptor.tag,
            });
        }
        debug!(tag = descriptor.tag, id = %descriptor.id, "registered type");
        entries.insert(descriptor.id, descriptor);
        Ok(())
    }

    /// Look up a descriptor
    pub fn find(&self, id: StableId) -> Option<TypeDescriptor> {
        self.entries.read().get(&id).copied()
    }

    /// Default-construct an instance of the type registered under `id`
    pub fn create(&self, id: StableId) -> Result<Box<dyn Object>> {
        self.find(id)
            .map(|descriptor| descriptor.create())
            .ok_or_else(|| Error::unknown_type(id.get()))
    }

    /// Returns true if `id` is registered
    pub fn contains(&self, id: StableId) -> bool {
        self.entries.read().contains_key(&id)
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Tags of all registered types, sorted
    pub fn tags(&self) -> Vec<&'static str> {
        let mut tags: Vec<_> = self.entries.read().values().map(|d| d.tag).collect();
        tags.sort_unstable();
        tags
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.tags())
            .finish()
    }
}
