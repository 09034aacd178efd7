//! Per-session identity bookkeeping.
//!
//! The save side maps object addresses to sequential [`ObjectId`]s so that a
//! second reference to the same object writes only its id. Shared objects
//! are retained until the session ends, so an address cannot be reused by a
//! different object while its id is still live. The load side is a handle
//! table: each id owns a [`Slot`] holding the materialised object, keyed by
//! the stable integer rather than by any memory address.
//!
//! Types get the same treatment through [`TypeId`].

use crate::registry::StableId;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;

/// Archive-local object identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u32);

impl ObjectId {
    /// Encodes a null reference
    pub const NULL: Self = Self(1);
    /// First id handed to a real object
    pub const FIRST: Self = Self(2);

    /// Wraps a raw id read from a stream
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw value as written on the wire
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Returns true for the null sentinel
    pub const fn is_null(self) -> bool {
        self.0 == Self::NULL.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Archive-local type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(u32);

impl TypeId {
    /// First id handed to a real type (0 and 1 are never assigned)
    pub const FIRST: Self = Self(2);

    /// Wraps a raw id read from a stream
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw value as written on the wire
    pub const fn get(self) -> u32 {
        self.0
    }
}

/// How a materialised object is owned by the graph that received it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Moved into a single `Box`; the id may never be bound again
    Exclusive,
    /// Reference counted; every later reference shares the instance
    Shared,
    /// First reached through a non-owning back-reference
    Weak,
}

/// One entry of the load-side handle table.
///
/// A shared object is retained under each static type it may be reached
/// through: its concrete `Rc<RefCell<T>>`, and for polymorphic objects an
/// `Rc<RefCell<dyn Object>>` and the trait-object view it was created for.
/// All views point at the same allocation.
pub struct Slot {
    ownership: Ownership,
    views: Vec<Box<dyn Any>>,
}

impl Slot {
    /// A slot whose object was moved into an exclusive owner
    pub fn exclusive() -> Self {
        Self {
            ownership: Ownership::Exclusive,
            views: Vec::new(),
        }
    }

    /// A slot retaining a shared handle (normally an `Rc<RefCell<_>>`)
    pub fn shared<H: Any>(handle: H, ownership: Ownership) -> Self {
        Self {
            ownership,
            views: vec![Box::new(handle)],
        }
    }

    /// Retain another typed handle to the same object
    pub fn with_view<H: Any>(mut self, view: H) -> Self {
        self.views.push(Box::new(view));
        self
    }

    /// Replace the recorded ownership kind
    pub fn with_ownership(mut self, ownership: Ownership) -> Self {
        self.ownership = ownership;
        self
    }

    /// Ownership kind recorded when the id was first bound
    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    /// Borrow the first retained handle of type `H`
    pub fn handle<H: Any>(&self) -> Option<&H> {
        self.views.iter().find_map(|view| view.downcast_ref::<H>())
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("ownership", &self.ownership)
            .field("views", &self.views.len())
            .finish()
    }
}

/// Object and type identity maps for one archive session
pub struct IdentityTracker {
    next_object: u32,
    next_type: u32,
    object_ids: HashMap<usize, ObjectId>,
    pinned: Vec<Box<dyn Any>>,
    objects: HashMap<ObjectId, Slot>,
    type_ids: HashMap<StableId, TypeId>,
    types: HashMap<TypeId, StableId>,
}

impl fmt::Debug for IdentityTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityTracker")
            .field("next_object", &self.next_object)
            .field("next_type", &self.next_type)
            .field("pinned", &self.pinned.len())
            .field("objects", &self.objects)
            .finish()
    }
}

impl Default for IdentityTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityTracker {
    /// Creates an empty tracker
    pub fn new() -> Self {
        Self {
            next_object: ObjectId::FIRST.get(),
            next_type: TypeId::FIRST.get(),
            object_ids: HashMap::new(),
            pinned: Vec::new(),
            objects: HashMap::new(),
            type_ids: HashMap::new(),
            types: HashMap::new(),
        }
    }

    /// Id for the object at `address`, allocating one on first sight.
    ///
    /// The boolean is true when the id was freshly allocated.
    pub fn object_id_for(&mut self, address: usize) -> (ObjectId, bool) {
        if let Some(&id) = self.object_ids.get(&address) {
            return (id, false);
        }
        let id = self.allocate_object_id();
        self.object_ids.insert(address, id);
        (id, true)
    }

    /// Id for an object that can only be reached once, such as the target
    /// of a `Box`. Nothing is recorded against its address.
    pub fn allocate_object_id(&mut self) -> ObjectId {
        let id = ObjectId(self.next_object);
        self.next_object += 1;
        id
    }

    /// Keep `handle` alive until the session is reset
    pub fn pin<H: Any>(&mut self, handle: H) {
        self.pinned.push(Box::new(handle));
    }

    /// The id a writer would hand to the next new object
    pub fn next_object_id(&self) -> ObjectId {
        ObjectId(self.next_object)
    }

    /// Slot bound to `id`, if the id was seen before
    pub fn resolve(&self, id: ObjectId) -> Option<&Slot> {
        self.objects.get(&id)
    }

    /// Bind a freshly materialised object to `id`
    pub fn bind(&mut self, id: ObjectId, slot: Slot) {
        self.next_object = self.next_object.max(id.get().saturating_add(1));
        self.objects.insert(id, slot);
    }

    /// Id for the type `stable`, allocating one on first use
    pub fn type_id_for(&mut self, stable: StableId) -> (TypeId, bool) {
        if let Some(&id) = self.type_ids.get(&stable) {
            return (id, false);
        }
        let id = TypeId(self.next_type);
        self.next_type += 1;
        self.type_ids.insert(stable, id);
        (id, true)
    }

    /// The id a writer would hand to the next new type
    pub fn next_type_id(&self) -> TypeId {
        TypeId(self.next_type)
    }

    /// Stable identifier bound to `id`, if the id was seen before
    pub fn resolve_type(&self, id: TypeId) -> Option<StableId> {
        self.types.get(&id).copied()
    }

    /// Bind a type id read from a stream to its stable identifier
    pub fn bind_type(&mut self, id: TypeId, stable: StableId) {
        self.next_type = self.next_type.max(id.get().saturating_add(1));
        self.types.insert(id, stable);
    }

    /// Number of object ids handed out or bound in this session
    pub fn object_count(&self) -> usize {
        (self.next_object - ObjectId::FIRST.get()) as usize
    }

    /// Number of types seen in either direction
    pub fn type_count(&self) -> usize {
        self.type_ids.len() + self.types.len()
    }

    /// Forget everything; releases retained handles
    pub fn reset(&mut self) {
        self.object_ids.clear();
        self.pinned.clear();
        self.objects.clear();
        self.type_ids.clear();
        self.types.clear();
        self.next_object = ObjectId::FIRST.get();
        self.next_type = TypeId::FIRST.get();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn test_object_ids_are_sequential_and_stable() {
        let mut tracker = IdentityTracker::new();
        assert_eq!(tracker.object_id_for(0x1000), (ObjectId::new(2), true));
        assert_eq!(tracker.object_id_for(0x2000), (ObjectId::new(3), true));
        assert_eq!(tracker.object_id_for(0x1000), (ObjectId::new(2), false));
        assert_eq!(tracker.next_object_id(), ObjectId::new(4));
    }

    #[test]
    fn test_type_ids_start_at_two() {
        let mut tracker = IdentityTracker::new();
        let a = StableId::of("test.A");
        let b = StableId::of("test.B");
        assert_eq!(tracker.type_id_for(a), (TypeId::new(2), true));
        assert_eq!(tracker.type_id_for(b), (TypeId::new(3), true));
        assert_eq!(tracker.type_id_for(a), (TypeId::new(2), false));
    }

    #[test]
    fn test_bind_and_resolve() {
        let mut tracker = IdentityTracker::new();
        let id = ObjectId::new(2);
        assert!(tracker.resolve(id).is_none());

        tracker.bind(id, Slot::shared(Rc::new(7u32), Ownership::Shared));
        let slot = tracker.resolve(id).unwrap();
        assert_eq!(slot.ownership(), Ownership::Shared);
        assert_eq!(**slot.handle::<Rc<u32>>().unwrap(), 7);
        assert!(slot.handle::<Rc<i64>>().is_none());
        assert_eq!(tracker.next_object_id(), ObjectId::new(3));
    }

    #[test]
    fn test_slot_views_resolve_by_type() {
        let value = Rc::new(5u32);
        let text = Rc::new(String::from("five"));
        let slot = Slot::shared(Rc::clone(&value), Ownership::Shared)
            .with_view(Rc::clone(&text))
            .with_ownership(Ownership::Weak);
        assert_eq!(slot.ownership(), Ownership::Weak);
        assert!(Rc::ptr_eq(slot.handle::<Rc<u32>>().unwrap(), &value));
        assert!(Rc::ptr_eq(slot.handle::<Rc<String>>().unwrap(), &text));
        assert!(slot.handle::<Rc<u8>>().is_none());
    }

    #[test]
    fn test_allocated_ids_are_never_reused() {
        let mut tracker = IdentityTracker::new();
        assert_eq!(tracker.allocate_object_id(), ObjectId::new(2));
        assert_eq!(tracker.allocate_object_id(), ObjectId::new(3));
        // the same address after an allocation still gets its own id
        assert_eq!(tracker.object_id_for(0x40), (ObjectId::new(4), true));
        assert_eq!(tracker.object_count(), 3);
    }

    #[test]
    fn test_pinned_handles_live_until_reset() {
        let mut tracker = IdentityTracker::new();
        let value = Rc::new(3u16);
        tracker.pin(Rc::clone(&value));
        assert_eq!(Rc::strong_count(&value), 2);
        tracker.reset();
        assert_eq!(Rc::strong_count(&value), 1);
    }

    #[test]
    fn test_exclusive_slot_has_no_handle() {
        let slot = Slot::exclusive();
        assert_eq!(slot.ownership(), Ownership::Exclusive);
        assert!(slot.handle::<Rc<u32>>().is_none());
    }

    #[test]
    fn test_reset_releases_handles() {
        let mut tracker = IdentityTracker::new();
        let value = Rc::new(1u8);
        tracker.bind(ObjectId::new(2), Slot::shared(Rc::clone(&value), Ownership::Shared));
        tracker.object_id_for(0x10);
        tracker.type_id_for(StableId::of("x"));
        assert_eq!(Rc::strong_count(&value), 2);

        tracker.reset();
        assert_eq!(Rc::strong_count(&value), 1);
        assert_eq!(tracker.object_count(), 0);
        assert_eq!(tracker.type_count(), 0);
        assert_eq!(tracker.next_object_id(), ObjectId::FIRST);
        assert_eq!(tracker.next_type_id(), TypeId::FIRST);
    }

    #[test]
    fn test_null_sentinel() {
        assert!(ObjectId::NULL.is_null());
        assert!(!ObjectId::FIRST.is_null());
        assert_eq!(ObjectId::NULL.get(), 1);
    }
}
