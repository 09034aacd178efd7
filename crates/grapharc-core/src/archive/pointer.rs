//! Pointer categories.
//!
//! Every pointer is written as an [`ObjectId`]. The id of a new object is
//! recorded before its fields are walked, so a cycle back to it writes the
//! id alone.
//!
//! A `Box` target can only be reached once, so it always takes a fresh id,
//! whatever its address (every zero-sized target has the same one). Shared
//! targets are keyed by address and pinned for the rest of the session.
//!
//! On load, exclusive (`Box`) targets take a fresh slot that may never be
//! bound again; shared (`Rc`) targets are retained in the handle table and
//! every later reference clones the same `Rc`, whichever static type it was
//! declared with.

use super::{Archivable, Archive, Category};
use crate::error::{Error, Result};
use crate::identity::{ObjectId, Ownership, Slot};
use crate::object::Pointee;
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use tracing::trace;

impl Archive<'_> {
    fn write_null(&mut self) -> Result<()> {
        self.write_varint(ObjectId::NULL.get())
    }

    fn read_object_id(&mut self) -> Result<ObjectId> {
        let raw = self.read_varint()?;
        if raw < ObjectId::NULL.get() {
            let expected = self.identity.next_object_id().get();
            return Err(self.fail(Error::UnexpectedId {
                what: "object",
                expected,
                found: raw,
            }));
        }
        Ok(ObjectId::new(raw))
    }

    fn expect_new_object(&mut self, id: ObjectId) -> Result<()> {
        let expected = self.identity.next_object_id();
        if self.config.strict_ids && id != expected {
            return Err(self.fail(Error::UnexpectedId {
                what: "object",
                expected: expected.get(),
                found: id.get(),
            }));
        }
        Ok(())
    }

    fn save_boxed<T: Pointee + ?Sized>(&mut self, pointer: &mut Option<Box<T>>) -> Result<()> {
        self.check()?;
        let Some(target) = pointer.as_deref_mut() else {
            return self.write_null();
        };
        let id = self.identity.allocate_object_id();
        self.write_varint(id.get())?;
        trace!(%id, target = T::expected(), "saving owned object");
        target.write_header(self)?;
        target.serialize_target(self)
    }

    fn load_boxed<T: Pointee + ?Sized>(&mut self, pointer: &mut Option<Box<T>>) -> Result<()> {
        self.check()?;
        let id = self.read_object_id()?;
        if id.is_null() {
            *pointer = None;
            return Ok(());
        }
        if self.identity.resolve(id).is_some() {
            return Err(self.fail(Error::ownership(
                id.get(),
                "already materialised; an exclusive owner cannot share it",
            )));
        }
        self.expect_new_object(id)?;
        self.identity.bind(id, Slot::exclusive());

        trace!(%id, target = T::expected(), "loading owned object");
        let mut target = T::instantiate(self)?;
        target.serialize_target(self)?;
        *pointer = Some(target);
        Ok(())
    }

    fn save_shared<T: Pointee + ?Sized>(&mut self, target: &Rc<RefCell<T>>) -> Result<()> {
        self.check()?;
        let address = Rc::as_ptr(target) as *const () as usize;
        let (id, is_new) = self.identity.object_id_for(address);
        self.write_varint(id.get())?;
        if !is_new {
            return Ok(());
        }
        self.identity.pin(Rc::clone(target));

        trace!(%id, target = T::expected(), "saving shared object");
        let mut guard = match target.try_borrow_mut() {
            Ok(guard) => guard,
            Err(_) => return Err(self.fail(Error::ObjectBusy { address })),
        };
        guard.write_header(self)?;
        guard.serialize_target(self)
    }

    fn load_shared<T: Pointee + ?Sized>(
        &mut self,
        ownership: Ownership,
    ) -> Result<Option<Rc<RefCell<T>>>> {
        self.check()?;
        let id = self.read_object_id()?;
        if id.is_null() {
            return Ok(None);
        }

        let known = self
            .identity
            .resolve(id)
            .map(|slot| (slot.ownership(), T::share(slot)));
        match known {
            Some((_, Some(shared))) => return Ok(Some(shared)),
            Some((Ownership::Exclusive, None)) => {
                return Err(self.fail(Error::ownership(
                    id.get(),
                    "exclusively owned; it cannot be shared",
                )));
            }
            Some((_, None)) => {
                return Err(self.fail(Error::type_mismatch(
                    T::expected(),
                    format!("object {id} materialised as a different type"),
                )));
            }
            None => {}
        }

        self.expect_new_object(id)?;
        trace!(%id, target = T::expected(), "loading shared object");
        let (target, slot) = T::instantiate_shared(self)?;
        self.identity.bind(id, slot.with_ownership(ownership));
        target.borrow_mut().serialize_target(self)?;
        Ok(Some(target))
    }
}

impl<T: Pointee + ?Sized> Archivable for Option<Box<T>> {
    const CATEGORY: Category = Category::OwningPointer;

    fn save(&mut self, ar: &mut Archive<'_>) -> Result<()> {
        ar.save_boxed(self)
    }

    fn load(&mut self, ar: &mut Archive<'_>) -> Result<()> {
        ar.load_boxed(self)
    }
}

impl<T: Pointee + ?Sized> Archivable for Option<Rc<RefCell<T>>> {
    const CATEGORY: Category = Category::SharedPointer;

    fn save(&mut self, ar: &mut Archive<'_>) -> Result<()> {
        match self {
            Some(target) => ar.save_shared(target),
            None => ar.write_null(),
        }
    }

    fn load(&mut self, ar: &mut Archive<'_>) -> Result<()> {
        *self = ar.load_shared(Ownership::Shared)?;
        Ok(())
    }
}

/// A non-nullable shared pointer; a null in the stream is a type error
impl<T: Pointee + ?Sized> Archivable for Rc<RefCell<T>> {
    const CATEGORY: Category = Category::SharedPointer;

    fn save(&mut self, ar: &mut Archive<'_>) -> Result<()> {
        ar.save_shared(self)
    }

    fn load(&mut self, ar: &mut Archive<'_>) -> Result<()> {
        match ar.load_shared(Ownership::Shared)? {
            Some(target) => {
                *self = target;
                Ok(())
            }
            None => Err(ar.fail(Error::type_mismatch(T::expected(), "null"))),
        }
    }
}

/// A back-reference; a dead target is saved as null
impl<T: Pointee> Archivable for Weak<RefCell<T>> {
    const CATEGORY: Category = Category::SharedPointer;

    fn save(&mut self, ar: &mut Archive<'_>) -> Result<()> {
        match self.upgrade() {
            Some(target) => ar.save_shared(&target),
            None => ar.write_null(),
        }
    }

    fn load(&mut self, ar: &mut Archive<'_>) -> Result<()> {
        *self = match ar.load_shared::<T>(Ownership::Weak)? {
            Some(target) => Rc::downgrade(&target),
            None => Weak::new(),
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::Mode;
    use crate::object::Serializable;
    use crate::plain::Plain;
    use crate::registry::TypeRegistry;
    use crate::transport::MemoryTransport;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct Link {
        value: u32,
        next: Option<Rc<RefCell<Link>>>,
        back: Weak<RefCell<Link>>,
    }

    impl Serializable for Link {
        fn serialize(&mut self, ar: &mut Archive<'_>) -> Result<()> {
            ar.serialize(&mut self.value)?;
            ar.serialize(&mut self.next)?;
            ar.serialize(&mut self.back)
        }
    }

    crate::polymorphic!(Link, "pointer.Link");

    #[derive(Default)]
    struct Owner {
        child: Option<Box<Owner>>,
        tag: u8,
    }

    impl Serializable for Owner {
        fn serialize(&mut self, ar: &mut Archive<'_>) -> Result<()> {
            ar.serialize(&mut self.tag)?;
            ar.serialize(&mut self.child)
        }
    }

    crate::polymorphic!(Owner, "pointer.Owner");

    #[derive(Default)]
    struct Marker;

    impl Serializable for Marker {
        fn serialize(&mut self, _ar: &mut Archive<'_>) -> Result<()> {
            Ok(())
        }
    }

    crate::polymorphic!(Marker, "pointer.Marker");

    fn registry() -> TypeRegistry {
        let registry = TypeRegistry::new();
        registry.register::<Link>().unwrap();
        registry.register::<Owner>().unwrap();
        registry.register::<Marker>().unwrap();
        registry
    }

    #[test]
    fn test_null_pointer_is_sentinel() {
        let mut transport = MemoryTransport::new();
        let mut pointer: Option<Box<Owner>> = None;
        Archive::new(&mut transport).save(&mut pointer).unwrap();
        assert_eq!(transport.as_bytes(), &[0x81]);

        transport.rewind();
        let mut loaded = Some(Box::new(Owner::default()));
        Archive::new(&mut transport).load(&mut loaded).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_owned_chain_layout() {
        let registry = registry();
        let mut transport = MemoryTransport::new();
        let mut root = Some(Box::new(Owner {
            tag: 1,
            child: Some(Box::new(Owner { tag: 2, child: None })),
        }));
        Archive::new(&mut transport)
            .with_registry(&registry)
            .save(&mut root)
            .unwrap();

        let id = StableIdBytes::of("pointer.Owner");
        let mut expected = vec![0x82, 0x82];
        expected.extend_from_slice(&id.0);
        expected.extend_from_slice(&[0x01, 0x83, 0x82, 0x02, 0x81]);
        assert_eq!(transport.as_bytes(), expected.as_slice());

        transport.rewind();
        let mut loaded: Option<Box<Owner>> = None;
        Archive::new(&mut transport)
            .with_registry(&registry)
            .load(&mut loaded)
            .unwrap();
        let loaded = loaded.unwrap();
        assert_eq!(loaded.tag, 1);
        assert_eq!(loaded.child.as_ref().unwrap().tag, 2);
        assert!(loaded.child.as_ref().unwrap().child.is_none());
    }

    struct StableIdBytes([u8; 8]);

    impl StableIdBytes {
        fn of(tag: &str) -> Self {
            Self(crate::registry::StableId::of(tag).get().to_be_bytes())
        }
    }

    #[test]
    fn test_shared_cycle_roundtrip() {
        let registry = registry();
        let a = Rc::new(RefCell::new(Link { value: 1, ..Default::default() }));
        let b = Rc::new(RefCell::new(Link { value: 2, ..Default::default() }));
        a.borrow_mut().next = Some(Rc::clone(&b));
        b.borrow_mut().next = Some(Rc::clone(&a));
        b.borrow_mut().back = Rc::downgrade(&a);

        let mut transport = MemoryTransport::new();
        let mut root = Some(Rc::clone(&a));
        Archive::new(&mut transport)
            .with_registry(&registry)
            .save(&mut root)
            .unwrap();
        // break the cycle so the fixture is freed
        a.borrow_mut().next = None;

        transport.rewind();
        let mut ar = Archive::new(&mut transport).with_registry(&registry);
        let mut loaded: Option<Rc<RefCell<Link>>> = None;
        ar.load(&mut loaded).unwrap();
        drop(ar);

        let a2 = loaded.unwrap();
        let b2 = a2.borrow().next.clone().unwrap();
        assert_eq!(a2.borrow().value, 1);
        assert_eq!(b2.borrow().value, 2);
        assert!(Rc::ptr_eq(b2.borrow().next.as_ref().unwrap(), &a2));
        assert!(Rc::ptr_eq(&b2.borrow().back.upgrade().unwrap(), &a2));

        b2.borrow_mut().next = None;
    }

    #[test]
    fn test_repeated_id_into_box_is_rejected() {
        let registry = registry();
        let shared = Rc::new(RefCell::new(Link::default()));
        let mut transport = MemoryTransport::new();
        {
            let mut ar = Archive::with_mode(&mut transport, Mode::Save).with_registry(&registry);
            let mut first = Some(Rc::clone(&shared));
            let mut second = Some(Rc::clone(&shared));
            ar.serialize(&mut first).unwrap();
            ar.serialize(&mut second).unwrap();
        }

        transport.rewind();
        let mut ar = Archive::with_mode(&mut transport, Mode::Load).with_registry(&registry);
        let mut first: Option<Box<Link>> = None;
        let mut second: Option<Box<Link>> = None;
        ar.serialize(&mut first).unwrap();
        let err = ar.serialize(&mut second).unwrap_err();
        assert!(matches!(err, Error::Ownership { id: 2, .. }));
        assert!(second.is_none());
    }

    #[test]
    fn test_shared_object_under_concrete_and_any_pointer() {
        let registry = registry();
        let shared = Rc::new(RefCell::new(Link { value: 4, ..Default::default() }));
        let mut transport = MemoryTransport::new();
        {
            let mut ar = Archive::with_mode(&mut transport, Mode::Save).with_registry(&registry);
            let mut concrete = Some(Rc::clone(&shared));
            let erased: Rc<RefCell<dyn crate::Object>> = shared.clone();
            let mut any = Some(erased);
            ar.serialize(&mut concrete).unwrap();
            ar.serialize(&mut any).unwrap();
        }

        transport.rewind();
        let mut ar = Archive::with_mode(&mut transport, Mode::Load).with_registry(&registry);
        let mut concrete: Option<Rc<RefCell<Link>>> = None;
        let mut any: Option<Rc<RefCell<dyn crate::Object>>> = None;
        ar.serialize(&mut concrete).unwrap();
        ar.serialize(&mut any).unwrap();
        drop(ar);

        let (concrete, any) = (concrete.unwrap(), any.unwrap());
        assert_eq!(
            Rc::as_ptr(&concrete) as *const (),
            Rc::as_ptr(&any) as *const ()
        );
        assert_eq!(any.borrow().downcast_ref::<Link>().unwrap().value, 4);
    }

    #[test]
    fn test_shared_object_rejects_other_concrete_type() {
        let registry = registry();
        let shared = Rc::new(RefCell::new(Link::default()));
        let mut transport = MemoryTransport::new();
        {
            let mut ar = Archive::with_mode(&mut transport, Mode::Save).with_registry(&registry);
            ar.serialize(&mut Some(Rc::clone(&shared))).unwrap();
            ar.serialize(&mut Some(Rc::clone(&shared))).unwrap();
        }

        transport.rewind();
        let mut ar = Archive::with_mode(&mut transport, Mode::Load).with_registry(&registry);
        let mut first: Option<Rc<RefCell<Link>>> = None;
        let mut second: Option<Rc<RefCell<Owner>>> = None;
        ar.serialize(&mut first).unwrap();
        let err = ar.serialize(&mut second).unwrap_err();
        assert!(err.is_type());
    }

    #[test]
    fn test_zero_sized_boxes_get_their_own_ids() {
        let registry = registry();
        let first: Box<dyn crate::Object> = Box::new(Marker);
        let second: Box<dyn crate::Object> = Box::new(Marker);
        let mut markers = vec![Some(first), Some(second)];
        let mut transport = MemoryTransport::new();
        Archive::new(&mut transport)
            .with_registry(&registry)
            .save(&mut markers)
            .unwrap();

        // count, id 2 with the full type token, id 3 with the type id alone
        let mut expected = vec![0x82, 0x82, 0x82];
        expected.extend_from_slice(&StableIdBytes::of("pointer.Marker").0);
        expected.extend_from_slice(&[0x83, 0x82]);
        assert_eq!(transport.as_bytes(), expected.as_slice());

        transport.rewind();
        let mut loaded: Vec<Option<Box<dyn crate::Object>>> = Vec::new();
        Archive::new(&mut transport)
            .with_registry(&registry)
            .load(&mut loaded)
            .unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(loaded.iter().all(|m| m.as_deref().is_some_and(|m| m.is::<Marker>())));
    }

    #[test]
    fn test_saved_objects_stay_alive_for_the_session() {
        let registry = registry();
        let mut transport = MemoryTransport::new();
        let mut ar = Archive::with_mode(&mut transport, Mode::Save).with_registry(&registry);
        let first = Rc::new(RefCell::new(Link { value: 1, ..Default::default() }));
        let address = Rc::as_ptr(&first) as usize;
        ar.serialize(&mut Some(first)).unwrap();
        // the archive still holds the first object, so its address is taken
        let second = Rc::new(RefCell::new(Link { value: 2, ..Default::default() }));
        assert_ne!(Rc::as_ptr(&second) as usize, address);
        ar.serialize(&mut Some(second)).unwrap();
        drop(ar);

        transport.rewind();
        let mut ar = Archive::with_mode(&mut transport, Mode::Load).with_registry(&registry);
        let mut first: Option<Rc<RefCell<Link>>> = None;
        let mut second: Option<Rc<RefCell<Link>>> = None;
        ar.serialize(&mut first).unwrap();
        ar.serialize(&mut second).unwrap();
        assert_eq!(first.unwrap().borrow().value, 1);
        assert_eq!(second.unwrap().borrow().value, 2);
    }

    #[test]
    fn test_busy_object_is_reported() {
        let registry = registry();
        let shared = Rc::new(RefCell::new(Link::default()));
        let _guard = shared.borrow_mut();
        let mut transport = MemoryTransport::new();
        let mut root = Some(Rc::clone(&shared));
        let err = Archive::new(&mut transport)
            .with_registry(&registry)
            .save(&mut root)
            .unwrap_err();
        assert!(matches!(err, Error::ObjectBusy { .. }));
    }

    #[test]
    fn test_dead_weak_saves_null() {
        let mut transport = MemoryTransport::new();
        let mut dangling: Weak<RefCell<Link>> = Weak::new();
        Archive::new(&mut transport).save(&mut dangling).unwrap();
        assert_eq!(transport.as_bytes(), &[0x81]);
    }

    #[test]
    fn test_plain_pointer_has_no_type_token() {
        let mut transport = MemoryTransport::new();
        let mut pointer = Some(Box::new(Plain(0x0A0B_0C0Du32)));
        Archive::new(&mut transport).save(&mut pointer).unwrap();
        let mut expected = vec![0x82];
        expected.extend_from_slice(&0x0A0B_0C0Du32.to_ne_bytes());
        assert_eq!(transport.as_bytes(), expected.as_slice());

        transport.rewind();
        let mut loaded: Option<Box<Plain<u32>>> = None;
        Archive::new(&mut transport).load(&mut loaded).unwrap();
        assert_eq!(loaded.unwrap().0, 0x0A0B_0C0D);
    }

    #[test]
    fn test_out_of_sequence_object_id() {
        // object id 7 where 2 was expected
        let mut transport = MemoryTransport::from_bytes(&[0x87]);
        let mut loaded: Option<Box<Plain<u8>>> = None;
        let err = Archive::new(&mut transport).load(&mut loaded).unwrap_err();
        assert!(matches!(
            err,
            Error::UnexpectedId { what: "object", expected: 2, found: 7 }
        ));
    }
}
