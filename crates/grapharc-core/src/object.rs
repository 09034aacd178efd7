//! Polymorphic object traits.
//!
//! A user type takes part in the archive by implementing [`Serializable`]
//! (one symmetric field walk used for both directions) and declaring a tag
//! with [`polymorphic!`](crate::polymorphic). The macro wires up
//! [`Polymorphic`], [`Archivable`](crate::Archivable) and [`Pointee`], which
//! is everything the pointer machinery needs.
//!
//! Trait-object families are declared with [`family!`](crate::family): it
//! lists the concrete types that may stand behind `Box<dyn Trait>` or
//! `Rc<RefCell<dyn Trait>>`.
//!
//! # Example
//!
//! ```
//! use grapharc_core::{polymorphic, Archive, MemoryTransport, Result, Serializable};
//!
//! #[derive(Default)]
//! struct Point {
//!     x: i32,
//!     y: i32,
//! }
//!
//! impl Serializable for Point {
//!     fn serialize(&mut self, ar: &mut Archive<'_>) -> Result<()> {
//!         ar.serialize(&mut self.x)?;
//!         ar.serialize(&mut self.y)
//!     }
//! }
//!
//! polymorphic!(Point, "doc.Point");
//!
//! let mut transport = MemoryTransport::new();
//! let mut point = Point { x: 3, y: -4 };
//! Archive::new(&mut transport).save(&mut point).unwrap();
//!
//! transport.rewind();
//! let mut copy = Point::default();
//! Archive::new(&mut transport).load(&mut copy).unwrap();
//! assert_eq!((copy.x, copy.y), (3, -4));
//! ```

use crate::archive::Archive;
use crate::error::{Error, Result};
use crate::identity::{Ownership, Slot};
use crate::registry::{StableId, TypeDescriptor};
use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

/// Symmetric field walk.
///
/// The same method runs on save and on load; `ar.serialize(&mut field)`
/// writes or reads depending on the archive's mode.
pub trait Serializable: 'static {
    /// Visit every persistent field in a fixed order
    fn serialize(&mut self, ar: &mut Archive<'_>) -> Result<()>;
}

/// A concrete type with a stable tag.
///
/// Implemented by [`polymorphic!`](crate::polymorphic).
pub trait Polymorphic: Serializable + Default {
    /// Tag string; the stable identifier is derived from it
    const TAG: &'static str;

    /// Tags of every base this type may be loaded as
    const ANCESTRY: &'static [&'static str] = &[];

    /// Stable identifier of this type
    fn stable_id() -> StableId {
        StableId::of(Self::TAG)
    }

    /// Registry descriptor of this type
    fn type_descriptor() -> TypeDescriptor {
        TypeDescriptor::of::<Self>()
    }
}

/// Object-safe view of a polymorphic value
pub trait Object: Serializable {
    /// Descriptor of the concrete type
    fn descriptor(&self) -> TypeDescriptor;

    /// Returns true if this object is `id` or derives from it
    fn is_of_type(&self, id: StableId) -> bool;

    /// Borrow as `Any` for downcasting
    fn as_any(&self) -> &dyn Any;

    /// Mutably borrow as `Any` for downcasting
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Convert into `Box<dyn Any>` for downcasting by value
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<T: Polymorphic> Object for T {
    fn descriptor(&self) -> TypeDescriptor {
        T::type_descriptor()
    }

    fn is_of_type(&self, id: StableId) -> bool {
        T::stable_id() == id || T::ANCESTRY.iter().any(|tag| StableId::of(tag) == id)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

impl dyn Object {
    /// Returns true if the concrete type is `T`
    pub fn is<T: Object>(&self) -> bool {
        self.as_any().is::<T>()
    }

    /// Borrow as the concrete type `T`
    pub fn downcast_ref<T: Object>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Mutably borrow as the concrete type `T`
    pub fn downcast_mut<T: Object>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }
}

/// Anything a pointer may target.
///
/// Owning and shared pointers go through this trait to write the type
/// header of a new object, to materialise a fresh instance on load, and
/// to walk the target's fields.
pub trait Pointee: 'static {
    /// Name of what this pointer may hold, used in error messages
    fn expected() -> &'static str;

    /// Write whatever precedes the fields of a new object
    fn write_header(&self, ar: &mut Archive<'_>) -> Result<()>;

    /// Read the header and create a default instance behind a `Box`
    fn instantiate(ar: &mut Archive<'_>) -> Result<Box<Self>>;

    /// Read the header and create a default instance behind an `Rc`.
    ///
    /// The slot retains the instance under every static type a later
    /// reference to it may be declared with.
    fn instantiate_shared(ar: &mut Archive<'_>) -> Result<(Rc<RefCell<Self>>, Slot)>;

    /// Find an `Rc<RefCell<Self>>` among the views retained by `slot`
    fn share(slot: &Slot) -> Option<Rc<RefCell<Self>>> {
        slot.handle::<Rc<RefCell<Self>>>().cloned()
    }

    /// Walk the fields of the target
    fn serialize_target(&mut self, ar: &mut Archive<'_>) -> Result<()>;
}

/// Instantiate the concrete type `T` from the stream's type token.
///
/// Subtypes of `T` in the stream are rejected: a concrete destination has
/// no room for them.
pub fn instantiate_concrete<T: Polymorphic>(ar: &mut Archive<'_>) -> Result<Box<T>> {
    let object = ar.instantiate(Some(T::stable_id()), T::TAG)?;
    let found = object.descriptor().tag();
    match object.into_any().downcast::<T>() {
        Ok(concrete) => Ok(concrete),
        Err(_) => Err(ar.fail(Error::type_mismatch(T::TAG, found))),
    }
}

/// Move a fresh concrete object behind an `Rc` and build the slot that
/// retains it as `T` and as `dyn Object`
pub fn retain_concrete<T: Polymorphic>(object: T) -> (Rc<RefCell<T>>, Slot) {
    let concrete = Rc::new(RefCell::new(object));
    let erased: Rc<RefCell<dyn Object>> = concrete.clone();
    let slot = Slot::shared(Rc::clone(&concrete), Ownership::Shared).with_view(erased);
    (concrete, slot)
}

impl Pointee for dyn Object {
    fn expected() -> &'static str {
        "any registered object"
    }

    fn write_header(&self, ar: &mut Archive<'_>) -> Result<()> {
        ar.write_type(self.descriptor())
    }

    fn instantiate(ar: &mut Archive<'_>) -> Result<Box<Self>> {
        ar.instantiate(None, Self::expected())
    }

    fn instantiate_shared(ar: &mut Archive<'_>) -> Result<(Rc<RefCell<Self>>, Slot)> {
        ar.instantiate_shared(None, Self::expected())
    }

    fn serialize_target(&mut self, ar: &mut Archive<'_>) -> Result<()> {
        self.serialize(ar)
    }
}

/// Declare a concrete polymorphic type.
///
/// ```ignore
/// polymorphic!(Node, "demo.Node");
/// polymorphic!(Leaf, "demo.Leaf", extends ["demo.Node"]);
/// ```
///
/// The type must implement [`Serializable`] and [`Default`]. The `extends`
/// list names the tags this type may be loaded as; a pointer whose target
/// is a base family accepts the type only if the base tag appears here.
#[macro_export]
macro_rules! polymorphic {
    ($ty:ty, $tag:literal $(, extends [$($base:literal),* $(,)?])? $(,)?) => {
        impl $crate::Polymorphic for $ty {
            const TAG: &'static str = $tag;
            const ANCESTRY: &'static [&'static str] = &[$($($base),*)?];
        }

        impl $crate::Archivable for $ty {
            const CATEGORY: $crate::Category = $crate::Category::Object;

            fn save(&mut self, ar: &mut $crate::Archive<'_>) -> $crate::Result<()> {
                ar.save_object(self)
            }

            fn load(&mut self, ar: &mut $crate::Archive<'_>) -> $crate::Result<()> {
                ar.load_object(self)
            }
        }

        impl $crate::Pointee for $ty {
            fn expected() -> &'static str {
                $tag
            }

            fn write_header(&self, ar: &mut $crate::Archive<'_>) -> $crate::Result<()> {
                ar.write_type(<$ty as $crate::Polymorphic>::type_descriptor())
            }

            fn instantiate(
                ar: &mut $crate::Archive<'_>,
            ) -> $crate::Result<::std::boxed::Box<Self>> {
                $crate::object::instantiate_concrete::<$ty>(ar)
            }

            fn instantiate_shared(
                ar: &mut $crate::Archive<'_>,
            ) -> $crate::Result<(::std::rc::Rc<::std::cell::RefCell<Self>>, $crate::Slot)> {
                let boxed = $crate::object::instantiate_concrete::<$ty>(ar)?;
                Ok($crate::object::retain_concrete(*boxed))
            }

            fn serialize_target(&mut self, ar: &mut $crate::Archive<'_>) -> $crate::Result<()> {
                $crate::Serializable::serialize(self, ar)
            }
        }
    };
}

/// Declare a trait-object family.
///
/// ```ignore
/// trait Shape: Object {}
/// family!(dyn Shape, "demo.Shape", [Circle, Square]);
/// ```
///
/// `Trait` must have [`Object`] as a supertrait, and every listed type must
/// implement it and carry `"base-tag"` in its `extends` list (or be the
/// type registered under that tag). A stream object whose type is not a
/// member of the family is a type error.
#[macro_export]
macro_rules! family {
    (dyn $family:ident, $tag:literal, [$($member:ty),+ $(,)?] $(,)?) => {
        impl $crate::Pointee for dyn $family {
            fn expected() -> &'static str {
                $tag
            }

            fn write_header(&self, ar: &mut $crate::Archive<'_>) -> $crate::Result<()> {
                ar.write_type($crate::Object::descriptor(self))
            }

            fn instantiate(
                ar: &mut $crate::Archive<'_>,
            ) -> $crate::Result<::std::boxed::Box<Self>> {
                let object = ar.instantiate(Some($crate::StableId::of($tag)), $tag)?;
                let found = $crate::Object::descriptor(&*object).tag();
                let any = $crate::Object::into_any(object);
                $(
                    let any = match any.downcast::<$member>() {
                        Ok(concrete) => {
                            let boxed: ::std::boxed::Box<Self> = concrete;
                            return Ok(boxed);
                        }
                        Err(any) => any,
                    };
                )+
                drop(any);
                Err(ar.fail($crate::Error::type_mismatch($tag, found)))
            }

            fn instantiate_shared(
                ar: &mut $crate::Archive<'_>,
            ) -> $crate::Result<(::std::rc::Rc<::std::cell::RefCell<Self>>, $crate::Slot)> {
                let object = ar.instantiate(Some($crate::StableId::of($tag)), $tag)?;
                let found = $crate::Object::descriptor(&*object).tag();
                let any = $crate::Object::into_any(object);
                $(
                    let any = match any.downcast::<$member>() {
                        Ok(concrete) => {
                            let (member, slot) = $crate::object::retain_concrete(*concrete);
                            let shared: ::std::rc::Rc<::std::cell::RefCell<Self>> = member;
                            let slot = slot.with_view(::std::rc::Rc::clone(&shared));
                            return Ok((shared, slot));
                        }
                        Err(any) => any,
                    };
                )+
                drop(any);
                Err(ar.fail($crate::Error::type_mismatch($tag, found)))
            }

            fn share(
                slot: &$crate::Slot,
            ) -> ::std::option::Option<::std::rc::Rc<::std::cell::RefCell<Self>>> {
                if let Some(shared) = slot.handle::<::std::rc::Rc<::std::cell::RefCell<Self>>>() {
                    return Some(::std::rc::Rc::clone(shared));
                }
                // materialised through another view; any member may stand here
                $(
                    if let Some(member) = slot.handle::<::std::rc::Rc<::std::cell::RefCell<$member>>>() {
                        let member: ::std::rc::Rc<::std::cell::RefCell<$member>> =
                            ::std::rc::Rc::clone(member);
                        let shared: ::std::rc::Rc<::std::cell::RefCell<Self>> = member;
                        return Some(shared);
                    }
                )+
                None
            }

            fn serialize_target(&mut self, ar: &mut $crate::Archive<'_>) -> $crate::Result<()> {
                $crate::Serializable::serialize(self, ar)
            }
        }
    };
}
