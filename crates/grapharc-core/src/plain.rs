//! Plain-data wrapper.
//!
//! [`Plain<T>`] archives the raw in-memory bytes of a `bytemuck::Pod` value.
//! The layout is whatever the host compiler produced, so archives holding
//! plain values are only portable between hosts with the same endianness
//! and struct layout.

use crate::archive::{Archivable, Archive, Category};
use crate::error::Result;
use crate::identity::{Ownership, Slot};
use crate::object::Pointee;
use bytemuck::Pod;
use std::cell::RefCell;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

/// A POD value archived as a raw byte copy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Plain<T>(pub T);

impl<T> Plain<T> {
    /// Unwrap the inner value
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T: Pod> Default for Plain<T> {
    fn default() -> Self {
        Self(T::zeroed())
    }
}

impl<T> From<T> for Plain<T> {
    fn from(value: T) -> Self {
        Self(value)
    }
}

impl<T> Deref for Plain<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for Plain<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

impl<T: Pod> Archivable for Plain<T> {
    const CATEGORY: Category = Category::Plain;

    fn save(&mut self, ar: &mut Archive<'_>) -> Result<()> {
        ar.write_bytes(bytemuck::bytes_of(&self.0))
    }

    fn load(&mut self, ar: &mut Archive<'_>) -> Result<()> {
        ar.read_bytes(bytemuck::bytes_of_mut(&mut self.0))
    }
}

impl<T: Pod> Pointee for Plain<T> {
    fn expected() -> &'static str {
        "plain data"
    }

    fn write_header(&self, _ar: &mut Archive<'_>) -> Result<()> {
        Ok(())
    }

    fn instantiate(_ar: &mut Archive<'_>) -> Result<Box<Self>> {
        Ok(Box::default())
    }

    fn instantiate_shared(_ar: &mut Archive<'_>) -> Result<(Rc<RefCell<Self>>, Slot)> {
        let shared: Rc<RefCell<Self>> = Rc::default();
        let slot = Slot::shared(Rc::clone(&shared), Ownership::Shared);
        Ok((shared, slot))
    }

    fn serialize_target(&mut self, ar: &mut Archive<'_>) -> Result<()> {
        ar.serialize(self)
    }
}
