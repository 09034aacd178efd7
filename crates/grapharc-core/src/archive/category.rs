//! Structural categories and their encodings.

use super::Archive;
use crate::error::{Error, Result};
use std::collections::{BTreeMap, HashMap, LinkedList, VecDeque};
use std::fmt;
use std::hash::Hash;

/// Upper bound on capacity reserved up front from a stream count
const PREALLOC_LIMIT: usize = 4096;

/// The closed set of shapes the archive knows how to encode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Integers, `bool`, `char`: fixed width, canonical byte order
    Primitive,
    /// Raw in-memory bytes of a POD value
    Plain,
    /// Polymorphic object by value: type token, then fields
    Object,
    /// `Option<Box<T>>`
    OwningPointer,
    /// `Rc<RefCell<T>>` and `Weak<RefCell<T>>`
    SharedPointer,
    /// `[T; N]`
    FixedContainer,
    /// Sequences and maps
    VariableContainer,
    /// Strings and bounded text buffers
    Text,
}

impl Category {
    /// Short lowercase name
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primitive => "primitive",
            Self::Plain => "plain",
            Self::Object => "object",
            Self::OwningPointer => "owning pointer",
            Self::SharedPointer => "shared pointer",
            Self::FixedContainer => "fixed container",
            Self::VariableContainer => "variable container",
            Self::Text => "text",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value the archive can save and load.
///
/// `save` and `load` are mirror images: whatever `save` writes, `load`
/// reads back in the same order.
pub trait Archivable {
    /// Structural category of this type
    const CATEGORY: Category;

    /// Write `self` to the archive
    fn save(&mut self, ar: &mut Archive<'_>) -> Result<()>;

    /// Replace `self` with a value read from the archive
    fn load(&mut self, ar: &mut Archive<'_>) -> Result<()>;
}

macro_rules! primitive {
    ($($ty:ty),* $(,)?) => {$(
        impl Archivable for $ty {
            const CATEGORY: Category = Category::Primitive;

            fn save(&mut self, ar: &mut Archive<'_>) -> Result<()> {
                ar.write_fixed(*self)
            }

            fn load(&mut self, ar: &mut Archive<'_>) -> Result<()> {
                *self = ar.read_fixed()?;
                Ok(())
            }
        }
    )*};
}

primitive!(u8, i8, u16, i16, u32, i32, u64, i64, usize, isize);

impl Archivable for bool {
    const CATEGORY: Category = Category::Primitive;

    fn save(&mut self, ar: &mut Archive<'_>) -> Result<()> {
        ar.write_fixed(u8::from(*self))
    }

    fn load(&mut self, ar: &mut Archive<'_>) -> Result<()> {
        *self = ar.read_fixed::<u8>()? != 0;
        Ok(())
    }
}

impl Archivable for char {
    const CATEGORY: Category = Category::Primitive;

    fn save(&mut self, ar: &mut Archive<'_>) -> Result<()> {
        ar.write_fixed(u32::from(*self))
    }

    fn load(&mut self, ar: &mut Archive<'_>) -> Result<()> {
        let value: u32 = ar.read_fixed()?;
        match char::from_u32(value) {
            Some(c) => {
                *self = c;
                Ok(())
            }
            None => Err(ar.fail(Error::InvalidChar { value })),
        }
    }
}

// Floats are plain data: the raw host representation goes on the wire.
macro_rules! float {
    ($($ty:ty),*) => {$(
        impl Archivable for $ty {
            const CATEGORY: Category = Category::Plain;

            fn save(&mut self, ar: &mut Archive<'_>) -> Result<()> {
                ar.write_bytes(&self.to_ne_bytes())
            }

            fn load(&mut self, ar: &mut Archive<'_>) -> Result<()> {
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                ar.read_bytes(&mut raw)?;
                *self = <$ty>::from_ne_bytes(raw);
                Ok(())
            }
        }
    )*};
}

float!(f32, f64);

impl<T: Archivable, const N: usize> Archivable for [T; N] {
    const CATEGORY: Category = Category::FixedContainer;

    fn save(&mut self, ar: &mut Archive<'_>) -> Result<()> {
        ar.write_len(N)?;
        for item in self.iter_mut() {
            item.save(ar)?;
        }
        Ok(())
    }

    fn load(&mut self, ar: &mut Archive<'_>) -> Result<()> {
        let count = ar.read_varint()?;
        if count as usize != N {
            return Err(ar.fail(Error::count_mismatch(N, count)));
        }
        for item in self.iter_mut() {
            item.load(ar)?;
        }
        Ok(())
    }
}

fn load_item<T: Archivable + Default>(ar: &mut Archive<'_>) -> Result<T> {
    let mut item = T::default();
    item.load(ar)?;
    Ok(item)
}

impl<T: Archivable + Default> Archivable for Vec<T> {
    const CATEGORY: Category = Category::VariableContainer;

    fn save(&mut self, ar: &mut Archive<'_>) -> Result<()> {
        ar.write_len(self.len())?;
        for item in self.iter_mut() {
            item.save(ar)?;
        }
        Ok(())
    }

    fn load(&mut self, ar: &mut Archive<'_>) -> Result<()> {
        let count = ar.read_len()? as usize;
        self.clear();
        self.reserve(count.min(PREALLOC_LIMIT));
        for _ in 0..count {
            self.push(load_item(ar)?);
        }
        Ok(())
    }
}

impl<T: Archivable + Default> Archivable for VecDeque<T> {
    const CATEGORY: Category = Category::VariableContainer;

    fn save(&mut self, ar: &mut Archive<'_>) -> Result<()> {
        ar.write_len(self.len())?;
        for item in self.iter_mut() {
            item.save(ar)?;
        }
        Ok(())
    }

    fn load(&mut self, ar: &mut Archive<'_>) -> Result<()> {
        let count = ar.read_len()? as usize;
        self.clear();
        self.reserve(count.min(PREALLOC_LIMIT));
        for _ in 0..count {
            self.push_back(load_item(ar)?);
        }
        Ok(())
    }
}

impl<T: Archivable + Default> Archivable for LinkedList<T> {
    const CATEGORY: Category = Category::VariableContainer;

    fn save(&mut self, ar: &mut Archive<'_>) -> Result<()> {
        ar.write_len(self.len())?;
        for item in self.iter_mut() {
            item.save(ar)?;
        }
        Ok(())
    }

    fn load(&mut self, ar: &mut Archive<'_>) -> Result<()> {
        let count = ar.read_len()?;
        self.clear();
        for _ in 0..count {
            self.push_back(load_item(ar)?);
        }
        Ok(())
    }
}

// Map keys are immutable in place, so they are saved from a clone.
impl<K, V> Archivable for BTreeMap<K, V>
where
    K: Archivable + Default + Clone + Ord,
    V: Archivable + Default,
{
    const CATEGORY: Category = Category::VariableContainer;

    fn save(&mut self, ar: &mut Archive<'_>) -> Result<()> {
        ar.write_len(self.len())?;
        for (key, value) in self.iter_mut() {
            key.clone().save(ar)?;
            value.save(ar)?;
        }
        Ok(())
    }

    fn load(&mut self, ar: &mut Archive<'_>) -> Result<()> {
        let count = ar.read_len()?;
        self.clear();
        for _ in 0..count {
            let key: K = load_item(ar)?;
            let value: V = load_item(ar)?;
            self.insert(key, value);
        }
        Ok(())
    }
}

impl<K, V, S> Archivable for HashMap<K, V, S>
where
    K: Archivable + Default + Clone + Eq + Hash,
    V: Archivable + Default,
    S: std::hash::BuildHasher,
{
    const CATEGORY: Category = Category::VariableContainer;

    fn save(&mut self, ar: &mut Archive<'_>) -> Result<()> {
        ar.write_len(self.len())?;
        for (key, value) in self.iter_mut() {
            key.clone().save(ar)?;
            value.save(ar)?;
        }
        Ok(())
    }

    fn load(&mut self, ar: &mut Archive<'_>) -> Result<()> {
        let count = ar.read_len()? as usize;
        self.clear();
        self.reserve(count.min(PREALLOC_LIMIT));
        for _ in 0..count {
            let key: K = load_item(ar)?;
            let value: V = load_item(ar)?;
            self.insert(key, value);
        }
        Ok(())
    }
}

impl Archivable for String {
    const CATEGORY: Category = Category::Text;

    fn save(&mut self, ar: &mut Archive<'_>) -> Result<()> {
        ar.write_len(self.len())?;
        ar.write_bytes(self.as_bytes())
    }

    fn load(&mut self, ar: &mut Archive<'_>) -> Result<()> {
        let length = ar.read_len()? as usize;
        let mut raw = vec![0u8; length];
        ar.read_bytes(&mut raw)?;
        match String::from_utf8(raw) {
            Ok(text) => {
                *self = text;
                Ok(())
            }
            Err(_) => Err(ar.fail(Error::InvalidUtf8)),
        }
    }
}
