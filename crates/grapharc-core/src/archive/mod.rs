//! Archive engine.
//!
//! An [`Archive`] binds one [`Transport`] to one session. It holds the
//! direction, the sticky error, the rolling checksum and the identity maps,
//! and dispatches each value to its [`Archivable`] implementation.
//!
//! ## Failure model
//!
//! The first failure is latched. From then on every operation returns a
//! copy of that error without touching the transport, until the session
//! is [`reset`](Archive::reset) or the direction changes.

mod category;
mod pointer;

pub use category::{Archivable, Category};

use crate::error::{Error, Result};
use crate::identity::{IdentityTracker, Slot, TypeId};
use crate::object::Object;
use crate::registry::{StableId, TypeDescriptor, TypeRegistry};
use crate::transport::Transport;
use crate::wire::{self, FixedWidth, RollingChecksum, VarintDecoder, MAX_VARINT_LEN};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use tracing::{debug, trace, warn};

/// Default upper bound on any length read from a stream (16 MiB)
pub const DEFAULT_MAX_LENGTH: u32 = 16 * 1024 * 1024;

/// Direction of an archive session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// No direction chosen yet
    #[default]
    Unknown,
    /// Writing values to the transport
    Save,
    /// Reading values from the transport
    Load,
}

/// Configuration for an archive session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveConfig {
    /// Largest sequence, map, string or blob length accepted on load
    pub max_length: u32,
    /// Require first-use object and type ids to arrive in sequence
    pub strict_ids: bool,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            max_length: DEFAULT_MAX_LENGTH,
            strict_ids: true,
        }
    }
}

impl ArchiveConfig {
    /// Creates a new archive config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the largest length accepted on load
    pub fn max_length(mut self, limit: u32) -> Self {
        self.max_length = limit;
        self
    }

    /// Sets whether first-use ids must arrive in sequence
    pub fn strict_ids(mut self, strict: bool) -> Self {
        self.strict_ids = strict;
        self
    }
}

/// A save or load session over one transport
pub struct Archive<'a> {
    transport: &'a mut dyn Transport,
    registry: &'a TypeRegistry,
    config: ArchiveConfig,
    mode: Mode,
    error: Option<Error>,
    checksum: RollingChecksum,
    identity: IdentityTracker,
}

impl<'a> Archive<'a> {
    /// Creates an archive with no direction, bound to the global registry
    pub fn new(transport: &'a mut dyn Transport) -> Self {
        Self::with_mode(transport, Mode::Unknown)
    }

    /// Creates an archive in the given direction
    pub fn with_mode(transport: &'a mut dyn Transport, mode: Mode) -> Self {
        Self {
            transport,
            registry: TypeRegistry::global(),
            config: ArchiveConfig::default(),
            mode,
            error: None,
            checksum: RollingChecksum::new(),
            identity: IdentityTracker::new(),
        }
    }

    /// Use `registry` instead of the global registry
    pub fn with_registry(mut self, registry: &'a TypeRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Use a custom configuration
    pub fn with_config(mut self, config: ArchiveConfig) -> Self {
        self.config = config;
        self
    }

    // ------------------------------------------------------------------
    // Session lifecycle
    // ------------------------------------------------------------------

    /// Current direction
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Returns true when saving
    pub fn is_save(&self) -> bool {
        self.mode == Mode::Save
    }

    /// Returns true when loading
    pub fn is_load(&self) -> bool {
        self.mode == Mode::Load
    }

    /// Returns true once any operation has failed
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// The latched error, if any
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Current rolling checksum
    pub fn checksum(&self) -> u32 {
        self.checksum.value()
    }

    /// Session configuration
    pub fn config(&self) -> &ArchiveConfig {
        &self.config
    }

    /// Registry this session instantiates from
    pub fn registry(&self) -> &TypeRegistry {
        self.registry
    }

    /// Switch to saving; resets the session if the direction changes
    pub fn set_save(&mut self) {
        self.set_mode(Mode::Save);
    }

    /// Switch to loading; resets the session if the direction changes
    pub fn set_load(&mut self) {
        self.set_mode(Mode::Load);
    }

    fn set_mode(&mut self, mode: Mode) {
        if self.mode != mode {
            self.reset();
            debug!(from = ?self.mode, to = ?mode, "archive direction changed");
            self.mode = mode;
        }
    }

    /// Clear identity maps, the checksum and the latched error.
    ///
    /// The direction is kept.
    pub fn reset(&mut self) {
        self.identity.reset();
        self.checksum.reset();
        self.error = None;
        debug!(mode = ?self.mode, "archive session reset");
    }

    /// Flush the transport
    pub fn flush(&mut self) -> Result<()> {
        self.check()?;
        match self.transport.flush() {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail(Error::transport("flush", e))),
        }
    }

    // ------------------------------------------------------------------
    // Entry points
    // ------------------------------------------------------------------

    /// Save or load `value` depending on the current mode
    pub fn serialize<T: Archivable>(&mut self, value: &mut T) -> Result<()> {
        self.check()?;
        match self.mode {
            Mode::Save => value.save(self),
            Mode::Load => value.load(self),
            Mode::Unknown => Err(self.fail(Error::NoMode)),
        }
    }

    /// Force the session into save mode and write `value`
    pub fn save<T: Archivable>(&mut self, value: &mut T) -> Result<()> {
        self.set_save();
        self.check()?;
        value.save(self)
    }

    /// Force the session into load mode and read into `value`
    pub fn load<T: Archivable>(&mut self, value: &mut T) -> Result<()> {
        self.set_load();
        self.check()?;
        value.load(self)
    }

    /// Write or verify the rolling checksum
    pub fn checkpoint(&mut self) -> Result<()> {
        self.check()?;
        match self.mode {
            Mode::Save => {
                let value = self.checksum.value();
                self.write_fixed(value)?;
                debug!("checkpoint written: {value:#010x}");
                Ok(())
            }
            Mode::Load => {
                let computed = self.checksum.value();
                let stored: u32 = self.read_fixed()?;
                if stored != computed {
                    return Err(self.fail(Error::ChecksumMismatch { computed, stored }));
                }
                debug!("checkpoint verified: {computed:#010x}");
                Ok(())
            }
            Mode::Unknown => Err(self.fail(Error::NoMode)),
        }
    }

    /// Save or load a length-prefixed byte run.
    ///
    /// On load, at most `data.len()` bytes are accepted. Returns the number
    /// of payload bytes transferred.
    pub fn blob(&mut self, data: &mut [u8]) -> Result<usize> {
        self.check()?;
        match self.mode {
            Mode::Save => {
                self.write_len(data.len())?;
                self.write_bytes(data)?;
                Ok(data.len())
            }
            Mode::Load => {
                let length = self.read_len()? as usize;
                if length > data.len() {
                    return Err(self.fail(Error::capacity_exceeded(length, data.len())));
                }
                self.read_bytes(&mut data[..length])?;
                Ok(length)
            }
            Mode::Unknown => Err(self.fail(Error::NoMode)),
        }
    }

    // ------------------------------------------------------------------
    // Error latch
    // ------------------------------------------------------------------

    /// Latch `error` as the session's sticky error and return it.
    ///
    /// Only the first error is kept. Custom [`Serializable`] impls may call
    /// this to reject values they find invalid.
    ///
    /// [`Serializable`]: crate::Serializable
    pub fn fail(&mut self, error: Error) -> Error {
        if self.error.is_none() {
            warn!(%error, mode = ?self.mode, "archive error latched");
            self.error = Some(error.clone());
        }
        error
    }

    #[inline]
    fn check(&self) -> Result<()> {
        match &self.error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    // ------------------------------------------------------------------
    // Raw I/O
    // ------------------------------------------------------------------

    /// Write raw bytes through the transport
    pub fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.check()?;
        if data.is_empty() {
            return Ok(());
        }
        self.checksum.update(data);
        match self.transport.save(data) {
            Ok(n) if n == data.len() => Ok(()),
            Ok(n) => Err(self.fail(Error::short_transfer("save", data.len(), n))),
            Err(e) => Err(self.fail(Error::transport("save", e))),
        }
    }

    /// Fill `buf` from the transport
    pub fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        self.check()?;
        if buf.is_empty() {
            return Ok(());
        }
        match self.transport.load(buf) {
            Ok(n) if n == buf.len() => {
                self.checksum.update(buf);
                Ok(())
            }
            Ok(n) => Err(self.fail(Error::short_transfer("load", buf.len(), n))),
            Err(e) => Err(self.fail(Error::transport("load", e))),
        }
    }

    /// Write a varint
    pub fn write_varint(&mut self, value: u32) -> Result<()> {
        let mut buf = [0u8; MAX_VARINT_LEN];
        let len = wire::encode_varint(value, &mut buf);
        self.write_bytes(&buf[..len])
    }

    /// Read a varint, one byte at a time
    pub fn read_varint(&mut self) -> Result<u32> {
        let mut decoder = VarintDecoder::new();
        loop {
            let mut byte = [0u8; 1];
            self.read_bytes(&mut byte)?;
            match decoder.push(byte[0]) {
                Ok(Some(value)) => return Ok(value),
                Ok(None) => {}
                Err(e) => return Err(self.fail(e)),
            }
        }
    }

    /// Write a fixed-width integer in canonical byte order
    pub fn write_fixed<T: FixedWidth>(&mut self, value: T) -> Result<()> {
        self.write_bytes(value.to_wire().as_ref())
    }

    /// Read a fixed-width integer in canonical byte order
    pub fn read_fixed<T: FixedWidth>(&mut self) -> Result<T> {
        let mut wire = T::Wire::default();
        self.read_bytes(wire.as_mut())?;
        match T::from_wire(wire) {
            Some(value) => Ok(value),
            None => Err(self.fail(Error::IntegerRange {
                target: std::any::type_name::<T>(),
            })),
        }
    }

    /// Write a length or count prefix
    pub(crate) fn write_len(&mut self, length: usize) -> Result<()> {
        match u32::try_from(length) {
            Ok(length) => self.write_varint(length),
            Err(_) => Err(self.fail(Error::capacity_exceeded(length, u32::MAX as usize))),
        }
    }

    /// Read a length prefix, bounded by the configured limit
    pub(crate) fn read_len(&mut self) -> Result<u32> {
        let length = self.read_varint()?;
        if length > self.config.max_length {
            return Err(self.fail(Error::LengthLimit {
                length,
                limit: self.config.max_length,
            }));
        }
        Ok(length)
    }

    // ------------------------------------------------------------------
    // Type tokens
    // ------------------------------------------------------------------

    /// Write the type token for `descriptor`
    pub fn write_type(&mut self, descriptor: TypeDescriptor) -> Result<()> {
        self.check()?;
        let (type_id, is_new) = self.identity.type_id_for(descriptor.id());
        self.write_varint(type_id.get())?;
        if is_new {
            trace!(tag = descriptor.tag(), type_id = type_id.get(), "new type token");
            self.write_fixed(descriptor.id().get())?;
        }
        Ok(())
    }

    /// Read a type token, returning the stable identifier it names
    pub fn read_type(&mut self) -> Result<StableId> {
        let raw = self.read_varint()?;
        let type_id = TypeId::new(raw);
        if let Some(stable) = self.identity.resolve_type(type_id) {
            return Ok(stable);
        }

        let expected = self.identity.next_type_id();
        if raw < TypeId::FIRST.get() || (self.config.strict_ids && type_id != expected) {
            return Err(self.fail(Error::UnexpectedId {
                what: "type",
                expected: expected.get(),
                found: raw,
            }));
        }

        let stable = StableId::from_raw(self.read_fixed()?);
        trace!(type_id = raw, id = %stable, "new type token");
        self.identity.bind_type(type_id, stable);
        Ok(stable)
    }

    fn describe(&self, id: StableId) -> String {
        match self.registry.find(id) {
            Some(descriptor) => descriptor.tag().to_string(),
            None => id.to_string(),
        }
    }

    fn lookup(&mut self, id: StableId) -> Result<TypeDescriptor> {
        match self.registry.find(id) {
            Some(descriptor) => Ok(descriptor),
            None => Err(self.fail(Error::unknown_type(id.get()))),
        }
    }

    /// Read a type token and create a default instance of that type.
    ///
    /// With `expected` set, the instance must be that type or derive from
    /// it; otherwise it is dropped and a type error raised.
    pub fn instantiate(
        &mut self,
        expected: Option<StableId>,
        expected_name: &str,
    ) -> Result<Box<dyn Object>> {
        let stable = self.read_type()?;
        let descriptor = self.lookup(stable)?;
        let object = descriptor.create();
        if let Some(expected) = expected {
            if !object.is_of_type(expected) {
                drop(object);
                return Err(self.fail(Error::type_mismatch(expected_name, descriptor.tag())));
            }
        }
        Ok(object)
    }

    /// Like [`instantiate`](Self::instantiate), behind an `Rc<RefCell<_>>`.
    ///
    /// Also returns the handle-table slot retaining the new object.
    pub fn instantiate_shared(
        &mut self,
        expected: Option<StableId>,
        expected_name: &str,
    ) -> Result<(Rc<RefCell<dyn Object>>, Slot)> {
        let stable = self.read_type()?;
        let descriptor = self.lookup(stable)?;
        let (object, slot) = descriptor.create_shared();
        if let Some(expected) = expected {
            let compatible = object.borrow().is_of_type(expected);
            if !compatible {
                return Err(self.fail(Error::type_mismatch(expected_name, descriptor.tag())));
            }
        }
        Ok((object, slot))
    }

    // ------------------------------------------------------------------
    // Objects by value
    // ------------------------------------------------------------------

    /// Write the type token of `object`, then its fields
    pub fn save_object<T: Object + ?Sized>(&mut self, object: &mut T) -> Result<()> {
        self.check()?;
        self.write_type(object.descriptor())?;
        object.serialize(self)
    }

    /// Verify the stream names the type of `object`, then read its fields
    pub fn load_object<T: Object + ?Sized>(&mut self, object: &mut T) -> Result<()> {
        self.check()?;
        let stable = self.read_type()?;
        let descriptor = object.descriptor();
        if stable != descriptor.id() {
            let found = self.describe(stable);
            return Err(self.fail(Error::type_mismatch(descriptor.tag(), found)));
        }
        object.serialize(self)
    }
}

impl fmt::Debug for Archive<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Archive")
            .field("mode", &self.mode)
            .field("error", &self.error)
            .field("checksum", &format_args!("{:#010x}", self.checksum.value()))
            .field("config", &self.config)
            .field("identity", &self.identity)
            .finish()
    }
}
