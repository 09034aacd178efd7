//! # grapharc-core
//!
//! A binary archive engine for cyclic, polymorphic object graphs.
//!
//! This crate provides the core functionality for:
//! - Saving and loading values through one symmetric field walk
//! - Preserving pointer identity, so shared subgraphs and cycles round-trip
//! - Reconstructing concrete types from a stream-supplied type token
//! - Detecting writer/reader desynchronization with an embedded checksum
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`wire`]: Varint, fixed-width and checksum encodings
//! - [`registry`]: Stable type identifiers and the factory registry
//! - [`object`]: Serialization traits and the declaration macros
//! - [`identity`]: Per-session object and type identity maps
//! - [`archive`]: The engine and its per-category encodings
//! - [`transport`]: Memory, file, TCP and filter transports
//! - [`error`]: Error types and handling
//!
//! ## Example
//!
//! ```
//! use grapharc_core::{polymorphic, Archive, MemoryTransport, Result, Serializable, TypeRegistry};
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! #[derive(Default)]
//! struct Node {
//!     value: u32,
//!     next: Option<Rc<RefCell<Node>>>,
//! }
//!
//! impl Serializable for Node {
//!     fn serialize(&mut self, ar: &mut Archive<'_>) -> Result<()> {
//!         ar.serialize(&mut self.value)?;
//!         ar.serialize(&mut self.next)
//!     }
//! }
//!
//! polymorphic!(Node, "doc.Node");
//! TypeRegistry::global().register::<Node>()?;
//!
//! // a two-node cycle
//! let a = Rc::new(RefCell::new(Node { value: 1, next: None }));
//! let b = Rc::new(RefCell::new(Node { value: 2, next: Some(a.clone()) }));
//! a.borrow_mut().next = Some(b.clone());
//!
//! let mut transport = MemoryTransport::new();
//! let mut ar = Archive::new(&mut transport);
//! ar.save(&mut Some(a.clone()))?;
//! ar.checkpoint()?;
//! drop(ar);
//!
//! transport.rewind();
//! let mut ar = Archive::new(&mut transport);
//! let mut root: Option<Rc<RefCell<Node>>> = None;
//! ar.load(&mut root)?;
//! ar.checkpoint()?;
//!
//! let root = root.unwrap();
//! let other = root.borrow().next.clone().unwrap();
//! assert_eq!(other.borrow().value, 2);
//! assert!(Rc::ptr_eq(other.borrow().next.as_ref().unwrap(), &root));
//! # a.borrow_mut().next = None;
//! # other.borrow_mut().next = None;
//! # Ok::<(), grapharc_core::Error>(())
//! ```
//!
//! ## Extensibility
//!
//! - [`Transport`]: Plug in any byte sink/source
//! - [`Archivable`]: Teach the engine a new value shape
//! - [`Pointee`]: Control how pointer targets are reconstructed
//!

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod archive;
pub mod error;
pub mod identity;
pub mod object;
pub mod plain;
pub mod registry;
pub mod text;
pub mod transport;
pub mod wire;

// Re-export primary types for convenience
pub use archive::{Archivable, Archive, ArchiveConfig, Category, Mode};
pub use error::{Error, ErrorKind, Result};
pub use identity::{IdentityTracker, ObjectId, Ownership, Slot, TypeId};
pub use object::{Object, Pointee, Polymorphic, Serializable};
pub use plain::Plain;
pub use registry::{StableId, TypeDescriptor, TypeRegistry};
pub use text::TextBuf;
pub use transport::{FileTransport, MemoryTransport, TcpTransport, Transport, XorFilter};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
