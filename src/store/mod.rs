//! Indirect object storage.
//!
//! The structure engine never numbers objects or writes file bytes itself. It
//! talks to an [`ObjectStore`], which owns the indirect object table of one
//! document and knows how to persist it.
//!
//! ## Architecture
//!
//! ```text
//! StructureBuilder
//!     ↓ (reserve / put / get_mut)
//! [ObjectStore] (indirect object table)
//!     ↓ (save / write_to)
//! [DocumentWriter] (header, body, xref, trailer)
//!     ↓
//! [ObjectSerializer] (serializes PDF objects)
//!     ↓
//! PDF bytes
//! ```
//!
//! [`MemoryStore`] is the in-memory implementation shipped with the crate. The
//! store is an owned value: dropping it releases the document on every exit
//! path, including when a build is aborted by an error.

mod memory;
mod serializer;
mod writer;

pub use memory::MemoryStore;
pub use serializer::ObjectSerializer;
pub use writer::DocumentWriter;

use crate::error::{Error, Result};
use crate::object::{Object, ObjectRef};
use std::io::Write;
use std::path::Path;

/// Indirect object table of a single document.
pub trait ObjectStore {
    /// Store `obj` as a new indirect object and return its reference.
    fn add(&mut self, obj: Object) -> ObjectRef;

    /// Allocate an object number without a value yet.
    ///
    /// The slot holds `null` until [`ObjectStore::put`] fills it. Used for
    /// objects that point at each other (a structure element and its `/P`).
    fn reserve(&mut self) -> ObjectRef;

    /// Set the value of an existing or reserved indirect object.
    fn put(&mut self, obj_ref: ObjectRef, obj: Object) -> Result<()>;

    /// Load an indirect object.
    fn get(&self, obj_ref: ObjectRef) -> Result<&Object>;

    /// Load an indirect object for in-place modification.
    fn get_mut(&mut self, obj_ref: ObjectRef) -> Result<&mut Object>;

    /// Reference of the document catalog.
    fn catalog_ref(&self) -> ObjectRef;

    /// Serialize every object reachable from the catalog.
    fn write_to(&self, w: &mut dyn Write) -> Result<()>;

    /// Whether `obj_ref` names an object in this store.
    fn contains(&self, obj_ref: ObjectRef) -> bool {
        self.get(obj_ref).is_ok()
    }

    /// Follow an indirect reference, or return direct objects unchanged.
    fn resolve<'a>(&'a self, obj: &'a Object) -> Result<&'a Object> {
        match obj {
            Object::Reference(obj_ref) => self.get(*obj_ref),
            _ => Ok(obj),
        }
    }

    /// Load an indirect object that must be a dictionary.
    fn get_dict(&self, obj_ref: ObjectRef) -> Result<&crate::object::Dict> {
        self.get(obj_ref)?.expect_dict()
    }

    /// Write the document to a file.
    ///
    /// The store is borrowed immutably: a failed save leaves it unchanged and
    /// can simply be retried.
    fn save(&self, path: &Path) -> Result<()> {
        let mut bytes = Vec::new();
        self.write_to(&mut bytes)?;
        std::fs::write(path, bytes).map_err(Error::Io)?;
        log::debug!("Saved {} to {}", self.catalog_ref(), path.display());
        Ok(())
    }
}
