//! Content items that can be linked into a structure tree.
//!
//! A content item is anything a structure element can own through an object
//! reference (OBJR): annotations, form field widgets, XObjects. The engine only
//! needs three things from it (ISO 32000-1:2008, Section 14.7.4.3):
//! - a stable identity (its indirect object reference, written as `/Obj`)
//! - an owning index slot (`/StructParent`), written by the engine
//! - the page it appears on (`/Pg`), if known

use crate::error::Result;
use crate::object::{Object, ObjectRef};
use crate::store::ObjectStore;

/// A renderable item that can be referenced from the structure tree.
pub trait ContentItem {
    /// Indirect reference identifying the item.
    fn identity(&self) -> ObjectRef;

    /// Page the item appears on.
    fn page(&self) -> Option<ObjectRef>;

    /// Current owning index (`/StructParent`), if any.
    fn struct_parent(&self) -> Option<u32>;

    /// Write (or with `None`, remove) the owning index.
    fn set_struct_parent(&mut self, index: Option<u32>) -> Result<()>;
}

/// An annotation dictionary living in an [`ObjectStore`].
///
/// Reads its page from `/P` and keeps `/StructParent` directly in the
/// annotation dictionary, so stamping is visible to everything else sharing
/// the store.
pub struct StoredAnnotation<'a, S: ObjectStore + ?Sized> {
    store: &'a mut S,
    obj_ref: ObjectRef,
}

impl<'a, S: ObjectStore + ?Sized> StoredAnnotation<'a, S> {
    /// Wrap the annotation at `obj_ref`.
    ///
    /// Fails if the object does not exist or is not a dictionary.
    pub fn open(store: &'a mut S, obj_ref: ObjectRef) -> Result<Self> {
        store.get_dict(obj_ref)?;
        Ok(Self { store, obj_ref })
    }

    /// Annotation subtype (`/Subtype`), e.g. `Widget` or `Link`.
    pub fn subtype(&self) -> Option<String> {
        self.store
            .get_dict(self.obj_ref)
            .ok()?
            .get("Subtype")?
            .as_name()
            .map(str::to_string)
    }
}

impl<S: ObjectStore + ?Sized> ContentItem for StoredAnnotation<'_, S> {
    fn identity(&self) -> ObjectRef {
        self.obj_ref
    }

    fn page(&self) -> Option<ObjectRef> {
        self.store
            .get_dict(self.obj_ref)
            .ok()?
            .get("P")?
            .as_reference()
    }

    fn struct_parent(&self) -> Option<u32> {
        self.store
            .get_dict(self.obj_ref)
            .ok()?
            .get("StructParent")?
            .as_key()
    }

    fn set_struct_parent(&mut self, index: Option<u32>) -> Result<()> {
        let dict = self.store.get_mut(self.obj_ref)?.expect_dict_mut()?;
        match index {
            Some(index) => {
                dict.insert("StructParent".to_string(), Object::Integer(index as i64));
            },
            None => {
                dict.remove("StructParent");
            },
        }
        Ok(())
    }
}

/// Stamp `/StructParent` on a stored object without wrapping it.
///
/// Used at finalize time to re-stamp every linked target, which also repairs
/// targets of trees loaded from damaged files.
pub(crate) fn stamp_struct_parent<S: ObjectStore + ?Sized>(
    store: &mut S,
    target: ObjectRef,
    index: u32,
) -> Result<()> {
    let dict = store.get_mut(target)?.expect_dict_mut()?;
    let previous = dict.get("StructParent").and_then(|p| p.as_key());
    if previous != Some(index) {
        if let Some(previous) = previous {
            log::warn!(
                "Re-stamping {} /StructParent {} -> {}",
                target,
                previous,
                index
            );
        }
        dict.insert("StructParent".to_string(), Object::Integer(index as i64));
    }
    Ok(())
}
