//! In-memory object store.

use super::writer::DocumentWriter;
use super::{ObjectSerializer, ObjectStore};
use crate::error::{Error, Result};
use crate::object::{Object, ObjectRef};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;

/// Object store holding the whole document in memory.
///
/// A fresh store contains an empty page tree and a catalog pointing at it.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    /// PDF version written in the header (e.g., "1.7")
    version: String,
    /// Object ID counter
    next_obj_id: u32,
    /// Allocated objects (id -> object)
    objects: BTreeMap<u32, Object>,
    catalog: ObjectRef,
}

impl MemoryStore {
    /// Create a store with an empty catalog and page tree.
    pub fn new() -> Self {
        Self::with_version("1.7")
    }

    /// Create a store that writes the given PDF version.
    pub fn with_version(version: impl Into<String>) -> Self {
        let mut store = Self {
            version: version.into(),
            next_obj_id: 1,
            objects: BTreeMap::new(),
            catalog: ObjectRef::new(0, 0),
        };

        let catalog = store.reserve();
        let pages = store.add(ObjectSerializer::dict(vec![
            ("Type", ObjectSerializer::name("Pages")),
            ("Kids", ObjectSerializer::array(vec![])),
            ("Count", ObjectSerializer::integer(0)),
        ]));
        store.objects.insert(
            catalog.id,
            ObjectSerializer::dict(vec![
                ("Type", ObjectSerializer::name("Catalog")),
                ("Pages", ObjectSerializer::reference(pages)),
            ]),
        );
        store.catalog = catalog;
        store
    }

    /// PDF version written in the header.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Number of indirect objects (including reserved slots).
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the store has no objects at all.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Serialize the document to bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.write_to(&mut bytes)?;
        Ok(bytes)
    }

    /// Allocate a new object ID.
    fn alloc_obj_id(&mut self) -> u32 {
        let id = self.next_obj_id;
        self.next_obj_id += 1;
        id
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for MemoryStore {
    fn add(&mut self, obj: Object) -> ObjectRef {
        let id = self.alloc_obj_id();
        self.objects.insert(id, obj);
        ObjectRef::new(id, 0)
    }

    fn reserve(&mut self) -> ObjectRef {
        self.add(Object::Null)
    }

    fn put(&mut self, obj_ref: ObjectRef, obj: Object) -> Result<()> {
        match self.objects.get_mut(&obj_ref.id) {
            Some(slot) if obj_ref.gen == 0 => {
                *slot = obj;
                Ok(())
            },
            _ => Err(Error::ObjectNotFound(obj_ref)),
        }
    }

    fn get(&self, obj_ref: ObjectRef) -> Result<&Object> {
        if obj_ref.gen != 0 {
            return Err(Error::ObjectNotFound(obj_ref));
        }
        self.objects
            .get(&obj_ref.id)
            .ok_or(Error::ObjectNotFound(obj_ref))
    }

    fn get_mut(&mut self, obj_ref: ObjectRef) -> Result<&mut Object> {
        if obj_ref.gen != 0 {
            return Err(Error::ObjectNotFound(obj_ref));
        }
        self.objects
            .get_mut(&obj_ref.id)
            .ok_or(Error::ObjectNotFound(obj_ref))
    }

    fn catalog_ref(&self) -> ObjectRef {
        self.catalog
    }

    fn write_to(&self, w: &mut dyn Write) -> Result<()> {
        let reachable = self.reachable();
        let skipped = self.objects.len() - reachable.len();
        if skipped > 0 {
            log::debug!("Dropping {} unreachable objects on write", skipped);
        }
        let writer = DocumentWriter::new(&self.version);
        let objects = self
            .objects
            .iter()
            .filter(|(id, _)| reachable.contains(id))
            .map(|(id, obj)| (ObjectRef::new(*id, 0), obj));
        writer.write(w, objects, self.next_obj_id, self.catalog)
    }
}

impl MemoryStore {
    /// Object numbers reachable from the catalog.
    fn reachable(&self) -> BTreeSet<u32> {
        let mut seen = BTreeSet::new();
        let mut queue = vec![self.catalog.id];
        while let Some(id) = queue.pop() {
            if !seen.insert(id) {
                continue;
            }
            if let Some(obj) = self.objects.get(&id) {
                collect_references(obj, &mut queue);
            }
        }
        seen.retain(|id| self.objects.contains_key(id));
        seen
    }
}

fn collect_references(obj: &Object, out: &mut Vec<u32>) {
    match obj {
        Object::Reference(r) if r.gen == 0 => out.push(r.id),
        Object::Array(items) => items.iter().for_each(|o| collect_references(o, out)),
        Object::Dictionary(dict) => dict.values().for_each(|o| collect_references(o, out)),
        _ => {},
    }
}
