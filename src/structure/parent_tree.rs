//! Parent tree: the number tree mapping owning indices back to the structure.
//!
//! Every content item linked into the structure tree carries an owning index
//! (`/StructParent`). The parent tree maps that index to the object references
//! that point at the item (ISO 32000-1:2008, Section 14.7.4.4). Keys are issued
//! by a counter (`/ParentTreeNextKey`); the counter is always greater than
//! every key in the tree.
//!
//! On output the tree is written as a PDF number tree (Section 7.9.7): a single
//! `/Nums` node when it fits into one leaf, otherwise a root with `/Kids` of
//! nodes carrying `/Limits`.

use super::types::ObjRefId;
use crate::error::{Error, Result};
use crate::object::{Object, ObjectRef};
use crate::store::{ObjectSerializer, ObjectStore};
use std::collections::{BTreeMap, HashSet};

/// Largest key a parent tree may hold. Keys are written as PDF integers.
pub const MAX_KEY: u32 = i32::MAX as u32 - 1;

/// Value stored under one parent tree key.
#[derive(Debug, Clone, PartialEq)]
pub enum ParentTreeEntry {
    /// Object references sharing this key, in registration order
    Objects(Vec<ObjRefId>),

    /// Entry loaded from an existing document that does not describe object
    /// references (e.g. a page's `/StructParents` array of marked content
    /// owners). Written back verbatim.
    Foreign(Object),
}

/// In-memory parent tree.
#[derive(Debug, Clone, Default)]
pub struct ParentTree {
    entries: BTreeMap<u32, ParentTreeEntry>,
    next_key: u32,
}

impl ParentTree {
    /// Create an empty parent tree with the counter at 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Next key the counter will issue (`/ParentTreeNextKey`).
    pub fn next_key(&self) -> u32 {
        self.next_key
    }

    /// Number of keys in the tree.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the tree has no keys.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Issue the next key and advance the counter.
    pub fn allocate_index(&mut self) -> Result<u32> {
        if self.next_key > MAX_KEY {
            return Err(Error::IndexOverflow(MAX_KEY));
        }
        let index = self.next_key;
        self.next_key += 1;
        log::trace!("Allocated parent tree key {}", index);
        Ok(index)
    }

    /// Un-issue `index` if it is the most recently issued key and still unused.
    ///
    /// Returns whether the counter moved back.
    pub fn release(&mut self, index: u32) -> bool {
        if index.checked_add(1) == Some(self.next_key) && !self.entries.contains_key(&index) {
            self.next_key = index;
            true
        } else {
            log::warn!(
                "Cannot release parent tree key {} (next key is {})",
                index,
                self.next_key
            );
            false
        }
    }

    /// Register an object reference under an already-issued key.
    ///
    /// Registering the same reference twice is a no-op.
    pub fn register(&mut self, index: u32, objref: ObjRefId) -> Result<()> {
        if index >= self.next_key {
            return Err(Error::InconsistentGraph(format!(
                "parent tree key {} was never issued (next key is {})",
                index, self.next_key
            )));
        }
        self.insert(index, objref)
    }

    /// Register an object reference under a caller-chosen key.
    ///
    /// The key must not have been issued yet; the counter moves past it.
    pub fn register_manual(&mut self, index: u32, objref: ObjRefId) -> Result<()> {
        self.check_manual(index)?;
        self.insert(index, objref)?;
        self.next_key = index + 1;
        Ok(())
    }

    /// Check that `index` is usable for [`ParentTree::register_manual`].
    pub fn check_manual(&self, index: u32) -> Result<()> {
        if index < self.next_key {
            return Err(Error::DuplicateRegistration {
                index,
                next_key: self.next_key,
            });
        }
        if index > MAX_KEY {
            return Err(Error::IndexOverflow(MAX_KEY));
        }
        Ok(())
    }

    fn insert(&mut self, index: u32, objref: ObjRefId) -> Result<()> {
        match self
            .entries
            .entry(index)
            .or_insert_with(|| ParentTreeEntry::Objects(Vec::new()))
        {
            ParentTreeEntry::Objects(ids) => {
                if !ids.contains(&objref) {
                    ids.push(objref);
                }
                Ok(())
            },
            ParentTreeEntry::Foreign(_) => Err(Error::DuplicateRegistration {
                index,
                next_key: self.next_key,
            }),
        }
    }

    /// Remove one object reference from `index`; the key disappears with its
    /// last reference.
    ///
    /// Returns whether anything was removed.
    pub fn unregister(&mut self, index: u32, objref: ObjRefId) -> bool {
        let Some(ParentTreeEntry::Objects(ids)) = self.entries.get_mut(&index) else {
            return false;
        };
        let before = ids.len();
        ids.retain(|id| *id != objref);
        let removed = ids.len() != before;
        if ids.is_empty() {
            self.entries.remove(&index);
        }
        removed
    }

    /// Object references registered under `index`.
    pub fn lookup(&self, index: u32) -> Result<&[ObjRefId]> {
        match self.entries.get(&index) {
            Some(ParentTreeEntry::Objects(ids)) => Ok(ids),
            _ => Err(Error::NotFound(index)),
        }
    }

    /// Raw entry under `index`, including foreign entries.
    pub fn entry(&self, index: u32) -> Option<&ParentTreeEntry> {
        self.entries.get(&index)
    }

    /// Entries in ascending key order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &ParentTreeEntry)> {
        self.entries.iter().map(|(k, v)| (*k, v))
    }

    /// Insert an entry read from an existing document.
    pub(crate) fn restore(&mut self, index: u32, entry: ParentTreeEntry) -> Result<()> {
        if index > MAX_KEY {
            return Err(Error::IndexOverflow(MAX_KEY));
        }
        match entry {
            ParentTreeEntry::Objects(ids) => {
                for id in ids {
                    self.insert(index, id)?;
                }
            },
            foreign @ ParentTreeEntry::Foreign(_) => {
                if self.entries.contains_key(&index) {
                    return Err(Error::DuplicateRegistration {
                        index,
                        next_key: self.next_key,
                    });
                }
                self.entries.insert(index, foreign);
            },
        }
        self.advance_past(index)
    }

    /// Move the counter back to `next_key` if no key at or above it is in use.
    pub(crate) fn rewind_to(&mut self, next_key: u32) {
        if self.entries.range(next_key..).next().is_none() {
            self.next_key = self.next_key.min(next_key);
        }
    }

    /// Move the counter forward so that it exceeds `index`.
    pub(crate) fn advance_past(&mut self, index: u32) -> Result<()> {
        if index > MAX_KEY {
            return Err(Error::IndexOverflow(MAX_KEY));
        }
        self.advance_to(index + 1)
    }

    /// Move the counter forward to `next_key` (never backwards).
    ///
    /// The counter may reach `MAX_KEY + 1`, which still fits a PDF integer.
    pub(crate) fn advance_to(&mut self, next_key: u32) -> Result<()> {
        if next_key > MAX_KEY + 1 {
            return Err(Error::IndexOverflow(MAX_KEY));
        }
        self.next_key = self.next_key.max(next_key);
        Ok(())
    }
}

/// Write `pairs` (ascending keys) as a number tree.
///
/// Node objects are taken from `reuse` in order before new ones are reserved,
/// so rewriting a tree keeps its object numbers. Returns every node written,
/// root first.
pub(crate) fn write_number_tree<S: ObjectStore + ?Sized>(
    store: &mut S,
    pairs: Vec<(u32, Object)>,
    leaf_size: usize,
    reuse: &[ObjectRef],
) -> Result<Vec<ObjectRef>> {
    let leaf_size = leaf_size.max(2);
    let mut slots = reuse.iter().copied();
    let root = slots.next().unwrap_or_else(|| store.reserve());
    let mut written = vec![root];

    if pairs.len() <= leaf_size {
        store.put(root, leaf_node(pairs, None))?;
        return Ok(written);
    }

    // Leaves first, then inner levels until one level fits under the root.
    let mut level: Vec<(ObjectRef, u32, u32)> = Vec::new();
    let mut pairs = pairs.into_iter().peekable();
    while pairs.peek().is_some() {
        let chunk: Vec<(u32, Object)> = pairs.by_ref().take(leaf_size).collect();
        let (Some(first), Some(last)) = (chunk.first().map(|p| p.0), chunk.last().map(|p| p.0))
        else {
            break;
        };
        let node = slots.next().unwrap_or_else(|| store.reserve());
        store.put(node, leaf_node(chunk, Some((first, last))))?;
        written.push(node);
        level.push((node, first, last));
    }

    while level.len() > leaf_size {
        let mut parents = Vec::new();
        for group in level.chunks(leaf_size) {
            let first = group[0].1;
            let last = group[group.len() - 1].2;
            let node = slots.next().unwrap_or_else(|| store.reserve());
            store.put(node, inner_node(group, Some((first, last))))?;
            written.push(node);
            parents.push((node, first, last));
        }
        level = parents;
    }

    store.put(root, inner_node(&level, None))?;
    log::debug!(
        "Wrote parent tree with {} nodes under {}",
        written.len(),
        root
    );
    Ok(written)
}

fn limits(range: Option<(u32, u32)>) -> Option<Object> {
    range.map(|(first, last)| {
        ObjectSerializer::array(vec![
            ObjectSerializer::integer(first as i64),
            ObjectSerializer::integer(last as i64),
        ])
    })
}

fn leaf_node(pairs: Vec<(u32, Object)>, range: Option<(u32, u32)>) -> Object {
    let mut nums = Vec::with_capacity(pairs.len() * 2);
    for (key, value) in pairs {
        nums.push(Object::Integer(key as i64));
        nums.push(value);
    }
    let mut entries = vec![("Nums", Object::Array(nums))];
    if let Some(limits) = limits(range) {
        entries.push(("Limits", limits));
    }
    ObjectSerializer::dict(entries)
}

fn inner_node(kids: &[(ObjectRef, u32, u32)], range: Option<(u32, u32)>) -> Object {
    let kids = kids
        .iter()
        .map(|(node, _, _)| ObjectSerializer::reference(*node))
        .collect();
    let mut entries = vec![("Kids", Object::Array(kids))];
    if let Some(limits) = limits(range) {
        entries.push(("Limits", limits));
    }
    ObjectSerializer::dict(entries)
}

/// Number tree contents read from a document.
#[derive(Debug, Default)]
pub(crate) struct LoadedNumberTree {
    /// Key/value pairs; values are left unresolved
    pub pairs: BTreeMap<u32, Object>,
    /// Indirect node objects, root first
    pub nodes: Vec<ObjectRef>,
}

/// Read a number tree, following `/Kids` recursively.
///
/// Negative or non-integer keys are skipped with a warning.
pub(crate) fn read_number_tree<S: ObjectStore + ?Sized>(
    store: &S,
    tree: &Object,
    max_depth: usize,
) -> Result<LoadedNumberTree> {
    let mut loaded = LoadedNumberTree::default();
    let mut visited = HashSet::new();
    read_node(store, tree, 0, max_depth, &mut visited, &mut loaded)?;
    Ok(loaded)
}

fn read_node<S: ObjectStore + ?Sized>(
    store: &S,
    node: &Object,
    depth: usize,
    max_depth: usize,
    visited: &mut HashSet<ObjectRef>,
    loaded: &mut LoadedNumberTree,
) -> Result<()> {
    if depth > max_depth {
        return Err(Error::InvalidPdf(format!(
            "number tree nested deeper than {} levels",
            max_depth
        )));
    }
    if let Some(r) = node.as_reference() {
        if !visited.insert(r) {
            return Err(Error::InvalidPdf(format!("number tree node {} visited twice", r)));
        }
        loaded.nodes.push(r);
    }

    let dict = store
        .resolve(node)?
        .as_dict()
        .ok_or_else(|| Error::InvalidPdf("number tree node is not a dictionary".to_string()))?;

    // Check for /Nums array (leaf node)
    if let Some(nums) = dict.get("Nums") {
        if let Some(nums) = store.resolve(nums)?.as_array() {
            for pair in nums.chunks(2) {
                let [key, value] = pair else {
                    log::warn!("Odd /Nums array length, dropping trailing key");
                    break;
                };
                match store.resolve(key)?.as_key() {
                    Some(key) => {
                        if loaded.pairs.insert(key, value.clone()).is_some() {
                            log::warn!("Number tree key {} appears twice, keeping the last", key);
                        }
                    },
                    None => log::warn!("Skipping invalid number tree key {:?}", key),
                }
            }
        }
    }

    // Check for /Kids array (intermediate node)
    if let Some(kids) = dict.get("Kids") {
        if let Some(kids) = store.resolve(kids)?.as_array() {
            for kid in kids {
                read_node(store, kid, depth + 1, max_depth, visited, loaded)?;
            }
        }
    }

    Ok(())
}
