//! Structure tree builder.
//!
//! [`StructureBuilder`] owns the element graph of one document together with
//! its secondary indices: the parent tree and the content item → index map.
//! All structural mutations go through the builder so the three stay in
//! lock-step. Linking lives in [`super::linker`], writing in
//! [`super::assembler`] and loading in [`super::parser`].
//!
//! PDF Spec: ISO 32000-1:2008, Section 14.7

use super::graph::ElementGraph;
use super::metadata::AccessibilityMetadata;
use super::parent_tree::ParentTree;
use super::types::{
    ElementId, ObjRefId, ObjectReference, Parent, StructChild, StructElem, StructType,
};
use crate::config::StructureOptions;
use crate::error::{Error, Result};
use crate::object::{Dict, Object, ObjectRef};
use std::collections::{BTreeSet, HashMap};

/// Dictionary keys of a StructElem that the builder writes itself.
pub(crate) const ELEMENT_KEYS: &[&str] = &["Type", "S", "P", "K"];

/// Builds (or edits) the structure tree of a single document.
#[derive(Debug, Clone)]
pub struct StructureBuilder {
    pub(super) graph: ElementGraph,

    /// Object reference arena, indexed by [`ObjRefId`]
    pub(super) objrefs: Vec<Option<ObjectReference>>,

    pub(super) parent_tree: ParentTree,

    /// Content item identity -> its object reference
    pub(super) by_target: HashMap<ObjectRef, ObjRefId>,

    pub(super) metadata: AccessibilityMetadata,
    pub(super) options: StructureOptions,

    /// StructTreeRoot object, once loaded or written
    pub(super) root_ref: Option<ObjectRef>,

    /// Parent tree node objects from the last load or write, root first
    pub(super) parent_tree_nodes: Vec<ObjectRef>,

    /// StructTreeRoot entries the builder does not manage (e.g. `/IDTree`,
    /// `/ClassMap`), written back verbatim
    pub(super) root_extra: Dict,

    /// Objects of removed elements, nulled on the next finalize
    pub(super) stale_objects: Vec<ObjectRef>,

    /// Unlinked content items whose `/StructParent` is cleared on finalize
    pub(super) unstamp: BTreeSet<ObjectRef>,

    #[cfg(test)]
    pub(super) fault: Option<super::linker::LinkStep>,
}

impl Default for StructureBuilder {
    fn default() -> Self {
        Self::with_options(StructureOptions::default())
    }
}

impl StructureBuilder {
    /// Start an empty structure tree for a new document.
    pub fn new_document() -> Self {
        Self::default()
    }

    /// Start an empty structure tree with custom options.
    pub fn with_options(options: StructureOptions) -> Self {
        Self {
            graph: ElementGraph::new(),
            objrefs: Vec::new(),
            parent_tree: ParentTree::new(),
            by_target: HashMap::new(),
            metadata: AccessibilityMetadata::new(),
            options,
            root_ref: None,
            parent_tree_nodes: Vec::new(),
            root_extra: Dict::new(),
            stale_objects: Vec::new(),
            unstamp: BTreeSet::new(),
            #[cfg(test)]
            fault: None,
        }
    }

    /// Options in effect.
    pub fn options(&self) -> &StructureOptions {
        &self.options
    }

    /// Add an element directly under the StructTreeRoot.
    pub fn add_top_level_element(&mut self, role: &str) -> Result<ElementId> {
        let id = self.graph.create_element(role, Parent::Root)?;
        log::debug!("Added top-level /{} element {}", role, id);
        Ok(id)
    }

    /// Add an element as the last child of `parent`.
    pub fn add_element(&mut self, role: &str, parent: ElementId) -> Result<ElementId> {
        let id = self.graph.create_element(role, Parent::Element(parent))?;
        log::debug!("Added /{} element {} under {}", role, id, parent);
        Ok(id)
    }

    /// Create an element that is not attached yet.
    pub fn create_detached(&mut self, role: &str) -> Result<ElementId> {
        self.graph.create_detached(role)
    }

    /// Attach a detached element as the last child of `parent`.
    pub fn attach(&mut self, parent: Parent, child: ElementId) -> Result<()> {
        self.graph.append_child(parent, StructChild::Element(child))
    }

    /// Remove the last-appended child of `parent`.
    ///
    /// Object references in the removed subtree leave the parent tree with
    /// it; their content items lose `/StructParent` on the next finalize.
    pub fn pop_child(&mut self, parent: Parent) -> Result<Option<StructChild>> {
        let Some(removed) = self.graph.pop_child(parent)? else {
            return Ok(None);
        };
        for id in removed.objects {
            if let Some(objref) = self.free_objref(id) {
                self.parent_tree.unregister(objref.index, id);
                self.by_target.remove(&objref.target);
                self.unstamp.insert(objref.target);
            }
        }
        self.stale_objects.extend(removed.released);
        Ok(Some(removed.child))
    }

    /// The element graph.
    pub fn graph(&self) -> &ElementGraph {
        &self.graph
    }

    /// Look up an element.
    pub fn element(&self, id: ElementId) -> Result<&StructElem> {
        self.graph.get(id)
    }

    /// Role of an element.
    pub fn role(&self, id: ElementId) -> Result<&StructType> {
        Ok(&self.graph.get(id)?.struct_type)
    }

    /// Parent of an element (`None` while detached).
    pub fn parent_of(&self, id: ElementId) -> Result<Option<Parent>> {
        Ok(self.graph.get(id)?.parent)
    }

    /// Children of an element in reading order.
    pub fn children(&self, id: ElementId) -> Result<&[StructChild]> {
        self.graph.children(id)
    }

    /// Set an attribute entry (e.g. `/Alt`, `/T`, `/Lang`) on an element.
    pub fn set_attribute(&mut self, id: ElementId, key: &str, value: Object) -> Result<()> {
        if ELEMENT_KEYS.contains(&key) {
            return Err(Error::InvalidPdf(format!(
                "/{} of a structure element is managed by the builder",
                key
            )));
        }
        self.graph
            .get_mut(id)?
            .attributes
            .insert(key.to_string(), value);
        Ok(())
    }

    /// Read an attribute entry of an element.
    pub fn attribute(&self, id: ElementId, key: &str) -> Result<Option<&Object>> {
        Ok(self.graph.get(id)?.attributes.get(key))
    }

    /// The parent tree index.
    pub fn parent_tree(&self) -> &ParentTree {
        &self.parent_tree
    }

    /// Next parent tree key (`/ParentTreeNextKey`).
    pub fn next_key(&self) -> u32 {
        self.parent_tree.next_key()
    }

    /// Look up an object reference.
    pub fn object_reference(&self, id: ObjRefId) -> Option<&ObjectReference> {
        self.objrefs.get(id.0).and_then(Option::as_ref)
    }

    /// Live object references in creation order.
    pub fn object_references(&self) -> impl Iterator<Item = (ObjRefId, &ObjectReference)> {
        self.objrefs
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.as_ref().map(|r| (ObjRefId(i), r)))
    }

    /// Owning index assigned to a content item, if it is linked.
    pub fn index_of(&self, target: ObjectRef) -> Option<u32> {
        let id = self.by_target.get(&target)?;
        self.object_reference(*id).map(|r| r.index)
    }

    /// Accessibility metadata.
    pub fn metadata(&self) -> &AccessibilityMetadata {
        &self.metadata
    }

    /// Mutable accessibility metadata.
    pub fn metadata_mut(&mut self) -> &mut AccessibilityMetadata {
        &mut self.metadata
    }

    /// StructTreeRoot object, once the tree was loaded or written.
    pub fn root_ref(&self) -> Option<ObjectRef> {
        self.root_ref
    }

    pub(super) fn alloc_objref(&mut self, objref: ObjectReference) -> ObjRefId {
        let id = ObjRefId(self.objrefs.len());
        self.objrefs.push(Some(objref));
        id
    }

    pub(super) fn free_objref(&mut self, id: ObjRefId) -> Option<ObjectReference> {
        let objref = self.objrefs.get_mut(id.0).and_then(Option::take);
        // Keep the arena short when the newest slot goes away (rollback).
        while matches!(self.objrefs.last(), Some(None)) {
            self.objrefs.pop();
        }
        objref
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_document_is_empty() {
        let builder = StructureBuilder::new_document();
        assert!(builder.graph().is_empty());
        assert!(builder.parent_tree().is_empty());
        assert_eq!(builder.next_key(), 0);
        assert_eq!(builder.root_ref(), None);
    }

    #[test]
    fn test_add_elements() {
        let mut builder = StructureBuilder::new_document();
        let doc = builder.add_top_level_element("Document").unwrap();
        let form = builder.add_element("Form", doc).unwrap();

        assert_eq!(builder.role(form).unwrap(), &StructType::Form);
        assert_eq!(builder.parent_of(form).unwrap(), Some(Parent::Element(doc)));
        assert_eq!(builder.children(doc).unwrap(), &[StructChild::Element(form)]);
    }

    #[test]
    fn test_detached_then_attached() {
        let mut builder = StructureBuilder::new_document();
        let doc = builder.add_top_level_element("Document").unwrap();
        let sect = builder.create_detached("Sect").unwrap();
        assert_eq!(builder.parent_of(sect).unwrap(), None);

        builder.attach(doc.into(), sect).unwrap();
        assert_eq!(builder.parent_of(sect).unwrap(), Some(Parent::Element(doc)));
    }

    #[test]
    fn test_attributes() {
        let mut builder = StructureBuilder::new_document();
        let fig = builder.add_top_level_element("Figure").unwrap();
        builder
            .set_attribute(fig, "Alt", Object::String(b"A chart".to_vec()))
            .unwrap();
        assert_eq!(
            builder.attribute(fig, "Alt").unwrap(),
            Some(&Object::String(b"A chart".to_vec()))
        );
        assert!(builder.set_attribute(fig, "K", Object::Null).is_err());
    }

    #[test]
    fn test_pop_top_level_element() {
        let mut builder = StructureBuilder::new_document();
        let doc = builder.add_top_level_element("Document").unwrap();
        let removed = builder.pop_child(Parent::Root).unwrap();
        assert_eq!(removed, Some(StructChild::Element(doc)));
        assert!(builder.element(doc).is_err());
        assert_eq!(builder.pop_child(Parent::Root).unwrap(), None);
    }

    #[test]
    fn test_builder_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<StructureBuilder>();
    }
}
