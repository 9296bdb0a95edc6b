//! Serializable dump of a structure tree for diagnostics.

use super::builder::StructureBuilder;
use super::parent_tree::ParentTreeEntry;
use super::types::{ElementId, StructChild};
use crate::error::Result;
use crate::object::ObjectRef;
use indexmap::IndexMap;
use serde::Serialize;

/// Point-in-time view of a structure tree.
#[derive(Debug, Clone, Serialize)]
pub struct TreeSnapshot {
    /// StructTreeRoot object, if the tree was loaded or written
    pub root: Option<ObjectRef>,
    /// Whether the document is declared tagged
    pub tagged: bool,
    /// Primary language
    pub language: Option<String>,
    /// Explicit role map entries
    pub role_map: IndexMap<String, String>,
    /// Top-level elements with their subtrees
    pub elements: Vec<ElementSnapshot>,
    /// Parent tree entries in key order
    pub parent_tree: Vec<ParentTreeSnapshot>,
    /// `/ParentTreeNextKey`
    pub next_key: u32,
}

/// One structure element and its subtree.
#[derive(Debug, Clone, Serialize)]
pub struct ElementSnapshot {
    /// Element handle
    pub id: ElementId,
    /// Structure type as written in `/S`
    pub role: String,
    /// Backing object, once written
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object: Option<ObjectRef>,
    /// Children in reading order
    pub children: Vec<NodeSnapshot>,
}

/// Child of an element.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeSnapshot {
    /// Nested element
    Element(ElementSnapshot),
    /// Object reference
    Object {
        /// Content item
        target: ObjectRef,
        /// Page of the content item
        page: Option<ObjectRef>,
        /// Owning index
        index: u32,
    },
    /// Marked content kept from a loaded document
    MarkedContent,
}

/// One parent tree key.
#[derive(Debug, Clone, Serialize)]
pub struct ParentTreeSnapshot {
    /// Key
    pub key: u32,
    /// Content items registered under the key
    pub targets: Vec<ObjectRef>,
    /// Entry loaded from the document and kept verbatim
    pub foreign: bool,
}

impl TreeSnapshot {
    /// Pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl StructureBuilder {
    /// Capture the attached tree, its parent tree and metadata.
    pub fn snapshot(&self) -> TreeSnapshot {
        let elements = self
            .graph
            .top_level()
            .iter()
            .filter_map(|id| self.snapshot_element(*id))
            .collect();

        let parent_tree = self
            .parent_tree
            .iter()
            .map(|(key, entry)| match entry {
                ParentTreeEntry::Objects(ids) => ParentTreeSnapshot {
                    key,
                    targets: ids
                        .iter()
                        .filter_map(|id| self.object_reference(*id).map(|r| r.target))
                        .collect(),
                    foreign: false,
                },
                ParentTreeEntry::Foreign(_) => ParentTreeSnapshot {
                    key,
                    targets: Vec::new(),
                    foreign: true,
                },
            })
            .collect();

        TreeSnapshot {
            root: self.root_ref,
            tagged: self.metadata.is_tagged(),
            language: self.metadata.language().map(str::to_string),
            role_map: self.metadata.role_map().clone(),
            elements,
            parent_tree,
            next_key: self.parent_tree.next_key(),
        }
    }

    fn snapshot_element(&self, id: ElementId) -> Option<ElementSnapshot> {
        let elem = self.graph.get(id).ok()?;
        let children = elem
            .children
            .iter()
            .filter_map(|child| match child {
                StructChild::Element(kid) => self.snapshot_element(*kid).map(NodeSnapshot::Element),
                StructChild::Object(objref) => {
                    self.object_reference(*objref).map(|r| NodeSnapshot::Object {
                        target: r.target,
                        page: r.page,
                        index: r.index,
                    })
                },
                StructChild::MarkedContent(_) => Some(NodeSnapshot::MarkedContent),
            })
            .collect();
        Some(ElementSnapshot {
            id,
            role: elem.struct_type.as_str().to_string(),
            object: elem.obj,
            children,
        })
    }
}
