//! PDF Logical Structure (Tagged PDF) support.
//!
//! This module builds, indexes and persists structure trees according to
//! ISO 32000-1:2008 Section 14.7.
//!
//! ## Overview
//!
//! Tagged PDFs contain explicit document structure that defines reading order,
//! semantic meaning, and accessibility information. A structure tree consists of:
//! - **StructTreeRoot**: The root of the structure hierarchy
//! - **StructElem**: Structure elements (paragraphs, headings, forms, etc.)
//! - **OBJR**: Object references tying an annotation or XObject to an element
//! - **ParentTree**: Maps each content item's `/StructParent` back to its element
//!
//! [`StructureBuilder`] keeps the element graph and the parent tree in
//! lock-step: content items are linked with [`StructureBuilder::link`], and
//! [`StructureBuilder::bind_and_finalize`] writes the tree into an
//! [`ObjectStore`](crate::store::ObjectStore) and binds it to the catalog.
//!
//! ## Example
//!
//! ```
//! use tagged_pdf::catalog::DocumentCatalog;
//! use tagged_pdf::content::StoredAnnotation;
//! use tagged_pdf::store::{MemoryStore, ObjectSerializer, ObjectStore};
//! use tagged_pdf::structure::StructureBuilder;
//!
//! # fn main() -> tagged_pdf::Result<()> {
//! let mut store = MemoryStore::new();
//! let page = store.add_page(612.0, 792.0)?;
//! let widget = store.add(ObjectSerializer::dict(vec![
//!     ("Type", ObjectSerializer::name("Annot")),
//!     ("Subtype", ObjectSerializer::name("Widget")),
//! ]));
//! store.add_annotation(page, widget)?;
//!
//! let mut builder = StructureBuilder::new_document();
//! let document = builder.add_top_level_element("Document")?;
//! let form = builder.add_element("Form", document)?;
//! let index = builder.link(&mut StoredAnnotation::open(&mut store, widget)?, form)?;
//! assert_eq!(index, 0);
//!
//! builder.metadata_mut().mark_tagged();
//! builder.metadata_mut().set_language("en-US")?;
//! builder.bind_and_finalize(&mut store)?;
//! # Ok(())
//! # }
//! ```

mod assembler;
mod builder;
mod consistency;
pub mod graph;
mod linker;
pub mod metadata;
pub mod parent_tree;
mod parser;
mod snapshot;
mod types;

pub use assembler::bind;
pub use builder::StructureBuilder;
pub use graph::{ElementGraph, RemovedChild};
pub use linker::LinkStep;
pub use metadata::AccessibilityMetadata;
pub use parent_tree::{ParentTree, ParentTreeEntry};
pub use snapshot::{ElementSnapshot, NodeSnapshot, ParentTreeSnapshot, TreeSnapshot};
pub use types::{
    ElementId, ObjRefId, ObjectReference, Parent, StructChild, StructElem, StructType,
};
