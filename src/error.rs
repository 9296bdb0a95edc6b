//! Error types for the structure engine.
//!
//! This module defines all error types that can occur while building, validating,
//! loading or persisting a tagged PDF structure tree.

use crate::object::ObjectRef;

/// Result type alias for structure engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur during structure tree processing.
#[derive(Debug, thiserror::Error)]
#[allow(clippy::enum_variant_names)] // "Invalid" prefix is intentional for clarity
pub enum Error {
    /// Structure type name is empty or otherwise unusable
    #[error("Invalid structure role: {0:?}")]
    InvalidRole(String),

    /// Appending the child would make an element its own ancestor or give it
    /// a second parent
    #[error("Cycle detected: element {child} cannot be attached under {}", parent_label(.parent))]
    Cycle {
        /// Element that was being attached
        child: usize,
        /// Element it was being attached to (`None` for the StructTreeRoot)
        parent: Option<usize>,
    },

    /// Target structure element does not exist (never created or already removed)
    #[error("Structure element {0} does not exist")]
    MissingParent(usize),

    /// Manually supplied parent tree key falls inside the already-issued range
    #[error("Parent tree key {index} already issued (next key is {next_key})")]
    DuplicateRegistration {
        /// Requested key
        index: u32,
        /// Counter value at the time of the request
        next_key: u32,
    },

    /// Catalog already references a different StructTreeRoot
    #[error("Catalog already bound to StructTreeRoot {existing}, refusing to bind {requested}")]
    AlreadyBound {
        /// Root currently referenced by the catalog
        existing: ObjectRef,
        /// Root the caller tried to bind
        requested: ObjectRef,
    },

    /// Parent tree lookup miss
    #[error("No parent tree entry for key {0}")]
    NotFound(u32),

    /// Element graph and parent tree disagree
    #[error("Inconsistent structure graph: {0}")]
    InconsistentGraph(String),

    /// Custom role with no role map entry resolving to a standard type
    #[error("Structure role /{0} is not mapped to a standard structure type")]
    UnmappedRole(String),

    /// Document language tag is missing or empty
    #[error("Invalid document language: {0:?}")]
    InvalidLanguage(String),

    /// Document is not marked as tagged (`/MarkInfo /Marked`)
    #[error("Document is not marked as tagged")]
    NotTagged,

    /// Parent tree keys exhausted
    #[error("Parent tree key space exhausted (max: {0})")]
    IndexOverflow(u32),

    /// Referenced object not found in the object store
    #[error("Object not found: {0}")]
    ObjectNotFound(ObjectRef),

    /// Object has wrong type
    #[error("Invalid object type: expected {expected}, found {found}")]
    InvalidObjectType {
        /// Expected object type
        expected: String,
        /// Actual object type found
        found: String,
    },

    /// Invalid PDF structure (generic)
    #[error("Invalid PDF: {0}")]
    InvalidPdf(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot serialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn parent_label(parent: &Option<usize>) -> String {
    match parent {
        Some(id) => format!("element {}", id),
        None => "the StructTreeRoot".to_string(),
    }
}
