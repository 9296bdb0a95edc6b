//! Types for PDF logical structure trees.
//!
//! Implements structure element types according to ISO 32000-1:2008 Section 14.7.2.

use crate::object::{Dict, Object, ObjectRef};
use serde::Serialize;

/// Handle of a structure element inside a [`super::StructureBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ElementId(pub(crate) usize);

impl ElementId {
    /// Arena slot of this element.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for ElementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Handle of an object reference (OBJR) node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjRefId(pub(crate) usize);

/// Where a structure element hangs in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Parent {
    /// Directly under the StructTreeRoot (`/K` of the root)
    Root,
    /// Under another structure element
    Element(ElementId),
}

impl From<ElementId> for Parent {
    fn from(id: ElementId) -> Self {
        Parent::Element(id)
    }
}

/// A structure element (StructElem) in the structure tree.
///
/// According to PDF spec Section 14.7.2, each StructElem has:
/// - `/S` - Structure type (e.g., /Document, /P, /H1, /Form)
/// - `/K` - Children (structure elements, object references or marked content)
/// - `/P` - Parent structure element (or the StructTreeRoot)
/// - `/A`, `/Alt`, `/T`, `/Lang`, ... - Optional attributes
#[derive(Debug, Clone)]
pub struct StructElem {
    /// Structure type (e.g., "Document", "Form", or a custom name)
    pub struct_type: StructType,

    /// Parent link. `None` while the element is detached.
    ///
    /// Lookup only: ownership runs from parent to children.
    pub parent: Option<Parent>,

    /// Children in reading order
    pub children: Vec<StructChild>,

    /// Remaining dictionary entries, written back verbatim
    pub attributes: Dict,

    /// Indirect object this element was loaded from or last written to
    pub(crate) obj: Option<ObjectRef>,
}

impl StructElem {
    /// Create a new detached structure element
    pub fn new(struct_type: StructType) -> Self {
        Self {
            struct_type,
            parent: None,
            children: Vec::new(),
            attributes: Dict::new(),
            obj: None,
        }
    }

    /// Indirect object backing this element, once it has one.
    pub fn object_ref(&self) -> Option<ObjectRef> {
        self.obj
    }
}

/// Child of a structure element.
#[derive(Debug, Clone, PartialEq)]
pub enum StructChild {
    /// Another structure element (recursive hierarchy)
    Element(ElementId),

    /// Object reference (OBJR) to an annotation or XObject
    Object(ObjRefId),

    /// Marked content kid (MCID integer or MCR dictionary) kept verbatim from
    /// a loaded document
    MarkedContent(Object),
}

/// An object reference: the leaf linking a structure element to a content item.
///
/// Written as `<< /Type /OBJR /Obj target /Pg page >>` (Section 14.7.4.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectReference {
    /// The referenced content item
    pub target: ObjectRef,
    /// Page the content item appears on
    pub page: Option<ObjectRef>,
    /// Parent tree key the content item is stamped with (`/StructParent`)
    pub index: u32,
    /// Structure element holding this reference
    pub owner: ElementId,
}

/// Standard structure types from PDF spec Section 14.8.4.
///
/// These are the standard structure types defined by the PDF specification.
/// Custom types can be mapped to standard types via the RoleMap.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StructType {
    // Document-level structure types
    /// Document root
    Document,
    /// Part (major division)
    Part,
    /// Article
    Art,
    /// Section
    Sect,
    /// Division
    Div,
    /// Block quotation
    BlockQuote,
    /// Caption
    Caption,
    /// Table of contents
    TOC,
    /// Table of contents item
    TOCI,
    /// Index
    Index,
    /// Non-structural grouping element
    NonStruct,
    /// Private (producer-specific) content
    Private,

    // Paragraph-level structure types
    /// Paragraph
    P,
    /// Heading
    H,
    /// Heading level 1
    H1,
    /// Heading level 2
    H2,
    /// Heading level 3
    H3,
    /// Heading level 4
    H4,
    /// Heading level 5
    H5,
    /// Heading level 6
    H6,

    // List structure types
    /// List
    L,
    /// List item
    LI,
    /// Label (list item marker)
    Lbl,
    /// List body (list item content)
    LBody,

    // Table structure types
    /// Table
    Table,
    /// Table row
    TR,
    /// Table header cell
    TH,
    /// Table data cell
    TD,
    /// Table header group
    THead,
    /// Table body group
    TBody,
    /// Table footer group
    TFoot,

    // Inline structure types
    /// Span (inline generic)
    Span,
    /// Quote
    Quote,
    /// Note
    Note,
    /// Reference
    Reference,
    /// Bibliographic entry
    BibEntry,
    /// Code
    Code,
    /// Link
    Link,
    /// Annotation
    Annot,

    // Illustration structure types
    /// Figure
    Figure,
    /// Formula
    Formula,
    /// Form (interactive form field widget)
    Form,

    // Non-standard or custom type
    /// Custom structure type not defined in the PDF specification
    Custom(String),
}

impl StructType {
    /// Parse structure type from a name (e.g., "P" -> StructType::P)
    pub fn from_str(s: &str) -> Self {
        match s {
            "Document" => Self::Document,
            "Part" => Self::Part,
            "Art" => Self::Art,
            "Sect" => Self::Sect,
            "Div" => Self::Div,
            "BlockQuote" => Self::BlockQuote,
            "Caption" => Self::Caption,
            "TOC" => Self::TOC,
            "TOCI" => Self::TOCI,
            "Index" => Self::Index,
            "NonStruct" => Self::NonStruct,
            "Private" => Self::Private,
            "P" => Self::P,
            "H" => Self::H,
            "H1" => Self::H1,
            "H2" => Self::H2,
            "H3" => Self::H3,
            "H4" => Self::H4,
            "H5" => Self::H5,
            "H6" => Self::H6,
            "L" => Self::L,
            "LI" => Self::LI,
            "Lbl" => Self::Lbl,
            "LBody" => Self::LBody,
            "Table" => Self::Table,
            "TR" => Self::TR,
            "TH" => Self::TH,
            "TD" => Self::TD,
            "THead" => Self::THead,
            "TBody" => Self::TBody,
            "TFoot" => Self::TFoot,
            "Span" => Self::Span,
            "Quote" => Self::Quote,
            "Note" => Self::Note,
            "Reference" => Self::Reference,
            "BibEntry" => Self::BibEntry,
            "Code" => Self::Code,
            "Link" => Self::Link,
            "Annot" => Self::Annot,
            "Figure" => Self::Figure,
            "Formula" => Self::Formula,
            "Form" => Self::Form,
            _ => Self::Custom(s.to_string()),
        }
    }

    /// Name written as `/S` (e.g., StructType::Form -> "Form")
    pub fn as_str(&self) -> &str {
        match self {
            Self::Document => "Document",
            Self::Part => "Part",
            Self::Art => "Art",
            Self::Sect => "Sect",
            Self::Div => "Div",
            Self::BlockQuote => "BlockQuote",
            Self::Caption => "Caption",
            Self::TOC => "TOC",
            Self::TOCI => "TOCI",
            Self::Index => "Index",
            Self::NonStruct => "NonStruct",
            Self::Private => "Private",
            Self::P => "P",
            Self::H => "H",
            Self::H1 => "H1",
            Self::H2 => "H2",
            Self::H3 => "H3",
            Self::H4 => "H4",
            Self::H5 => "H5",
            Self::H6 => "H6",
            Self::L => "L",
            Self::LI => "LI",
            Self::Lbl => "Lbl",
            Self::LBody => "LBody",
            Self::Table => "Table",
            Self::TR => "TR",
            Self::TH => "TH",
            Self::TD => "TD",
            Self::THead => "THead",
            Self::TBody => "TBody",
            Self::TFoot => "TFoot",
            Self::Span => "Span",
            Self::Quote => "Quote",
            Self::Note => "Note",
            Self::Reference => "Reference",
            Self::BibEntry => "BibEntry",
            Self::Code => "Code",
            Self::Link => "Link",
            Self::Annot => "Annot",
            Self::Figure => "Figure",
            Self::Formula => "Formula",
            Self::Form => "Form",
            Self::Custom(name) => name,
        }
    }

    /// Check if this is one of the standard structure types
    pub fn is_standard(&self) -> bool {
        !matches!(self, Self::Custom(_))
    }

    /// Check if this is a heading type (H, H1-H6)
    pub fn is_heading(&self) -> bool {
        matches!(self, Self::H | Self::H1 | Self::H2 | Self::H3 | Self::H4 | Self::H5 | Self::H6)
    }
}

impl std::fmt::Display for StructType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_struct_type_parsing() {
        assert_eq!(StructType::from_str("P"), StructType::P);
        assert_eq!(StructType::from_str("Form"), StructType::Form);
        assert_eq!(StructType::from_str("Document"), StructType::Document);

        // Custom types
        match StructType::from_str("Signature") {
            StructType::Custom(s) => assert_eq!(s, "Signature"),
            _ => panic!("Expected Custom type"),
        }
    }

    #[test]
    fn test_as_str_inverts_from_str() {
        for name in ["Document", "Form", "TOCI", "LBody", "NonStruct", "MyRole"] {
            assert_eq!(StructType::from_str(name).as_str(), name);
        }
    }

    #[test]
    fn test_is_standard() {
        assert!(StructType::Form.is_standard());
        assert!(!StructType::Custom("Sig".into()).is_standard());
        // Names are case-sensitive
        assert!(!StructType::from_str("form").is_standard());
    }

    #[test]
    fn test_is_heading() {
        assert!(StructType::H1.is_heading());
        assert!(StructType::H.is_heading());
        assert!(!StructType::P.is_heading());
    }

    #[test]
    fn test_element_id_display() {
        assert_eq!(ElementId(3).to_string(), "#3");
        assert_eq!(Parent::from(ElementId(3)), Parent::Element(ElementId(3)));
    }
}
