//! Document catalog access.
//!
//! Typed getters and setters for the catalog entries the structure engine
//! depends on (ISO 32000-1:2008, Section 7.7.2): `/StructTreeRoot`,
//! `/MarkInfo`, `/Lang`, `/AcroForm` and the page tree.
//!
//! The methods live on the [`DocumentCatalog`] extension trait, implemented
//! for every [`ObjectStore`].

use crate::error::{Error, Result};
use crate::object::{Dict, Object, ObjectRef};
use crate::store::{ObjectSerializer, ObjectStore};
use std::collections::HashSet;

/// Catalog-level operations available on every object store.
pub trait DocumentCatalog: ObjectStore {
    /// The catalog dictionary.
    fn catalog(&self) -> Result<&Dict> {
        self.get_dict(self.catalog_ref())
    }

    /// Reference currently held in the catalog's `/StructTreeRoot` slot.
    ///
    /// A direct (inline) dictionary has no reference and is reported as
    /// [`Error::InvalidPdf`]; the writer only ever produces indirect roots.
    fn struct_tree_root(&self) -> Result<Option<ObjectRef>> {
        match self.catalog()?.get("StructTreeRoot") {
            None | Some(Object::Null) => Ok(None),
            Some(Object::Reference(r)) => Ok(Some(*r)),
            Some(other) => Err(Error::InvalidPdf(format!(
                "/StructTreeRoot is a direct {}, expected an indirect reference",
                other.type_name()
            ))),
        }
    }

    /// Overwrite the `/StructTreeRoot` slot without any check.
    ///
    /// Use [`crate::structure::bind`] to install a root safely.
    fn set_struct_tree_root(&mut self, root: ObjectRef) -> Result<()> {
        catalog_mut(self)?.insert("StructTreeRoot".to_string(), Object::Reference(root));
        Ok(())
    }

    /// Whether `/MarkInfo /Marked` is true.
    fn is_marked(&self) -> Result<bool> {
        let Some(mark_info) = self.catalog()?.get("MarkInfo") else {
            return Ok(false);
        };
        let marked = self
            .resolve(mark_info)?
            .as_dict()
            .and_then(|d| d.get("Marked"))
            .and_then(|m| m.as_bool())
            .unwrap_or(false);
        Ok(marked)
    }

    /// Set `/MarkInfo /Marked`, keeping any other MarkInfo entries.
    fn set_marked(&mut self, marked: bool) -> Result<()> {
        let existing = self.catalog()?.get("MarkInfo").cloned();
        match existing {
            Some(Object::Reference(r)) => {
                self.get_mut(r)?
                    .expect_dict_mut()?
                    .insert("Marked".to_string(), Object::Boolean(marked));
            },
            Some(Object::Dictionary(mut dict)) => {
                dict.insert("Marked".to_string(), Object::Boolean(marked));
                catalog_mut(self)?.insert("MarkInfo".to_string(), Object::Dictionary(dict));
            },
            _ => {
                let mark_info =
                    ObjectSerializer::dict(vec![("Marked", ObjectSerializer::boolean(marked))]);
                catalog_mut(self)?.insert("MarkInfo".to_string(), mark_info);
            },
        }
        Ok(())
    }

    /// Primary language of the document (`/Lang`).
    fn language(&self) -> Result<Option<String>> {
        let Some(lang) = self.catalog()?.get("Lang") else {
            return Ok(None);
        };
        Ok(self.resolve(lang)?.as_text().filter(|l| !l.is_empty()))
    }

    /// Set the primary language (`/Lang`).
    fn set_language(&mut self, lang: &str) -> Result<()> {
        if lang.trim().is_empty() {
            return Err(Error::InvalidLanguage(lang.to_string()));
        }
        catalog_mut(self)?.insert("Lang".to_string(), ObjectSerializer::text(lang));
        Ok(())
    }

    /// Pages in document order (flattened page tree).
    fn pages(&self) -> Result<Vec<ObjectRef>> {
        let root = self
            .catalog()?
            .get("Pages")
            .and_then(|p| p.as_reference())
            .ok_or_else(|| Error::InvalidPdf("Catalog has no /Pages reference".into()))?;
        let mut pages = Vec::new();
        let mut visited = HashSet::new();
        collect_pages(self, root, &mut pages, &mut visited)?;
        Ok(pages)
    }

    /// Append a blank page to the root page tree node.
    fn add_page(&mut self, width: f64, height: f64) -> Result<ObjectRef> {
        let pages_ref = self
            .catalog()?
            .get("Pages")
            .and_then(|p| p.as_reference())
            .ok_or_else(|| Error::InvalidPdf("Catalog has no /Pages reference".into()))?;

        let page = self.add(ObjectSerializer::dict(vec![
            ("Type", ObjectSerializer::name("Page")),
            ("Parent", ObjectSerializer::reference(pages_ref)),
            ("MediaBox", ObjectSerializer::rect(0.0, 0.0, width, height)),
            ("Resources", ObjectSerializer::dict(vec![])),
        ]));

        let pages = self.get_mut(pages_ref)?.expect_dict_mut()?;
        match pages.get_mut("Kids") {
            Some(Object::Array(kids)) => kids.push(Object::Reference(page)),
            _ => {
                pages.insert("Kids".to_string(), Object::Array(vec![Object::Reference(page)]));
            },
        }
        let count = pages.get("Count").and_then(|c| c.as_integer()).unwrap_or(0);
        pages.insert("Count".to_string(), Object::Integer(count + 1));
        Ok(page)
    }

    /// Add an annotation to a page's `/Annots` and point its `/P` at the page.
    fn add_annotation(&mut self, page: ObjectRef, annot: ObjectRef) -> Result<()> {
        self.get_mut(annot)?
            .expect_dict_mut()?
            .insert("P".to_string(), Object::Reference(page));

        let annots = self.get_dict(page)?.get("Annots").cloned();
        match annots {
            Some(Object::Reference(arr_ref)) => match self.get_mut(arr_ref)? {
                Object::Array(arr) => arr.push(Object::Reference(annot)),
                other => {
                    return Err(Error::InvalidObjectType {
                        expected: "Array".to_string(),
                        found: other.type_name().to_string(),
                    })
                },
            },
            Some(Object::Array(mut arr)) => {
                arr.push(Object::Reference(annot));
                self.get_mut(page)?
                    .expect_dict_mut()?
                    .insert("Annots".to_string(), Object::Array(arr));
            },
            _ => {
                self.get_mut(page)?
                    .expect_dict_mut()?
                    .insert("Annots".to_string(), Object::Array(vec![Object::Reference(annot)]));
            },
        }
        Ok(())
    }

    /// Set the page's annotation tab order (`/Tabs`).
    fn set_tab_order(&mut self, page: ObjectRef, order: &str) -> Result<()> {
        self.get_mut(page)?
            .expect_dict_mut()?
            .insert("Tabs".to_string(), Object::Name(order.to_string()));
        Ok(())
    }

    /// Top-level form fields (`/AcroForm /Fields`).
    fn form_fields(&self) -> Result<Vec<ObjectRef>> {
        let Some(acroform) = self.catalog()?.get("AcroForm") else {
            return Ok(Vec::new());
        };
        let Some(fields) = self.resolve(acroform)?.as_dict().and_then(|d| d.get("Fields")) else {
            return Ok(Vec::new());
        };
        Ok(self
            .resolve(fields)?
            .as_array()
            .map(|arr| arr.iter().filter_map(|f| f.as_reference()).collect())
            .unwrap_or_default())
    }

    /// Register a top-level field in `/AcroForm /Fields`, creating the
    /// AcroForm dictionary if needed.
    fn register_field(&mut self, field: ObjectRef) -> Result<()> {
        let acroform = self.catalog()?.get("AcroForm").cloned();
        let acroform_ref = match acroform {
            Some(Object::Reference(r)) => r,
            Some(Object::Dictionary(dict)) => {
                // Hoist an inline AcroForm so it can be edited in place.
                let r = self.add(Object::Dictionary(dict));
                catalog_mut(self)?.insert("AcroForm".to_string(), Object::Reference(r));
                r
            },
            _ => {
                let r = self.add(ObjectSerializer::dict(vec![(
                    "Fields",
                    ObjectSerializer::array(vec![]),
                )]));
                catalog_mut(self)?.insert("AcroForm".to_string(), Object::Reference(r));
                r
            },
        };

        let fields = self.get_dict(acroform_ref)?.get("Fields").cloned();
        match fields {
            Some(Object::Reference(arr_ref)) => {
                if let Object::Array(arr) = self.get_mut(arr_ref)? {
                    arr.push(Object::Reference(field));
                }
            },
            Some(Object::Array(mut arr)) => {
                arr.push(Object::Reference(field));
                self.get_mut(acroform_ref)?
                    .expect_dict_mut()?
                    .insert("Fields".to_string(), Object::Array(arr));
            },
            _ => {
                self.get_mut(acroform_ref)?
                    .expect_dict_mut()?
                    .insert("Fields".to_string(), Object::Array(vec![Object::Reference(field)]));
            },
        }
        Ok(())
    }

    /// Widget annotations of the field with the given fully qualified name.
    ///
    /// A field merged with its widget (`/Subtype /Widget` on the field itself)
    /// is its own widget; otherwise widgets are the `/Kids` without a `/T`.
    /// Returns an empty list when no field matches.
    fn find_field_widgets(&self, name: &str) -> Result<Vec<ObjectRef>> {
        let mut visited = HashSet::new();
        for field in self.form_fields()? {
            if let Some(widgets) = find_field(self, field, "", name, &mut visited)? {
                return Ok(widgets);
            }
        }
        Ok(Vec::new())
    }
}

impl<S: ObjectStore + ?Sized> DocumentCatalog for S {}

fn catalog_mut<S: ObjectStore + ?Sized>(store: &mut S) -> Result<&mut Dict> {
    let catalog = store.catalog_ref();
    store.get_mut(catalog)?.expect_dict_mut()
}

fn collect_pages<S: ObjectStore + ?Sized>(
    store: &S,
    node: ObjectRef,
    pages: &mut Vec<ObjectRef>,
    visited: &mut HashSet<ObjectRef>,
) -> Result<()> {
    if !visited.insert(node) {
        log::warn!("Page tree cycle at {}, skipping", node);
        return Ok(());
    }
    let dict = store.get_dict(node)?;
    match dict.get("Type").and_then(|t| t.as_name()) {
        Some("Page") => pages.push(node),
        _ => {
            let kids: Vec<ObjectRef> = dict
                .get("Kids")
                .and_then(|k| k.as_array())
                .map(|arr| arr.iter().filter_map(|k| k.as_reference()).collect())
                .unwrap_or_default();
            for kid in kids {
                collect_pages(store, kid, pages, visited)?;
            }
        },
    }
    Ok(())
}

fn find_field<S: ObjectStore + ?Sized>(
    store: &S,
    field: ObjectRef,
    prefix: &str,
    name: &str,
    visited: &mut HashSet<ObjectRef>,
) -> Result<Option<Vec<ObjectRef>>> {
    if !visited.insert(field) {
        return Ok(None);
    }
    let dict = store.get_dict(field)?;
    let partial = dict.get("T").and_then(|t| t.as_text());
    let qualified = match (&partial, prefix.is_empty()) {
        (Some(t), true) => t.clone(),
        (Some(t), false) => format!("{}.{}", prefix, t),
        (None, _) => prefix.to_string(),
    };
    let kids: Vec<ObjectRef> = dict
        .get("Kids")
        .and_then(|k| k.as_array())
        .map(|arr| arr.iter().filter_map(|k| k.as_reference()).collect())
        .unwrap_or_default();

    if partial.is_some() && qualified == name {
        let mut widgets = Vec::new();
        if dict.get("Subtype").and_then(|s| s.as_name()) == Some("Widget") {
            widgets.push(field);
        }
        for kid in kids {
            if !store.get_dict(kid)?.contains_key("T") {
                widgets.push(kid);
            }
        }
        return Ok(Some(widgets));
    }

    for kid in kids {
        if let Some(found) = find_field(store, kid, &qualified, name, visited)? {
            return Ok(Some(found));
        }
    }
    Ok(None)
}
