//! Tree assembler: writes the structure tree into an object store and binds
//! it to the catalog.
//!
//! Finalizing validates everything up front (graph consistency, metadata, role
//! map, content items, catalog binding) and only then writes, so a rejected
//! finalize leaves the store as it was apart from a reserved root object.
//!
//! Output shape (ISO 32000-1:2008, Section 14.7.2):
//!
//! ```text
//! Catalog
//!  ├─ /StructTreeRoot ─► << /Type /StructTreeRoot
//!  │                        /K [elements]
//!  │                        /ParentTree number tree
//!  │                        /ParentTreeNextKey n
//!  │                        /RoleMap << ... >> >>
//!  ├─ /MarkInfo << /Marked true >>
//!  └─ /Lang (en-US)
//! ```

use super::builder::{StructureBuilder, ELEMENT_KEYS};
use super::metadata::role_map_object;
use super::parent_tree::{write_number_tree, ParentTreeEntry};
use super::types::{ElementId, Parent, StructChild};
use crate::catalog::DocumentCatalog;
use crate::content::stamp_struct_parent;
use crate::error::{Error, Result};
use crate::object::{Dict, Object, ObjectRef};
use crate::store::{ObjectSerializer, ObjectStore};
use std::collections::{BTreeSet, HashMap};

/// StructTreeRoot keys written by the assembler.
pub(crate) const ROOT_KEYS: &[&str] = &["Type", "K", "ParentTree", "ParentTreeNextKey", "RoleMap"];

/// Install `root` as the catalog's `/StructTreeRoot`.
///
/// Binding the root that is already installed is a no-op; a catalog holding a
/// different root is left alone and [`Error::AlreadyBound`] is returned.
pub fn bind<S: ObjectStore + ?Sized>(store: &mut S, root: ObjectRef) -> Result<()> {
    check_bind(store, root)?;
    store.set_struct_tree_root(root)?;
    log::debug!("Bound StructTreeRoot {}", root);
    Ok(())
}

fn check_bind<S: ObjectStore + ?Sized>(store: &S, root: ObjectRef) -> Result<()> {
    match store.struct_tree_root()? {
        Some(existing) if existing != root => Err(Error::AlreadyBound {
            existing,
            requested: root,
        }),
        _ => Ok(()),
    }
}

/// Values checked before anything is written.
struct Validated {
    language: String,
    role_map: Object,
}

impl StructureBuilder {
    /// Validate the tree, write it into `store` and bind it to the catalog.
    ///
    /// Returns the StructTreeRoot reference. Finalizing again rewrites the
    /// same objects.
    pub fn bind_and_finalize<S: ObjectStore + ?Sized>(
        &mut self,
        store: &mut S,
    ) -> Result<ObjectRef> {
        let validated = self.validate(store)?;

        let root = match self.root_ref {
            Some(root) => root,
            None => {
                let root = store.reserve();
                self.root_ref = Some(root);
                root
            },
        };
        check_bind(store, root)?;

        let element_refs = self.assign_element_refs(store);
        self.write_elements(store, root, &element_refs)?;
        let parent_tree = self.write_parent_tree(store, &element_refs)?;
        self.write_root(store, root, parent_tree, &element_refs, validated.role_map)?;
        self.stamp_targets(store)?;

        store.set_marked(true)?;
        store.set_language(&validated.language)?;
        bind(store, root)?;

        for stale in std::mem::take(&mut self.stale_objects) {
            if store.contains(stale) {
                store.put(stale, Object::Null)?;
            }
        }
        self.metadata.mark_tagged();
        log::debug!(
            "Finalized structure tree {} ({} elements, {} parent tree keys, next key {})",
            root,
            element_refs.len(),
            self.parent_tree.len(),
            self.parent_tree.next_key()
        );
        Ok(root)
    }

    fn validate<S: ObjectStore + ?Sized>(&self, store: &S) -> Result<Validated> {
        self.check_consistency()?;

        if !self.metadata.is_tagged() && !store.is_marked()? {
            return Err(Error::NotTagged);
        }

        let language = match self.metadata.language() {
            Some(lang) => lang.to_string(),
            None => match &self.options.default_language {
                Some(lang) if !lang.trim().is_empty() => lang.trim().to_string(),
                _ => store
                    .language()?
                    .filter(|l| !l.trim().is_empty())
                    .ok_or_else(|| Error::InvalidLanguage(String::new()))?,
            },
        };

        let order = self.graph.preorder();
        let mut roles = Vec::with_capacity(order.len());
        for id in &order {
            roles.push(&self.graph.get(*id)?.struct_type);
        }
        let role_map = self
            .metadata
            .effective_role_map(roles, self.options.identity_role_map)?;

        for (_, objref) in self.object_references() {
            store.get_dict(objref.target)?;
        }

        Ok(Validated {
            language,
            role_map: role_map_object(&role_map),
        })
    }

    /// Give every attached element an object, keeping the ones it already has.
    fn assign_element_refs<S: ObjectStore + ?Sized>(
        &mut self,
        store: &mut S,
    ) -> HashMap<ElementId, ObjectRef> {
        let mut refs = HashMap::new();
        for id in self.graph.preorder() {
            let Ok(elem) = self.graph.get_mut(id) else {
                continue;
            };
            let obj_ref = match elem.obj {
                Some(r) => r,
                None => {
                    let r = store.reserve();
                    elem.obj = Some(r);
                    r
                },
            };
            refs.insert(id, obj_ref);
        }
        refs
    }

    fn write_elements<S: ObjectStore + ?Sized>(
        &self,
        store: &mut S,
        root: ObjectRef,
        refs: &HashMap<ElementId, ObjectRef>,
    ) -> Result<()> {
        for id in self.graph.preorder() {
            let elem = self.graph.get(id)?;
            let obj_ref = element_ref(refs, id)?;
            let parent = match elem.parent {
                Some(Parent::Element(p)) => element_ref(refs, p)?,
                _ => root,
            };

            let mut kids = Vec::with_capacity(elem.children.len());
            for child in &elem.children {
                kids.push(match child {
                    StructChild::Element(kid) => {
                        ObjectSerializer::reference(element_ref(refs, *kid)?)
                    },
                    StructChild::Object(objref_id) => {
                        let objref = self.object_reference(*objref_id).ok_or_else(|| {
                            Error::InconsistentGraph(format!(
                                "element {} holds a removed object reference",
                                id
                            ))
                        })?;
                        let mut entries = vec![
                            ("Type", ObjectSerializer::name("OBJR")),
                            ("Obj", ObjectSerializer::reference(objref.target)),
                        ];
                        if let Some(page) = objref.page {
                            entries.push(("Pg", ObjectSerializer::reference(page)));
                        }
                        ObjectSerializer::dict(entries)
                    },
                    StructChild::MarkedContent(obj) => obj.clone(),
                });
            }

            let mut dict: Dict = elem
                .attributes
                .iter()
                .filter(|(k, _)| !ELEMENT_KEYS.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            dict.insert("Type".to_string(), ObjectSerializer::name("StructElem"));
            dict.insert("S".to_string(), ObjectSerializer::name(elem.struct_type.as_str()));
            dict.insert("P".to_string(), ObjectSerializer::reference(parent));
            dict.insert("K".to_string(), Object::Array(kids));
            store.put(obj_ref, Object::Dictionary(dict))?;
        }
        Ok(())
    }

    fn write_parent_tree<S: ObjectStore + ?Sized>(
        &mut self,
        store: &mut S,
        refs: &HashMap<ElementId, ObjectRef>,
    ) -> Result<ObjectRef> {
        let mut pairs = Vec::with_capacity(self.parent_tree.len());
        for (key, entry) in self.parent_tree.iter() {
            let value = match entry {
                ParentTreeEntry::Foreign(obj) => obj.clone(),
                ParentTreeEntry::Objects(ids) => {
                    let mut owners: Vec<ObjectRef> = Vec::new();
                    for id in ids {
                        let Some(objref) = self.object_reference(*id) else {
                            continue;
                        };
                        let owner = element_ref(refs, objref.owner)?;
                        if !owners.contains(&owner) {
                            owners.push(owner);
                        }
                    }
                    match owners.as_slice() {
                        [single] => ObjectSerializer::reference(*single),
                        _ => Object::Array(owners.into_iter().map(Object::Reference).collect()),
                    }
                },
            };
            pairs.push((key, value));
        }

        let nodes = write_number_tree(
            store,
            pairs,
            self.options.leaf_size,
            &self.parent_tree_nodes,
        )?;
        // Nodes left over from a larger tree are no longer referenced.
        for unused in self.parent_tree_nodes.iter().skip(nodes.len()) {
            store.put(*unused, Object::Null)?;
        }
        let root = nodes[0];
        self.parent_tree_nodes = nodes;
        Ok(root)
    }

    fn write_root<S: ObjectStore + ?Sized>(
        &self,
        store: &mut S,
        root: ObjectRef,
        parent_tree: ObjectRef,
        refs: &HashMap<ElementId, ObjectRef>,
        role_map: Object,
    ) -> Result<()> {
        let mut kids = Vec::with_capacity(self.graph.top_level().len());
        for id in self.graph.top_level() {
            kids.push(ObjectSerializer::reference(element_ref(refs, *id)?));
        }

        let mut dict: Dict = self
            .root_extra
            .iter()
            .filter(|(k, _)| !ROOT_KEYS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        dict.insert("Type".to_string(), ObjectSerializer::name("StructTreeRoot"));
        dict.insert("K".to_string(), Object::Array(kids));
        dict.insert("ParentTree".to_string(), ObjectSerializer::reference(parent_tree));
        dict.insert(
            "ParentTreeNextKey".to_string(),
            ObjectSerializer::integer(self.parent_tree.next_key() as i64),
        );
        if role_map.as_dict().is_some_and(|m| !m.is_empty()) {
            dict.insert("RoleMap".to_string(), role_map);
        }
        store.put(root, Object::Dictionary(dict))
    }

    /// Stamp `/StructParent` on every linked content item, clear it on
    /// unlinked ones and set structure tab order on their pages.
    fn stamp_targets<S: ObjectStore + ?Sized>(&mut self, store: &mut S) -> Result<()> {
        let mut pages = BTreeSet::new();
        for (_, objref) in self.object_references() {
            stamp_struct_parent(store, objref.target, objref.index)?;
            let page = objref.page.or_else(|| {
                store
                    .get_dict(objref.target)
                    .ok()?
                    .get("P")?
                    .as_reference()
            });
            pages.extend(page);
        }

        for target in std::mem::take(&mut self.unstamp) {
            if self.by_target.contains_key(&target) {
                continue;
            }
            if let Ok(obj) = store.get_mut(target) {
                if let Some(dict) = obj.as_dict_mut() {
                    dict.remove("StructParent");
                }
            }
        }

        if self.options.structure_tab_order {
            for page in pages {
                if store.contains(page) {
                    store.set_tab_order(page, "S")?;
                }
            }
        }
        Ok(())
    }
}

fn element_ref(refs: &HashMap<ElementId, ObjectRef>, id: ElementId) -> Result<ObjectRef> {
    refs.get(&id).copied().ok_or_else(|| {
        Error::InconsistentGraph(format!("element {} is not part of the written tree", id))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::StoredAnnotation;
    use crate::store::MemoryStore;

    fn widget(store: &mut MemoryStore, page: ObjectRef) -> ObjectRef {
        let annot = store.add(ObjectSerializer::dict(vec![
            ("Type", ObjectSerializer::name("Annot")),
            ("Subtype", ObjectSerializer::name("Widget")),
        ]));
        store.add_annotation(page, annot).unwrap();
        annot
    }

    fn tagged_builder() -> StructureBuilder {
        let mut builder = StructureBuilder::new_document();
        builder.metadata_mut().mark_tagged();
        builder.metadata_mut().set_language("en-US").unwrap();
        builder
    }

    #[test]
    fn test_bind_twice_with_different_roots() {
        let mut store = MemoryStore::new();
        let first = store.add(Object::Null);
        let second = store.add(Object::Null);

        bind(&mut store, first).unwrap();
        bind(&mut store, first).unwrap();
        assert!(matches!(
            bind(&mut store, second),
            Err(Error::AlreadyBound { existing, requested }) if existing == first && requested == second
        ));
        assert_eq!(store.struct_tree_root().unwrap(), Some(first));
    }

    #[test]
    fn test_finalize_writes_tree() {
        let mut store = MemoryStore::new();
        let page = store.add_page(612.0, 792.0).unwrap();
        let annot = widget(&mut store, page);

        let mut builder = tagged_builder();
        let doc = builder.add_top_level_element("Document").unwrap();
        let form = builder.add_element("Form", doc).unwrap();
        let mut item = StoredAnnotation::open(&mut store, annot).unwrap();
        builder.link(&mut item, form).unwrap();

        let root = builder.bind_and_finalize(&mut store).unwrap();
        assert_eq!(store.struct_tree_root().unwrap(), Some(root));
        assert!(store.is_marked().unwrap());
        assert_eq!(store.language().unwrap().as_deref(), Some("en-US"));

        let root_dict = store.get_dict(root).unwrap();
        assert_eq!(root_dict.get("Type").unwrap().as_name(), Some("StructTreeRoot"));
        assert_eq!(root_dict.get("ParentTreeNextKey").unwrap().as_integer(), Some(1));
        let role_map = root_dict.get("RoleMap").unwrap().as_dict().unwrap();
        assert_eq!(role_map.get("Form").unwrap().as_name(), Some("Form"));

        let form_ref = builder.element(form).unwrap().object_ref().unwrap();
        let form_dict = store.get_dict(form_ref).unwrap();
        assert_eq!(form_dict.get("S").unwrap().as_name(), Some("Form"));
        let kids = form_dict.get("K").unwrap().as_array().unwrap();
        let objr = kids[0].as_dict().unwrap();
        assert_eq!(objr.get("Type").unwrap().as_name(), Some("OBJR"));
        assert_eq!(objr.get("Obj").unwrap().as_reference(), Some(annot));
        assert_eq!(objr.get("Pg").unwrap().as_reference(), Some(page));

        let tree = root_dict.get("ParentTree").unwrap().as_reference().unwrap();
        let nums = store.get_dict(tree).unwrap().get("Nums").unwrap().as_array().unwrap();
        assert_eq!(nums[0].as_integer(), Some(0));
        assert_eq!(nums[1].as_reference(), Some(form_ref));

        let annot_dict = store.get_dict(annot).unwrap();
        assert_eq!(annot_dict.get("StructParent").unwrap().as_integer(), Some(0));
        assert_eq!(
            store.get_dict(page).unwrap().get("Tabs").unwrap().as_name(),
            Some("S")
        );
    }

    #[test]
    fn test_finalize_twice_reuses_objects() {
        let mut store = MemoryStore::new();
        let mut builder = tagged_builder();
        builder.add_top_level_element("Document").unwrap();

        let root = builder.bind_and_finalize(&mut store).unwrap();
        let count = store.len();
        assert_eq!(builder.bind_and_finalize(&mut store).unwrap(), root);
        assert_eq!(store.len(), count);
    }

    #[test]
    fn test_finalize_requires_tagged_and_language() {
        let mut store = MemoryStore::new();
        let mut builder = StructureBuilder::new_document();
        builder.add_top_level_element("Document").unwrap();
        assert!(matches!(
            builder.bind_and_finalize(&mut store),
            Err(Error::NotTagged)
        ));

        builder.metadata_mut().mark_tagged();
        assert!(matches!(
            builder.bind_and_finalize(&mut store),
            Err(Error::InvalidLanguage(_))
        ));
        assert_eq!(store.struct_tree_root().unwrap(), None);
    }

    #[test]
    fn test_default_language_and_catalog_language() {
        let mut store = MemoryStore::new();
        let mut builder = StructureBuilder::with_options(
            crate::config::StructureOptions::default().with_default_language("de-DE"),
        );
        builder.metadata_mut().mark_tagged();
        builder.bind_and_finalize(&mut store).unwrap();
        assert_eq!(store.language().unwrap().as_deref(), Some("de-DE"));

        let mut store = MemoryStore::new();
        store.set_language("fr-FR").unwrap();
        store.set_marked(true).unwrap();
        let mut builder = StructureBuilder::new_document();
        builder.bind_and_finalize(&mut store).unwrap();
        assert_eq!(store.language().unwrap().as_deref(), Some("fr-FR"));
    }

    #[test]
    fn test_unmapped_custom_role_blocks_finalize() {
        let mut store = MemoryStore::new();
        let mut builder = tagged_builder();
        builder.add_top_level_element("Signature").unwrap();
        assert!(matches!(
            builder.bind_and_finalize(&mut store),
            Err(Error::UnmappedRole(r)) if r == "Signature"
        ));

        builder.metadata_mut().set_role_alias("Signature", "Form").unwrap();
        let root = builder.bind_and_finalize(&mut store).unwrap();
        let role_map = store.get_dict(root).unwrap().get("RoleMap").unwrap().clone();
        assert_eq!(
            role_map.as_dict().unwrap().get("Signature").unwrap().as_name(),
            Some("Form")
        );
    }

    #[test]
    fn test_finalize_against_foreign_root() {
        let mut store = MemoryStore::new();
        let foreign = store.add(ObjectSerializer::dict(vec![(
            "Type",
            ObjectSerializer::name("StructTreeRoot"),
        )]));
        bind(&mut store, foreign).unwrap();

        let mut builder = tagged_builder();
        builder.add_top_level_element("Document").unwrap();
        assert!(matches!(
            builder.bind_and_finalize(&mut store),
            Err(Error::AlreadyBound { existing, .. }) if existing == foreign
        ));
        assert_eq!(store.struct_tree_root().unwrap(), Some(foreign));
    }

    #[test]
    fn test_missing_target_blocks_finalize() {
        let mut store = MemoryStore::new();
        let mut other = MemoryStore::new();
        let page = other.add_page(612.0, 792.0).unwrap();
        for _ in 0..10 {
            other.add(Object::Null);
        }
        let annot = widget(&mut other, page);

        let mut builder = tagged_builder();
        let form = builder.add_top_level_element("Form").unwrap();
        let mut item = StoredAnnotation::open(&mut other, annot).unwrap();
        builder.link(&mut item, form).unwrap();

        assert!(matches!(
            builder.bind_and_finalize(&mut store),
            Err(Error::ObjectNotFound(r)) if r == annot
        ));
    }

    #[test]
    fn test_unlinked_item_loses_struct_parent() {
        let mut store = MemoryStore::new();
        let page = store.add_page(612.0, 792.0).unwrap();
        let annot = widget(&mut store, page);

        let mut builder = tagged_builder();
        let form = builder.add_top_level_element("Form").unwrap();
        let mut item = StoredAnnotation::open(&mut store, annot).unwrap();
        builder.link(&mut item, form).unwrap();
        builder.bind_and_finalize(&mut store).unwrap();

        builder.pop_child(Parent::Element(form)).unwrap();
        builder.bind_and_finalize(&mut store).unwrap();
        assert!(store.get_dict(annot).unwrap().get("StructParent").is_none());
    }

    #[test]
    fn test_shared_key_writes_owner_array() {
        let mut store = MemoryStore::new();
        let page = store.add_page(612.0, 792.0).unwrap();
        let a = widget(&mut store, page);
        let b = widget(&mut store, page);

        let mut builder = tagged_builder();
        let first = builder.add_top_level_element("Form").unwrap();
        let second = builder.add_top_level_element("Form").unwrap();
        let mut item = StoredAnnotation::open(&mut store, a).unwrap();
        let index = builder.link(&mut item, first).unwrap();
        let mut item = StoredAnnotation::open(&mut store, b).unwrap();
        builder.link(&mut item, second).unwrap();

        // Put b under a's key as well
        let id_b = builder.by_target[&b];
        builder.parent_tree.unregister(1, id_b);
        builder.objrefs[id_b.0].as_mut().unwrap().index = index;
        builder.parent_tree.register(index, id_b).unwrap();

        let root = builder.bind_and_finalize(&mut store).unwrap();
        let root_dict = store.get_dict(root).unwrap();
        let tree = root_dict.get("ParentTree").unwrap().as_reference().unwrap();
        let nums = store.get_dict(tree).unwrap().get("Nums").unwrap().as_array().unwrap();
        assert_eq!(nums.len(), 2);
        assert_eq!(nums[1].as_array().unwrap().len(), 2);
        let stamped = store.get_dict(b).unwrap().get("StructParent").unwrap();
        assert_eq!(stamped.as_integer(), Some(0));
    }
}
