//! Loader for existing structure trees.
//!
//! Parses the StructTreeRoot referenced by the catalog (PDF spec Section 14.7)
//! back into a [`StructureBuilder`] so new content can be linked into it:
//! - `/RoleMap` becomes the metadata role map
//! - `/K` is walked recursively; OBJR kids become object references, MCID and
//!   MCR kids are kept verbatim
//! - `/ParentTree` entries not claimed by an object reference are kept as
//!   foreign entries
//! - `/ParentTreeNextKey` seeds the counter (raised past every key in use)

use super::assembler::ROOT_KEYS;
use super::builder::{StructureBuilder, ELEMENT_KEYS};
use super::parent_tree::{read_number_tree, ParentTreeEntry, MAX_KEY};
use super::types::{ElementId, ObjRefId, ObjectReference, Parent, StructChild};
use crate::catalog::DocumentCatalog;
use crate::config::StructureOptions;
use crate::error::{Error, Result};
use crate::object::{Dict, Object, ObjectRef};
use crate::store::ObjectStore;
use std::collections::{BTreeMap, BTreeSet, HashSet};

struct Loader<'a, S: ObjectStore + ?Sized> {
    store: &'a S,
    builder: StructureBuilder,
    visited: HashSet<ObjectRef>,
    claimed: BTreeSet<u32>,
    /// Object references whose content item has no usable `/StructParent`
    orphans: Vec<ObjRefId>,
}

impl StructureBuilder {
    /// Load the structure tree of an existing document with default options.
    ///
    /// A document without `/StructTreeRoot` gives an empty builder that picks
    /// up the catalog's `/MarkInfo` and `/Lang`.
    pub fn from_existing<S: ObjectStore + ?Sized>(store: &S) -> Result<Self> {
        Self::from_existing_with_options(store, StructureOptions::default())
    }

    /// Load the structure tree of an existing document.
    ///
    /// In strict mode the first malformed element aborts loading; in lenient
    /// mode it is skipped with a warning.
    pub fn from_existing_with_options<S: ObjectStore + ?Sized>(
        store: &S,
        options: StructureOptions,
    ) -> Result<Self> {
        let mut builder = StructureBuilder::with_options(options);
        if store.is_marked()? {
            builder.metadata.mark_tagged();
        }
        if let Some(lang) = store.language()? {
            builder.metadata.set_language(&lang)?;
        }

        let Some(root) = store.struct_tree_root()? else {
            log::debug!("No StructTreeRoot in catalog, starting a new tree");
            return Ok(builder);
        };

        let mut loader = Loader {
            store,
            builder,
            visited: HashSet::new(),
            claimed: BTreeSet::new(),
            orphans: Vec::new(),
        };
        loader.load(root)?;
        let builder = loader.builder;
        log::debug!(
            "Loaded structure tree {} ({} elements, {} parent tree keys, next key {})",
            root,
            builder.graph.len(),
            builder.parent_tree.len(),
            builder.parent_tree.next_key()
        );
        Ok(builder)
    }
}

impl<S: ObjectStore + ?Sized> Loader<'_, S> {
    fn strict(&self) -> bool {
        self.builder.options.strict
    }

    /// Fail in strict mode, warn and carry on in lenient mode.
    fn malformed(&self, msg: String) -> Result<()> {
        if self.strict() {
            Err(Error::InvalidPdf(msg))
        } else {
            log::warn!("{}, skipping", msg);
            Ok(())
        }
    }

    fn load(&mut self, root: ObjectRef) -> Result<()> {
        let store = self.store;
        let root_dict = store.get(root)?.expect_dict()?;
        self.builder.root_ref = Some(root);

        // Parse RoleMap (optional)
        if let Some(role_map) = root_dict.get("RoleMap") {
            if let Some(role_map) = store.resolve(role_map)?.as_dict() {
                let mut entries: Vec<(&String, &Object)> = role_map.iter().collect();
                entries.sort_by(|a, b| a.0.cmp(b.0));
                for (custom, standard) in entries {
                    let Some(standard) = standard.as_name() else {
                        self.malformed(format!("RoleMap entry /{} is not a name", custom))?;
                        continue;
                    };
                    if let Err(e) = self.builder.metadata.set_role_alias(custom, standard) {
                        self.malformed(format!("RoleMap entry /{}: {}", custom, e))?;
                    }
                }
            }
        }

        // Parse ParentTree (optional)
        let mut raw_pairs = BTreeMap::new();
        if let Some(tree) = root_dict.get("ParentTree") {
            let loaded = read_number_tree(store, tree, self.builder.options.max_depth)?;
            raw_pairs = loaded.pairs;
            self.builder.parent_tree_nodes = loaded.nodes;
        }

        if let Some(next_key) = root_dict.get("ParentTreeNextKey") {
            match store.resolve(next_key)?.as_key() {
                Some(next_key) => {
                    if let Err(e) = self.builder.parent_tree.advance_to(next_key) {
                        self.malformed(format!("/ParentTreeNextKey {}: {}", next_key, e))?;
                    }
                },
                None => self.malformed("invalid /ParentTreeNextKey".to_string())?,
            }
        }

        self.builder.root_extra = root_dict
            .iter()
            .filter(|(k, _)| !ROOT_KEYS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        // Parse K (children) - can be a single element or array of elements
        if let Some(k) = root_dict.get("K") {
            let kids = match store.resolve(k)? {
                Object::Array(arr) => arr.clone(),
                Object::Null => Vec::new(),
                _ => vec![k.clone()],
            };
            for kid in &kids {
                self.load_element(kid, Parent::Root, 0)?;
            }
        }

        for (key, value) in raw_pairs {
            if !self.claimed.contains(&key) {
                log::trace!("Keeping foreign parent tree entry {}", key);
                if let Err(e) = self
                    .builder
                    .parent_tree
                    .restore(key, ParentTreeEntry::Foreign(value))
                {
                    self.malformed(format!("parent tree key {}: {}", key, e))?;
                }
            }
        }

        for id in std::mem::take(&mut self.orphans) {
            let index = self.builder.parent_tree.allocate_index()?;
            let Some(objref) = self.builder.objrefs.get_mut(id.0).and_then(Option::as_mut) else {
                continue;
            };
            objref.index = index;
            log::warn!(
                "{} has no usable /StructParent, assigning index {}",
                objref.target,
                index
            );
            self.builder
                .parent_tree
                .restore(index, ParentTreeEntry::Objects(vec![id]))?;
        }
        Ok(())
    }

    fn load_element(&mut self, obj: &Object, parent: Parent, depth: usize) -> Result<()> {
        if depth > self.builder.options.max_depth {
            return Err(Error::InvalidPdf(format!(
                "structure tree nested deeper than {} levels",
                self.builder.options.max_depth
            )));
        }
        let store = self.store;
        let obj_ref = obj.as_reference();
        if let Some(r) = obj_ref {
            if !self.visited.insert(r) {
                return self.malformed(format!("structure element {} is referenced twice", r));
            }
        }

        let Some(dict) = store.resolve(obj)?.as_dict() else {
            return self.malformed(format!("structure element {:?} is not a dictionary", obj));
        };

        // Get /S (structure type) - REQUIRED
        let Some(role) = dict.get("S").and_then(|s| s.as_name()) else {
            return self.malformed("StructElem missing /S".to_string());
        };
        let id = match self.builder.graph.create_detached(role) {
            Ok(id) => id,
            Err(e) => return self.malformed(format!("StructElem /S: {}", e)),
        };
        {
            let elem = self.builder.graph.get_mut(id)?;
            elem.obj = obj_ref;
            elem.attributes = attributes(dict);
        }
        self.builder
            .graph
            .append_child(parent, StructChild::Element(id))?;

        // Parse /K (children) - a single kid or an array of kids
        if let Some(k) = dict.get("K") {
            let kids = match store.resolve(k)? {
                Object::Array(arr) => arr.clone(),
                _ => vec![k.clone()],
            };
            let page = dict.get("Pg").and_then(|p| p.as_reference());
            for kid in &kids {
                self.load_kid(kid, id, page, depth)?;
            }
        }
        Ok(())
    }

    fn load_kid(
        &mut self,
        kid: &Object,
        owner: ElementId,
        page: Option<ObjectRef>,
        depth: usize,
    ) -> Result<()> {
        let store = self.store;
        match store.resolve(kid)? {
            // MCID
            Object::Integer(_) => self.push_marked_content(owner, kid.clone()),
            Object::Dictionary(dict) => match dict.get("Type").and_then(|t| t.as_name()) {
                Some("OBJR") => self.load_objr(dict, owner, page),
                Some("MCR") => self.push_marked_content(owner, kid.clone()),
                _ => self.load_element(kid, Parent::Element(owner), depth + 1),
            },
            other => self.malformed(format!("unsupported /K entry {}", other.type_name())),
        }
    }

    fn push_marked_content(&mut self, owner: ElementId, kid: Object) -> Result<()> {
        self.builder
            .graph
            .append_child(Parent::Element(owner), StructChild::MarkedContent(kid))
    }

    fn load_objr(&mut self, dict: &Dict, owner: ElementId, page: Option<ObjectRef>) -> Result<()> {
        let Some(target) = dict.get("Obj").and_then(|o| o.as_reference()) else {
            return self.malformed("OBJR without an indirect /Obj".to_string());
        };
        if self.builder.by_target.contains_key(&target) {
            return self.malformed(format!("{} is referenced by more than one OBJR", target));
        }
        let page = dict.get("Pg").and_then(|p| p.as_reference()).or(page);

        let index = match self.store.get_dict(target) {
            Ok(target_dict) => target_dict.get("StructParent").and_then(|k| k.as_key()),
            Err(Error::ObjectNotFound(_)) => {
                return self.malformed(format!("OBJR target {} does not exist", target));
            },
            Err(e) => return Err(e),
        };
        // A key above the counter limit or one already claimed by another OBJR
        // (files that stamp every widget with the same index) is reassigned.
        let index = index.filter(|index| {
            if *index > MAX_KEY {
                log::warn!("{} has /StructParent {} beyond the key limit", target, index);
                false
            } else if self.claimed.contains(index) {
                log::warn!("{} shares /StructParent {} with another OBJR", target, index);
                false
            } else {
                true
            }
        });
        // Orphans keep their place in reading order; their index is assigned
        // once every key in use is known.
        let id = self.builder.alloc_objref(ObjectReference {
            target,
            page,
            index: index.unwrap_or(0),
            owner,
        });
        self.builder
            .graph
            .append_child(Parent::Element(owner), StructChild::Object(id))?;
        self.builder.by_target.insert(target, id);
        match index {
            Some(index) => {
                self.claimed.insert(index);
                self.builder
                    .parent_tree
                    .restore(index, ParentTreeEntry::Objects(vec![id]))
            },
            None => {
                self.orphans.push(id);
                Ok(())
            },
        }
    }
}

/// Entries of a StructElem dictionary other than the ones the builder writes.
fn attributes(dict: &Dict) -> Dict {
    dict.iter()
        .filter(|(k, _)| !ELEMENT_KEYS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, ObjectSerializer};
    use crate::structure::types::StructType;

    /// Hand-built tagged document: Document -> [P (MCID 0), Form (OBJR widget)].
    fn tagged_store() -> (MemoryStore, ObjectRef) {
        let mut store = MemoryStore::new();
        let page = store.add_page(612.0, 792.0).unwrap();
        let widget = store.add(ObjectSerializer::dict(vec![
            ("Subtype", ObjectSerializer::name("Widget")),
            ("StructParent", ObjectSerializer::integer(1)),
        ]));
        store.add_annotation(page, widget).unwrap();

        let root = store.reserve();
        let doc = store.reserve();
        let p = store.add(ObjectSerializer::dict(vec![
            ("Type", ObjectSerializer::name("StructElem")),
            ("S", ObjectSerializer::name("P")),
            ("P", ObjectSerializer::reference(doc)),
            ("Pg", ObjectSerializer::reference(page)),
            ("K", ObjectSerializer::integer(0)),
        ]));
        let form = store.add(ObjectSerializer::dict(vec![
            ("Type", ObjectSerializer::name("StructElem")),
            ("S", ObjectSerializer::name("Signature")),
            ("P", ObjectSerializer::reference(doc)),
            ("Alt", ObjectSerializer::text("Sign here")),
            (
                "K",
                ObjectSerializer::dict(vec![
                    ("Type", ObjectSerializer::name("OBJR")),
                    ("Obj", ObjectSerializer::reference(widget)),
                    ("Pg", ObjectSerializer::reference(page)),
                ]),
            ),
        ]));
        store
            .put(
                doc,
                ObjectSerializer::dict(vec![
                    ("Type", ObjectSerializer::name("StructElem")),
                    ("S", ObjectSerializer::name("Document")),
                    ("P", ObjectSerializer::reference(root)),
                    (
                        "K",
                        ObjectSerializer::array(vec![
                            ObjectSerializer::reference(p),
                            ObjectSerializer::reference(form),
                        ]),
                    ),
                ]),
            )
            .unwrap();
        store
            .put(
                root,
                ObjectSerializer::dict(vec![
                    ("Type", ObjectSerializer::name("StructTreeRoot")),
                    ("K", ObjectSerializer::reference(doc)),
                    (
                        "ParentTree",
                        ObjectSerializer::dict(vec![(
                            "Nums",
                            ObjectSerializer::array(vec![
                                ObjectSerializer::integer(0),
                                ObjectSerializer::array(vec![ObjectSerializer::reference(p)]),
                                ObjectSerializer::integer(1),
                                ObjectSerializer::reference(form),
                            ]),
                        )]),
                    ),
                    ("ParentTreeNextKey", ObjectSerializer::integer(2)),
                    (
                        "RoleMap",
                        ObjectSerializer::dict(vec![("Signature", ObjectSerializer::name("Form"))]),
                    ),
                    ("IDTree", ObjectSerializer::dict(vec![])),
                ]),
            )
            .unwrap();
        store.set_struct_tree_root(root).unwrap();
        store.set_marked(true).unwrap();
        store.set_language("en-GB").unwrap();
        (store, widget)
    }

    #[test]
    fn test_untagged_document_gives_empty_builder() {
        let store = MemoryStore::new();
        let builder = StructureBuilder::from_existing(&store).unwrap();
        assert!(builder.graph().is_empty());
        assert!(!builder.metadata().is_tagged());
        assert_eq!(builder.root_ref(), None);
    }

    #[test]
    fn test_load_elements_and_metadata() {
        let (store, widget) = tagged_store();
        let builder = StructureBuilder::from_existing(&store).unwrap();

        assert!(builder.metadata().is_tagged());
        assert_eq!(builder.metadata().language(), Some("en-GB"));
        assert_eq!(
            builder.metadata().role_map().get("Signature").map(String::as_str),
            Some("Form")
        );

        let order = builder.graph().preorder();
        let roles: Vec<&str> = order
            .iter()
            .map(|id| builder.role(*id).unwrap().as_str())
            .collect();
        assert_eq!(roles, vec!["Document", "P", "Signature"]);

        let p = order[1];
        assert_eq!(
            builder.children(p).unwrap(),
            &[StructChild::MarkedContent(Object::Integer(0))]
        );
        assert!(builder.attribute(p, "Pg").unwrap().is_some());
        assert!(builder.attribute(order[2], "Alt").unwrap().is_some());

        assert_eq!(builder.index_of(widget), Some(1));
        assert_eq!(builder.next_key(), 2);
        builder.check_consistency().unwrap();
    }

    #[test]
    fn test_unclaimed_keys_are_foreign() {
        let (store, _) = tagged_store();
        let builder = StructureBuilder::from_existing(&store).unwrap();
        assert!(matches!(
            builder.parent_tree().entry(0),
            Some(ParentTreeEntry::Foreign(Object::Array(_)))
        ));
        assert!(builder.parent_tree().lookup(1).is_ok());
        assert!(builder.root_extra.contains_key("IDTree"));
    }

    #[test]
    fn test_missing_struct_parent_gets_fresh_index() {
        let (mut store, widget) = tagged_store();
        store
            .get_mut(widget)
            .unwrap()
            .as_dict_mut()
            .unwrap()
            .remove("StructParent");

        let builder = StructureBuilder::from_existing(&store).unwrap();
        // Key 1 is now unclaimed and kept as foreign; the widget gets key 2
        assert_eq!(builder.index_of(widget), Some(2));
        assert_eq!(builder.next_key(), 3);
        builder.check_consistency().unwrap();
    }

    #[test]
    fn test_struct_parent_beyond_key_limit_is_reassigned() {
        let (mut store, widget) = tagged_store();
        store
            .get_mut(widget)
            .unwrap()
            .as_dict_mut()
            .unwrap()
            .insert("StructParent".to_string(), Object::Integer(i32::MAX as i64));

        let builder = StructureBuilder::from_existing(&store).unwrap();
        assert_eq!(builder.index_of(widget), Some(2));
        assert_eq!(builder.next_key(), 3);
        assert!(i64::from(builder.next_key()) <= i64::from(i32::MAX));
        builder.check_consistency().unwrap();
    }

    #[test]
    fn test_next_key_beyond_limit_strict_vs_lenient() {
        let (mut store, widget) = tagged_store();
        let root = store.struct_tree_root().unwrap().unwrap();
        store
            .get_mut(root)
            .unwrap()
            .as_dict_mut()
            .unwrap()
            .insert("ParentTreeNextKey".to_string(), Object::Integer(i32::MAX as i64 + 1));
        // as_key rejects values that do not fit an i32
        assert!(matches!(
            StructureBuilder::from_existing(&store),
            Err(Error::InvalidPdf(_))
        ));

        store
            .get_mut(root)
            .unwrap()
            .as_dict_mut()
            .unwrap()
            .insert("ParentTreeNextKey".to_string(), Object::Integer(i32::MAX as i64));
        let builder = StructureBuilder::from_existing(&store).unwrap();
        assert_eq!(builder.next_key(), MAX_KEY + 1);
        assert_eq!(builder.index_of(widget), Some(1));
    }

    #[test]
    fn test_shared_fixed_zero_keys_are_split() {
        let mut store = MemoryStore::new();
        let page = store.add_page(612.0, 792.0).unwrap();
        let widgets: Vec<ObjectRef> = (0..3)
            .map(|_| {
                let widget = store.add(ObjectSerializer::dict(vec![
                    ("Subtype", ObjectSerializer::name("Widget")),
                    ("StructParent", ObjectSerializer::integer(0)),
                ]));
                store.add_annotation(page, widget).unwrap();
                widget
            })
            .collect();

        let root = store.reserve();
        let objrs = widgets
            .iter()
            .map(|w| {
                ObjectSerializer::dict(vec![
                    ("Type", ObjectSerializer::name("OBJR")),
                    ("Obj", ObjectSerializer::reference(*w)),
                ])
            })
            .collect();
        let form = store.add(ObjectSerializer::dict(vec![
            ("Type", ObjectSerializer::name("StructElem")),
            ("S", ObjectSerializer::name("Form")),
            ("P", ObjectSerializer::reference(root)),
            ("K", ObjectSerializer::array(objrs)),
        ]));
        store
            .put(
                root,
                ObjectSerializer::dict(vec![
                    ("Type", ObjectSerializer::name("StructTreeRoot")),
                    ("K", ObjectSerializer::reference(form)),
                    (
                        "ParentTree",
                        ObjectSerializer::dict(vec![(
                            "Nums",
                            ObjectSerializer::array(vec![
                                ObjectSerializer::integer(0),
                                ObjectSerializer::reference(form),
                            ]),
                        )]),
                    ),
                    ("ParentTreeNextKey", ObjectSerializer::integer(1)),
                ]),
            )
            .unwrap();
        store.set_struct_tree_root(root).unwrap();

        let builder = StructureBuilder::from_existing(&store).unwrap();
        let indices: Vec<Option<u32>> = widgets.iter().map(|w| builder.index_of(*w)).collect();
        assert_eq!(indices, vec![Some(0), Some(1), Some(2)]);
        assert_eq!(builder.next_key(), 3);
        assert_eq!(builder.parent_tree().lookup(0).unwrap().len(), 1);
        builder.check_consistency().unwrap();
    }

    #[test]
    fn test_missing_role_strict_vs_lenient() {
        let (mut store, _) = tagged_store();
        let root = store.struct_tree_root().unwrap().unwrap();
        let broken = store.add(ObjectSerializer::dict(vec![(
            "Type",
            ObjectSerializer::name("StructElem"),
        )]));
        let root_dict = store.get_mut(root).unwrap().as_dict_mut().unwrap();
        let doc = root_dict["K"].clone();
        root_dict.insert(
            "K".to_string(),
            ObjectSerializer::array(vec![doc, ObjectSerializer::reference(broken)]),
        );

        assert!(matches!(
            StructureBuilder::from_existing(&store),
            Err(Error::InvalidPdf(_))
        ));

        let builder =
            StructureBuilder::from_existing_with_options(&store, StructureOptions::lenient())
                .unwrap();
        assert_eq!(builder.graph().top_level().len(), 1);
        let doc = builder.graph().top_level()[0];
        assert_eq!(builder.role(doc).unwrap(), &StructType::Document);
    }

    #[test]
    fn test_element_cycle_detected() {
        let (mut store, _) = tagged_store();
        let root = store.struct_tree_root().unwrap().unwrap();
        let doc = store.get_dict(root).unwrap()["K"].as_reference().unwrap();
        // Document lists itself as a kid
        store
            .get_mut(doc)
            .unwrap()
            .as_dict_mut()
            .unwrap()
            .insert("K".to_string(), ObjectSerializer::reference(doc));

        assert!(StructureBuilder::from_existing(&store).is_err());
        let builder =
            StructureBuilder::from_existing_with_options(&store, StructureOptions::lenient())
                .unwrap();
        assert_eq!(builder.graph().len(), 1);
    }

    #[test]
    fn test_depth_limit() {
        let (store, _) = tagged_store();
        let options = StructureOptions::default().with_max_depth(0);
        assert!(StructureBuilder::from_existing_with_options(&store, options).is_err());
    }
}
