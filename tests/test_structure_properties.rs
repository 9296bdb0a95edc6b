//! Property tests for structure tree invariants.
//!
//! Random sequences of element creation, linking and removal must always leave
//! an acyclic graph whose parent tree agrees with it, and must survive a
//! finalize and reload unchanged.

use proptest::prelude::*;
use std::collections::HashSet;
use tagged_pdf::catalog::DocumentCatalog;
use tagged_pdf::content::StoredAnnotation;
use tagged_pdf::store::{MemoryStore, ObjectSerializer, ObjectStore};
use tagged_pdf::structure::{ElementId, Parent};
use tagged_pdf::{ObjectRef, StructureBuilder};

#[derive(Debug, Clone)]
enum Op {
    AddTopLevel,
    AddChild(usize),
    Link(usize),
    Pop(usize),
    Unlink(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::AddTopLevel),
        (0usize..64).prop_map(Op::AddChild),
        (0usize..64).prop_map(Op::Link),
        (0usize..64).prop_map(Op::Pop),
        (0usize..64).prop_map(Op::Unlink),
    ]
}

const ROLES: &[&str] = &["Document", "Sect", "Form", "P", "Figure"];

struct Harness {
    store: MemoryStore,
    page: ObjectRef,
    builder: StructureBuilder,
    elements: Vec<ElementId>,
    widgets: Vec<ObjectRef>,
}

impl Harness {
    fn new() -> Self {
        let mut store = MemoryStore::new();
        let page = store.add_page(612.0, 792.0).unwrap();
        let mut builder = StructureBuilder::new_document();
        builder.metadata_mut().mark_tagged();
        builder.metadata_mut().set_language("en-US").unwrap();
        Self {
            store,
            page,
            builder,
            elements: Vec::new(),
            widgets: Vec::new(),
        }
    }

    fn pick(&self, n: usize) -> Option<ElementId> {
        if self.elements.is_empty() {
            None
        } else {
            Some(self.elements[n % self.elements.len()])
        }
    }

    fn apply(&mut self, op: &Op) {
        match *op {
            Op::AddTopLevel => {
                let role = ROLES[self.elements.len() % ROLES.len()];
                let id = self.builder.add_top_level_element(role).unwrap();
                self.elements.push(id);
            },
            Op::AddChild(n) => {
                let Some(parent) = self.pick(n) else { return };
                let role = ROLES[n % ROLES.len()];
                if let Ok(id) = self.builder.add_element(role, parent) {
                    self.elements.push(id);
                }
            },
            Op::Link(n) => {
                let Some(parent) = self.pick(n) else { return };
                let widget = self.store.add(ObjectSerializer::dict(vec![
                    ("Type", ObjectSerializer::name("Annot")),
                    ("Subtype", ObjectSerializer::name("Widget")),
                ]));
                self.store.add_annotation(self.page, widget).unwrap();
                let mut item = StoredAnnotation::open(&mut self.store, widget).unwrap();
                if self.builder.link(&mut item, parent).is_ok() {
                    self.widgets.push(widget);
                }
            },
            Op::Pop(n) => {
                let parent = match self.pick(n) {
                    Some(id) if n % 3 != 0 => Parent::Element(id),
                    _ => Parent::Root,
                };
                let _ = self.builder.pop_child(parent);
            },
            Op::Unlink(n) => {
                if self.widgets.is_empty() {
                    return;
                }
                let widget = self.widgets[n % self.widgets.len()];
                let mut item = StoredAnnotation::open(&mut self.store, widget).unwrap();
                let _ = self.builder.unlink(&mut item);
            },
        }
    }

    fn linked(&self) -> Vec<(ObjectRef, u32)> {
        self.builder
            .object_references()
            .map(|(_, objref)| (objref.target, objref.index))
            .collect()
    }
}

proptest! {
    #[test]
    fn prop_graph_stays_acyclic_and_indexed(ops in prop::collection::vec(op_strategy(), 1..80)) {
        let mut harness = Harness::new();
        for op in &ops {
            harness.apply(op);
        }
        let builder = &harness.builder;
        prop_assert!(builder.check_consistency().is_ok());

        for id in builder.graph().preorder() {
            let ancestors = builder.graph().ancestors(id).unwrap();
            prop_assert!(!ancestors.contains(&id));
            prop_assert!(ancestors.len() < builder.graph().len());
        }

        let next_key = builder.next_key();
        let mut seen = HashSet::new();
        for (target, index) in harness.linked() {
            prop_assert!(index < next_key);
            prop_assert!(seen.insert(index));
            prop_assert_eq!(builder.index_of(target), Some(index));
        }
    }

    #[test]
    fn prop_finalize_then_reload_preserves_indices(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let mut harness = Harness::new();
        for op in &ops {
            harness.apply(op);
        }
        let root = harness.builder.bind_and_finalize(&mut harness.store).unwrap();
        prop_assert_eq!(harness.store.struct_tree_root().unwrap(), Some(root));

        let reloaded = StructureBuilder::from_existing(&harness.store).unwrap();
        prop_assert!(reloaded.check_consistency().is_ok());
        prop_assert_eq!(reloaded.next_key(), harness.builder.next_key());
        prop_assert_eq!(reloaded.graph().len(), harness.builder.graph().preorder().len());
        for (target, index) in harness.linked() {
            prop_assert_eq!(reloaded.index_of(target), Some(index));
        }
    }
}
