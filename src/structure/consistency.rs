//! Consistency check between the element graph and its indices.
//!
//! Verifies, for the attached tree:
//! - every element is reached once and its parent link matches its position
//! - every object reference is a child of its owner, registered under its
//!   index in the parent tree and reachable from its content item identity
//! - every parent tree object entry points back at a live object reference
//! - every key is below the counter

use super::builder::StructureBuilder;
use super::parent_tree::ParentTreeEntry;
use super::types::{ElementId, Parent, StructChild};
use crate::error::{Error, Result};
use std::collections::HashSet;

impl StructureBuilder {
    /// Check the element graph, the parent tree and the identity index
    /// against each other.
    pub fn check_consistency(&self) -> Result<()> {
        self.check_elements()?;
        self.check_object_references()?;
        self.check_parent_tree()?;
        Ok(())
    }

    fn check_elements(&self) -> Result<()> {
        let mut seen: HashSet<ElementId> = HashSet::new();
        let mut stack: Vec<(ElementId, Parent)> = self
            .graph
            .top_level()
            .iter()
            .map(|id| (*id, Parent::Root))
            .collect();

        while let Some((id, expected)) = stack.pop() {
            if !seen.insert(id) {
                return Err(inconsistent(format!("element {} is reachable twice", id)));
            }
            let elem = self.graph.get(id).map_err(|_| {
                inconsistent(format!("element {} was removed but is still referenced", id))
            })?;
            if elem.parent != Some(expected) {
                return Err(inconsistent(format!(
                    "element {} has parent link {:?}, expected {:?}",
                    id, elem.parent, expected
                )));
            }
            for child in &elem.children {
                if let StructChild::Element(kid) = child {
                    stack.push((*kid, Parent::Element(id)));
                }
            }
        }
        Ok(())
    }

    fn check_object_references(&self) -> Result<()> {
        let mut live = 0;
        for (id, objref) in self.object_references() {
            live += 1;
            if !self.graph.is_attached(objref.owner) {
                return Err(inconsistent(format!(
                    "owner {} of {} is not in the tree",
                    objref.owner, objref.target
                )));
            }
            let owned = self
                .graph
                .children(objref.owner)?
                .iter()
                .filter(|c| **c == StructChild::Object(id))
                .count();
            if owned != 1 {
                return Err(inconsistent(format!(
                    "{} appears {} times under element {}",
                    objref.target, owned, objref.owner
                )));
            }
            if objref.index >= self.parent_tree.next_key() {
                return Err(inconsistent(format!(
                    "{} has index {} but the next key is {}",
                    objref.target,
                    objref.index,
                    self.parent_tree.next_key()
                )));
            }
            let registered = self
                .parent_tree
                .lookup(objref.index)
                .map(|ids| ids.contains(&id))
                .unwrap_or(false);
            if !registered {
                return Err(inconsistent(format!(
                    "{} is missing from the parent tree under key {}",
                    objref.target, objref.index
                )));
            }
            if self.by_target.get(&objref.target) != Some(&id) {
                return Err(inconsistent(format!(
                    "{} is not indexed by its content item",
                    objref.target
                )));
            }
        }
        if live != self.by_target.len() {
            return Err(inconsistent(format!(
                "{} object references but {} indexed content items",
                live,
                self.by_target.len()
            )));
        }
        Ok(())
    }

    fn check_parent_tree(&self) -> Result<()> {
        let next_key = self.parent_tree.next_key();
        for (key, entry) in self.parent_tree.iter() {
            if key >= next_key {
                return Err(inconsistent(format!(
                    "parent tree key {} is not below the next key {}",
                    key, next_key
                )));
            }
            let ParentTreeEntry::Objects(ids) = entry else {
                continue;
            };
            for id in ids {
                match self.object_reference(*id) {
                    Some(objref) if objref.index == key => {},
                    Some(objref) => {
                        return Err(inconsistent(format!(
                            "parent tree key {} holds {} which has index {}",
                            key, objref.target, objref.index
                        )))
                    },
                    None => {
                        return Err(inconsistent(format!(
                            "parent tree key {} holds a removed object reference",
                            key
                        )))
                    },
                }
            }
        }
        Ok(())
    }
}

fn inconsistent(msg: String) -> Error {
    Error::InconsistentGraph(msg)
}
