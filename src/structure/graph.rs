//! Structure element graph.
//!
//! Elements live in an arena and are addressed by [`ElementId`]. A parent owns
//! its ordered children; the child's `parent` field is a lookup-only back
//! link. Removing a child frees the whole subtree; stale handles then fail with
//! [`Error::MissingParent`].

use super::types::{ElementId, ObjRefId, Parent, StructChild, StructElem, StructType};
use crate::error::{Error, Result};
use crate::object::ObjectRef;

/// Result of removing the last child of an element.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedChild {
    /// The child that was removed
    pub child: StructChild,
    /// Object references that were in the removed subtree
    pub objects: Vec<ObjRefId>,
    /// Indirect objects previously written for elements of the removed subtree
    pub released: Vec<ObjectRef>,
}

/// Arena of structure elements under a single StructTreeRoot.
#[derive(Debug, Clone, Default)]
pub struct ElementGraph {
    elements: Vec<Option<StructElem>>,
    top_level: Vec<ElementId>,
}

impl ElementGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an element with the given role and append it to `parent`.
    pub fn create_element(&mut self, role: &str, parent: Parent) -> Result<ElementId> {
        let struct_type = parse_role(role)?;
        self.check_parent(parent)?;
        let id = self.insert(StructElem::new(struct_type));
        self.append_child(parent, StructChild::Element(id))?;
        Ok(id)
    }

    /// Create an element that is not attached anywhere yet.
    ///
    /// Attach it later with [`ElementGraph::append_child`]; detached elements
    /// are not written out.
    pub fn create_detached(&mut self, role: &str) -> Result<ElementId> {
        let struct_type = parse_role(role)?;
        Ok(self.insert(StructElem::new(struct_type)))
    }

    pub(crate) fn insert(&mut self, elem: StructElem) -> ElementId {
        let id = ElementId(self.elements.len());
        self.elements.push(Some(elem));
        id
    }

    /// Append a child to `parent`.
    ///
    /// Element children must be detached. Attaching one of `parent`'s own
    /// ancestors (or `parent` itself), or an element that already hangs
    /// somewhere else, fails with [`Error::Cycle`].
    pub fn append_child(&mut self, parent: Parent, child: StructChild) -> Result<()> {
        self.check_parent(parent)?;

        if let StructChild::Element(child_id) = child {
            let elem = self.get(child_id)?;
            let parent_index = match parent {
                Parent::Element(parent_id) => Some(parent_id.0),
                Parent::Root => None,
            };
            if let Parent::Element(parent_id) = parent {
                if self.is_ancestor_or_self(child_id, parent_id) {
                    return Err(Error::Cycle {
                        child: child_id.0,
                        parent: parent_index,
                    });
                }
            }
            if elem.parent.is_some() {
                log::debug!("Element {} already has a parent", child_id);
                return Err(Error::Cycle {
                    child: child_id.0,
                    parent: parent_index,
                });
            }
            self.get_mut(child_id)?.parent = Some(parent);
        }

        match parent {
            Parent::Root => match child {
                StructChild::Element(id) => self.top_level.push(id),
                _ => {
                    return Err(Error::InconsistentGraph(
                        "the StructTreeRoot can only hold structure elements".into(),
                    ))
                },
            },
            Parent::Element(id) => self.get_mut(id)?.children.push(child),
        }
        Ok(())
    }

    /// Remove the last-appended child of `parent`.
    ///
    /// An element child is freed together with its whole subtree.
    pub fn pop_child(&mut self, parent: Parent) -> Result<Option<RemovedChild>> {
        self.check_parent(parent)?;
        let child = match parent {
            Parent::Root => self.top_level.pop().map(StructChild::Element),
            Parent::Element(id) => self.get_mut(id)?.children.pop(),
        };
        let Some(child) = child else {
            return Ok(None);
        };

        let mut objects = Vec::new();
        let mut released = Vec::new();
        match &child {
            StructChild::Object(obj) => objects.push(*obj),
            StructChild::Element(id) => self.free_subtree(*id, &mut objects, &mut released),
            StructChild::MarkedContent(_) => {},
        }
        Ok(Some(RemovedChild {
            child,
            objects,
            released,
        }))
    }

    fn free_subtree(
        &mut self,
        id: ElementId,
        objects: &mut Vec<ObjRefId>,
        released: &mut Vec<ObjectRef>,
    ) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(elem) = self.elements.get_mut(current.0).and_then(Option::take) else {
                continue;
            };
            released.extend(elem.obj);
            for child in elem.children {
                match child {
                    StructChild::Element(kid) => stack.push(kid),
                    StructChild::Object(obj) => objects.push(obj),
                    StructChild::MarkedContent(_) => {},
                }
            }
        }
    }

    /// Children of `parent` in reading order.
    pub fn children(&self, parent: ElementId) -> Result<&[StructChild]> {
        Ok(&self.get(parent)?.children)
    }

    /// Elements directly under the StructTreeRoot.
    pub fn top_level(&self) -> &[ElementId] {
        &self.top_level
    }

    /// Look up a live element.
    pub fn get(&self, id: ElementId) -> Result<&StructElem> {
        self.elements
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or(Error::MissingParent(id.0))
    }

    pub(crate) fn get_mut(&mut self, id: ElementId) -> Result<&mut StructElem> {
        self.elements
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(Error::MissingParent(id.0))
    }

    /// Whether `id` names a live element.
    pub fn contains(&self, id: ElementId) -> bool {
        self.get(id).is_ok()
    }

    /// Number of live elements (attached or detached).
    pub fn len(&self) -> usize {
        self.elements.iter().filter(|e| e.is_some()).count()
    }

    /// Whether the graph has no live elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ancestors of `id`, nearest first, ending just below the root.
    pub fn ancestors(&self, id: ElementId) -> Result<Vec<ElementId>> {
        let mut out = Vec::new();
        let mut current = self.get(id)?.parent;
        while let Some(Parent::Element(p)) = current {
            if out.len() > self.elements.len() {
                return Err(Error::InconsistentGraph(format!(
                    "parent chain of element {} does not terminate",
                    id
                )));
            }
            out.push(p);
            current = self.get(p)?.parent;
        }
        Ok(out)
    }

    /// Whether `id` hangs (transitively) under the StructTreeRoot.
    pub fn is_attached(&self, id: ElementId) -> bool {
        let mut current = id;
        for _ in 0..=self.elements.len() {
            match self.get(current).map(|e| e.parent) {
                Ok(Some(Parent::Root)) => return true,
                Ok(Some(Parent::Element(p))) => current = p,
                _ => return false,
            }
        }
        false
    }

    /// Whether `candidate` is `of` or one of its ancestors.
    fn is_ancestor_or_self(&self, candidate: ElementId, of: ElementId) -> bool {
        let mut current = Some(of);
        let mut steps = 0;
        while let Some(id) = current {
            if id == candidate {
                return true;
            }
            steps += 1;
            if steps > self.elements.len() {
                return true;
            }
            current = match self.get(id).map(|e| e.parent) {
                Ok(Some(Parent::Element(p))) => Some(p),
                _ => None,
            };
        }
        false
    }

    /// Attached elements in pre-order (reading order).
    pub fn preorder(&self) -> Vec<ElementId> {
        let mut order = Vec::new();
        let mut stack: Vec<ElementId> = self.top_level.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            let Ok(elem) = self.get(id) else {
                continue;
            };
            order.push(id);
            for child in elem.children.iter().rev() {
                if let StructChild::Element(kid) = child {
                    stack.push(*kid);
                }
            }
        }
        order
    }

    fn check_parent(&self, parent: Parent) -> Result<()> {
        match parent {
            Parent::Root => Ok(()),
            Parent::Element(id) => self.get(id).map(|_| ()),
        }
    }
}

fn parse_role(role: &str) -> Result<StructType> {
    if role.trim().is_empty() {
        return Err(Error::InvalidRole(role.to_string()));
    }
    Ok(StructType::from_str(role))
}
