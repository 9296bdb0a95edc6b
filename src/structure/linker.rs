//! Reference linker: registers a content item in the structure tree.
//!
//! Linking runs five steps:
//!
//! 1. allocate an owning index from the parent tree counter
//! 2. stamp the content item with it (`/StructParent`)
//! 3. build the object reference (OBJR)
//! 4. append the object reference to the target element
//! 5. register index -> reference in the parent tree
//!
//! Either all five take effect or none does: a failure undoes the completed
//! steps in reverse order and restores the item's previous `/StructParent`.

use super::builder::StructureBuilder;
use super::types::{ElementId, ObjRefId, ObjectReference, Parent, StructChild};
use crate::content::ContentItem;
use crate::error::{Error, Result};

/// Steps of a link operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStep {
    /// Owning index allocation
    Allocate,
    /// `/StructParent` written on the content item
    Stamp,
    /// Object reference built
    Construct,
    /// Object reference appended to the target element
    Append,
    /// Parent tree updated
    Register,
}

#[derive(Debug, Clone, Copy)]
enum IndexSource {
    Counter,
    Manual,
}

/// Undo log of a link in progress.
#[derive(Debug, Default)]
struct LinkTransaction {
    index: Option<u32>,
    counter: bool,
    next_key_before: u32,
    previous_stamp: Option<Option<u32>>,
    objref: Option<ObjRefId>,
    appended: bool,
    registered: bool,
}

impl StructureBuilder {
    /// Link a content item under `target`, returning its owning index.
    ///
    /// The index comes from the parent tree counter. Linking an item that is
    /// already linked returns its existing index and changes nothing.
    pub fn link<C: ContentItem + ?Sized>(
        &mut self,
        item: &mut C,
        target: ElementId,
    ) -> Result<u32> {
        self.link_inner(item, target, IndexSource::Counter, 0)
    }

    /// Link a content item under `target` with a caller-chosen owning index.
    ///
    /// `index` must not have been issued yet
    /// ([`Error::DuplicateRegistration`] otherwise); the counter moves past it.
    pub fn link_with_index<C: ContentItem + ?Sized>(
        &mut self,
        item: &mut C,
        target: ElementId,
        index: u32,
    ) -> Result<u32> {
        self.link_inner(item, target, IndexSource::Manual, index)
    }

    fn link_inner<C: ContentItem + ?Sized>(
        &mut self,
        item: &mut C,
        target: ElementId,
        source: IndexSource,
        manual_index: u32,
    ) -> Result<u32> {
        let identity = item.identity();
        if let Some(index) = self.index_of(identity) {
            log::debug!("{} is already linked with index {}", identity, index);
            return Ok(index);
        }

        self.graph.get(target)?;
        if !self.graph.is_attached(target) {
            return Err(Error::MissingParent(target.index()));
        }

        let mut tx = LinkTransaction::default();
        match self.run_steps(item, target, source, manual_index, &mut tx) {
            Ok(index) => {
                if let Some(id) = tx.objref {
                    self.by_target.insert(identity, id);
                }
                self.unstamp.remove(&identity);
                log::debug!(
                    "Linked {} under element {} with index {}",
                    identity,
                    target,
                    index
                );
                Ok(index)
            },
            Err(e) => {
                log::warn!("Linking {} failed, rolling back: {}", identity, e);
                self.rollback(item, target, tx);
                Err(e)
            },
        }
    }

    fn run_steps<C: ContentItem + ?Sized>(
        &mut self,
        item: &mut C,
        target: ElementId,
        source: IndexSource,
        manual_index: u32,
        tx: &mut LinkTransaction,
    ) -> Result<u32> {
        // 1. allocate
        tx.next_key_before = self.parent_tree.next_key();
        let index = match source {
            IndexSource::Counter => {
                let index = self.parent_tree.allocate_index()?;
                tx.counter = true;
                index
            },
            IndexSource::Manual => {
                self.parent_tree.check_manual(manual_index)?;
                manual_index
            },
        };
        tx.index = Some(index);
        self.inject(LinkStep::Allocate)?;

        // 2. stamp
        let previous = item.struct_parent();
        item.set_struct_parent(Some(index))?;
        tx.previous_stamp = Some(previous);
        self.inject(LinkStep::Stamp)?;

        // 3. construct
        let identity = item.identity();
        if !identity.is_valid() {
            return Err(Error::InvalidPdf(format!(
                "content item identity {} is not an indirect object",
                identity
            )));
        }
        let id = self.alloc_objref(ObjectReference {
            target: identity,
            page: item.page(),
            index,
            owner: target,
        });
        tx.objref = Some(id);
        self.inject(LinkStep::Construct)?;

        // 4. append
        self.graph
            .append_child(Parent::Element(target), StructChild::Object(id))?;
        tx.appended = true;
        self.inject(LinkStep::Append)?;

        // 5. register
        match source {
            IndexSource::Counter => self.parent_tree.register(index, id)?,
            IndexSource::Manual => self.parent_tree.register_manual(index, id)?,
        }
        tx.registered = true;
        self.inject(LinkStep::Register)?;

        Ok(index)
    }

    fn rollback<C: ContentItem + ?Sized>(
        &mut self,
        item: &mut C,
        target: ElementId,
        tx: LinkTransaction,
    ) {
        if let (true, Some(index), Some(id)) = (tx.registered, tx.index, tx.objref) {
            self.parent_tree.unregister(index, id);
            // register_manual moved the counter; put it back.
            if !tx.counter {
                self.parent_tree.rewind_to(tx.next_key_before);
            }
        }
        if tx.appended {
            if let Err(e) = self.graph.pop_child(Parent::Element(target)) {
                log::error!("Rollback could not detach object reference: {}", e);
            }
        }
        if let Some(id) = tx.objref {
            self.free_objref(id);
        }
        if let Some(previous) = tx.previous_stamp {
            if let Err(e) = item.set_struct_parent(previous) {
                log::error!("Rollback could not restore /StructParent: {}", e);
            }
        }
        if let (true, Some(index)) = (tx.counter, tx.index) {
            self.parent_tree.release(index);
        }
    }

    /// Remove a linked content item from the tree.
    ///
    /// Its `/StructParent` is cleared, its object reference leaves the owning
    /// element and its parent tree entry goes with it. Returns the index it had.
    pub fn unlink<C: ContentItem + ?Sized>(&mut self, item: &mut C) -> Result<u32> {
        let identity = item.identity();
        let Some(&id) = self.by_target.get(&identity) else {
            return Err(Error::ObjectNotFound(identity));
        };
        let Some(objref) = self.object_reference(id).cloned() else {
            return Err(Error::InconsistentGraph(format!(
                "{} maps to a removed object reference",
                identity
            )));
        };

        item.set_struct_parent(None)?;

        let owner = self.graph.get_mut(objref.owner)?;
        owner
            .children
            .retain(|child| *child != StructChild::Object(id));
        self.parent_tree.unregister(objref.index, id);
        self.by_target.remove(&identity);
        self.free_objref(id);
        self.unstamp.insert(identity);
        log::debug!("Unlinked {} (index {})", identity, objref.index);
        Ok(objref.index)
    }

    #[cfg(test)]
    fn inject(&self, step: LinkStep) -> Result<()> {
        if self.fault == Some(step) {
            return Err(Error::InconsistentGraph(format!("injected fault at {:?}", step)));
        }
        Ok(())
    }

    #[cfg(not(test))]
    #[inline]
    fn inject(&self, _step: LinkStep) -> Result<()> {
        Ok(())
    }
}
