//! Document-level accessibility metadata.
//!
//! Tagged flag (`/MarkInfo /Marked`), primary language (`/Lang`) and the role
//! map of the StructTreeRoot (ISO 32000-1:2008, Sections 14.7.2 and 14.8.1).
//! The setters only record intent; everything is validated and written when
//! the tree is finalized.

use super::types::StructType;
use crate::error::{Error, Result};
use crate::object::Object;
use indexmap::IndexMap;
use std::collections::HashSet;

/// Accessibility flags collected before finalize.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessibilityMetadata {
    tagged: bool,
    language: Option<String>,
    role_map: IndexMap<String, String>,
}

impl AccessibilityMetadata {
    /// Create empty metadata (untagged, no language, empty role map).
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the document tagged.
    pub fn mark_tagged(&mut self) {
        self.tagged = true;
    }

    /// Whether [`AccessibilityMetadata::mark_tagged`] was called.
    pub fn is_tagged(&self) -> bool {
        self.tagged
    }

    /// Set the primary natural language (e.g. "en-US").
    pub fn set_language(&mut self, tag: &str) -> Result<()> {
        let tag = tag.trim();
        if tag.is_empty() {
            return Err(Error::InvalidLanguage(tag.to_string()));
        }
        self.language = Some(tag.to_string());
        Ok(())
    }

    /// Primary language, if set.
    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    /// Map `custom` onto `standard` in the role map.
    ///
    /// `standard` may itself be a custom role that is mapped further. Standard
    /// roles can only be mapped onto themselves.
    pub fn set_role_alias(&mut self, custom: &str, standard: &str) -> Result<()> {
        if custom.trim().is_empty() {
            return Err(Error::InvalidRole(custom.to_string()));
        }
        if standard.trim().is_empty() {
            return Err(Error::InvalidRole(standard.to_string()));
        }
        if StructType::from_str(custom).is_standard() && custom != standard {
            return Err(Error::InvalidRole(format!(
                "standard role /{} cannot be remapped to /{}",
                custom, standard
            )));
        }
        self.role_map.insert(custom.to_string(), standard.to_string());
        Ok(())
    }

    /// Explicit role map entries in insertion order.
    pub fn role_map(&self) -> &IndexMap<String, String> {
        &self.role_map
    }

    /// Follow the role map from `role` to a standard structure type.
    pub fn resolve_role(&self, role: &StructType) -> Result<StructType> {
        let mut current = role.clone();
        let mut seen = HashSet::new();
        while !current.is_standard() {
            let name = current.as_str().to_string();
            if !seen.insert(name.clone()) {
                return Err(Error::UnmappedRole(role.as_str().to_string()));
            }
            match self.role_map.get(&name) {
                Some(next) => current = StructType::from_str(next),
                None => return Err(Error::UnmappedRole(role.as_str().to_string())),
            }
        }
        Ok(current)
    }

    /// Role map to write for a tree using `roles`.
    ///
    /// Every custom role must resolve to a standard type. With `identity`,
    /// standard roles in use get a `/Role /Role` entry too.
    pub(crate) fn effective_role_map<'a>(
        &self,
        roles: impl IntoIterator<Item = &'a StructType>,
        identity: bool,
    ) -> Result<IndexMap<String, String>> {
        let mut map = self.role_map.clone();
        for role in roles {
            if role.is_standard() {
                if identity && !map.contains_key(role.as_str()) {
                    map.insert(role.as_str().to_string(), role.as_str().to_string());
                }
            } else {
                self.resolve_role(role)?;
            }
        }
        Ok(map)
    }
}

/// Convert a role map to a `/RoleMap` dictionary.
pub(crate) fn role_map_object(map: &IndexMap<String, String>) -> Object {
    Object::Dictionary(
        map.iter()
            .map(|(k, v)| (k.clone(), Object::Name(v.clone())))
            .collect(),
    )
}
