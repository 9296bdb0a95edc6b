//! Structure engine configuration.
//!
//! [`StructureOptions`] controls how existing trees are loaded, how the parent
//! tree is laid out on output and which accessibility extras are written at
//! finalize time.
//!
//! # Example
//!
//! ```
//! use tagged_pdf::config::StructureOptions;
//!
//! // Strict mode - fail on malformed structure elements (default)
//! let strict = StructureOptions::strict();
//!
//! // Lenient mode - skip malformed elements while loading
//! let lenient = StructureOptions::lenient();
//!
//! // Custom configuration
//! let custom = StructureOptions::default()
//!     .with_leaf_size(32)
//!     .with_default_language("en-US")
//!     .with_identity_role_map(false);
//! assert_eq!(custom.leaf_size, 32);
//! ```

/// Options for building, loading and finalizing a structure tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructureOptions {
    /// Fail on the first malformed structure element while loading (true)
    /// or skip it with a warning (false).
    pub strict: bool,

    /// Maximum number of key/value pairs in one parent tree node.
    ///
    /// Trees with more entries are written as a root with `/Kids` of leaves
    /// carrying `/Limits` (ISO 32000-1:2008, Section 7.9.7).
    pub leaf_size: usize,

    /// Also write `/Role -> /Role` entries for standard roles used in the tree.
    ///
    /// Some accessibility checkers expect every role in use to appear in the
    /// role map, standard or not.
    pub identity_role_map: bool,

    /// Set `/Tabs /S` on pages that carry tagged annotations.
    ///
    /// PDF/UA-1 (ISO 14289-1, Section 7.18.3) requires structure tab order on
    /// such pages.
    pub structure_tab_order: bool,

    /// Language written at finalize time when none was set explicitly.
    pub default_language: Option<String>,

    /// Maximum element nesting depth accepted while loading.
    ///
    /// Guards against stack exhaustion on malicious files.
    pub max_depth: usize,
}

impl Default for StructureOptions {
    fn default() -> Self {
        Self::strict()
    }
}

impl StructureOptions {
    /// Strict preset: malformed elements abort loading.
    pub fn strict() -> Self {
        Self {
            strict: true,
            leaf_size: 64,
            identity_role_map: true,
            structure_tab_order: true,
            default_language: None,
            max_depth: 256,
        }
    }

    /// Lenient preset: malformed elements are skipped while loading.
    pub fn lenient() -> Self {
        Self {
            strict: false,
            ..Self::strict()
        }
    }

    /// Set the parent tree leaf size (minimum 2).
    pub fn with_leaf_size(mut self, leaf_size: usize) -> Self {
        self.leaf_size = leaf_size.max(2);
        self
    }

    /// Enable or disable identity role map entries for standard roles.
    pub fn with_identity_role_map(mut self, enabled: bool) -> Self {
        self.identity_role_map = enabled;
        self
    }

    /// Enable or disable `/Tabs /S` on pages with tagged annotations.
    pub fn with_structure_tab_order(mut self, enabled: bool) -> Self {
        self.structure_tab_order = enabled;
        self
    }

    /// Set the fallback document language.
    pub fn with_default_language(mut self, lang: impl Into<String>) -> Self {
        self.default_language = Some(lang.into());
        self
    }

    /// Set the maximum nesting depth accepted while loading.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}
