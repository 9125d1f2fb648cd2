//! Instance Arena - interned library instances and templates.
//!
//! Every library instance and every template name is stored exactly once
//! in a contiguous block and referred to by a 32-bit index. Interning
//! happens in sorted identifier order, so comparing two indices is the
//! same as comparing the identifiers they stand for. All downstream
//! structures inherit their determinism from this property.

use std::collections::BTreeSet;
use std::fmt;

use rustc_hash::FxHashMap;

use crate::error::LibraryError;
use crate::library::LibraryEntry;

/// Index of an interned library instance. Ordered like the instance ids.
pub type InstanceIndex = u32;

/// Index of an interned template. Ordered like the template names.
pub type TemplateIndex = u32;

/// A single library query instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstanceNode {
    /// Opaque identifier, usually the path of the query file
    pub id: Box<str>,
    /// Join count measured on the instance's execution plan
    pub num_joins: u32,
    /// Template the instance belongs to
    pub template: TemplateIndex,
}

/// Immutable store of interned instances and templates.
pub struct InstanceArena {
    /// Instances sorted by id
    nodes: Vec<InstanceNode>,
    /// Template names sorted lexicographically
    templates: Vec<Box<str>>,
    /// Template name -> index
    template_lookup: FxHashMap<Box<str>, TemplateIndex>,
}

impl InstanceArena {
    /// Intern a set of library entries.
    ///
    /// The input order is irrelevant: entries are sorted by id and
    /// template names are sorted before indices are handed out.
    ///
    /// # Errors
    /// Fails on an empty input, on duplicate instance ids, and when the
    /// entry count does not fit a 32-bit index.
    pub fn intern(mut entries: Vec<LibraryEntry>) -> Result<Self, LibraryError> {
        if entries.is_empty() {
            return Err(LibraryError::Empty);
        }
        if entries.len() >= u32::MAX as usize {
            return Err(LibraryError::TooLarge { count: entries.len() });
        }

        entries.sort_by(|a, b| a.filepath.cmp(&b.filepath));
        if let Some(pair) = entries.windows(2).find(|w| w[0].filepath == w[1].filepath) {
            return Err(LibraryError::DuplicateInstance {
                id: pair[0].filepath.clone(),
            });
        }

        let names: BTreeSet<&str> = entries.iter().map(|e| e.template.as_str()).collect();
        let templates: Vec<Box<str>> = names.into_iter().map(Box::from).collect();
        let template_lookup: FxHashMap<Box<str>, TemplateIndex> = templates
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i as TemplateIndex))
            .collect();

        let nodes = entries
            .into_iter()
            .map(|e| InstanceNode {
                template: template_lookup[e.template.as_str()],
                id: e.filepath.into_boxed_str(),
                num_joins: e.num_joins,
            })
            .collect();

        Ok(Self {
            nodes,
            templates,
            template_lookup,
        })
    }

    /// Get an instance.
    #[inline]
    pub fn get(&self, index: InstanceIndex) -> &InstanceNode {
        &self.nodes[index as usize]
    }

    /// Get a template name.
    #[inline]
    pub fn template_name(&self, index: TemplateIndex) -> &str {
        &self.templates[index as usize]
    }

    /// Look up a template by name.
    #[inline]
    pub fn template_index(&self, name: &str) -> Option<TemplateIndex> {
        self.template_lookup.get(name).copied()
    }

    /// Iterate over all instances in index order.
    pub fn iter(&self) -> impl Iterator<Item = (InstanceIndex, &InstanceNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (i as InstanceIndex, node))
    }

    /// Number of interned instances.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false for a successfully interned arena.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of distinct templates.
    #[inline]
    pub fn template_count(&self) -> usize {
        self.templates.len()
    }
}

impl fmt::Debug for InstanceArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceArena")
            .field("instances", &self.nodes.len())
            .field("templates", &self.templates.len())
            .finish()
    }
}
