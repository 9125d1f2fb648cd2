//! Library Index - deterministic lookup structures over the benchmark library.
//!
//! Built once per run and shared read-only by every user:
//!
//! - join count -> instances with that join count
//! - join count -> distinct templates with that join count
//! - template   -> instances of that template
//!
//! All lists are in index order, which is identifier order (see
//! [`crate::arena`]).

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::arena::{InstanceArena, InstanceIndex, InstanceNode, TemplateIndex};
use crate::error::LibraryError;
use crate::normalize::JoinRange;

/// One row of the library stats file.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct LibraryEntry {
    /// Instance identifier
    pub filepath: String,
    /// Join count of the instance
    pub num_joins: u32,
    /// Template grouping key
    pub template: String,
}

/// Immutable, shareable library index.
pub struct LibraryIndex {
    arena: InstanceArena,
    by_join_count: BTreeMap<u32, Vec<InstanceIndex>>,
    templates_by_join_count: BTreeMap<u32, Vec<TemplateIndex>>,
    instances_by_template: Vec<Vec<InstanceIndex>>,
    join_counts_by_template: Vec<Vec<u32>>,
}

impl LibraryIndex {
    /// Build the index from raw per-instance stats.
    pub fn build(entries: Vec<LibraryEntry>) -> Result<Self, LibraryError> {
        let arena = InstanceArena::intern(entries)?;

        let mut by_join_count: BTreeMap<u32, Vec<InstanceIndex>> = BTreeMap::new();
        let mut templates: BTreeMap<u32, BTreeSet<TemplateIndex>> = BTreeMap::new();
        let mut instances_by_template = vec![Vec::new(); arena.template_count()];
        let mut join_counts: Vec<BTreeSet<u32>> = vec![BTreeSet::new(); arena.template_count()];

        // Arena iteration is sorted, so every pushed list stays sorted
        for (index, node) in arena.iter() {
            by_join_count.entry(node.num_joins).or_default().push(index);
            templates.entry(node.num_joins).or_default().insert(node.template);
            instances_by_template[node.template as usize].push(index);
            join_counts[node.template as usize].insert(node.num_joins);
        }

        let templates_by_join_count = templates
            .into_iter()
            .map(|(n, set)| (n, set.into_iter().collect()))
            .collect();
        let join_counts_by_template: Vec<Vec<u32>> = join_counts
            .into_iter()
            .map(|set| set.into_iter().collect())
            .collect();

        for (t, counts) in join_counts_by_template.iter().enumerate() {
            if counts.len() > 1 {
                warn!(
                    template = arena.template_name(t as TemplateIndex),
                    join_counts = ?counts,
                    "template spans several join counts"
                );
            }
        }
        debug_assert!(instances_by_template.iter().all(|list| !list.is_empty()));

        let index = Self {
            arena,
            by_join_count,
            templates_by_join_count,
            instances_by_template,
            join_counts_by_template,
        };
        debug!(
            instances = index.instance_count(),
            templates = index.template_count(),
            join_counts = index.by_join_count.len(),
            "library index built"
        );
        Ok(index)
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    /// Instances with exactly `num_joins` joins, sorted by id.
    #[inline]
    pub fn instances_with_joins(&self, num_joins: u32) -> &[InstanceIndex] {
        self.by_join_count
            .get(&num_joins)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Distinct templates with `num_joins` joins, sorted by name.
    #[inline]
    pub fn templates_with_joins(&self, num_joins: u32) -> &[TemplateIndex] {
        self.templates_by_join_count
            .get(&num_joins)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Instances of a template, sorted by id.
    #[inline]
    pub fn instances_of(&self, template: TemplateIndex) -> &[InstanceIndex] {
        &self.instances_by_template[template as usize]
    }

    /// Join counts under which a template is listed.
    #[inline]
    pub fn join_counts_of(&self, template: TemplateIndex) -> &[u32] {
        &self.join_counts_by_template[template as usize]
    }

    /// Get an instance.
    #[inline]
    pub fn instance(&self, index: InstanceIndex) -> &InstanceNode {
        self.arena.get(index)
    }

    /// Identifier of an instance.
    #[inline]
    pub fn instance_id(&self, index: InstanceIndex) -> &str {
        &self.arena.get(index).id
    }

    /// Name of a template.
    #[inline]
    pub fn template_name(&self, template: TemplateIndex) -> &str {
        self.arena.template_name(template)
    }

    /// Look up a template by name.
    #[inline]
    pub fn template_index(&self, name: &str) -> Option<TemplateIndex> {
        self.arena.template_index(name)
    }

    /// Join counts present in the library, ascending.
    pub fn join_counts(&self) -> impl Iterator<Item = u32> + '_ {
        self.by_join_count.keys().copied()
    }

    /// Smallest and largest join count in the library.
    pub fn join_count_range(&self) -> Option<JoinRange> {
        let min = *self.by_join_count.keys().next()?;
        let max = *self.by_join_count.keys().next_back()?;
        Some(JoinRange { min, max })
    }

    /// Number of instances.
    pub fn instance_count(&self) -> usize {
        self.arena.len()
    }

    /// Number of templates.
    pub fn template_count(&self) -> usize {
        self.arena.template_count()
    }
}

impl fmt::Debug for LibraryIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LibraryIndex")
            .field("instances", &self.instance_count())
            .field("templates", &self.template_count())
            .field("join_counts", &self.by_join_count.len())
            .finish()
    }
}
