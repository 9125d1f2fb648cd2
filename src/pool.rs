//! Allocation State - a user's private view of the library pools.
//!
//! Template pools are only ever popped from the tail of the shared,
//! sorted instance list, so a pool is just a remaining-length cursor.
//! Taking a snapshot for a new user copies one counter per template and
//! never touches the instance lists themselves.
//!
//! "Unmapped" templates are tracked with a bound flag per template and a
//! counter of unbound templates per join count. Binding a template flips
//! its flag once, which retires it under every join count it is listed
//! under.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use crate::arena::{InstanceIndex, TemplateIndex};
use crate::library::LibraryIndex;
use crate::record::Readset;

/// Mutable per-user pools, bindings and memoized allocations.
pub struct AllocationState<'a> {
    library: &'a LibraryIndex,
    /// Per template: number of instances not yet handed out
    remaining: Vec<u32>,
    /// Per template: bound to some readset
    bound: Vec<bool>,
    /// Per join count: number of templates still unbound
    unmapped: BTreeMap<u32, usize>,
    hash_to_allocation: FxHashMap<String, InstanceIndex>,
    readset_to_template: FxHashMap<Readset, TemplateIndex>,
}

impl<'a> AllocationState<'a> {
    /// Snapshot the library into fresh, fully stocked pools.
    pub fn new(library: &'a LibraryIndex) -> Self {
        let remaining = (0..library.template_count() as TemplateIndex)
            .map(|t| library.instances_of(t).len() as u32)
            .collect();
        let unmapped = library
            .join_counts()
            .map(|n| (n, library.templates_with_joins(n).len()))
            .collect();

        Self {
            library,
            remaining,
            bound: vec![false; library.template_count()],
            unmapped,
            hash_to_allocation: FxHashMap::default(),
            readset_to_template: FxHashMap::default(),
        }
    }

    #[inline]
    pub fn library(&self) -> &'a LibraryIndex {
        self.library
    }

    // ========================================================================
    // Template Pools
    // ========================================================================

    /// Number of unused instances left for a template.
    #[inline]
    pub fn remaining(&self, template: TemplateIndex) -> usize {
        self.remaining[template as usize] as usize
    }

    /// Take the next unused instance of a template (highest id first).
    ///
    /// Returns `None` once the pool is exhausted. Pools are never refilled.
    #[inline]
    pub fn pop(&mut self, template: TemplateIndex) -> Option<InstanceIndex> {
        let left = &mut self.remaining[template as usize];
        if *left == 0 {
            return None;
        }
        *left -= 1;
        Some(self.library.instances_of(template)[*left as usize])
    }

    // ========================================================================
    // Unmapped Templates
    // ========================================================================

    /// Whether the template has not been bound to any readset yet.
    #[inline]
    pub fn is_unmapped(&self, template: TemplateIndex) -> bool {
        !self.bound[template as usize]
    }

    /// Whether any template with `num_joins` joins is still unbound.
    #[inline]
    pub fn has_unmapped(&self, num_joins: u32) -> bool {
        self.unmapped.get(&num_joins).is_some_and(|&count| count > 0)
    }

    /// Unbound templates with `num_joins` joins, in name order.
    pub fn unmapped_templates(&self, num_joins: u32) -> impl Iterator<Item = TemplateIndex> + '_ {
        self.library
            .templates_with_joins(num_joins)
            .iter()
            .copied()
            .filter(move |&t| self.is_unmapped(t))
    }

    // ========================================================================
    // Bindings
    // ========================================================================

    /// Template a readset is bound to.
    #[inline]
    pub fn bound_template(&self, readset: &Readset) -> Option<TemplateIndex> {
        self.readset_to_template.get(readset).copied()
    }

    /// Bind a readset to an unbound template and retire the template from
    /// the unmapped set of every join count.
    pub fn bind(&mut self, readset: Readset, template: TemplateIndex) {
        debug_assert!(self.is_unmapped(template), "template bound twice");
        self.bound[template as usize] = true;
        for &n in self.library.join_counts_of(template) {
            if let Some(count) = self.unmapped.get_mut(&n) {
                *count -= 1;
            }
        }
        self.readset_to_template.insert(readset, template);
    }

    /// Number of readsets bound so far.
    #[inline]
    pub fn binding_count(&self) -> usize {
        self.readset_to_template.len()
    }

    // ========================================================================
    // Memoization
    // ========================================================================

    /// Instance previously allocated to a query hash.
    #[inline]
    pub fn cached(&self, query_hash: &str) -> Option<InstanceIndex> {
        self.hash_to_allocation.get(query_hash).copied()
    }

    #[inline]
    pub fn cache(&mut self, query_hash: &str, instance: InstanceIndex) {
        self.hash_to_allocation.insert(query_hash.to_string(), instance);
    }

    /// Number of distinct query hashes allocated so far.
    #[inline]
    pub fn cached_count(&self) -> usize {
        self.hash_to_allocation.len()
    }
}
