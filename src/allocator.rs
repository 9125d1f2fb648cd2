//! Query Allocator - maps a user's real queries onto library instances.
//!
//! For each record in timeline order:
//! 1. CACHE: a query hash seen before gets the same instance again
//! 2. BOUND: a readset bound to a template draws from that template's pool
//! 3. BIND: an unbound readset claims the unbound template with the most
//!    instances left (ties go to the lexicographically first template)
//! 4. FALLBACK: reuse an already-bound template with instances left, or
//!    pick uniformly from every instance with the join count

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{trace, warn};

use crate::arena::{InstanceIndex, TemplateIndex};
use crate::error::AllocError;
use crate::library::LibraryIndex;
use crate::normalize::{JoinRange, Normalizer};
use crate::pool::AllocationState;
use crate::record::{
    Allocation, DecisionPath, FallbackPath, QueryType, UserKey, UserQueryRecord,
};
use crate::recorder::AllocationRecorder;

/// Random stream for one user: the run seed, on a stream chosen by the
/// user key. Independent of the order users are processed in.
pub fn user_rng(seed: u64, user: &UserKey) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(user.stable_hash());
    rng
}

/// Stateful allocator for one user.
pub struct Allocator<'a> {
    state: AllocationState<'a>,
    normalizer: Normalizer,
    rng: ChaCha8Rng,
    recorder: AllocationRecorder,
}

impl<'a> Allocator<'a> {
    /// Create an allocator with fresh pools.
    ///
    /// # Errors
    /// [`AllocError::DegenerateJoinRange`] if the user's join counts do not
    /// span a range.
    pub fn new(
        library: &'a LibraryIndex,
        user_range: JoinRange,
        library_range: JoinRange,
        rng: ChaCha8Rng,
    ) -> Result<Self, AllocError> {
        Ok(Self {
            state: AllocationState::new(library),
            normalizer: Normalizer::new(user_range, library_range)?,
            rng,
            recorder: AllocationRecorder::new(),
        })
    }

    /// Replay a whole timeline.
    ///
    /// Records that produce no allocation (non-select statements never seen
    /// before) are skipped and counted.
    pub fn allocate(
        &mut self,
        timeline: &[UserQueryRecord],
    ) -> Result<Vec<Allocation>, AllocError> {
        let mut allocations = Vec::with_capacity(timeline.len());
        for record in timeline {
            if let Some(allocation) = self.allocate_one(record)? {
                allocations.push(allocation);
            }
        }
        Ok(allocations)
    }

    /// Allocate a library instance for a single record.
    pub fn allocate_one(
        &mut self,
        record: &UserQueryRecord,
    ) -> Result<Option<Allocation>, AllocError> {
        let num_joins = self.normalizer.apply(record.num_joins);

        let (instance, path) = if let Some(instance) = self.state.cached(&record.query_hash) {
            (instance, DecisionPath::CacheHit)
        } else if record.query_type != QueryType::Select {
            warn!(
                query_id = record.query_id,
                "unseen non-select query, no allocation produced"
            );
            self.recorder.record_skipped();
            return Ok(None);
        } else {
            let (instance, path) = self.match_new(record, num_joins)?;
            self.state.cache(&record.query_hash, instance);
            (instance, path)
        };

        trace!(
            query_id = record.query_id,
            raw_joins = record.num_joins,
            num_joins,
            instance = self.state.library().instance_id(instance),
            %path,
            "allocated"
        );
        self.recorder.record(path);

        Ok(Some(Allocation {
            instance,
            raw_joins: record.num_joins,
            normalized_joins: num_joins,
            query_id: record.query_id,
            path,
        }))
    }

    /// Allocate for a query hash that has not been seen yet.
    fn match_new(
        &mut self,
        record: &UserQueryRecord,
        num_joins: u32,
    ) -> Result<(InstanceIndex, DecisionPath), AllocError> {
        if let Some(template) = self.state.bound_template(&record.readset) {
            if let Some(instance) = self.state.pop(template) {
                return Ok((instance, DecisionPath::BoundPoolHit));
            }
            let (instance, fallback) = fallback(&mut self.state, &mut self.rng, num_joins)?;
            return Ok((instance, DecisionPath::BoundPoolExhausted(fallback)));
        }

        if let Some(template) = largest_unmapped(&self.state, num_joins) {
            if let Some(instance) = self.state.pop(template) {
                self.state.bind(record.readset.clone(), template);
                return Ok((instance, DecisionPath::NewBinding));
            }
        }

        let (instance, fallback) = fallback(&mut self.state, &mut self.rng, num_joins)?;
        Ok((instance, DecisionPath::Unbound(fallback)))
    }

    /// Decision-path histogram so far.
    pub fn recorder(&self) -> &AllocationRecorder {
        &self.recorder
    }

    /// Allocation state, for inspection.
    pub fn state(&self) -> &AllocationState<'a> {
        &self.state
    }

    pub fn into_recorder(self) -> AllocationRecorder {
        self.recorder
    }
}

/// Unbound template with `num_joins` joins and the largest non-empty pool.
///
/// Strict comparison over name order: on a tie the first name wins.
fn largest_unmapped(state: &AllocationState<'_>, num_joins: u32) -> Option<TemplateIndex> {
    if !state.has_unmapped(num_joins) {
        return None;
    }
    let mut best = None;
    let mut best_value = 0;
    for template in state.unmapped_templates(num_joins) {
        let value = state.remaining(template);
        if value > best_value {
            best_value = value;
            best = Some(template);
        }
    }
    best
}

/// Shared fallback for exhausted or missing bindings.
///
/// Scans the templates with `num_joins` joins in shuffled order for one
/// that is already bound and still has unused instances. Failing that,
/// picks any instance with `num_joins` joins, possibly one already used.
///
/// # Errors
/// [`AllocError::NoInstancesForJoinCount`] if the library has no instance
/// with `num_joins` joins.
pub fn fallback(
    state: &mut AllocationState<'_>,
    rng: &mut ChaCha8Rng,
    num_joins: u32,
) -> Result<(InstanceIndex, FallbackPath), AllocError> {
    let library = state.library();

    let mut candidates = library.templates_with_joins(num_joins).to_vec();
    candidates.shuffle(rng);
    for template in candidates {
        if !state.is_unmapped(template) {
            if let Some(instance) = state.pop(template) {
                return Ok((instance, FallbackPath::ReuseBoundTemplate));
            }
        }
    }

    library
        .instances_with_joins(num_joins)
        .choose(rng)
        .map(|&instance| (instance, FallbackPath::UnconstrainedRandom))
        .ok_or(AllocError::NoInstancesForJoinCount { num_joins })
}
