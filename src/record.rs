//! Record and Decision types for the allocator.
//!
//! Records are the inputs replayed from a user's timeline.
//! Allocations and decision paths are the outputs.

use std::fmt;
use std::str::FromStr;

use crate::arena::InstanceIndex;
use crate::error::TraceError;

// ============================================================================
// Input Records
// ============================================================================

/// Identity of a trace user: `"{user_id}#{instance_id}"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserKey {
    pub user_id: u64,
    pub instance_id: u64,
}

impl UserKey {
    pub const fn new(user_id: u64, instance_id: u64) -> Self {
        Self { user_id, instance_id }
    }

    /// Stable 64-bit hash of the key's text form (FNV-1a).
    ///
    /// Used to pick the per-user random stream, so it must not depend on
    /// the platform or the process.
    pub fn stable_hash(&self) -> u64 {
        const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
        const PRIME: u64 = 0x0000_0100_0000_01b3;
        self.to_string()
            .bytes()
            .fold(OFFSET, |h, b| (h ^ b as u64).wrapping_mul(PRIME))
    }
}

impl fmt::Display for UserKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.user_id, self.instance_id)
    }
}

impl FromStr for UserKey {
    type Err = TraceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TraceError::InvalidUserKey { value: s.to_string() };
        let (user, instance) = s.split_once('#').ok_or_else(invalid)?;
        Ok(Self {
            user_id: user.trim().parse().map_err(|_| invalid())?,
            instance_id: instance.trim().parse().map_err(|_| invalid())?,
        })
    }
}

/// Sorted table ids a query reads. Empty when the trace has none.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Readset(Vec<u64>);

impl Readset {
    pub fn new(mut tables: Vec<u64>) -> Self {
        tables.sort_unstable();
        Self(tables)
    }

    #[inline]
    pub fn tables(&self) -> &[u64] {
        &self.0
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromStr for Readset {
    type Err = TraceError;

    /// Parse a comma-separated table id list such as `"12,3,7"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Self::default());
        }
        s.split(',')
            .map(|id| id.trim().parse::<u64>())
            .collect::<Result<Vec<_>, _>>()
            .map(Self::new)
            .map_err(|_| TraceError::InvalidReadset { value: s.to_string() })
    }
}

/// Statement kind of a trace query.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QueryType {
    Select,
    /// Anything else (insert, update, ctas, ...)
    Other,
}

impl From<&str> for QueryType {
    fn from(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("select") {
            QueryType::Select
        } else {
            QueryType::Other
        }
    }
}

/// One real query from a user's timeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserQueryRecord {
    /// Identity of the query's text/shape
    pub query_hash: String,
    /// Tables read
    pub readset: Readset,
    /// Raw join count
    pub num_joins: u32,
    pub query_type: QueryType,
    pub query_id: u64,
}

// ============================================================================
// Output
// ============================================================================

/// How the fallback routine found an instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FallbackPath {
    /// Unused instance of an already-bound template
    ReuseBoundTemplate,
    /// Uniform pick over every instance with the join count
    UnconstrainedRandom,
}

/// Which branch of the allocator produced an allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DecisionPath {
    /// Query hash seen before; cached instance reused
    CacheHit,
    /// Readset bound, pool of its template non-empty
    BoundPoolHit,
    /// Readset unbound, bound to the unmapped template with the largest pool
    NewBinding,
    /// Readset bound, its template's pool exhausted
    BoundPoolExhausted(FallbackPath),
    /// Readset unbound, no unmapped template with instances left
    Unbound(FallbackPath),
}

impl DecisionPath {
    /// Paths reported in the stats file, in column order.
    pub const COUNTED: [DecisionPath; 6] = [
        DecisionPath::BoundPoolHit,
        DecisionPath::NewBinding,
        DecisionPath::BoundPoolExhausted(FallbackPath::ReuseBoundTemplate),
        DecisionPath::BoundPoolExhausted(FallbackPath::UnconstrainedRandom),
        DecisionPath::Unbound(FallbackPath::ReuseBoundTemplate),
        DecisionPath::Unbound(FallbackPath::UnconstrainedRandom),
    ];

    /// Position in [`DecisionPath::COUNTED`], `None` for cache hits.
    #[inline]
    pub const fn counter_slot(self) -> Option<usize> {
        match self {
            DecisionPath::CacheHit => None,
            DecisionPath::BoundPoolHit => Some(0),
            DecisionPath::NewBinding => Some(1),
            DecisionPath::BoundPoolExhausted(FallbackPath::ReuseBoundTemplate) => Some(2),
            DecisionPath::BoundPoolExhausted(FallbackPath::UnconstrainedRandom) => Some(3),
            DecisionPath::Unbound(FallbackPath::ReuseBoundTemplate) => Some(4),
            DecisionPath::Unbound(FallbackPath::UnconstrainedRandom) => Some(5),
        }
    }

    /// Human-readable label for logs.
    pub const fn label(self) -> &'static str {
        match self {
            DecisionPath::CacheHit => "cache-hit",
            DecisionPath::BoundPoolHit => "bound-pool-hit",
            DecisionPath::NewBinding => "new-binding",
            DecisionPath::BoundPoolExhausted(FallbackPath::ReuseBoundTemplate) => {
                "bound-pool-exhausted->reuse-bound-template"
            }
            DecisionPath::BoundPoolExhausted(FallbackPath::UnconstrainedRandom) => {
                "bound-pool-exhausted->unconstrained-random"
            }
            DecisionPath::Unbound(FallbackPath::ReuseBoundTemplate) => {
                "unbound->reuse-bound-template"
            }
            DecisionPath::Unbound(FallbackPath::UnconstrainedRandom) => {
                "unbound->unconstrained-random"
            }
        }
    }

    /// Step name used by the stats file columns.
    pub const fn step(self) -> &'static str {
        match self {
            DecisionPath::CacheHit => "1",
            DecisionPath::BoundPoolHit => "2",
            DecisionPath::NewBinding => "5",
            DecisionPath::BoundPoolExhausted(FallbackPath::ReuseBoundTemplate) => "3_to_6",
            DecisionPath::BoundPoolExhausted(FallbackPath::UnconstrainedRandom) => "3_to_7",
            DecisionPath::Unbound(FallbackPath::ReuseBoundTemplate) => "4_to_6",
            DecisionPath::Unbound(FallbackPath::UnconstrainedRandom) => "4_to_7",
        }
    }

    /// True when the instance came from an unconstrained pick and may
    /// duplicate one used elsewhere.
    #[inline]
    pub const fn is_unconstrained(self) -> bool {
        matches!(
            self,
            DecisionPath::BoundPoolExhausted(FallbackPath::UnconstrainedRandom)
                | DecisionPath::Unbound(FallbackPath::UnconstrainedRandom)
        )
    }
}

impl fmt::Display for DecisionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A library instance allocated to one real query.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Allocation {
    pub instance: InstanceIndex,
    /// Join count of the real query
    pub raw_joins: u32,
    /// Join count after normalization
    pub normalized_joins: u32,
    pub query_id: u64,
    pub path: DecisionPath,
}
