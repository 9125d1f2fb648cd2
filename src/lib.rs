//! # Redbench
//!
//! A deterministic, trace-driven SQL benchmark workload generator.
//!
//! Every real query of a sampled trace user is replaced by a structurally
//! similar query instance from a fixed template library, preserving the
//! user's query repetition, readset diversity and join-count profile.
//!
//! ## Design Principles
//!
//! - **Deterministic**: output is a pure function of (trace, library, seed)
//! - **Shared Library, Private Pools**: the library index is immutable; each
//!   user gets a snapshot of remaining-pool cursors, not a deep copy
//! - **Interned Indices**: instances and templates are 32-bit indices whose
//!   order is the sorted identifier order
//! - **Per-User Random Streams**: users can run in any order or in parallel
//!
//! ## Architecture
//!
//! ```text
//! [Library Stats] --> [LibraryIndex] ---------------------+
//!                                                          |
//! [Query Trace] --> [UserProfile] --> [Sampler] --> [Allocator (per user)]
//!                                                          |
//!                                               [Workload + Stats CSV]
//! ```

pub mod arena;
pub mod error;
pub mod record;
pub mod library;
pub mod normalize;
pub mod pool;
pub mod recorder;
pub mod allocator;
pub mod trace;
pub mod profile;
pub mod writer;
pub mod engine;

// Re-exports for convenience
pub use arena::{InstanceArena, InstanceIndex, InstanceNode, TemplateIndex};
pub use error::{AllocError, Error, LibraryError, Result, TraceError};
pub use record::{
    Allocation, DecisionPath, FallbackPath, QueryType, Readset, UserKey, UserQueryRecord,
};
pub use library::{LibraryEntry, LibraryIndex};
pub use normalize::{normalize, JoinRange, LibraryProfile, Normalizer};
pub use pool::AllocationState;
pub use recorder::AllocationRecorder;
pub use allocator::{fallback, user_rng, Allocator};
pub use trace::{load_library, load_library_path, Trace};
pub use profile::{
    sample_users, GroupSample, RepetitionGroup, SampledUser, UserProfile, WorkloadType,
};
pub use engine::{GenerationSummary, Generator, GeneratorConfig, UserWorkload};
