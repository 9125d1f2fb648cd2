//! Generator - drives sampling, allocation and output for a whole trace.
//!
//! The library index is built once and shared read-only; each sampled
//! user gets its own allocator with fresh pools and its own random
//! stream, so users can be processed in any order (or in parallel with
//! the `parallel` feature) without changing the output.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::allocator::{user_rng, Allocator};
use crate::error::{AllocError, Error, Result};
use crate::library::LibraryIndex;
use crate::normalize::{JoinRange, LibraryProfile};
use crate::profile::{sample_users, GroupSample, RepetitionGroup, SampledUser, UserProfile};
use crate::record::{Allocation, UserQueryRecord};
use crate::recorder::AllocationRecorder;
use crate::trace::Trace;
use crate::writer::{write_group_stats_file, write_workload_file, UserReport};

/// Name of the per-group stats file.
pub const STATS_FILE: &str = "stats.csv";

/// Generator settings.
#[derive(Clone, Debug)]
pub struct GeneratorConfig {
    /// Root directory of the generated workloads
    pub out_dir: PathBuf,
    /// Join counts the library can serve
    pub library_range: JoinRange,
    /// Run seed; each user derives its own stream from it
    pub seed: u64,
    /// Regenerate even if workloads already exist
    pub override_existing: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from("workloads"),
            library_range: LibraryProfile::Imdb.join_range(),
            seed: 0,
            override_existing: false,
        }
    }
}

/// Allocation result for one sampled user.
#[derive(Clone, Debug)]
pub struct UserWorkload {
    pub user: SampledUser,
    pub allocations: Vec<Allocation>,
    pub recorder: AllocationRecorder,
}

/// What a run produced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GenerationSummary {
    pub groups: usize,
    pub users: usize,
    pub queries: u64,
    /// Output already existed and was left untouched
    pub skipped: bool,
}

/// Workload generator over a shared library index.
pub struct Generator {
    library: Arc<LibraryIndex>,
    config: GeneratorConfig,
}

impl Generator {
    pub fn new(library: Arc<LibraryIndex>, config: GeneratorConfig) -> Self {
        Self { library, config }
    }

    pub fn library(&self) -> &LibraryIndex {
        &self.library
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Whether the output directory already holds generated workloads:
    /// at least one group directory, each with a CSV file in it.
    pub fn exists(&self) -> bool {
        let Ok(entries) = fs::read_dir(&self.config.out_dir) else {
            return false;
        };
        let groups: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        !groups.is_empty() && groups.iter().all(|dir| has_csv(dir))
    }

    /// Profile every user in the trace, keeping the eligible ones.
    pub fn profile_users(&self, trace: &Trace) -> Vec<UserProfile> {
        let range = self.config.library_range;
        trace
            .users()
            .filter_map(|(key, timeline)| UserProfile::from_timeline(*key, timeline))
            .filter(|profile| {
                let eligible = profile.is_eligible(range);
                if !eligible {
                    debug!(user = %profile.user, joins = %profile.join_range, "user excluded");
                }
                eligible
            })
            .collect()
    }

    /// Replay one user's timeline through a fresh allocator.
    pub fn allocate_user(
        &self,
        user: &SampledUser,
        timeline: &[UserQueryRecord],
    ) -> std::result::Result<UserWorkload, AllocError> {
        let key = &user.profile.user;
        let mut allocator = Allocator::new(
            &self.library,
            user.profile.join_range,
            self.config.library_range,
            user_rng(self.config.seed, key),
        )?;
        let allocations = allocator.allocate(timeline)?;
        let bindings = allocator.state().binding_count();
        let recorder = allocator.into_recorder();

        info!(
            user = %key,
            workload = %user.workload_type,
            queries = recorder.num_queries(),
            cache_hits = recorder.cache_hits(),
            bindings,
            unconstrained = recorder.unconstrained(),
            "user allocated"
        );
        Ok(UserWorkload {
            user: user.clone(),
            allocations,
            recorder,
        })
    }

    /// Sample users, allocate their workloads and write every group.
    pub fn run(&self, trace: &Trace) -> Result<GenerationSummary> {
        if !self.config.override_existing && self.exists() {
            info!(out = %self.config.out_dir.display(), "workloads already generated");
            return Ok(GenerationSummary {
                skipped: true,
                ..GenerationSummary::default()
            });
        }

        self.clear_groups()?;

        let profiles = self.profile_users(trace);
        info!(
            users = trace.user_count(),
            eligible = profiles.len(),
            "generating workloads"
        );

        let mut summary = GenerationSummary::default();
        for sample in sample_users(&profiles) {
            let workloads = self.allocate_group(&sample, trace)?;
            self.write_group(&sample, &workloads)?;

            summary.groups += 1;
            summary.users += workloads.len();
            summary.queries += workloads.iter().map(|w| w.recorder.num_queries()).sum::<u64>();
        }

        info!(
            groups = summary.groups,
            users = summary.users,
            queries = summary.queries,
            "finished generating workloads"
        );
        Ok(summary)
    }

    /// Remove group directories left by an earlier run so a rerun never
    /// mixes workloads from different traces or seeds.
    fn clear_groups(&self) -> Result<()> {
        for group in RepetitionGroup::deciles() {
            let dir = self.config.out_dir.join(group.id());
            if !dir.is_dir() {
                continue;
            }
            fs::remove_dir_all(&dir).map_err(|source| Error::Io {
                path: dir.clone(),
                source,
            })?;
            debug!(dir = %dir.display(), "removed previous group output");
        }
        Ok(())
    }

    #[cfg(not(feature = "parallel"))]
    fn allocate_group(&self, sample: &GroupSample, trace: &Trace) -> Result<Vec<UserWorkload>> {
        sample
            .users
            .iter()
            .map(|user| self.allocate_sampled(user, trace))
            .collect()
    }

    #[cfg(feature = "parallel")]
    fn allocate_group(&self, sample: &GroupSample, trace: &Trace) -> Result<Vec<UserWorkload>> {
        use rayon::prelude::*;

        sample
            .users
            .par_iter()
            .map(|user| self.allocate_sampled(user, trace))
            .collect()
    }

    fn allocate_sampled(&self, user: &SampledUser, trace: &Trace) -> Result<UserWorkload> {
        let timeline = trace.timeline(&user.profile.user).unwrap_or(&[]);
        Ok(self.allocate_user(user, timeline)?)
    }

    fn write_group(&self, sample: &GroupSample, workloads: &[UserWorkload]) -> Result<()> {
        let dir = self.config.out_dir.join(sample.group.id());
        fs::create_dir_all(&dir).map_err(|source| Error::Io {
            path: dir.clone(),
            source,
        })?;

        for workload in workloads {
            let path = dir.join(format!("{}.csv", workload.user.workload_type));
            write_workload_file(&path, &self.library, &workload.allocations)?;
        }

        let reports: Vec<UserReport<'_>> = workloads
            .iter()
            .map(|w| UserReport {
                user: &w.user,
                recorder: &w.recorder,
            })
            .collect();
        write_group_stats_file(&dir.join(STATS_FILE), &reports)?;

        info!(
            group = %sample.group,
            users = workloads.len(),
            dir = %dir.display(),
            "group written"
        );
        Ok(())
    }
}

fn has_csv(dir: &Path) -> bool {
    fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .any(|e| e.path().extension().is_some_and(|ext| ext == "csv"))
        })
        .unwrap_or(false)
}
