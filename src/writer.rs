//! Workload Writer - serializes per-user workloads and per-group stats.
//!
//! Column names and order are consumed by the execution harness and
//! must not change.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::library::LibraryIndex;
use crate::profile::SampledUser;
use crate::record::{Allocation, DecisionPath};
use crate::recorder::AllocationRecorder;

/// Header of a per-user workload file.
pub const WORKLOAD_HEADER: [&str; 4] = [
    "filepath",
    "num_joins_in_user_query",
    "num_joins_in_benchmark_query",
    "query_id",
];

/// Leading columns of a group stats file; one `n_occurrences_step_*`
/// column per counted decision path follows.
pub const STATS_LEADING_HEADER: [&str; 7] = [
    "workload_type",
    "user_id",
    "instance_id",
    "number_of_queries",
    "query_repetition_rate",
    "n_distinct_num_joins",
    "n_distinct_readsets",
];

#[derive(Serialize)]
struct WorkloadRow<'a> {
    filepath: &'a str,
    num_joins_in_user_query: u32,
    num_joins_in_benchmark_query: u32,
    query_id: u64,
}

/// Full stats header in column order.
pub fn stats_header() -> Vec<String> {
    STATS_LEADING_HEADER
        .iter()
        .map(|s| s.to_string())
        .chain(
            DecisionPath::COUNTED
                .iter()
                .map(|p| format!("n_occurrences_step_{}", p.step())),
        )
        .collect()
}

/// Write one user's workload as CSV.
pub fn write_workload<W: Write>(
    writer: W,
    library: &LibraryIndex,
    allocations: &[Allocation],
) -> std::result::Result<(), csv::Error> {
    let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
    wtr.write_record(WORKLOAD_HEADER)?;
    for a in allocations {
        wtr.serialize(WorkloadRow {
            filepath: library.instance_id(a.instance),
            num_joins_in_user_query: a.raw_joins,
            num_joins_in_benchmark_query: a.normalized_joins,
            query_id: a.query_id,
        })?;
    }
    wtr.flush()?;
    Ok(())
}

/// One row of a group stats file.
#[derive(Clone, Copy, Debug)]
pub struct UserReport<'a> {
    pub user: &'a SampledUser,
    pub recorder: &'a AllocationRecorder,
}

impl UserReport<'_> {
    fn record(&self) -> Vec<String> {
        let profile = &self.user.profile;
        let mut row = vec![
            self.user.workload_type.as_str().to_string(),
            profile.user.user_id.to_string(),
            profile.user.instance_id.to_string(),
            self.recorder.num_queries().to_string(),
            format!("{:.3}", profile.query_repetition_rate),
            profile.num_distinct_num_joins.to_string(),
            profile.num_distinct_readsets.to_string(),
        ];
        row.extend(self.recorder.step_counts().iter().map(u64::to_string));
        row
    }
}

/// Write a group stats file as CSV.
pub fn write_group_stats<W: Write>(
    writer: W,
    reports: &[UserReport<'_>],
) -> std::result::Result<(), csv::Error> {
    let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
    wtr.write_record(stats_header())?;
    for report in reports {
        wtr.write_record(report.record())?;
    }
    wtr.flush()?;
    Ok(())
}

/// Create `path` and write a workload to it.
pub fn write_workload_file(
    path: &Path,
    library: &LibraryIndex,
    allocations: &[Allocation],
) -> Result<()> {
    let file = create(path)?;
    write_workload(file, library, allocations).map_err(|source| Error::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Create `path` and write group stats to it.
pub fn write_group_stats_file(path: &Path, reports: &[UserReport<'_>]) -> Result<()> {
    let file = create(path)?;
    write_group_stats(file, reports).map_err(|source| Error::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn create(path: &Path) -> Result<File> {
    File::create(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })
}
