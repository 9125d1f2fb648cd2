//! Trace Loader - CSV ingest for the query trace and the library stats.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, NaiveDateTime};
use serde::Deserialize;
use tracing::debug;

use crate::error::TraceError;
use crate::library::LibraryEntry;
use crate::normalize::JoinRange;
use crate::record::{QueryType, Readset, UserKey, UserQueryRecord};

/// Raw row of a Redset-style query trace. Extra columns are ignored.
#[derive(Debug, Deserialize)]
pub struct TraceRow {
    pub instance_id: u64,
    pub user_id: u64,
    pub query_id: u64,
    pub arrival_timestamp: String,
    pub query_type: String,
    pub query_hash: String,
    pub read_table_ids: Option<String>,
    pub num_joins: u32,
}

impl TraceRow {
    pub fn user_key(&self) -> UserKey {
        UserKey::new(self.user_id, self.instance_id)
    }

    /// Convert to a typed record plus its arrival time.
    pub fn into_record(self) -> Result<(NaiveDateTime, UserQueryRecord), TraceError> {
        let arrival = parse_timestamp(&self.arrival_timestamp)?;
        let readset = match self.read_table_ids.as_deref() {
            Some(ids) => ids.parse()?,
            None => Readset::default(),
        };
        Ok((
            arrival,
            UserQueryRecord {
                query_type: QueryType::from(self.query_type.as_str()),
                query_hash: self.query_hash,
                readset,
                num_joins: self.num_joins,
                query_id: self.query_id,
            },
        ))
    }
}

/// Accepts `YYYY-MM-DD HH:MM:SS[.f]`, the same with a `T` separator, or
/// RFC 3339 (converted to UTC).
pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime, TraceError> {
    let v = value.trim();
    NaiveDateTime::parse_from_str(v, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(v, "%Y-%m-%dT%H:%M:%S%.f"))
        .or_else(|_| DateTime::parse_from_rfc3339(v).map(|dt| dt.naive_utc()))
        .map_err(|_| TraceError::InvalidTimestamp {
            value: v.to_string(),
        })
}

/// Per-user query timelines in arrival order.
#[derive(Clone, Debug, Default)]
pub struct Trace {
    timelines: BTreeMap<UserKey, Vec<UserQueryRecord>>,
}

impl Trace {
    /// Build from already ordered timelines.
    pub fn from_timelines(
        timelines: impl IntoIterator<Item = (UserKey, Vec<UserQueryRecord>)>,
    ) -> Self {
        Self {
            timelines: timelines.into_iter().collect(),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, TraceError> {
        let reader = csv::Reader::from_path(path).map_err(|source| TraceError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_csv(reader)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, TraceError> {
        Self::from_csv(csv::Reader::from_reader(reader))
    }

    fn from_csv<R: Read>(mut reader: csv::Reader<R>) -> Result<Self, TraceError> {
        let mut staged: BTreeMap<UserKey, Vec<(NaiveDateTime, UserQueryRecord)>> = BTreeMap::new();
        for row in reader.deserialize() {
            let row: TraceRow = row?;
            let key = row.user_key();
            staged.entry(key).or_default().push(row.into_record()?);
        }

        // Stable sort: equal timestamps keep file order
        let timelines = staged
            .into_iter()
            .map(|(key, mut rows)| {
                rows.sort_by_key(|(arrival, _)| *arrival);
                (key, rows.into_iter().map(|(_, record)| record).collect())
            })
            .collect();

        let trace = Self { timelines };
        debug!(
            users = trace.user_count(),
            queries = trace.query_count(),
            "trace loaded"
        );
        Ok(trace)
    }

    /// A user's timeline.
    pub fn timeline(&self, user: &UserKey) -> Option<&[UserQueryRecord]> {
        self.timelines.get(user).map(Vec::as_slice)
    }

    /// All users in key order.
    pub fn users(&self) -> impl Iterator<Item = (&UserKey, &[UserQueryRecord])> {
        self.timelines.iter().map(|(k, v)| (k, v.as_slice()))
    }

    pub fn user_count(&self) -> usize {
        self.timelines.len()
    }

    pub fn query_count(&self) -> usize {
        self.timelines.values().map(Vec::len).sum()
    }
}

// ============================================================================
// Library stats
// ============================================================================

/// Read library stats (`filepath,num_joins,template`), keeping only
/// instances whose join count lies in `range`.
pub fn load_library<R: Read>(reader: R, range: JoinRange) -> Result<Vec<LibraryEntry>, TraceError> {
    read_library(csv::Reader::from_reader(reader), range)
}

pub fn load_library_path(path: &Path, range: JoinRange) -> Result<Vec<LibraryEntry>, TraceError> {
    let reader = csv::Reader::from_path(path).map_err(|source| TraceError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    read_library(reader, range)
}

fn read_library<R: Read>(
    mut reader: csv::Reader<R>,
    range: JoinRange,
) -> Result<Vec<LibraryEntry>, TraceError> {
    let mut entries = Vec::new();
    let mut dropped = 0usize;
    for row in reader.deserialize() {
        let entry: LibraryEntry = row?;
        if range.contains(entry.num_joins) {
            entries.push(entry);
        } else {
            dropped += 1;
        }
    }
    debug!(kept = entries.len(), dropped, %range, "library stats loaded");
    Ok(entries)
}
