//! User Profiler & Sampler - picks representative users from the trace.
//!
//! Users are bucketed by query repetition rate into ten 10%-wide groups.
//! Inside a group they are ranked by how many distinct join counts and
//! distinct readsets they show; the least, median and most variable
//! users are sampled.

use std::collections::HashSet;
use std::fmt;

use tracing::debug;

use crate::normalize::JoinRange;
use crate::record::{Readset, UserKey, UserQueryRecord};

/// Aggregate statistics of one user's timeline.
#[derive(Clone, Debug, PartialEq)]
pub struct UserProfile {
    pub user: UserKey,
    pub total_num_queries: usize,
    /// Smallest and largest raw join count
    pub join_range: JoinRange,
    pub num_distinct_num_joins: usize,
    pub num_distinct_readsets: usize,
    /// Share of queries that repeat an earlier query hash
    pub query_repetition_rate: f64,
}

impl UserProfile {
    /// Profile a timeline. `None` for an empty one.
    pub fn from_timeline(user: UserKey, timeline: &[UserQueryRecord]) -> Option<Self> {
        let min = timeline.iter().map(|r| r.num_joins).min()?;
        let max = timeline.iter().map(|r| r.num_joins).max()?;

        let distinct_joins: HashSet<u32> = timeline.iter().map(|r| r.num_joins).collect();
        let distinct_readsets: HashSet<&Readset> = timeline.iter().map(|r| &r.readset).collect();
        let distinct_hashes: HashSet<&str> =
            timeline.iter().map(|r| r.query_hash.as_str()).collect();
        let repeats = timeline.len() - distinct_hashes.len();

        Some(Self {
            user,
            total_num_queries: timeline.len(),
            join_range: JoinRange::new(min, max),
            num_distinct_num_joins: distinct_joins.len(),
            num_distinct_readsets: distinct_readsets.len(),
            query_repetition_rate: repeats as f64 / timeline.len() as f64,
        })
    }

    /// Whether the user's join counts can be rescaled onto `library`.
    ///
    /// A single join count cannot be normalized, and a spread wider than
    /// twice the library's would collapse too many distinct values.
    pub fn is_eligible(&self, library: JoinRange) -> bool {
        let spread = self.join_range.spread();
        spread > 0 && spread <= 2 * library.spread() + 1
    }
}

/// Variability class of a sampled user. Names the output file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WorkloadType {
    LowVariability,
    MidVariability,
    HighVariability,
}

impl WorkloadType {
    pub const fn as_str(self) -> &'static str {
        match self {
            WorkloadType::LowVariability => "low_variability",
            WorkloadType::MidVariability => "mid_variability",
            WorkloadType::HighVariability => "high_variability",
        }
    }
}

impl fmt::Display for WorkloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive repetition-rate bucket `[lo%, hi%]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RepetitionGroup {
    pub lo: u32,
    pub hi: u32,
}

impl RepetitionGroup {
    /// `0%-10%`, `10%-20%`, ..., `90%-100%`.
    pub fn deciles() -> impl Iterator<Item = RepetitionGroup> {
        (10..=100).step_by(10).map(|hi| RepetitionGroup { lo: hi - 10, hi })
    }

    /// Directory name of the group.
    pub fn id(&self) -> String {
        format!("{}%-{}%", self.lo, self.hi)
    }

    /// Both bounds inclusive, so boundary users belong to two groups.
    #[inline]
    pub fn contains(&self, rate: f64) -> bool {
        rate >= self.lo as f64 / 100.0 && rate <= self.hi as f64 / 100.0
    }
}

impl fmt::Display for RepetitionGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}

/// A user chosen to drive one workload file.
#[derive(Clone, Debug, PartialEq)]
pub struct SampledUser {
    pub profile: UserProfile,
    pub workload_type: WorkloadType,
}

/// The users sampled for one repetition group.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupSample {
    pub group: RepetitionGroup,
    pub users: Vec<SampledUser>,
}

/// Sample low/mid/high variability users from every non-empty group.
pub fn sample_users(profiles: &[UserProfile]) -> Vec<GroupSample> {
    RepetitionGroup::deciles()
        .filter_map(|group| {
            let members: Vec<&UserProfile> = profiles
                .iter()
                .filter(|p| group.contains(p.query_repetition_rate))
                .collect();
            if members.is_empty() {
                debug!(group = %group, "no users in group");
                return None;
            }
            let ranked = rank_by_variability(&members);
            let (first, last) = (ranked.first()?, ranked.last()?);
            let mid = ranked[ranked.len() / 2];

            let users = [
                (*first, WorkloadType::LowVariability),
                (mid, WorkloadType::MidVariability),
                (*last, WorkloadType::HighVariability),
            ]
            .into_iter()
            .map(|(profile, workload_type)| SampledUser {
                profile: profile.clone(),
                workload_type,
            })
            .collect();
            Some(GroupSample { group, users })
        })
        .collect()
}

/// Order by the sum of two competition ranks (distinct join counts,
/// distinct readsets), then by user key text.
fn rank_by_variability<'a>(members: &[&'a UserProfile]) -> Vec<&'a UserProfile> {
    let joins: Vec<usize> = members.iter().map(|p| p.num_distinct_num_joins).collect();
    let readsets: Vec<usize> = members.iter().map(|p| p.num_distinct_readsets).collect();

    let mut keyed: Vec<(usize, String, &UserProfile)> = members
        .iter()
        .map(|&p| {
            let variability = competition_rank(&joins, p.num_distinct_num_joins)
                + competition_rank(&readsets, p.num_distinct_readsets);
            (variability, p.user.to_string(), p)
        })
        .collect();
    keyed.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    keyed.into_iter().map(|(_, _, p)| p).collect()
}

/// SQL `rank()`: one plus the number of strictly smaller values.
#[inline]
fn competition_rank(values: &[usize], value: usize) -> usize {
    1 + values.iter().filter(|&&v| v < value).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::QueryType;

    fn record(hash: &str, tables: &[u64], num_joins: u32) -> UserQueryRecord {
        UserQueryRecord {
            query_hash: hash.to_string(),
            readset: Readset::new(tables.to_vec()),
            num_joins,
            query_type: QueryType::Select,
            query_id: 0,
        }
    }

    fn profile(user_id: u64, rate: f64, joins: usize, readsets: usize) -> UserProfile {
        UserProfile {
            user: UserKey::new(user_id, 0),
            total_num_queries: 10,
            join_range: JoinRange::new(1, 4),
            num_distinct_num_joins: joins,
            num_distinct_readsets: readsets,
            query_repetition_rate: rate,
        }
    }

    #[test]
    fn test_profile_from_timeline() {
        let timeline = vec![
            record("a", &[1, 2], 2),
            record("b", &[2, 1], 3),
            record("a", &[1, 2], 2),
            record("a", &[1, 2], 2),
            record("c", &[5], 5),
        ];
        let p = UserProfile::from_timeline(UserKey::new(1, 1), &timeline).unwrap();
        assert_eq!(p.total_num_queries, 5);
        assert_eq!(p.join_range, JoinRange::new(2, 5));
        assert_eq!(p.num_distinct_num_joins, 3);
        assert_eq!(p.num_distinct_readsets, 2);
        assert!((p.query_repetition_rate - 0.4).abs() < 1e-12);
        assert!(UserProfile::from_timeline(UserKey::new(1, 1), &[]).is_none());
    }

    #[test]
    fn test_eligibility() {
        let lib = JoinRange::new(6, 11);
        let mut p = profile(1, 0.5, 2, 2);
        assert!(p.is_eligible(lib));
        p.join_range = JoinRange::new(3, 3);
        assert!(!p.is_eligible(lib));
        p.join_range = JoinRange::new(1, 12);
        assert!(p.is_eligible(lib));
        p.join_range = JoinRange::new(1, 13);
        assert!(!p.is_eligible(lib));
    }

    #[test]
    fn test_groups() {
        let ids: Vec<String> = RepetitionGroup::deciles().map(|g| g.id()).collect();
        assert_eq!(ids.len(), 10);
        assert_eq!(ids[0], "0%-10%");
        assert_eq!(ids[2], "20%-30%");
        assert_eq!(ids[9], "90%-100%");

        let g = RepetitionGroup { lo: 20, hi: 30 };
        assert!(g.contains(0.2));
        assert!(g.contains(0.3));
        assert!(!g.contains(0.31));
    }

    #[test]
    fn test_competition_rank() {
        let values = [1, 3, 3, 7];
        assert_eq!(competition_rank(&values, 1), 1);
        assert_eq!(competition_rank(&values, 3), 2);
        assert_eq!(competition_rank(&values, 7), 4);
    }

    #[test]
    fn test_sample_low_mid_high() {
        let profiles = vec![
            profile(4, 0.55, 9, 9),
            profile(1, 0.52, 1, 1),
            profile(3, 0.58, 5, 4),
            profile(2, 0.51, 2, 3),
            profile(9, 0.05, 1, 1),
        ];
        let samples = sample_users(&profiles);
        assert_eq!(samples.len(), 2);

        let group = samples.iter().find(|s| s.group.id() == "50%-60%").unwrap();
        let picked: Vec<(u64, WorkloadType)> = group
            .users
            .iter()
            .map(|u| (u.profile.user.user_id, u.workload_type))
            .collect();
        assert_eq!(
            picked,
            vec![
                (1, WorkloadType::LowVariability),
                (3, WorkloadType::MidVariability),
                (4, WorkloadType::HighVariability),
            ]
        );
    }

    #[test]
    fn test_sample_ties_break_on_user_key() {
        let profiles = vec![profile(7, 0.9, 2, 2), profile(3, 0.9, 2, 2)];
        let samples = sample_users(&profiles);
        let group = &samples[0];
        assert_eq!(group.users[0].profile.user.user_id, 3);
        assert_eq!(group.users[2].profile.user.user_id, 7);
    }
}
