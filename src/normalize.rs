//! Join-Count Normalizer - rescales a user's join counts onto the library range.

use std::fmt;

use clap::ValueEnum;

use crate::error::AllocError;

/// Inclusive join-count range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct JoinRange {
    pub min: u32,
    pub max: u32,
}

impl JoinRange {
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    /// Width of the range (`max - min`), zero when inverted.
    #[inline]
    pub const fn spread(&self) -> u32 {
        self.max.saturating_sub(self.min)
    }

    #[inline]
    pub const fn contains(&self, num_joins: u32) -> bool {
        num_joins >= self.min && num_joins <= self.max
    }
}

impl fmt::Display for JoinRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)
    }
}

/// Benchmark libraries with a known valid join-count range.
///
/// Each join count inside the range has enough distinct instances and
/// templates to allocate from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LibraryProfile {
    /// JOB + CEB queries over IMDb
    Imdb,
    /// TPC-DS queries
    Tpcds,
}

impl LibraryProfile {
    pub const fn join_range(self) -> JoinRange {
        match self {
            LibraryProfile::Imdb => JoinRange::new(6, 11),
            LibraryProfile::Tpcds => JoinRange::new(2, 7),
        }
    }
}

/// Linear rescale from a user's join-count range to the library's.
#[derive(Clone, Copy, Debug)]
pub struct Normalizer {
    user: JoinRange,
    library: JoinRange,
}

impl Normalizer {
    /// # Errors
    /// [`AllocError::DegenerateJoinRange`] when the user's range is a
    /// single point; such users must be filtered out upstream.
    pub fn new(user: JoinRange, library: JoinRange) -> Result<Self, AllocError> {
        if user.max <= user.min {
            return Err(AllocError::DegenerateJoinRange {
                min: user.min,
                max: user.max,
            });
        }
        Ok(Self { user, library })
    }

    /// Map a raw join count, rounding half up.
    #[inline]
    pub fn apply(&self, raw: u32) -> u32 {
        let frac = (raw as f64 - self.user.min as f64) / (self.user.max - self.user.min) as f64;
        let lib_span = self.library.max as f64 - self.library.min as f64;
        (frac * lib_span + self.library.min as f64 + 0.5).floor() as u32
    }
}

/// One-shot form of [`Normalizer::apply`].
pub fn normalize(raw: u32, user: JoinRange, library: JoinRange) -> Result<u32, AllocError> {
    Normalizer::new(user, library).map(|n| n.apply(raw))
}
