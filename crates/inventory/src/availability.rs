use serde::{Serialize, Serializer};

/// How many more units (servings or orders) the current stock can serve.
///
/// `Unbounded` means no constraint is modeled (empty BOM, zero quantities,
/// `person_min == 0`). It is distinct from `Bounded(0)`, which means the
/// constraint exists and is exhausted. Variant order makes `Bounded(_) <
/// Unbounded`, so `Ord::min` computes the bottleneck directly.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Availability {
    Bounded(u64),
    Unbounded,
}

impl Availability {
    pub fn as_count(self) -> Option<u64> {
        match self {
            Availability::Bounded(n) => Some(n),
            Availability::Unbounded => None,
        }
    }

    /// Group single servings into order units of `unit_size` (floored).
    ///
    /// A zero unit size carries no constraint.
    pub fn per_unit(self, unit_size: u32) -> Self {
        match self {
            Availability::Unbounded => Availability::Unbounded,
            Availability::Bounded(_) if unit_size == 0 => Availability::Unbounded,
            Availability::Bounded(n) => Availability::Bounded(n / u64::from(unit_size)),
        }
    }

    pub fn covers(self, needed: u64) -> bool {
        self.as_count().is_none_or(|n| n >= needed)
    }

    /// Numeric form used by batch listings: `-1` stands for unbounded.
    pub fn to_sentinel(self) -> i64 {
        self.as_count()
            .map_or(-1, |n| i64::try_from(n).unwrap_or(i64::MAX))
    }
}

impl core::fmt::Display for Availability {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Availability::Bounded(n) => write!(f, "{n}"),
            Availability::Unbounded => f.write_str("unbounded"),
        }
    }
}

impl Serialize for Availability {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Availability::Bounded(n) => serializer.serialize_u64(*n),
            Availability::Unbounded => serializer.serialize_str("unbounded"),
        }
    }
}
