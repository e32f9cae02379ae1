//! Immutable adjustment records.
//! An `Adjustment` is never mutated after construction; "editing" one means
//! building a replacement with the same id and re-adding it to the manager.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

use super::error::AdjustError;

/// The scenario adjustments belong to unless a caller opts into another one.
pub const DEFAULT_SCENARIO: &str = "base";

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AdjustmentId(pub u64);

impl AdjustmentId {
    /// Allocates a fresh process-unique id.
    pub fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for AdjustmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "adj#{}", self.0)
    }
}

/// How an adjustment combines with the running value during a fold.
///
/// Closed set: the fold matches exhaustively on this enum, so a new kind of
/// adjustment is a compile-time-checked addition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AdjustmentType {
    /// `current + value * scale`
    Additive,
    /// `current * value^scale`
    Multiplicative,
    /// `current := value` (scale is ignored; this is not a weighted blend)
    Replacement,
}

impl fmt::Display for AdjustmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AdjustmentType::Additive => "additive",
            AdjustmentType::Multiplicative => "multiplicative",
            AdjustmentType::Replacement => "replacement",
        };
        f.write_str(s)
    }
}

/// A discretionary override applied on top of a computed base value for one
/// (node, period) location.
///
/// Identity and equality are by `id` alone: two records with the same id are
/// the same adjustment as far as the manager is concerned, whatever their
/// other fields say.
///
/// Periods are opaque strings, but window checks compare them
/// lexicographically, so callers must use an ordering-preserving
/// representation (e.g. `"2023Q1"`, not `"Q1-2023"`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Adjustment {
    pub id: AdjustmentId,
    pub node_name: String,
    /// Primary target period.
    pub period: String,
    /// Inclusive lower bound of the effective window; `None` = unbounded.
    pub start_period: Option<String>,
    /// Inclusive upper bound of the effective window; `None` = unbounded.
    pub end_period: Option<String>,
    pub value: f64,
    pub adj_type: AdjustmentType,
    /// Attenuation factor in [0.0, 1.0], validated at construction.
    pub scale: f64,
    /// Fold-order tie-break; lower applies earlier.
    pub priority: i64,
    /// Hierarchical `/`-delimited classification paths.
    pub tags: BTreeSet<String>,
    pub scenario: String,
    pub reason: String,
    pub user: Option<String>,
    /// Creation time, the secondary sort key.
    pub timestamp: DateTime<Utc>,
}

impl PartialEq for Adjustment {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Adjustment {}

impl Hash for Adjustment {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Adjustment {
    /// Total ordering key used by every sorted surface of the engine.
    ///
    /// `(priority, timestamp)` alone is not total when two records share
    /// both; the id breaks the tie so fold order never depends on insertion
    /// or input order.
    #[inline]
    pub fn sort_key(&self) -> (i64, DateTime<Utc>, AdjustmentId) {
        (self.priority, self.timestamp, self.id)
    }
}

/// Staged fields for a new [`Adjustment`]; `build` runs validation.
///
/// Defaults: additive, scale 1.0, priority 0, no tags, the default scenario,
/// no user, a fresh id, creation time now.
#[derive(Debug, Clone)]
pub struct AdjustmentDraft {
    node_name: String,
    period: String,
    value: f64,
    reason: String,
    adj_type: AdjustmentType,
    scale: f64,
    priority: i64,
    tags: BTreeSet<String>,
    scenario: String,
    user: Option<String>,
    id: Option<AdjustmentId>,
    start_period: Option<String>,
    end_period: Option<String>,
    timestamp: Option<DateTime<Utc>>,
}

impl AdjustmentDraft {
    pub fn new(
        node_name: impl Into<String>,
        period: impl Into<String>,
        value: f64,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            node_name: node_name.into(),
            period: period.into(),
            value,
            reason: reason.into(),
            adj_type: AdjustmentType::Additive,
            scale: 1.0,
            priority: 0,
            tags: BTreeSet::new(),
            scenario: DEFAULT_SCENARIO.to_string(),
            user: None,
            id: None,
            start_period: None,
            end_period: None,
            timestamp: None,
        }
    }

    pub fn with_type(mut self, adj_type: AdjustmentType) -> Self {
        self.adj_type = adj_type;
        self
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_scenario(mut self, scenario: impl Into<String>) -> Self {
        self.scenario = scenario.into();
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Reuse an existing id; adding the built record replaces the old one.
    pub fn with_id(mut self, id: AdjustmentId) -> Self {
        self.id = Some(id);
        self
    }

    /// Inclusive lower bound of the effective window.
    pub fn with_start_period(mut self, start_period: impl Into<String>) -> Self {
        self.start_period = Some(start_period.into());
        self
    }

    /// Inclusive upper bound of the effective window.
    pub fn with_end_period(mut self, end_period: impl Into<String>) -> Self {
        self.end_period = Some(end_period.into());
        self
    }

    /// Overrides the creation timestamp (importers replaying a log).
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Validates and freezes the record.
    pub fn build(self) -> Result<Adjustment, AdjustError> {
        if !(0.0..=1.0).contains(&self.scale) {
            return Err(AdjustError::InvalidScale { scale: self.scale });
        }
        Ok(Adjustment {
            id: self.id.unwrap_or_else(AdjustmentId::next),
            node_name: self.node_name,
            period: self.period,
            start_period: self.start_period,
            end_period: self.end_period,
            value: self.value,
            adj_type: self.adj_type,
            scale: self.scale,
            priority: self.priority,
            tags: self.tags,
            scenario: self.scenario,
            reason: self.reason,
            user: self.user,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0.0)]
    #[case(0.5)]
    #[case(1.0)]
    fn test_valid_scale_builds(#[case] scale: f64) {
        let adj = AdjustmentDraft::new("revenue", "2024Q1", 10.0, "audit finding")
            .with_scale(scale)
            .build()
            .unwrap();
        assert_eq!(adj.scale, scale);
    }

    #[rstest]
    #[case(-0.01)]
    #[case(1.01)]
    #[case(f64::NAN)]
    #[case(f64::INFINITY)]
    fn test_invalid_scale_rejected(#[case] scale: f64) {
        let err = AdjustmentDraft::new("revenue", "2024Q1", 10.0, "audit finding")
            .with_scale(scale)
            .build()
            .unwrap_err();
        assert!(matches!(err, AdjustError::InvalidScale { .. }));
    }

    #[test]
    fn test_defaults() {
        let adj = AdjustmentDraft::new("opex", "2024Q2", -3.0, "reclass").build().unwrap();
        assert_eq!(adj.adj_type, AdjustmentType::Additive);
        assert_eq!(adj.scale, 1.0);
        assert_eq!(adj.priority, 0);
        assert_eq!(adj.scenario, DEFAULT_SCENARIO);
        assert!(adj.tags.is_empty());
        assert!(adj.user.is_none());
        assert!(adj.start_period.is_none() && adj.end_period.is_none());
    }

    #[test]
    fn test_ids_are_process_unique() {
        let a = AdjustmentDraft::new("n", "p", 1.0, "r").build().unwrap();
        let b = AdjustmentDraft::new("n", "p", 1.0, "r").build().unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_equality_is_by_id() {
        let a = AdjustmentDraft::new("n", "p", 1.0, "r").build().unwrap();
        let b = AdjustmentDraft::new("other", "q", 99.0, "different")
            .with_id(a.id)
            .build()
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_serde_roundtrip_preserves_ordering_fields() {
        let adj = AdjustmentDraft::new("revenue", "2024Q1", 12.5, "late invoice")
            .with_priority(3)
            .with_tag("manual/q1")
            .with_user("analyst1")
            .build()
            .unwrap();
        let json = serde_json::to_string(&adj).unwrap();
        let back: Adjustment = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, adj.id);
        assert_eq!(back.sort_key(), adj.sort_key());
        assert_eq!(back.tags, adj.tags);
        assert_eq!(back.value, adj.value);
    }
}
