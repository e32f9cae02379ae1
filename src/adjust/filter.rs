//! Declarative selection of adjustments.
//!
//! An [`AdjustmentFilter`] is pure data: independently-optional clauses that
//! are ANDed together by [`AdjustmentFilter::matches`]. A [`FilterSpec`] is
//! the caller-facing spelling of a query filter; the manager normalizes it
//! into a filter (plus an optional ad hoc predicate) before scanning.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use super::record::{Adjustment, AdjustmentType, DEFAULT_SCENARIO};
use super::tags::tag_matches;

/// Ad hoc match callback: `(adjustment, query period) -> keep?`.
/// The period argument is always passed; callers that do not need the query
/// context simply ignore it.
pub type AdjustmentPredicate = Arc<dyn Fn(&Adjustment, &str) -> bool + Send + Sync>;

/// Declarative predicate over scenario, tags, type and effective window.
///
/// Every field is optional; unset means "no constraint on that axis".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentFilter {
    /// Scenario membership include-set.
    pub scenarios: Option<BTreeSet<String>>,
    /// Scenario membership exclude-set; wins over the include-set.
    pub exclude_scenarios: Option<BTreeSet<String>>,
    /// Hierarchical tag prefixes; at least one tag must match one of them.
    pub tags: Option<BTreeSet<String>>,
    /// Hierarchical tag prefixes; no tag may match any of them.
    pub exclude_tags: Option<BTreeSet<String>>,
    /// Exact tag membership: every listed tag must be present as-is.
    pub require_all_tags: Option<BTreeSet<String>>,
    /// Adjustment-type include-set.
    pub types: Option<BTreeSet<AdjustmentType>>,
    /// Adjustment-type exclude-set.
    pub exclude_types: Option<BTreeSet<AdjustmentType>>,
    /// Evaluation-context period for the effective-window clause.
    /// Without it the window clause is not evaluated at all.
    pub period: Option<String>,
}

impl AdjustmentFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scenarios<I, T>(mut self, scenarios: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.scenarios = Some(scenarios.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_exclude_scenarios<I, T>(mut self, scenarios: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.exclude_scenarios = Some(scenarios.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_tags<I, T>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags = Some(prefixes.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_exclude_tags<I, T>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.exclude_tags = Some(prefixes.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_require_all_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.require_all_tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_types<I>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = AdjustmentType>,
    {
        self.types = Some(types.into_iter().collect());
        self
    }

    pub fn with_exclude_types<I>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = AdjustmentType>,
    {
        self.exclude_types = Some(types.into_iter().collect());
        self
    }

    pub fn with_period(mut self, period: impl Into<String>) -> Self {
        self.period = Some(period.into());
        self
    }

    /// Copy with the window context stripped; cross-period aggregation uses
    /// this because a multi-period summary has no single evaluation period.
    pub fn without_period(&self) -> Self {
        let mut f = self.clone();
        f.period = None;
        f
    }

    /// Evaluates every set clause against `adj`; failing any one is a
    /// no-match.
    pub fn matches(&self, adj: &Adjustment) -> bool {
        // Scenario membership. Exclusion is checked first so that a scenario
        // named in both sets is rejected.
        if let Some(excluded) = &self.exclude_scenarios {
            if excluded.contains(&adj.scenario) {
                return false;
            }
        }
        if let Some(included) = &self.scenarios {
            if !included.contains(&adj.scenario) {
                return false;
            }
        }

        // Tag clauses: hierarchical include/exclude, then exact subset.
        if let Some(prefixes) = &self.tags {
            if !tag_matches(&adj.tags, prefixes) {
                return false;
            }
        }
        if let Some(prefixes) = &self.exclude_tags {
            if tag_matches(&adj.tags, prefixes) {
                return false;
            }
        }
        if let Some(required) = &self.require_all_tags {
            if !required.is_subset(&adj.tags) {
                return false;
            }
        }

        // Type membership.
        if let Some(excluded) = &self.exclude_types {
            if excluded.contains(&adj.adj_type) {
                return false;
            }
        }
        if let Some(included) = &self.types {
            if !included.contains(&adj.adj_type) {
                return false;
            }
        }

        // Effective window, inclusive on both sides, lexicographic on the
        // opaque period strings. Only meaningful with a query context.
        if let Some(period) = &self.period {
            if let Some(start) = &adj.start_period {
                if start > period {
                    return false;
                }
            }
            if let Some(end) = &adj.end_period {
                if end < period {
                    return false;
                }
            }
        }

        true
    }
}

/// The accepted spellings of a query filter, closed at compile time.
#[derive(Clone, Default)]
pub enum FilterSpec {
    /// No preference: default scenario only, scoped to the query period.
    #[default]
    Default,
    /// A full filter, used as-is; the query period is attached if the filter
    /// carries none, so window checks always have context.
    Filter(AdjustmentFilter),
    /// Shorthand: these tag prefixes, restricted to the default scenario.
    TagPrefixes(BTreeSet<String>),
    /// Ad hoc predicate, ANDed with the baseline window check for the query
    /// period. Scenario scanning falls back to "buckets present here".
    Predicate(AdjustmentPredicate),
}

impl fmt::Debug for FilterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterSpec::Default => f.write_str("FilterSpec::Default"),
            FilterSpec::Filter(inner) => f.debug_tuple("FilterSpec::Filter").field(inner).finish(),
            FilterSpec::TagPrefixes(p) => {
                f.debug_tuple("FilterSpec::TagPrefixes").field(p).finish()
            }
            FilterSpec::Predicate(_) => f.write_str("FilterSpec::Predicate(..)"),
        }
    }
}

impl From<AdjustmentFilter> for FilterSpec {
    fn from(filter: AdjustmentFilter) -> Self {
        FilterSpec::Filter(filter)
    }
}

impl From<BTreeSet<String>> for FilterSpec {
    fn from(prefixes: BTreeSet<String>) -> Self {
        FilterSpec::TagPrefixes(prefixes)
    }
}

impl FilterSpec {
    /// Wraps a closure as an ad hoc predicate spec.
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&Adjustment, &str) -> bool + Send + Sync + 'static,
    {
        FilterSpec::Predicate(Arc::new(f))
    }

    /// Normalizes the spec into a canonical filter plus an optional
    /// predicate, given the query period as window context.
    pub fn normalize(&self, period: &str) -> (AdjustmentFilter, Option<AdjustmentPredicate>) {
        match self {
            FilterSpec::Default => (
                AdjustmentFilter::new()
                    .with_scenarios([DEFAULT_SCENARIO])
                    .with_period(period),
                None,
            ),
            FilterSpec::Filter(filter) => {
                let mut filter = filter.clone();
                if filter.period.is_none() {
                    filter.period = Some(period.to_string());
                }
                (filter, None)
            }
            FilterSpec::TagPrefixes(prefixes) => (
                AdjustmentFilter::new()
                    .with_scenarios([DEFAULT_SCENARIO])
                    .with_tags(prefixes.iter().cloned())
                    .with_period(period),
                None,
            ),
            FilterSpec::Predicate(pred) => (
                AdjustmentFilter::new().with_period(period),
                Some(Arc::clone(pred)),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adjust::record::AdjustmentDraft;
    use rstest::rstest;

    fn make(scenario: &str, tags: &[&str], adj_type: AdjustmentType) -> Adjustment {
        AdjustmentDraft::new("ebitda", "2024Q2", 5.0, "test")
            .with_scenario(scenario)
            .with_tags(tags.iter().copied())
            .with_type(adj_type)
            .build()
            .unwrap()
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let adj = make("base", &["ops/manual"], AdjustmentType::Additive);
        assert!(AdjustmentFilter::new().matches(&adj));
    }

    #[test]
    fn test_scenario_include_and_exclude() {
        let adj = make("stress", &[], AdjustmentType::Additive);
        assert!(AdjustmentFilter::new()
            .with_scenarios(["stress", "base"])
            .matches(&adj));
        assert!(!AdjustmentFilter::new().with_scenarios(["base"]).matches(&adj));
        assert!(!AdjustmentFilter::new()
            .with_exclude_scenarios(["stress"])
            .matches(&adj));
    }

    #[test]
    fn test_scenario_exclude_wins_over_include() {
        let adj = make("stress", &[], AdjustmentType::Additive);
        let filter = AdjustmentFilter::new()
            .with_scenarios(["stress"])
            .with_exclude_scenarios(["stress"]);
        assert!(!filter.matches(&adj));
    }

    #[test]
    fn test_tag_prefix_clauses() {
        let adj = make("base", &["ops/manual/q2", "audit"], AdjustmentType::Additive);
        assert!(AdjustmentFilter::new().with_tags(["ops/manual"]).matches(&adj));
        assert!(!AdjustmentFilter::new().with_tags(["finance"]).matches(&adj));
        assert!(!AdjustmentFilter::new().with_exclude_tags(["audit"]).matches(&adj));
    }

    #[test]
    fn test_require_all_tags_is_exact_membership() {
        let adj = make("base", &["ops/manual/q2", "audit"], AdjustmentType::Additive);
        // Exact members pass.
        assert!(AdjustmentFilter::new()
            .with_require_all_tags(["audit", "ops/manual/q2"])
            .matches(&adj));
        // A prefix of a tag is not membership.
        assert!(!AdjustmentFilter::new()
            .with_require_all_tags(["ops/manual"])
            .matches(&adj));
    }

    #[test]
    fn test_type_clauses() {
        let adj = make("base", &[], AdjustmentType::Multiplicative);
        assert!(AdjustmentFilter::new()
            .with_types([AdjustmentType::Multiplicative])
            .matches(&adj));
        assert!(!AdjustmentFilter::new()
            .with_types([AdjustmentType::Additive])
            .matches(&adj));
        assert!(!AdjustmentFilter::new()
            .with_exclude_types([AdjustmentType::Multiplicative])
            .matches(&adj));
    }

    #[rstest]
    // (start, end, query period, in window?)
    #[case(Some("P07"), None, "P06", false)] // Starts after the query
    #[case(Some("P07"), None, "P08", true)]
    #[case(Some("P07"), None, "P07", true)] // Bounds are inclusive
    #[case(None, Some("P05"), "P06", false)] // Ended before the query
    #[case(None, Some("P06"), "P06", true)]
    #[case(Some("P03"), Some("P09"), "P06", true)]
    #[case(None, None, "P06", true)] // Unbounded is always in-window
    fn test_effective_window(
        #[case] start: Option<&str>,
        #[case] end: Option<&str>,
        #[case] period: &str,
        #[case] expected: bool,
    ) {
        let mut draft = AdjustmentDraft::new("ebitda", "P06", 5.0, "test");
        if let Some(start) = start {
            draft = draft.with_start_period(start);
        }
        if let Some(end) = end {
            draft = draft.with_end_period(end);
        }
        let adj = draft.build().unwrap();
        let filter = AdjustmentFilter::new().with_period(period);
        assert_eq!(filter.matches(&adj), expected);
    }

    #[test]
    fn test_window_not_evaluated_without_context() {
        let adj = AdjustmentDraft::new("ebitda", "P06", 5.0, "test")
            .with_start_period("P07")
            .build()
            .unwrap();
        // No period on the filter: the window clause is skipped entirely.
        assert!(AdjustmentFilter::new().matches(&adj));
    }

    #[test]
    fn test_normalize_default_scopes_to_default_scenario_and_period() {
        let (filter, pred) = FilterSpec::Default.normalize("2024Q3");
        assert!(pred.is_none());
        assert_eq!(filter.period.as_deref(), Some("2024Q3"));
        assert!(filter.scenarios.unwrap().contains(DEFAULT_SCENARIO));
    }

    #[test]
    fn test_normalize_keeps_explicit_filter_period() {
        let spec = FilterSpec::Filter(AdjustmentFilter::new().with_period("2023Q4"));
        let (filter, _) = spec.normalize("2024Q3");
        assert_eq!(filter.period.as_deref(), Some("2023Q4"));

        let spec = FilterSpec::Filter(AdjustmentFilter::new());
        let (filter, _) = spec.normalize("2024Q3");
        assert_eq!(filter.period.as_deref(), Some("2024Q3"));
    }

    #[test]
    fn test_normalize_predicate_keeps_window_baseline() {
        let spec = FilterSpec::predicate(|adj, _| adj.value > 0.0);
        let (filter, pred) = spec.normalize("2024Q3");
        assert!(pred.is_some());
        assert_eq!(filter.period.as_deref(), Some("2024Q3"));
        assert!(filter.scenarios.is_none());
    }
}
