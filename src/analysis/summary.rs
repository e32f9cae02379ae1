//! Grouped aggregation of the adjustment log.
//!
//! Everything here is read-only and built on `AdjustmentManager::get_all`;
//! the analytics layer never touches the indices directly.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::adjust::filter::AdjustmentFilter;
use crate::adjust::manager::AdjustmentManager;
use crate::adjust::record::Adjustment;
use crate::adjust::tags::tag_matches_prefix;

/// Grouping axis for [`Analytics::summary`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupField {
    Period,
    Node,
    Scenario,
    Type,
    User,
}

impl GroupField {
    pub fn label(&self) -> &'static str {
        match self {
            GroupField::Period => "period",
            GroupField::Node => "node_name",
            GroupField::Scenario => "scenario",
            GroupField::Type => "type",
            GroupField::User => "user",
        }
    }

    /// Key component for one record; `None` when the field is absent
    /// (an adjustment without a user).
    fn extract(&self, adj: &Adjustment) -> Option<String> {
        match self {
            GroupField::Period => Some(adj.period.clone()),
            GroupField::Node => Some(adj.node_name.clone()),
            GroupField::Scenario => Some(adj.scenario.clone()),
            GroupField::Type => Some(adj.adj_type.to_string()),
            GroupField::User => adj.user.clone(),
        }
    }
}

/// One aggregated group: its key (aligned with the table's `group_by`
/// columns), record count, sum of raw values, and mean of absolute values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub key: Vec<Option<String>>,
    pub count: usize,
    pub sum: f64,
    pub mean_abs: f64,
}

/// Output of [`Analytics::summary`]. An empty result still carries the
/// requested `group_by` columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryTable {
    pub group_by: Vec<GroupField>,
    pub rows: Vec<SummaryRow>,
}

impl SummaryTable {
    pub fn columns(&self) -> Vec<&'static str> {
        self.group_by.iter().map(GroupField::label).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Read-only reporting over a manager.
pub struct Analytics<'a> {
    manager: &'a AdjustmentManager,
}

impl<'a> Analytics<'a> {
    pub fn new(manager: &'a AdjustmentManager) -> Self {
        Self { manager }
    }

    /// Groups the whole adjustment log by `group_by` after applying
    /// `filter`.
    ///
    /// The filter's effective-window clause is deliberately ignored: windows
    /// are contextual to a calculation period, and a cross-period summary
    /// has no single period. Rows come back sorted by group key.
    pub fn summary(
        &self,
        filter: Option<&AdjustmentFilter>,
        group_by: &[GroupField],
    ) -> SummaryTable {
        let cross_period = filter.map(AdjustmentFilter::without_period);

        let mut groups: BTreeMap<Vec<Option<String>>, (usize, f64, f64)> = BTreeMap::new();
        for adj in self.manager.get_all() {
            if let Some(f) = &cross_period {
                if !f.matches(&adj) {
                    continue;
                }
            }
            let key: Vec<Option<String>> = group_by.iter().map(|g| g.extract(&adj)).collect();
            let entry = groups.entry(key).or_insert((0, 0.0, 0.0));
            entry.0 += 1;
            entry.1 += adj.value;
            entry.2 += adj.value.abs();
        }

        let rows = groups
            .into_iter()
            .map(|(key, (count, sum, abs_sum))| SummaryRow {
                key,
                count,
                sum,
                mean_abs: abs_sum / count as f64,
            })
            .collect();

        SummaryTable {
            group_by: group_by.to_vec(),
            rows,
        }
    }

    /// Adjustments passing `filter` whose tag set hierarchically matches
    /// `prefix`, sorted by `(priority, timestamp, id)`.
    pub fn list_by_tag(&self, prefix: &str, filter: Option<&AdjustmentFilter>) -> Vec<Adjustment> {
        let mut out: Vec<Adjustment> = self
            .manager
            .get_all()
            .into_iter()
            .filter(|adj| filter.map_or(true, |f| f.matches(adj)))
            .filter(|adj| tag_matches_prefix(&adj.tags, prefix))
            .collect();
        out.sort_by_key(Adjustment::sort_key);
        out
    }

    /// Per-scenario record tally.
    pub fn count_by_scenario(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for adj in self.manager.get_all() {
            *counts.entry(adj.scenario).or_insert(0) += 1;
        }
        counts
    }

    /// Every scenario currently holding adjustments.
    pub fn scenarios(&self) -> BTreeSet<String> {
        self.manager.scenarios()
    }
}
