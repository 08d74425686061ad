//! Grouping, snapshot and cumulative views over the base table.
//!
//! Every function here is pure and total over a validated [`Table`]. Group
//! members are always folded in one canonical order (group key, date,
//! country), so results are identical for any permutation of the input rows,
//! floating point included.

use crate::table::{GroupKey, Measures, Observation, Table};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Summed measures of one `(group, date)` pair.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroupRow {
    pub key: String,
    pub date: NaiveDate,
    pub measures: Measures,
}

/// Rows ordered ascending by date, ties ordered by group label.
pub type GroupedAggregate = Vec<GroupRow>;

/// Tail of a [`GroupedAggregate`]; see [`latest_snapshot_by_continent`].
pub type Snapshot = Vec<GroupRow>;

/// Like [`GroupedAggregate`], with running totals per group.
pub type CumulativeSeries = Vec<GroupRow>;

/// Measures summed over all dates, per group.
pub type Totals = BTreeMap<String, Measures>;

fn canonical_order(table: &Table, key: GroupKey) -> Vec<&Observation> {
    let mut rows: Vec<&Observation> = table.rows().iter().collect();
    rows.sort_by(|a, b| {
        key.of(a)
            .cmp(key.of(b))
            .then(a.date.cmp(&b.date))
            .then_with(|| a.country.cmp(&b.country))
    });
    rows
}

/// Folds canonically ordered rows into one row per `(key, date)`, ordered by
/// key then date.
fn fold_groups(rows: &[&Observation], key: GroupKey) -> Vec<GroupRow> {
    let mut grouped: Vec<GroupRow> = Vec::new();
    for obs in rows {
        let label = key.of(obs);
        match grouped.last_mut() {
            Some(last) if last.key == label && last.date == obs.date => {
                last.measures += &obs.measures();
            }
            _ => grouped.push(GroupRow {
                key: label.to_string(),
                date: obs.date,
                measures: obs.measures(),
            }),
        }
    }
    grouped
}

// Stable sort: rows arrive ordered by key, so equal dates keep key order.
fn order_by_date(rows: &mut [GroupRow]) {
    rows.sort_by(|a, b| a.date.cmp(&b.date));
}

/// Groups by `(key, date)` and sums every numeric column.
pub fn daily_by_group(table: &Table, key: GroupKey) -> GroupedAggregate {
    let mut grouped = fold_groups(&canonical_order(table, key), key);
    order_by_date(&mut grouped);
    grouped
}

pub fn daily_by_continent(table: &Table) -> GroupedAggregate {
    daily_by_group(table, GroupKey::Continent)
}

/// Last `continents` rows of a daily aggregate.
///
/// When the most recent date is only partially reported the tail reaches
/// back into earlier dates, so the snapshot may hold fewer rows of the last
/// date than there are continents.
pub fn snapshot_from_daily(daily: &[GroupRow], continents: usize) -> Snapshot {
    let start = daily.len().saturating_sub(continents);
    daily[start..].to_vec()
}

pub fn latest_snapshot_by_continent(table: &Table) -> Snapshot {
    let daily = daily_by_continent(table);
    snapshot_from_daily(&daily, table.continents().len())
}

/// Sums grouped rows per key, visiting each key's rows in date order.
pub fn totals_from_rows(rows: &[GroupRow]) -> Totals {
    let mut totals = Totals::new();
    for row in rows {
        *totals.entry(row.key.clone()).or_default() += &row.measures;
    }
    totals
}

/// Sums every numeric column per group, ignoring date.
pub fn total_by_group(table: &Table, key: GroupKey) -> Totals {
    totals_from_rows(&daily_by_group(table, key))
}

pub fn total_by_continent(table: &Table) -> Totals {
    total_by_group(table, GroupKey::Continent)
}

pub fn total_by_country(table: &Table) -> Totals {
    total_by_group(table, GroupKey::Country)
}

/// Running totals per group, ascending by date.
///
/// The scan resets at every new group value, so totals never leak across
/// groups. `population` is carried as the per-date sum, every other column
/// accumulates.
pub fn cumulative_by_group(table: &Table, key: GroupKey) -> CumulativeSeries {
    let grouped = fold_groups(&canonical_order(table, key), key);

    let mut series: Vec<GroupRow> = Vec::with_capacity(grouped.len());
    let mut running = Measures::default();
    let mut current: Option<&str> = None;
    for row in &grouped {
        if current != Some(row.key.as_str()) {
            running = Measures::default();
            current = Some(row.key.as_str());
        }
        running += &row.measures;
        series.push(GroupRow {
            key: row.key.clone(),
            date: row.date,
            measures: Measures {
                population: row.measures.population,
                ..running
            },
        });
    }

    order_by_date(&mut series);
    series
}

/// Rows whose `key` value is in `selected`. An empty or non-matching
/// selection yields an empty table.
pub fn filter_by_keys(table: &Table, key: GroupKey, selected: &BTreeSet<String>) -> Table {
    if selected.is_empty() {
        return Table::empty();
    }
    let rows = table
        .rows()
        .iter()
        .filter(|obs| selected.contains(key.of(obs)))
        .cloned()
        .collect();
    Table::from_validated(rows)
}

pub fn distinct_keys(table: &Table, key: GroupKey) -> Vec<String> {
    table.distinct(key)
}
