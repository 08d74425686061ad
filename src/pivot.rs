use crate::aggregate::{GroupRow, Totals};
use crate::table::{GroupKey, Metric, Table};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One date of a [`SeriesTable`]; `values[i]` belongs to `columns[i]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SeriesRow {
    pub date: NaiveDate,
    pub values: Vec<Option<f64>>,
}

/// A pivoted view: rows indexed by date, one column per group value.
///
/// A `(date, group)` pair with no observation stays `None`; it is never
/// filled with zero.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SeriesTable {
    pub columns: Vec<String>,
    pub rows: Vec<SeriesRow>,
}

impl SeriesTable {
    /// Pivots `(group, date, value)` points. Columns and dates come out
    /// sorted; repeated pairs are averaged.
    pub fn pivot<'a, I>(points: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, NaiveDate, f64)>,
    {
        let mut columns: BTreeSet<&'a str> = BTreeSet::new();
        let mut cells: BTreeMap<NaiveDate, BTreeMap<&'a str, (f64, u32)>> = BTreeMap::new();

        for (group, date, value) in points {
            columns.insert(group);
            let cell = cells.entry(date).or_default().entry(group).or_insert((0.0, 0));
            cell.0 += value;
            cell.1 += 1;
        }

        let rows = cells
            .into_iter()
            .map(|(date, by_group)| SeriesRow {
                date,
                values: columns
                    .iter()
                    .map(|column| by_group.get(column).map(|(sum, n)| sum / f64::from(*n)))
                    .collect(),
            })
            .collect();

        SeriesTable {
            columns: columns.into_iter().map(str::to_string).collect(),
            rows,
        }
    }

    pub fn from_groups(rows: &[GroupRow], metric: Metric) -> Self {
        Self::pivot(
            rows.iter()
                .map(|row| (row.key.as_str(), row.date, row.measures.metric(metric))),
        )
    }

    /// Pivots raw observations, one column per value of `key`.
    pub fn from_observations(table: &Table, key: GroupKey, metric: Metric) -> Self {
        Self::pivot(
            table
                .rows()
                .iter()
                .map(|obs| (key.of(obs), obs.date, obs.measures().metric(metric))),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn value(&self, date: NaiveDate, column: &str) -> Option<f64> {
        let index = self.columns.iter().position(|c| c == column)?;
        self.rows
            .iter()
            .find(|row| row.date == date)
            .and_then(|row| row.values[index])
    }

    /// The points present in one column, by ascending date.
    pub fn series(&self, column: &str) -> Vec<(NaiveDate, f64)> {
        let Some(index) = self.columns.iter().position(|c| c == column) else {
            return Vec::new();
        };
        self.rows
            .iter()
            .filter_map(|row| row.values[index].map(|value| (row.date, value)))
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Slice {
    pub label: String,
    pub value: f64,
}

/// Label/value pairs for pie-style charts, in source order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SliceTable {
    pub slices: Vec<Slice>,
}

impl SliceTable {
    /// One slice per grouped row; a label can repeat when the rows span
    /// more than one date.
    pub fn from_groups(rows: &[GroupRow], metric: Metric) -> Self {
        SliceTable {
            slices: rows
                .iter()
                .map(|row| Slice {
                    label: row.key.clone(),
                    value: row.measures.metric(metric),
                })
                .collect(),
        }
    }

    pub fn from_totals(totals: &Totals, metric: Metric) -> Self {
        SliceTable {
            slices: totals
                .iter()
                .map(|(label, measures)| Slice {
                    label: label.clone(),
                    value: measures.metric(metric),
                })
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.slices.iter().map(|slice| slice.label.as_str()).collect()
    }
}

/// A chart-ready table, free of any styling or chart-type information.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartData {
    Series(SeriesTable),
    Slices(SliceTable),
}

impl ChartData {
    pub fn is_empty(&self) -> bool {
        match self {
            ChartData::Series(table) => table.is_empty(),
            ChartData::Slices(table) => table.is_empty(),
        }
    }

    /// Group labels carried by the table: series columns or slice labels.
    pub fn groups(&self) -> Vec<String> {
        match self {
            ChartData::Series(table) => table.columns.clone(),
            ChartData::Slices(table) => table.labels().into_iter().map(str::to_string).collect(),
        }
    }
}
