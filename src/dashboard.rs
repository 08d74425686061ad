//! The COVID-19 dashboard: continent views precomputed once, wired to the
//! metric and country inputs through the reactive graph.

use crate::aggregate::{
    self, CumulativeSeries, GroupedAggregate, Snapshot, Totals, cumulative_by_group,
    filter_by_keys, total_by_country,
};
use crate::cell::{InputCell, InputValue};
use crate::error::{Error, Result};
use crate::pivot::{ChartData, SeriesTable, Slice, SliceTable};
use crate::reactive::{Inputs, OutputSet, ReactiveGraph, Rule};
use crate::table::{GroupKey, Metric, Table};
use chrono::NaiveDate;
use log::info;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

pub const METRIC_CHOICE: &str = "metric_choice";
pub const SELECTED_COUNTRIES: &str = "selected_countries";

pub const PIE_LAST_DAY: &str = "pie_last_day";
pub const PIE_TOTAL: &str = "pie_total";
pub const LINE_CONTINENT_DAILY: &str = "line_continent_daily";
pub const LINE_CONTINENT_CUMSUM: &str = "line_continent_cumsum";
pub const LINE_COUNTRY_DAILY: &str = "line_country_daily";
pub const LINE_COUNTRY_CUMSUM: &str = "line_country_cumsum";
pub const COUNTRY_CASE_TOTALS: &str = "country_case_totals";

pub const DEFAULT_COUNTRIES: [&str; 5] = [
    "Qatar",
    "Kuwait",
    "Bahrain",
    "Saudi_Arabia",
    "United_Arab_Emirates",
];

/// The base table and every continent-level view, computed once at startup
/// and shared read-only by all rule evaluations.
#[derive(Debug)]
pub struct BaseViews {
    pub table: Table,
    pub daily: GroupedAggregate,
    pub snapshot: Snapshot,
    pub totals: Totals,
    pub cumulative: CumulativeSeries,
}

impl BaseViews {
    pub fn build(table: Table) -> Self {
        let daily = aggregate::daily_by_continent(&table);
        let snapshot = aggregate::snapshot_from_daily(&daily, table.continents().len());
        let totals = aggregate::totals_from_rows(&daily);
        let cumulative = cumulative_by_group(&table, GroupKey::Continent);
        BaseViews {
            table,
            daily,
            snapshot,
            totals,
            cumulative,
        }
    }
}

/// What the page header and the selectors need to know about the data.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Summary {
    pub start_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub rows: usize,
    pub continents: Vec<String>,
    pub countries: Vec<String>,
    pub metrics: Vec<Metric>,
}

fn continent_pies(inputs: &Inputs<'_>, base: &BaseViews) -> Result<Vec<ChartData>> {
    let metric = inputs.metric(METRIC_CHOICE)?;
    Ok(vec![
        ChartData::Slices(SliceTable::from_groups(&base.snapshot, metric)),
        ChartData::Slices(SliceTable::from_totals(&base.totals, metric)),
    ])
}

fn continent_lines(inputs: &Inputs<'_>, base: &BaseViews) -> Result<Vec<ChartData>> {
    let metric = inputs.metric(METRIC_CHOICE)?;
    Ok(vec![
        ChartData::Series(SeriesTable::from_groups(&base.daily, metric)),
        ChartData::Series(SeriesTable::from_groups(&base.cumulative, metric)),
    ])
}

fn country_lines(inputs: &Inputs<'_>, base: &BaseViews) -> Result<Vec<ChartData>> {
    let metric = inputs.metric(METRIC_CHOICE)?;
    let selected = filter_by_keys(&base.table, GroupKey::Country, inputs.countries(SELECTED_COUNTRIES)?);
    let cumulative = cumulative_by_group(&selected, GroupKey::Country);
    Ok(vec![
        ChartData::Series(SeriesTable::from_observations(&selected, GroupKey::Country, metric)),
        ChartData::Series(SeriesTable::from_groups(&cumulative, metric)),
    ])
}

// Raw reported cases per selected country; independent of the metric.
fn country_totals(inputs: &Inputs<'_>, base: &BaseViews) -> Result<Vec<ChartData>> {
    let selected = filter_by_keys(&base.table, GroupKey::Country, inputs.countries(SELECTED_COUNTRIES)?);
    let slices = total_by_country(&selected)
        .into_iter()
        .map(|(label, measures)| Slice {
            label,
            value: measures.cases as f64,
        })
        .collect();
    Ok(vec![ChartData::Slices(SliceTable { slices })])
}

fn rules() -> Vec<Rule<BaseViews>> {
    vec![
        Rule::new(
            "continent_pies",
            &[METRIC_CHOICE],
            &[PIE_LAST_DAY, PIE_TOTAL],
            continent_pies,
        ),
        Rule::new(
            "continent_lines",
            &[METRIC_CHOICE],
            &[LINE_CONTINENT_DAILY, LINE_CONTINENT_CUMSUM],
            continent_lines,
        ),
        Rule::new(
            "country_lines",
            &[METRIC_CHOICE, SELECTED_COUNTRIES],
            &[LINE_COUNTRY_DAILY, LINE_COUNTRY_CUMSUM],
            country_lines,
        ),
        Rule::new(
            "country_totals",
            &[SELECTED_COUNTRIES],
            &[COUNTRY_CASE_TOTALS],
            country_totals,
        ),
    ]
}

pub struct Dashboard {
    graph: ReactiveGraph<BaseViews>,
}

impl Dashboard {
    pub fn new(table: Table, metric: Metric, countries: BTreeSet<String>) -> Result<Self> {
        let base = Arc::new(BaseViews::build(table));
        info!(
            "dashboard ready: {} rows, {} continents, {} daily continent rows",
            base.table.len(),
            base.totals.len(),
            base.daily.len()
        );
        let cells = vec![
            InputCell::create(METRIC_CHOICE, InputValue::Metric(metric)),
            InputCell::create(SELECTED_COUNTRIES, InputValue::Countries(countries)),
        ];
        Ok(Dashboard {
            graph: ReactiveGraph::new(base, cells, rules())?,
        })
    }

    /// Cases per million for the Gulf countries the page opens with.
    pub fn with_defaults(table: Table) -> Result<Self> {
        let countries = DEFAULT_COUNTRIES.iter().map(|c| c.to_string()).collect();
        Self::new(table, Metric::CasesPerMillion, countries)
    }

    pub fn set_input(&mut self, name: &str, value: InputValue) -> Result<Vec<String>> {
        self.graph.set_input(name, value)
    }

    pub fn set_metric(&mut self, metric: Metric) -> Result<Vec<String>> {
        self.set_input(METRIC_CHOICE, InputValue::Metric(metric))
    }

    pub fn set_countries<I, S>(&mut self, countries: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let countries = countries.into_iter().map(Into::into).collect();
        self.set_input(SELECTED_COUNTRIES, InputValue::Countries(countries))
    }

    pub fn metric(&self) -> Result<Metric> {
        self.graph.input(METRIC_CHOICE).and_then(|value| {
            value.as_metric().ok_or_else(|| Error::InputType {
                cell: METRIC_CHOICE.to_string(),
                expected: "metric",
            })
        })
    }

    pub fn countries(&self) -> BTreeSet<String> {
        self.graph
            .input(SELECTED_COUNTRIES)
            .ok()
            .and_then(InputValue::as_countries)
            .cloned()
            .unwrap_or_default()
    }

    pub fn inputs(&self) -> Vec<(String, InputValue)> {
        self.graph
            .inputs()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    pub fn outputs(&self) -> Arc<OutputSet> {
        self.graph.outputs()
    }

    pub fn output(&self, name: &str) -> Result<&ChartData> {
        self.graph.output(name)
    }

    pub fn runs(&self, rule: &str) -> Option<u64> {
        self.graph.runs(rule)
    }

    pub fn base(&self) -> &Arc<BaseViews> {
        self.graph.context()
    }

    pub fn summary(&self) -> Summary {
        let table = &self.base().table;
        Summary {
            start_date: table.start_date(),
            last_date: table.last_date(),
            rows: table.len(),
            continents: table.continents(),
            countries: table.countries(),
            metrics: Metric::ALL.to_vec(),
        }
    }
}
