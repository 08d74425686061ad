use crate::error::{Error, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::ops::AddAssign;
use std::str::FromStr;

const PER_MILLION: f64 = 1_000_000.0;

/// The two normalized metrics a dashboard user can choose between.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    CasesPerMillion,
    DeathsPerMillion,
}

impl Metric {
    pub const ALL: [Metric; 2] = [Metric::CasesPerMillion, Metric::DeathsPerMillion];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::CasesPerMillion => "cases_per_million",
            Metric::DeathsPerMillion => "deaths_per_million",
        }
    }

    /// Human readable label, as shown in the metric selector.
    pub fn label(&self) -> &'static str {
        match self {
            Metric::CasesPerMillion => "Cases Per Million",
            Metric::DeathsPerMillion => "Deaths Per Million",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = Error;

    /// Accepts both the identifier (`cases_per_million`) and the label
    /// (`Cases Per Million`).
    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "cases_per_million" => Ok(Metric::CasesPerMillion),
            "deaths_per_million" => Ok(Metric::DeathsPerMillion),
            _ => Err(Error::InvalidMetric(s.to_string())),
        }
    }
}

/// Column used to partition rows before aggregation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKey {
    Continent,
    Country,
}

impl GroupKey {
    pub fn of<'a>(&self, obs: &'a Observation) -> &'a str {
        match self {
            GroupKey::Continent => &obs.continent,
            GroupKey::Country => &obs.country,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GroupKey::Continent => "continent",
            GroupKey::Country => "country",
        }
    }
}

/// The numeric columns of an observation; also the value type of every
/// grouped aggregate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Measures {
    pub cases: i64,
    pub deaths: i64,
    pub population: f64,
    pub cases_per_million: f64,
    pub deaths_per_million: f64,
}

impl Measures {
    pub fn metric(&self, metric: Metric) -> f64 {
        match metric {
            Metric::CasesPerMillion => self.cases_per_million,
            Metric::DeathsPerMillion => self.deaths_per_million,
        }
    }
}

impl AddAssign<&Measures> for Measures {
    fn add_assign(&mut self, other: &Measures) {
        self.cases += other.cases;
        self.deaths += other.deaths;
        self.population += other.population;
        self.cases_per_million += other.cases_per_million;
        self.deaths_per_million += other.deaths_per_million;
    }
}

/// One row of the raw dataset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub country: String,
    pub continent: String,
    pub geo_id: String,
    pub country_code: String,
    pub date: NaiveDate,
    pub cases: i64,
    pub deaths: i64,
    pub population: f64,
    pub cases_per_million: f64,
    pub deaths_per_million: f64,
}

impl Observation {
    /// Builds an observation and derives the per-million metrics once.
    pub fn new(
        country: impl Into<String>,
        continent: impl Into<String>,
        date: NaiveDate,
        cases: i64,
        deaths: i64,
        population: f64,
    ) -> Self {
        Observation {
            country: country.into(),
            continent: continent.into(),
            geo_id: String::new(),
            country_code: String::new(),
            date,
            cases,
            deaths,
            population,
            cases_per_million: cases as f64 / population * PER_MILLION,
            deaths_per_million: deaths as f64 / population * PER_MILLION,
        }
    }

    pub fn with_identifiers(
        mut self,
        geo_id: impl Into<String>,
        country_code: impl Into<String>,
    ) -> Self {
        self.geo_id = geo_id.into();
        self.country_code = country_code.into();
        self
    }

    pub fn measures(&self) -> Measures {
        Measures {
            cases: self.cases,
            deaths: self.deaths,
            population: self.population,
            cases_per_million: self.cases_per_million,
            deaths_per_million: self.deaths_per_million,
        }
    }
}

/// The immutable base table every aggregation reads from.
///
/// Construction checks the row invariants: positive population, a unique
/// `(country, date)` pair per row and exactly one continent per country.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    rows: Vec<Observation>,
}

impl Table {
    pub fn new(rows: Vec<Observation>) -> Result<Self> {
        let mut seen: HashSet<(&str, NaiveDate)> = HashSet::with_capacity(rows.len());
        let mut continents: HashMap<&str, &str> = HashMap::new();

        for (index, obs) in rows.iter().enumerate() {
            if !(obs.population.is_finite() && obs.population > 0.0) {
                return Err(Error::Schema(format!(
                    "row {}: population for `{}` must be a positive number, got {}",
                    index, obs.country, obs.population
                )));
            }
            if !seen.insert((obs.country.as_str(), obs.date)) {
                return Err(Error::Schema(format!(
                    "row {}: duplicate observation for `{}` on {}",
                    index, obs.country, obs.date
                )));
            }
            match continents.get(obs.country.as_str()) {
                Some(existing) if *existing != obs.continent => {
                    return Err(Error::Schema(format!(
                        "row {}: `{}` reported under both `{}` and `{}`",
                        index, obs.country, existing, obs.continent
                    )));
                }
                Some(_) => {}
                None => {
                    continents.insert(obs.country.as_str(), obs.continent.as_str());
                }
            }
        }

        Ok(Table { rows })
    }

    pub fn empty() -> Self {
        Table { rows: Vec::new() }
    }

    /// Wraps rows taken from an already validated table.
    pub(crate) fn from_validated(rows: Vec<Observation>) -> Self {
        Table { rows }
    }

    pub fn rows(&self) -> &[Observation] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn start_date(&self) -> Option<NaiveDate> {
        self.rows.iter().map(|obs| obs.date).min()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.rows.iter().map(|obs| obs.date).max()
    }

    /// Distinct values of `key`, sorted.
    pub fn distinct(&self, key: GroupKey) -> Vec<String> {
        self.rows
            .iter()
            .map(|obs| key.of(obs))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    pub fn countries(&self) -> Vec<String> {
        self.distinct(GroupKey::Country)
    }

    pub fn continents(&self) -> Vec<String> {
        self.distinct(GroupKey::Continent)
    }
}
