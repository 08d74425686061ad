use crate::config::{FALLBACK_URL, PRIMARY_URL};
use crate::error::{Error, Result};
use crate::table::{Observation, Table};
use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord, Trim};
use flate2::read::GzDecoder;
use lazy_static::lazy_static;
use log::{info, warn};
use regex::Regex;
use std::collections::{BTreeSet, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;

lazy_static! {
    static ref DAY_FIRST_LONG: Regex = Regex::new(r"^\d{1,2}/\d{1,2}/\d{4}$").unwrap();
    static ref DAY_FIRST_SHORT: Regex = Regex::new(r"^\d{1,2}/\d{1,2}/\d{2}$").unwrap();
    static ref ISO_DATE: Regex = Regex::new(r"^\d{4}-\d{1,2}-\d{1,2}$").unwrap();
}

/// Source column names for each field the pipeline needs.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnNames {
    pub date: String,
    pub country: String,
    pub continent: String,
    pub cases: String,
    pub deaths: String,
    pub population: String,
    pub geo_id: String,
    pub country_code: String,
}

impl Default for ColumnNames {
    /// Column names of the ECDC geographic distribution CSV.
    fn default() -> Self {
        ColumnNames {
            date: "dateRep".to_string(),
            country: "countriesAndTerritories".to_string(),
            continent: "continentExp".to_string(),
            cases: "cases".to_string(),
            deaths: "deaths".to_string(),
            population: "popData2019".to_string(),
            geo_id: "geoId".to_string(),
            country_code: "countryterritoryCode".to_string(),
        }
    }
}

/// Field values read as missing, the same tokens pandas' `read_csv` treats
/// as NA. Namibia's `geoId` is literally `NA`.
pub const MISSING_VALUES: [&str; 19] = [
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

#[derive(Clone, Debug, PartialEq)]
pub struct LoaderOptions {
    pub primary: String,
    pub fallback: String,
    /// Percentage (0..=100) of missing values above which a column is dropped.
    pub missing_threshold: f64,
    /// Rows whose continent equals this value are excluded.
    pub excluded_continent: String,
    /// Filler for missing categorical identifiers.
    pub placeholder: String,
    /// Field values counted as missing.
    pub missing_values: BTreeSet<String>,
    pub columns: ColumnNames,
}

impl LoaderOptions {
    pub fn is_missing(&self, field: &str) -> bool {
        self.missing_values.contains(field)
    }
}

impl Default for LoaderOptions {
    fn default() -> Self {
        LoaderOptions {
            primary: PRIMARY_URL.to_string(),
            fallback: FALLBACK_URL.to_string(),
            missing_threshold: 5.0,
            excluded_continent: "Other".to_string(),
            placeholder: "NMB".to_string(),
            missing_values: MISSING_VALUES.iter().map(|v| v.to_string()).collect(),
            columns: ColumnNames::default(),
        }
    }
}

/// Fetches the dataset (primary, then the fallback once) and builds the
/// base table.
pub fn load(options: &LoaderOptions) -> Result<Table> {
    let text = fetch_with_fallback(&options.primary, &options.fallback)?;
    let table = parse_table(text.as_bytes(), options)?;
    info!(
        "table loaded: {} rows, {} countries, {:?} to {:?}",
        table.len(),
        table.countries().len(),
        table.start_date(),
        table.last_date()
    );
    Ok(table)
}

/// Reads `primary`; if that fails, reads `fallback` exactly once.
pub fn fetch_with_fallback(primary: &str, fallback: &str) -> Result<String> {
    info!("reading data from {}", primary);
    let primary_err = match read_source(primary) {
        Ok(text) => return Ok(text),
        Err(e) => e,
    };
    warn!("primary source {} failed: {}; trying {}", primary, primary_err, fallback);

    match read_source(fallback) {
        Ok(text) => {
            warn!("data read from the fallback source, it may not be the latest version");
            Ok(text)
        }
        Err(fallback_err) => Err(Error::SourceUnavailable {
            primary: primary_err.to_string(),
            fallback: fallback_err.to_string(),
        }),
    }
}

/// Reads a URL or a local `.csv` / `.csv.gz` file into memory.
pub fn read_source(source: &str) -> Result<String> {
    if source.starts_with("http://") || source.starts_with("https://") {
        let response = reqwest::blocking::get(source)?.error_for_status()?;
        return Ok(response.text()?);
    }

    let path = Path::new(source);
    let mut text = String::new();
    if path.extension().and_then(|ext| ext.to_str()) == Some("gz") {
        GzDecoder::new(File::open(path)?).read_to_string(&mut text)?;
    } else {
        File::open(path)?.read_to_string(&mut text)?;
    }
    Ok(text)
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let format = if DAY_FIRST_LONG.is_match(raw) {
        "%d/%m/%Y"
    } else if DAY_FIRST_SHORT.is_match(raw) {
        "%d/%m/%y"
    } else if ISO_DATE.is_match(raw) {
        "%Y-%m-%d"
    } else {
        return None;
    };
    NaiveDate::parse_from_str(raw, format).ok()
}

// Integers may come through as `12.0` when a column was written as floats.
fn parse_count(raw: &str) -> Option<i64> {
    raw.parse::<i64>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && v.fract() == 0.0)
            .map(|v| v as i64)
    })
}

/// Columns whose share of missing fields exceeds the missing threshold.
fn sparse_columns(headers: &StringRecord, records: &[StringRecord], options: &LoaderOptions) -> HashSet<usize> {
    let mut dropped = HashSet::new();
    if records.is_empty() {
        return dropped;
    }
    for (index, name) in headers.iter().enumerate() {
        let missing = records
            .iter()
            .filter(|record| record.get(index).is_none_or(|field| options.is_missing(field)))
            .count();
        let pct = missing as f64 * 100.0 / records.len() as f64;
        if pct > options.missing_threshold {
            info!("dropping column `{}`: {:.1}% missing", name, pct);
            dropped.insert(index);
        }
    }
    dropped
}

struct Layout {
    date: usize,
    country: usize,
    continent: usize,
    cases: usize,
    deaths: usize,
    population: usize,
    geo_id: Option<usize>,
    country_code: Option<usize>,
}

impl Layout {
    fn resolve(headers: &StringRecord, dropped: &HashSet<usize>, names: &ColumnNames) -> Result<Self> {
        let find = |name: &str| headers.iter().position(|h| h == name);
        let required = |name: &str| -> Result<usize> {
            match find(name) {
                Some(index) if dropped.contains(&index) => Err(Error::Schema(format!(
                    "required column `{}` was dropped for missing values",
                    name
                ))),
                Some(index) => Ok(index),
                None => Err(Error::Schema(format!("missing required column `{}`", name))),
            }
        };
        let optional = |name: &str| find(name).filter(|index| !dropped.contains(index));

        Ok(Layout {
            date: required(&names.date)?,
            country: required(&names.country)?,
            continent: required(&names.continent)?,
            cases: required(&names.cases)?,
            deaths: required(&names.deaths)?,
            population: required(&names.population)?,
            geo_id: optional(&names.geo_id),
            country_code: optional(&names.country_code),
        })
    }
}

/// Parses CSV text into the base table, applying the loader contract:
/// sparse columns dropped, sentinel continent rows excluded and missing
/// categorical identifiers filled with the placeholder.
pub fn parse_table<R: Read>(reader: R, options: &LoaderOptions) -> Result<Table> {
    let mut csv = ReaderBuilder::new().trim(Trim::All).from_reader(reader);
    let headers = csv.headers()?.clone();
    let records: Vec<StringRecord> = csv.records().collect::<std::result::Result<_, _>>()?;

    let dropped = sparse_columns(&headers, &records, options);
    let layout = Layout::resolve(&headers, &dropped, &options.columns)?;

    let names = &options.columns;
    let mut rows = Vec::with_capacity(records.len());
    let mut excluded = 0usize;
    for (index, record) in records.iter().enumerate() {
        // Header is line 1.
        let line = index + 2;
        let field = |column: usize| record.get(column).unwrap_or("");
        let category = |column: Option<usize>| match column.map(field) {
            Some(value) if !options.is_missing(value) => value.to_string(),
            _ => options.placeholder.clone(),
        };

        let continent = category(Some(layout.continent));
        if continent == options.excluded_continent {
            excluded += 1;
            continue;
        }

        let date = parse_date(field(layout.date)).ok_or_else(|| {
            Error::Schema(format!(
                "line {}: `{}` is not a date in column `{}`",
                line,
                field(layout.date),
                names.date
            ))
        })?;
        let count = |column: usize, name: &str| {
            parse_count(field(column)).ok_or_else(|| {
                Error::Schema(format!(
                    "line {}: `{}` is not an integer in column `{}`",
                    line,
                    field(column),
                    name
                ))
            })
        };
        let cases = count(layout.cases, &names.cases)?;
        let deaths = count(layout.deaths, &names.deaths)?;
        let population = field(layout.population).parse::<f64>().map_err(|_| {
            Error::Schema(format!(
                "line {}: `{}` is not a number in column `{}`",
                line,
                field(layout.population),
                names.population
            ))
        })?;

        rows.push(
            Observation::new(category(Some(layout.country)), continent, date, cases, deaths, population)
                .with_identifiers(category(layout.geo_id), category(layout.country_code)),
        );
    }

    if excluded > 0 {
        info!(
            "excluded {} rows with continent `{}`",
            excluded, options.excluded_continent
        );
    }
    Table::new(rows)
}
