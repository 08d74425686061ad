use chrono::NaiveDate;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::io::Write;
use trendboard::cell::InputValue;
use trendboard::dashboard::*;
use trendboard::loader::{self, LoaderOptions};
use trendboard::{ChartData, Dashboard, Error, Metric, Observation, Table};

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 7, d).unwrap()
}

fn table() -> Table {
    Table::new(vec![
        Observation::new("A", "cont1", day(1), 10, 1, 1e6),
        Observation::new("B", "cont1", day(1), 20, 2, 2e6),
        Observation::new("A", "cont1", day(2), 30, 0, 1e6),
        Observation::new("B", "cont1", day(2), 4, 1, 2e6),
        Observation::new("C", "cont2", day(1), 7, 7, 7e6),
        Observation::new("C", "cont2", day(2), 14, 0, 7e6),
    ])
    .unwrap()
}

fn columns(dashboard: &Dashboard, output: &str) -> Vec<String> {
    dashboard.output(output).unwrap().groups()
}

#[test]
fn widening_the_selection_touches_only_country_outputs() {
    let mut dashboard = Dashboard::new(table(), Metric::CasesPerMillion, ["A".to_string()].into()).unwrap();
    assert_eq!(columns(&dashboard, LINE_COUNTRY_DAILY), vec!["A"]);

    let before = dashboard.outputs();
    let replaced = dashboard.set_countries(["A", "B"]).unwrap();

    assert_eq!(columns(&dashboard, LINE_COUNTRY_DAILY), vec!["A", "B"]);
    assert_eq!(columns(&dashboard, LINE_COUNTRY_CUMSUM), vec!["A", "B"]);
    assert!(!replaced.iter().any(|name| name.contains("continent") || name.starts_with("pie")));

    let after = dashboard.outputs();
    for name in [PIE_LAST_DAY, PIE_TOTAL, LINE_CONTINENT_DAILY, LINE_CONTINENT_CUMSUM] {
        assert_eq!(before[name], after[name]);
    }
    assert_eq!(dashboard.runs("continent_pies"), Some(1));
    assert_eq!(dashboard.runs("continent_lines"), Some(1));
    assert_eq!(dashboard.runs("country_lines"), Some(2));
}

#[test]
fn metric_change_keeps_metric_free_outputs() {
    let mut dashboard = Dashboard::new(table(), Metric::CasesPerMillion, ["A".to_string(), "C".to_string()].into()).unwrap();
    let totals_before = dashboard.output(COUNTRY_CASE_TOTALS).unwrap().clone();

    let replaced = dashboard.set_metric(Metric::DeathsPerMillion).unwrap();
    assert!(!replaced.contains(&COUNTRY_CASE_TOTALS.to_string()));
    assert_eq!(dashboard.output(COUNTRY_CASE_TOTALS).unwrap(), &totals_before);
    assert_eq!(dashboard.runs("country_totals"), Some(1));

    let ChartData::Series(daily) = dashboard.output(LINE_CONTINENT_DAILY).unwrap() else {
        panic!("expected a series table");
    };
    // cont1 on day 1: 1 death per million for A, 1 for B.
    assert_eq!(daily.value(day(1), "cont1"), Some(2.0));
}

#[test]
fn cumulative_continent_line_ends_at_the_pie_total() {
    let dashboard = Dashboard::with_defaults(table()).unwrap();
    let ChartData::Series(cumsum) = dashboard.output(LINE_CONTINENT_CUMSUM).unwrap() else {
        panic!("expected a series table");
    };
    let ChartData::Slices(pie) = dashboard.output(PIE_TOTAL).unwrap() else {
        panic!("expected a slice table");
    };
    for slice in &pie.slices {
        let last = cumsum.series(&slice.label).last().map(|(_, v)| *v);
        assert_eq!(last, Some(slice.value));
    }
}

#[test]
fn empty_selection_and_unknown_countries_yield_empty_tables() {
    let mut dashboard = Dashboard::with_defaults(table()).unwrap();
    assert!(dashboard.output(LINE_COUNTRY_DAILY).unwrap().is_empty());

    dashboard.set_countries(Vec::<String>::new()).unwrap();
    assert!(dashboard.output(COUNTRY_CASE_TOTALS).unwrap().is_empty());
    assert!(!dashboard.output(PIE_TOTAL).unwrap().is_empty());
}

#[test]
fn setting_the_same_value_recomputes_nothing() {
    let mut dashboard = Dashboard::new(table(), Metric::CasesPerMillion, ["A".to_string()].into()).unwrap();
    assert!(dashboard.set_metric(Metric::CasesPerMillion).unwrap().is_empty());
    assert!(dashboard.set_countries(["A"]).unwrap().is_empty());
    assert_eq!(dashboard.runs("continent_pies"), Some(1));
    assert_eq!(dashboard.runs("country_lines"), Some(1));
}

#[test]
fn mistyped_input_is_rejected_without_side_effects() {
    let mut dashboard = Dashboard::with_defaults(table()).unwrap();
    let err = dashboard
        .set_input(METRIC_CHOICE, InputValue::Countries(["A".to_string()].into()))
        .unwrap_err();
    assert!(matches!(err, Error::InputType { .. }));
    assert_eq!(dashboard.metric().unwrap(), Metric::CasesPerMillion);

    let err = dashboard
        .set_input("date_range", InputValue::Metric(Metric::CasesPerMillion))
        .unwrap_err();
    assert!(matches!(err, Error::UnknownInput(_)));
}

#[test]
fn builds_from_a_compressed_fallback_file() {
    let csv = "dateRep,day,month,year,cases,deaths,countriesAndTerritories,geoId,countryterritoryCode,popData2019,continentExp
19/08/2020,19,8,2020,3,0,Qatar,QA,QAT,2881060,Asia
18/08/2020,18,8,2020,5,1,Qatar,QA,QAT,2881060,Asia
19/08/2020,19,8,2020,9,2,Italy,IT,ITA,60359546,Europe
19/08/2020,19,8,2020,1,0,Cases_on_an_international_conveyance_Japan,JPG11668,,3000,Other
";
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshot.csv.gz");
    let mut encoder = GzEncoder::new(std::fs::File::create(&path).unwrap(), Compression::default());
    encoder.write_all(csv.as_bytes()).unwrap();
    encoder.finish().unwrap();

    let options = LoaderOptions {
        primary: dir.path().join("missing.csv").to_string_lossy().into_owned(),
        fallback: path.to_string_lossy().into_owned(),
        ..LoaderOptions::default()
    };
    let table = loader::load(&options).unwrap();
    assert_eq!(table.len(), 3);
    assert_eq!(table.continents(), vec!["Asia", "Europe"]);

    let dashboard = Dashboard::with_defaults(table).unwrap();
    assert_eq!(columns(&dashboard, COUNTRY_CASE_TOTALS), vec!["Qatar"]);
    let ChartData::Slices(totals) = dashboard.output(COUNTRY_CASE_TOTALS).unwrap() else {
        panic!("expected a slice table");
    };
    assert_eq!(totals.slices[0].value, 8.0);
}
