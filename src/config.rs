use crate::dashboard::DEFAULT_COUNTRIES;
use crate::error::{Error, Result};
use crate::loader::LoaderOptions;
use crate::table::Metric;
use clap::Parser;
use std::collections::BTreeSet;
use std::path::PathBuf;

pub const PRIMARY_URL: &str = "https://opendata.ecdc.europa.eu/covid19/casedistribution/csv";
pub const FALLBACK_URL: &str = "https://raw.githubusercontent.com/junaidqazi/DataSets_Practice_ScienceAcademy/master/COVID-19-geographic-disbtribution-worldwide-2020-08-19.csv";
pub const IRIS_URL: &str =
    "https://raw.githubusercontent.com/junaidqazi/DataSets_Practice_ScienceAcademy/master/Iris.csv";

fn parse_metric(s: &str) -> std::result::Result<Metric, String> {
    s.parse::<Metric>().map_err(|e| e.to_string())
}

/// Runtime configuration, read from the command line.
#[derive(Parser, Debug, Clone)]
#[command(version, about = "COVID-19 trend and Iris dashboards", long_about = None)]
pub struct Config {
    /// Primary dataset source (URL or local .csv / .csv.gz path)
    #[arg(long, default_value = PRIMARY_URL)]
    pub primary: String,

    /// Source tried once when the primary one fails
    #[arg(long, default_value = FALLBACK_URL)]
    pub fallback: String,

    /// Columns missing more than this percentage of values are dropped
    #[arg(long, default_value_t = 5.0)]
    pub missing_threshold: f64,

    /// Continent value marking rows that are not a real continent
    #[arg(long, default_value = "Other")]
    pub excluded_continent: String,

    /// Filler for missing categorical identifiers
    #[arg(long, default_value = "NMB")]
    pub placeholder: String,

    /// Initial metric: cases_per_million or deaths_per_million
    #[arg(long, default_value = "cases_per_million", value_parser = parse_metric)]
    pub metric: Metric,

    /// Initially selected countries, comma separated
    #[arg(long, value_delimiter = ',', default_values = DEFAULT_COUNTRIES)]
    pub countries: Vec<String>,

    /// Iris dataset source (URL or local path)
    #[arg(long, default_value = IRIS_URL)]
    pub iris: String,

    /// Skip the Iris figures
    #[arg(long)]
    pub no_iris: bool,

    /// Directory the CLI writes one CSV per output into
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Address the web server listens on
    #[arg(long, default_value = "127.0.0.1:3000")]
    pub bind: String,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=100.0).contains(&self.missing_threshold) {
            return Err(Error::Config(format!(
                "missing threshold must be within 0..=100, got {}",
                self.missing_threshold
            )));
        }
        if self.primary.trim().is_empty() || self.fallback.trim().is_empty() {
            return Err(Error::Config("data sources must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn loader_options(&self) -> LoaderOptions {
        LoaderOptions {
            primary: self.primary.clone(),
            fallback: self.fallback.clone(),
            missing_threshold: self.missing_threshold,
            excluded_continent: self.excluded_continent.clone(),
            placeholder: self.placeholder.clone(),
            ..LoaderOptions::default()
        }
    }

    pub fn iris_source(&self) -> Option<&str> {
        (!self.no_iris).then_some(self.iris.as_str())
    }

    pub fn selected_countries(&self) -> BTreeSet<String> {
        self.countries
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Installs the global logger. `RUST_LOG` wins over `--log-level`.
    pub fn init_logging(&self) {
        let env = env_logger::Env::default().default_filter_or(self.log_level.as_str());
        let _ = env_logger::Builder::from_env(env).try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_open_on_gulf_cases_per_million() {
        let config = Config::parse_from(["trendboard"]);
        assert_eq!(config.primary, PRIMARY_URL);
        assert_eq!(config.metric, Metric::CasesPerMillion);
        assert_eq!(config.selected_countries().len(), 5);
        assert!(config.selected_countries().contains("Saudi_Arabia"));
        assert_eq!(config.loader_options().placeholder, "NMB");
        assert!(config.loader_options().is_missing("NA"));
        assert_eq!(config.iris_source(), Some(IRIS_URL));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_flags() {
        let config = Config::parse_from([
            "trendboard",
            "--metric",
            "Deaths Per Million",
            "--countries",
            "Italy, Spain",
            "--missing-threshold",
            "10",
            "--no-iris",
        ]);
        assert_eq!(config.metric, Metric::DeathsPerMillion);
        assert_eq!(
            config.selected_countries(),
            ["Italy".to_string(), "Spain".to_string()].into()
        );
        assert_eq!(config.loader_options().missing_threshold, 10.0);
        assert_eq!(config.iris_source(), None);
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let config = Config::parse_from(["trendboard", "--missing-threshold", "150"]);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
