use clap::Parser;
use log::{info, warn};
use std::fs;
use trendboard::config::Config;
use trendboard::dashboard::Dashboard;
use trendboard::downloader::to_csv;
use trendboard::iris::IrisTable;
use trendboard::loader;
use trendboard::saving::{SavedOutputs, save_outputs};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();
    config.init_logging();
    config.validate()?;

    let table = loader::load(&config.loader_options())?;
    let dashboard = Dashboard::new(table, config.metric, config.selected_countries())?;

    let summary = dashboard.summary();
    println!(
        "{} rows, {} countries in {} continents",
        summary.rows,
        summary.countries.len(),
        summary.continents.len()
    );
    if let (Some(start), Some(last)) = (summary.start_date, summary.last_date) {
        println!("data from {} to {}", start, last);
    }
    // Unknown countries are not an error, they just match nothing.
    for country in dashboard.countries() {
        if !summary.countries.contains(&country) {
            warn!("selected country `{}` is not in the dataset", country);
        }
    }

    let outputs = dashboard.outputs();
    for (name, data) in outputs.iter() {
        println!("{:<24} {:>3} groups", name, data.groups().len());
    }

    if let Some(dir) = &config.output_dir {
        fs::create_dir_all(dir)?;
        for (name, data) in outputs.iter() {
            fs::write(dir.join(format!("{}.csv", name)), to_csv(data)?)?;
        }
        save_outputs(&SavedOutputs::capture(&dashboard)?, dir.join("outputs.bin.gz"))?;
        info!("wrote {} outputs to {}", outputs.len(), dir.display());
    }

    if let Some(source) = config.iris_source() {
        let iris = IrisTable::load(source)?;
        let figures = iris.figures();
        println!("iris: {} flowers", iris.flowers().len());
        for slice in &figures.species.slices {
            println!("  {:<12} {}", slice.label, slice.value);
        }
        if let Some(dir) = &config.output_dir {
            fs::write(dir.join("iris.json"), serde_json::to_string_pretty(&figures)?)?;
        }
    } else {
        info!("skipping the iris figures");
    }

    Ok(())
}
