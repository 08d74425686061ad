use clap::Parser;
use log::info;
use trendboard::app::{self, AppState};
use trendboard::config::Config;
use trendboard::dashboard::Dashboard;
use trendboard::iris::IrisTable;
use trendboard::loader;

/// Loads the datasets, builds the dashboard and serves it over HTTP.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();
    config.init_logging();
    config.validate()?;

    // Fetching blocks, keep it off the async workers.
    let startup = config.clone();
    let (dashboard, iris) = tokio::task::spawn_blocking(move || -> trendboard::Result<_> {
        let table = loader::load(&startup.loader_options())?;
        let dashboard = Dashboard::new(table, startup.metric, startup.selected_countries())?;
        let iris = match startup.iris_source() {
            Some(source) => Some(IrisTable::load(source)?.figures()),
            None => None,
        };
        Ok((dashboard, iris))
    })
    .await??;

    info!("serving {} outputs", dashboard.outputs().len());
    app::run(AppState::new(dashboard, iris), &config.bind).await
}
