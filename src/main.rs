use clap::{Parser, Subcommand};
use tracing::{error, info};

use county_mapper::boundaries;
use county_mapper::config::Config;
use county_mapper::error::Result;
use county_mapper::logging;
use county_mapper::pipeline::{MapView, NormalizedAggregate};
use county_mapper::render::render_choropleth;
use county_mapper::warehouse::{ResponseSource, WarehouseClient};

#[derive(Parser)]
#[command(name = "county_mapper")]
#[command(about = "Survey response choropleth generator")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Query the warehouse and render the county choropleth PNG
    Render {
        /// Override the configured output path
        #[arg(long)]
        output: Option<String>,
    },
}

/// The whole run is one-shot and all-or-nothing: any stage failing aborts
/// before the image is written.
async fn run_render(mut config: Config, output_override: Option<String>) -> Result<()> {
    if let Some(path) = output_override {
        config.output.path = path;
    }

    let api_key = config.read_api_key()?;
    let warehouse = WarehouseClient::new(&config.warehouse, api_key)?;

    info!("Querying warehouse for county response counts");
    let rows = warehouse.fetch_county_counts().await?;

    let aggregate = NormalizedAggregate::from_rows(&rows)?;
    let view = aggregate.map_view();
    match &view {
        MapView::SingleState(state) => {
            info!("All counties belong to state {}, tightening viewport", state)
        }
        MapView::National => info!(
            "Responses span {} states, rendering national view",
            aggregate.states().len()
        ),
    }

    let county_boundaries = boundaries::fetch_county_boundaries(&config.boundaries).await?;

    render_choropleth(&aggregate, &county_boundaries, &view, &config.output)?;
    println!("🗺️  Wrote {}", config.output.path);
    Ok(())
}

#[tokio::main]
async fn main() {
    logging::init_logging();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Render { output } => match Config::load() {
            Ok(config) => run_render(config, output).await,
            Err(e) => Err(e),
        },
    };

    if let Err(e) = result {
        error!("Run failed: {}", e);
        eprintln!("❌ {}", e);
        std::process::exit(1);
    }
}
