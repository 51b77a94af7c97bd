use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use reforest::{
    logging,
    rng::RngManager,
    scenario::{Scenario, ScenarioLoader},
    session::Session,
    upstream::{self, DataSource, FixtureSource, HttpSource},
    web::{self, AppState, WebServerConfig},
};

#[derive(Debug, Parser)]
#[command(author, version, about = "Reforestation impact planner")]
struct Cli {
    /// Path to the scenario YAML file
    #[arg(long, default_value = "scenarios/coastal_restoration.yaml")]
    scenario: PathBuf,

    /// Override the projection timeline in years
    #[arg(long)]
    timeline: Option<u32>,

    /// Override the planting intensity (1-10)
    #[arg(long)]
    intensity: Option<f64>,

    /// Serve recorded upstream payloads from this directory instead of the network
    #[arg(long)]
    offline: Option<PathBuf>,

    /// Print the run as JSON instead of a table
    #[arg(long)]
    json: bool,

    /// Start the HTTP API instead of running the scenario once
    #[arg(long)]
    serve: bool,

    /// Override the API listen host
    #[arg(long)]
    host: Option<String>,

    /// Override the API listen port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let loader = ScenarioLoader::new(".");
    let scenario = loader.load(&cli.scenario)?;
    logging::init(&scenario.logging.level);

    let seed = scenario.seed.unwrap_or_else(rand::random);
    info!(scenario = %scenario.name, seed, "scenario loaded");

    match &cli.offline {
        Some(dir) => dispatch(&cli, &scenario, FixtureSource::new(dir), seed).await,
        None => {
            let source = HttpSource::new(scenario.upstream.clone())
                .context("Failed to build upstream HTTP client")?;
            dispatch(&cli, &scenario, source, seed).await
        }
    }
}

async fn dispatch<S>(cli: &Cli, scenario: &Scenario, source: S, seed: u64) -> Result<()>
where
    S: DataSource + Send + Sync + 'static,
{
    if cli.serve {
        let config = WebServerConfig {
            host: cli.host.clone().unwrap_or_else(|| scenario.server.host.clone()),
            port: cli.port.unwrap_or(scenario.server.port),
        };
        web::run(config, Arc::new(AppState::new(source, seed))).await
    } else {
        run_once(cli, scenario, &source, seed).await
    }
}

async fn run_once<S: DataSource>(
    cli: &Cli,
    scenario: &Scenario,
    source: &S,
    seed: u64,
) -> Result<()> {
    let region = scenario.build_region()?;
    let mut rng = RngManager::for_region(seed, &region);
    let mut session = Session::new();
    session.select_region(region.clone());

    let data = upstream::fetch_region(source, &region, &mut rng)
        .await
        .with_context(|| format!("Failed to fetch data for region {}", region.id))?;
    session.apply_region_data(&region.id, data)?;
    session.set_parameters(scenario.parameters(cli.timeline, cli.intensity))?;
    let run = session.run_simulation()?.clone();

    if cli.json {
        let report = serde_json::json!({
            "scenario": scenario.name,
            "region": session.region(),
            "data": session.data(),
            "projection": run,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if let Some(data) = session.data() {
        let soil = &data.land.soil;
        println!(
            "Scenario '{}' | {} ({}, {} km2)",
            scenario.name,
            region.display_name(),
            region.geometry.kind(),
            region.area_km2.unwrap_or_default()
        );
        println!(
            "Climate: avg {:.1} C, rainfall {:.0} mm/yr ({}), soil {} pH {:.1}, fertility {}",
            data.climate.temperature.average,
            data.climate.rainfall.annual,
            data.land.water_access.precipitation,
            soil.kind,
            soil.ph,
            soil.fertility
        );
        if data.soil_fallback {
            println!("Soil data unavailable; soil profile uses default values");
        }
    }
    println!("Method: {}", run.method);
    println!(
        "{:>6} {:>9} {:>8} {:>10} {:>6} {:>12} {:>7}",
        "year", "forest %", "temp C", "rain mm", "bio", "carbon t", "water"
    );
    for step in &run.snapshots {
        println!(
            "{:>6} {:>9.1} {:>8.2} {:>10.0} {:>6.2} {:>12.0} {:>7.1}",
            step.year,
            step.forest_coverage,
            step.temperature_average,
            step.rainfall_annual,
            step.biodiversity_index,
            step.carbon_sequestration,
            step.water_quality
        );
    }
    if let Some(summary) = run.summary {
        let pct = |value: Option<f64>| {
            value
                .map(|v| format!("{v:+.0}%"))
                .unwrap_or_else(|| "n/a".to_string())
        };
        println!(
            "By {}: forest {}, temperature {:+.1} C, rainfall {}",
            summary.year,
            pct(summary.forest_coverage_change_pct),
            summary.temperature_change,
            pct(summary.rainfall_change_pct)
        );
    }
    Ok(())
}
