#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line entry point for the accident map toolchain.
//!
//! Uses `indicatif-log-bridge` (via [`accident_map_cli_utils::init_logger`])
//! to route `log` output through `indicatif::MultiProgress` so that log
//! lines and progress bars never fight for the terminal. Data goes to
//! stdout; logs and progress go to stderr.

mod config;
mod report;

use std::io::Write;
use std::path::{Path, PathBuf};

use accident_map_cli_utils::IndicatifProgress;
use accident_map_cluster::{SegmentClusterer, StreetCluster};
use accident_map_table::{TableLayout, TableParser, read_rows};
use clap::{Parser, Subcommand};
use geojson::{Feature, FeatureCollection, JsonObject};

use crate::config::PipelineConfig;
use crate::report::ReportKind;

#[derive(Parser)]
#[command(name = "accident_map", about = "Accident report mapping tool")]
struct Cli {
    /// Pipeline config (TOML). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a report table (CSV rows on stdin) into accident records
    /// (CSV on stdout)
    Parse {
        /// Report year the table belongs to
        year: i32,
        /// Table layout (TOML), overriding the config's `[layout]`
        #[arg(long)]
        layout: Option<PathBuf>,
    },
    /// Cluster a street network `GeoJSON` into contiguous named streets
    Cluster {
        /// Street network `FeatureCollection`
        streets: PathBuf,
        /// Merge threshold in kilometers
        #[arg(long, default_value_t = accident_map_cluster::MERGE_THRESHOLD_KM)]
        threshold_km: f64,
    },
    /// Georeference the yearly tables and write a report
    Report {
        /// Report to write
        kind: ReportKind,
        /// Years to include (defaults to the configured range)
        #[arg(long, num_args = 1..)]
        year: Vec<i32>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = accident_map_cli_utils::init_logger();
    let cli = Cli::parse();
    let config = PipelineConfig::load(cli.config.as_deref())?;
    let stdout = std::io::stdout();

    match cli.command {
        Commands::Parse { year, layout } => {
            let layout = match layout {
                Some(path) => TableLayout::from_path(&path)?,
                None => config.layout,
            };
            parse(year, &layout, std::io::stdin().lock(), stdout.lock())?;
        }
        Commands::Cluster {
            streets,
            threshold_km,
        } => {
            let bar = IndicatifProgress::streets_bar(&multi, "Grouping street names");
            let clusters = cluster(&streets, SegmentClusterer::new(threshold_km), &*bar)?;
            write_clusters(&clusters, stdout.lock())?;
        }
        Commands::Report { kind, year } => {
            let years = config.years(&year);
            log::info!("Writing {kind} report for {} year(s)", years.len());
            report::run(kind, &config, &years, &multi, stdout.lock())?;
        }
    }

    Ok(())
}

/// Parses one table and writes its records as CSV.
fn parse(
    year: i32,
    layout: &TableLayout,
    input: impl std::io::Read,
    output: impl Write,
) -> Result<(), Box<dyn std::error::Error>> {
    let parser = TableParser::new(read_rows(input), layout.compile()?, year);
    let mut writer = csv::Writer::from_writer(output);

    let mut count = 0_usize;
    for record in parser {
        writer.serialize(record?)?;
        count += 1;
    }
    writer.flush()?;

    log::info!("Parsed {count} accident records for {year}");
    Ok(())
}

fn cluster(
    streets: &Path,
    clusterer: SegmentClusterer,
    progress: &dyn accident_map_cli_utils::ProgressCallback,
) -> Result<Vec<StreetCluster>, Box<dyn std::error::Error>> {
    let features = accident_map_street_index::load_streets(streets)?;
    Ok(clusterer.cluster_features(&features, progress))
}

/// Writes clusters as a `FeatureCollection` of `MultiLineString`s.
fn write_clusters(
    clusters: &[StreetCluster],
    mut output: impl Write,
) -> Result<(), Box<dyn std::error::Error>> {
    let features = clusters.iter().map(cluster_feature).collect();
    let collection = FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    };
    serde_json::to_writer(&mut output, &collection)?;
    output.flush()?;
    Ok(())
}

fn cluster_feature(cluster: &StreetCluster) -> Feature {
    let mut properties = JsonObject::new();
    properties.insert("name".to_owned(), cluster.name.clone().into());
    properties.insert("osmid".to_owned(), cluster.osmid.into());

    Feature {
        bbox: None,
        geometry: Some(geojson::Geometry::new(geojson::Value::from(
            &cluster.to_multi_line_string(),
        ))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}
