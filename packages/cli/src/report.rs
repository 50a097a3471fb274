//! The `report` subcommand.
//!
//! Streams every configured year through parse, resolve, and reference,
//! and writes one report to stdout.

use std::fs::File;
use std::io::{BufReader, Write};

use accident_map_accident_models::{GeoreferencedAccident, UnmatchedCounter};
use accident_map_cli_utils::{IndicatifProgress, MultiProgress};
use accident_map_georeference::GeoReferencer;
use accident_map_georeference::reports::{
    AccidentListRow, AccidentLocation, MissingRow, StreetListRow,
};
use accident_map_spatial::PlanarSpatialQuery;
use accident_map_street_index::StreetIndex;
use accident_map_table::{TableParser, read_rows};
use clap::ValueEnum;
use serde_json::json;
use strum_macros::{AsRefStr, Display, EnumString};

use crate::config::PipelineConfig;

/// Which report to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Display, EnumString, AsRefStr)]
#[value(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReportKind {
    /// `GeoJSON` points for every located accident.
    AccidentLocations,
    /// CSV of located accidents with their matched OSM ids.
    AccidentList,
    /// CSV of accidents attributed to their first matched street.
    StreetList,
    /// CSV of street names that matched nothing.
    Missing,
}

/// Runs the whole pipeline for `years` and writes `kind` to `out`.
///
/// # Errors
///
/// Fails on the first unreadable input, fatal parse or resolution error,
/// or write error.
pub fn run(
    kind: ReportKind,
    config: &PipelineConfig,
    years: &[i32],
    multi: &MultiProgress,
    out: impl Write,
) -> Result<(), Box<dyn std::error::Error>> {
    let index = StreetIndex::load(&config.paths)?;
    let referencer = GeoReferencer::new(&index, &PlanarSpatialQuery);
    let layout = config.layout.compile()?;
    let mut unmatched = UnmatchedCounter::new();

    let years_bar = IndicatifProgress::years_bar(multi, "Years", years.len() as u64);
    let records_bar = IndicatifProgress::records_spinner(multi, "Accidents");

    let mut sink = ReportSink::new(kind, out)?;

    for &year in years {
        let path = config.table_path(year);
        log::info!("Reading {year} from {}", path.display());
        years_bar.set_message(year.to_string());

        let rows = read_rows(BufReader::new(File::open(&path)?));
        let records = TableParser::new(rows, layout.clone(), year);

        for accident in referencer.records(records, &mut unmatched) {
            sink.push(&accident?, &referencer)?;
            records_bar.inc(1);
        }

        years_bar.inc(1);
    }

    records_bar.finish_and_clear();
    years_bar.finish(format!("{} years", years.len()));

    log::info!(
        "{} unmatched street names ({} occurrences)",
        unmatched.len(),
        unmatched.total()
    );

    sink.finish(&unmatched)
}

/// Writes rows of one report kind as accidents arrive.
enum ReportSink<W: Write> {
    /// A `FeatureCollection` whose opening has already been written.
    Locations {
        out: W,
        written: usize,
    },
    AccidentList {
        writer: csv::Writer<W>,
    },
    StreetList {
        writer: csv::Writer<W>,
    },
    Missing {
        writer: csv::Writer<W>,
    },
}

impl<W: Write> ReportSink<W> {
    fn new(kind: ReportKind, mut out: W) -> std::io::Result<Self> {
        Ok(match kind {
            ReportKind::AccidentLocations => {
                out.write_all(br#"{"type":"FeatureCollection","features":["#)?;
                Self::Locations { out, written: 0 }
            }
            ReportKind::AccidentList => Self::AccidentList {
                writer: csv::Writer::from_writer(out),
            },
            ReportKind::StreetList => Self::StreetList {
                writer: csv::Writer::from_writer(out),
            },
            ReportKind::Missing => Self::Missing {
                writer: csv::Writer::from_writer(out),
            },
        })
    }

    fn push(
        &mut self,
        accident: &GeoreferencedAccident,
        referencer: &GeoReferencer<'_>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match self {
            Self::Locations { out, written } => {
                if let Some(location) = AccidentLocation::from_accident(accident) {
                    if *written > 0 {
                        out.write_all(b",")?;
                    }
                    serde_json::to_writer(&mut *out, &location_feature(&location))?;
                    *written += 1;
                }
            }
            Self::AccidentList { writer } => {
                if let Some(row) = AccidentListRow::from_accident(accident, referencer.index()) {
                    writer.serialize(row)?;
                }
            }
            Self::StreetList { writer } => {
                let row = StreetListRow::from_accident(
                    accident,
                    referencer.index(),
                    referencer.spatial(),
                )?;
                writer.serialize(row)?;
            }
            Self::Missing { .. } => {}
        }
        Ok(())
    }

    fn finish(self, unmatched: &UnmatchedCounter) -> Result<(), Box<dyn std::error::Error>> {
        match self {
            Self::Locations { mut out, written } => {
                out.write_all(b"]}")?;
                out.flush()?;
                log::info!("Wrote {written} accident locations");
            }
            Self::AccidentList { mut writer } | Self::StreetList { mut writer } => {
                writer.flush()?;
            }
            Self::Missing { mut writer } => {
                for row in MissingRow::from_counter(unmatched) {
                    writer.serialize(row)?;
                }
                writer.flush()?;
            }
        }
        Ok(())
    }
}

fn location_feature(location: &AccidentLocation) -> serde_json::Value {
    json!({
        "type": "Feature",
        "properties": {
            "name": location.name,
            "year": location.year,
            "count": location.count,
            "directorate": location.directorate,
        },
        "geometry": {
            "type": "Point",
            "coordinates": [location.center.x(), location.center.y()],
        }
    })
}
