#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Street segment clustering.
//!
//! A street network export splits one street into many short ways, and
//! distinct streets in different parts of the city often share a name.
//! [`SegmentClusterer`] merges same-named segments that lie within
//! [`MERGE_THRESHOLD_KM`] of each other, so every resulting
//! [`StreetCluster`] is one contiguous street.

pub mod progress;

use std::collections::BTreeMap;

use accident_map_spatial::great_circle;
use accident_map_street_index::normalize::normalize;
use accident_map_street_models::StreetFeature;
use geo::{CoordsIter, Geometry, LineString, MultiLineString};

use crate::progress::ProgressCallback;

/// Segments closer than this many kilometers end up in the same cluster.
pub const MERGE_THRESHOLD_KM: f64 = 0.5;

/// A group of same-named segments judged to be one street.
#[derive(Debug, Clone, PartialEq)]
pub struct StreetCluster {
    /// Name of the first segment in the cluster.
    pub name: String,
    /// OSM id of the first segment in the cluster.
    pub osmid: i64,
    /// One entry per input segment.
    pub geometries: Vec<Geometry<f64>>,
}

impl StreetCluster {
    /// A cluster holding a single segment.
    #[must_use]
    pub fn from_feature(feature: &StreetFeature) -> Self {
        Self {
            name: feature.name.clone(),
            osmid: feature.osmid,
            geometries: vec![feature.geometry.clone()],
        }
    }

    /// Minimum great-circle distance in kilometers between any coordinate
    /// of this cluster and any coordinate of `other`.
    ///
    /// Infinite when either cluster has no coordinates.
    #[must_use]
    pub fn distance_km(&self, other: &Self) -> f64 {
        let mut min = f64::INFINITY;
        for a in self.geometries.iter().flat_map(|g| g.coords_iter()) {
            for b in other.geometries.iter().flat_map(|g| g.coords_iter()) {
                min = min.min(great_circle::distance_km(a, b));
            }
        }
        min
    }

    /// Moves every segment of `other` into this cluster.
    pub fn absorb(&mut self, other: Self) {
        self.geometries.extend(other.geometries);
    }

    /// All line work of the cluster flattened into one geometry.
    ///
    /// Point segments become single-coordinate line strings.
    #[must_use]
    pub fn to_multi_line_string(&self) -> MultiLineString<f64> {
        MultiLineString(self.geometries.iter().flat_map(line_strings).collect())
    }
}

fn line_strings(geometry: &Geometry<f64>) -> Vec<LineString<f64>> {
    match geometry {
        Geometry::LineString(ls) => vec![ls.clone()],
        Geometry::MultiLineString(mls) => mls.0.clone(),
        Geometry::Line(line) => vec![LineString::from(*line)],
        Geometry::GeometryCollection(gc) => gc.0.iter().flat_map(line_strings).collect(),
        other => vec![other.coords_iter().collect()],
    }
}

/// Greedy fixed-point clustering of same-named segments.
#[derive(Debug, Clone, Copy)]
pub struct SegmentClusterer {
    threshold_km: f64,
}

impl Default for SegmentClusterer {
    fn default() -> Self {
        Self::new(MERGE_THRESHOLD_KM)
    }
}

impl SegmentClusterer {
    #[must_use]
    pub const fn new(threshold_km: f64) -> Self {
        Self { threshold_km }
    }

    #[must_use]
    pub const fn threshold_km(&self) -> f64 {
        self.threshold_km
    }

    /// Merges clusters until no two of them are closer than the threshold.
    ///
    /// Each pass walks the list in order and lets every cluster absorb all
    /// later clusters within reach. Passes repeat until one merges nothing.
    /// The set of segments in each output cluster is independent of input
    /// order; the order of segments inside a cluster is not.
    #[must_use]
    pub fn cluster(&self, mut clusters: Vec<StreetCluster>) -> Vec<StreetCluster> {
        loop {
            let mut merged = false;
            let mut i = 0;

            while i < clusters.len() {
                let mut j = i + 1;
                while j < clusters.len() {
                    if clusters[i].distance_km(&clusters[j]) < self.threshold_km {
                        let absorbed = clusters.remove(j);
                        clusters[i].absorb(absorbed);
                        merged = true;
                    } else {
                        j += 1;
                    }
                }
                i += 1;
            }

            if !merged {
                return clusters;
            }
        }
    }

    /// Clusters a whole street network.
    ///
    /// Features are grouped by canonical name (in name order) and each
    /// group is clustered independently. Features whose name normalizes to
    /// nothing are skipped.
    #[must_use]
    pub fn cluster_features(
        &self,
        features: &[StreetFeature],
        progress: &dyn ProgressCallback,
    ) -> Vec<StreetCluster> {
        let mut groups: BTreeMap<String, Vec<StreetCluster>> = BTreeMap::new();
        for feature in features {
            let canonical = normalize(&feature.name);
            if canonical.is_empty() {
                log::debug!("Skipping feature {} with unusable name {:?}", feature.id, feature.name);
                continue;
            }
            groups
                .entry(canonical)
                .or_default()
                .push(StreetCluster::from_feature(feature));
        }

        log::info!(
            "Clustering {} segments under {} street names",
            features.len(),
            groups.len()
        );
        progress.set_total(groups.len() as u64);

        let mut clusters = Vec::new();
        for (canonical, segments) in groups {
            log::debug!("Clustering {canonical} ({} segments)", segments.len());
            progress.set_message(canonical);
            clusters.extend(self.cluster(segments));
            progress.inc(1);
        }

        progress.finish(format!("{} street clusters", clusters.len()));
        clusters
    }
}
