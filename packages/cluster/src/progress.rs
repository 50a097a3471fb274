//! Progress reporting for dataset-wide clustering and report runs.
//!
//! The library crates only report through [`ProgressCallback`]; the
//! terminal rendering lives in `accident_map_cli_utils`.

/// Receives progress from a long-running pass over streets or accidents.
pub trait ProgressCallback: Send + Sync {
    /// Number of units (street names, years) the pass will process.
    fn set_total(&self, total: u64);

    fn inc(&self, delta: u64);

    /// The unit currently being processed.
    fn set_message(&self, msg: String);

    /// Ends the pass, leaving `msg` as its summary.
    fn finish(&self, msg: String);

    /// Ends the pass without a summary.
    fn finish_and_clear(&self);
}
