//! Street-name canonicalization.
//!
//! Applied identically when the index is built and when a name is looked
//! up, so `"Hauptstraße"`, `"Hauptstrasse"`, `"Hauptstr."` and
//! `"HAUPTSTR (Höhe 12)"` all land on the same key.

use std::sync::LazyLock;

use regex::Regex;

/// Everything that is not an ASCII lowercase letter.
static NON_LOWER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z]+").expect("valid regex"));

/// Trailing remainder of `-straße` / `-strasse` once `str` is kept.
const FOLDED_SUFFIX: &str = "asse";

/// Canonicalizes a street name for index lookup.
///
/// The pipeline:
/// 1. Drop everything from the first `(` on
/// 2. Lowercase
/// 3. Fold `ß` to `ss`
/// 4. Strip everything but `a`-`z`
/// 5. Strip trailing `asse`, so `straße`/`strasse` meet `str`
///
/// The output contains only `a`-`z` and never ends in `asse`, so
/// normalizing it again is a no-op.
#[must_use]
pub fn normalize(name: &str) -> String {
    let name = name.find('(').map_or(name, |idx| &name[..idx]);
    let folded = name.to_lowercase().replace('ß', "ss");
    let mut canonical = NON_LOWER_RE.replace_all(&folded, "").into_owned();

    while canonical.ends_with(FOLDED_SUFFIX) {
        canonical.truncate(canonical.len() - FOLDED_SUFFIX.len());
    }

    canonical
}
