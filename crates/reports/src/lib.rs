//! Pure normalization of the three raw audit report payloads into display
//! metrics. No IO, no shared state; callers recompute on read.
//!
//! Malformed input is never an error here: the raw reports come from
//! external tools (depcheck, npm ls, npm audit) and older server versions
//! emitted plain error text where JSON was expected, so every parser
//! degrades to an empty or zero result instead of propagating.

use serde::Deserialize;
use serde_json::Value;
use shared::domain::VulnerabilitySummary;

/// Child-entry connectors drawn by npm ls. A line carrying either glyph is
/// one direct tree entry.
const CHILD_CONNECTORS: [&str; 2] = ["\u{251c}\u{2500}\u{2500}", "\u{2514}\u{2500}\u{2500}"];

#[derive(Debug, Deserialize)]
struct DepcheckReport {
    #[serde(default)]
    dependencies: Value,
}

#[derive(Debug, Deserialize)]
struct SecurityReport {
    #[serde(default)]
    metadata: Option<SecurityMetadata>,
}

#[derive(Debug, Deserialize)]
struct SecurityMetadata {
    #[serde(default)]
    vulnerabilities: Value,
}

/// Extracts the unused package names from a raw depcheck report.
///
/// Absent input, unparseable JSON, or a `dependencies` field that is not an
/// array all yield an empty list. A well-formed array is returned verbatim;
/// non-string entries are skipped.
pub fn unused_packages(raw: Option<&str>) -> Vec<String> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    let Ok(report) = serde_json::from_str::<DepcheckReport>(raw) else {
        return Vec::new();
    };
    match report.dependencies {
        Value::Array(entries) => entries
            .into_iter()
            .filter_map(|entry| match entry {
                Value::String(name) => Some(name),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Counts installed dependencies in a raw `npm ls` tree listing.
///
/// Counts the lines marked with a child connector, not unique packages: a
/// package reachable through several branches is counted once per branch.
/// That over-count matches the original dashboard and is kept as-is.
pub fn dependency_count(raw: Option<&str>) -> usize {
    let Some(raw) = raw else {
        return 0;
    };
    raw.lines()
        .filter(|line| CHILD_CONNECTORS.iter().any(|glyph| line.contains(glyph)))
        .count()
}

/// Derives severity counts from a raw `npm audit` report.
///
/// The raw payload is JSON on success but a plain error string when the
/// underlying audit failed; both the non-JSON case and a report without
/// `metadata.vulnerabilities` normalize to an all-zero summary. Severities
/// are read field by field: one that is missing or not a number counts as
/// zero without discarding the others, and unknown ones are ignored.
pub fn vulnerability_summary(raw: Option<&str>) -> VulnerabilitySummary {
    let Some(raw) = raw else {
        return VulnerabilitySummary::default();
    };
    let Ok(report) = serde_json::from_str::<SecurityReport>(raw) else {
        return VulnerabilitySummary::default();
    };
    let Some(vulnerabilities) = report.metadata.map(|metadata| metadata.vulnerabilities) else {
        return VulnerabilitySummary::default();
    };
    let count = |severity: &str| {
        vulnerabilities
            .get(severity)
            .and_then(Value::as_u64)
            .unwrap_or(0)
    };
    VulnerabilitySummary {
        low: count("low"),
        moderate: count("moderate"),
        high: count("high"),
        critical: count("critical"),
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
