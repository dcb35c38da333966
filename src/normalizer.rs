// Status normalization: raw upstream line records -> LineStatus with a
// heuristic delay estimate.

use crate::models::{LineStatus, RawLine};

pub const GOOD_SERVICE: &str = "Good Service";
pub const NOMINAL_SEVERITY: i64 = 10;

/// Severity at or above which a line is running normally.
const NOMINAL_THRESHOLD: i64 = 9;

/// Estimate how many minutes of delay a status represents.
///
/// Rules are checked in order and the first match wins, so "Severe Delays"
/// at severity 6 is 30 minutes, not the 15 the severity band would give.
pub fn estimate_delay_minutes(severity: i64, description: &str) -> u32 {
    if severity >= NOMINAL_THRESHOLD {
        return 0;
    }

    let description = description.to_lowercase();
    if description.contains("severe") {
        30
    } else if description.contains("minor") {
        10
    } else if description.contains("part") {
        15
    } else if severity <= 5 {
        25
    } else if severity <= 8 {
        15
    } else {
        0
    }
}

pub fn normalize_line(line: &RawLine) -> LineStatus {
    let first = line.line_statuses.first();

    // Zero severity and empty descriptions count as missing upstream.
    let status = first
        .map(|s| s.status_severity_description.as_str())
        .filter(|s| !s.is_empty())
        .unwrap_or(GOOD_SERVICE)
        .to_string();
    let severity = first
        .map(|s| s.status_severity)
        .filter(|s| *s != 0)
        .unwrap_or(NOMINAL_SEVERITY);
    let reason = first
        .and_then(|s| s.reason.clone())
        .unwrap_or_default();

    LineStatus {
        id: line.id.clone(),
        name: line.name.clone(),
        delay_minutes: estimate_delay_minutes(severity, &status),
        status_severity_description: status.clone(),
        status,
        reason,
        status_severity: severity,
    }
}

pub fn normalize_lines(lines: &[RawLine]) -> Vec<LineStatus> {
    lines.iter().map(normalize_line).collect()
}
