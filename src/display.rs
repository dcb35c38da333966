// Text formatting for delay summaries and the rolling history.

use chrono::NaiveDate;

use crate::history::{max_total_delay, record_for, sort_by_date};
use crate::models::{DailyDelayRecord, DelayStats};
use crate::poller::DashboardSnapshot;

/// "25 minutes", or "1h 5m" from an hour upwards.
pub fn format_minutes_long(minutes: u32) -> String {
    if minutes < 60 {
        format!("{} minutes", minutes)
    } else {
        format!("{}h {}m", minutes / 60, minutes % 60)
    }
}

/// "25m", or "1h 5m" from an hour upwards.
pub fn format_minutes_short(minutes: u32) -> String {
    if minutes < 60 {
        format!("{}m", minutes)
    } else {
        format!("{}h {}m", minutes / 60, minutes % 60)
    }
}

/// "Sat, 9 Mar" for a `YYYY-MM-DD` date; unparseable dates pass through.
pub fn format_day(date: &str) -> String {
    match NaiveDate::parse_from_str(date, "%Y-%m-%d") {
        Ok(day) => day.format("%a, %-d %b").to_string(),
        Err(_) => date.to_string(),
    }
}

/// One row of the history chart.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryBar {
    pub date: String,
    pub label: String,
    /// Share of the worst day, clamped to 0..=100.
    pub percentage: f64,
    /// Bar opacity, 0.7 for an empty day up to 1.0 for the worst day.
    pub opacity: f64,
}

pub fn history_bars(records: &[DailyDelayRecord]) -> Vec<HistoryBar> {
    let max = f64::from(max_total_delay(records));

    sort_by_date(records)
        .into_iter()
        .map(|record| {
            let percentage =
                (f64::from(record.total_delay_minutes) / max * 100.0).clamp(0.0, 100.0);
            HistoryBar {
                label: format_day(&record.date),
                date: record.date,
                percentage,
                opacity: (0.7 + percentage / 100.0 * 0.3).clamp(0.0, 1.0),
            }
        })
        .collect()
}

/// "Saturday, 9 March 2024" for a `YYYY-MM-DD` date.
pub fn format_day_long(date: &str) -> String {
    match NaiveDate::parse_from_str(date, "%Y-%m-%d") {
        Ok(day) => day.format("%A, %-d %B %Y").to_string(),
        Err(_) => date.to_string(),
    }
}

/// Detail block for one day of history, or `None` when nothing was
/// recorded on `date`.
pub fn day_detail(records: &[DailyDelayRecord], date: &str) -> Option<String> {
    let record = record_for(records, date)?;

    let mut out = format!(
        "{}\n  Total delays: {}\n  Affected lines: {} lines\n",
        format_day_long(&record.date),
        format_minutes_long(record.total_delay_minutes),
        record.affected_lines
    );
    if let Some(worst) = &record.worst_line {
        out.push_str(&format!(
            "  Most delayed line: {} ({} delay)\n",
            worst.name,
            format_minutes_long(worst.delay_minutes)
        ));
    }
    Some(out)
}

pub fn summary_line(stats: &DelayStats) -> String {
    let mut line = format!(
        "Total delay: {} across {} lines",
        format_minutes_long(stats.total_delay_minutes),
        stats.affected_lines
    );
    if let Some(worst) = &stats.worst_line {
        line.push_str(&format!(
            ", most affected: {} ({})",
            worst.name,
            format_minutes_short(worst.delay_minutes)
        ));
    }
    line
}

/// Plain-text rendering of a whole snapshot, used by the binary.
pub fn render_snapshot(snapshot: &DashboardSnapshot) -> String {
    if snapshot.loading {
        return "Loading line status...".to_string();
    }
    if let Some(error) = &snapshot.error {
        return format!("Error: {}", error);
    }

    let mut out = String::new();
    if let Some(stats) = &snapshot.delay_stats {
        out.push_str(&summary_line(stats));
        out.push('\n');
    }

    if !snapshot.history.is_empty() {
        out.push_str("Delay history:\n");
        for bar in history_bars(&snapshot.history) {
            let record = record_for(&snapshot.history, &bar.date);
            let total = record.map(|r| r.total_delay_minutes).unwrap_or(0);
            let affected = record.map(|r| r.affected_lines).unwrap_or(0);
            let width = (bar.percentage / 5.0).round() as usize;
            out.push_str(&format!(
                "  {:<12} {:<20} {:>8}  {} lines affected\n",
                bar.label,
                "#".repeat(width),
                format_minutes_short(total),
                affected
            ));
        }
    }

    for line in &snapshot.lines {
        out.push_str(&format!("  [{}] {}: {}", line.service_level(), line.name, line.status));
        if !line.reason.is_empty() {
            out.push_str(&format!(" ({})", line.reason.trim()));
        }
        out.push('\n');
    }

    out
}
