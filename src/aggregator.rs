// Delay aggregation: reduce normalized lines to a single DelayStats.

use crate::models::{DelayStats, LineStatus, WorstLine};

/// Summarize the delay impact across all lines.
///
/// Only lines with a positive delay count as affected. On a tie for the
/// largest delay the line seen first keeps the `worst_line` slot.
pub fn calculate_delay_stats(lines: &[LineStatus]) -> DelayStats {
    let mut total_delay_minutes = 0u32;
    let mut affected_lines = 0usize;
    let mut worst: Option<&LineStatus> = None;

    for line in lines.iter().filter(|l| l.is_affected()) {
        total_delay_minutes = total_delay_minutes.saturating_add(line.delay_minutes);
        affected_lines += 1;

        worst = match worst {
            Some(current) if line.delay_minutes > current.delay_minutes => Some(line),
            Some(current) => Some(current),
            None => Some(line),
        };
    }

    DelayStats {
        total_delay_minutes,
        affected_lines,
        worst_line: worst.map(|line| WorstLine {
            name: line.name.clone(),
            delay_minutes: line.delay_minutes,
        }),
    }
}
