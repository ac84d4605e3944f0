//! Pretty-printing helpers for the CLI's table and summary output.

use chrono::{DateTime, Utc};

use apptime_core::{SessionHistoryRow, TrackedProgram};

/// Renders whole seconds as `HhMMmSSs`, dropping leading zero components,
/// the way a time-tracking CLI's "today" summary reads at a glance.
pub fn duration(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{hours}h{minutes:02}m{secs:02}s")
    } else if minutes > 0 {
        format!("{minutes}m{secs:02}s")
    } else {
        format!("{secs}s")
    }
}

pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// A simple left-aligned column table: no box-drawing, just padded
/// whitespace, the way a CLI without a table-rendering dependency does it.
pub fn table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(width) = widths.get_mut(i) {
                *width = (*width).max(cell.len());
            }
        }
    }

    let mut out = String::new();
    out.push_str(&format_row(headers.iter().map(|h| h.to_string()).collect::<Vec<_>>().as_slice(), &widths));
    out.push('\n');
    for row in rows {
        out.push_str(&format_row(row, &widths));
        out.push('\n');
    }
    out
}

fn format_row(cells: &[String], widths: &[usize]) -> String {
    cells
        .iter()
        .enumerate()
        .map(|(i, cell)| format!("{:<width$}", cell, width = widths.get(i).copied().unwrap_or(0)))
        .collect::<Vec<_>>()
        .join("  ")
        .trim_end()
        .to_string()
}

pub fn program_row(program: &TrackedProgram) -> Vec<String> {
    vec![
        program.name.clone(),
        program.category.clone().unwrap_or_default(),
        program.project.clone().unwrap_or_default(),
        duration(program.lifetime_seconds),
    ]
}

pub fn history_row(row: &SessionHistoryRow) -> Vec<String> {
    vec![
        row.name.clone(),
        timestamp(row.start),
        timestamp(row.end),
        duration(row.duration_seconds),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_drops_leading_zero_components() {
        assert_eq!(duration(5), "5s");
        assert_eq!(duration(65), "1m05s");
        assert_eq!(duration(3661), "1h01m01s");
    }

    #[test]
    fn duration_clamps_negative_to_zero() {
        assert_eq!(duration(-5), "0s");
    }

    #[test]
    fn table_pads_columns_to_widest_cell() {
        let rendered = table(&["name", "lifetime"], &[vec!["code".to_string(), "1h00m00s".to_string()]]);
        let mut lines = rendered.lines();
        assert_eq!(lines.next().unwrap(), "name  lifetime");
        assert_eq!(lines.next().unwrap(), "code  1h00m00s");
    }
}
