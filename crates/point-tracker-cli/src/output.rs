//! Text formatting for tables and reports.

use chrono::{DateTime, Local, SubsecRound, Utc};

use point_tracker::{Projection, StreamerSummary, TrendOverlay};

use crate::session::EstimateReport;

/// Format a number with `precision` decimals, switching to scientific
/// notation outside `[1e-2, 1e6)`.
pub fn format_number(num: f64, precision: usize) -> String {
    let abs = num.abs();
    if abs >= 1e6 || abs < 1e-2 {
        format!("{num:.precision$e}")
    } else {
        let fixed = format!("{num:.precision$}");
        if fixed.contains('.') {
            fixed.trim_end_matches('0').trim_end_matches('.').to_string()
        } else {
            fixed
        }
    }
}

/// Format a point count with space-separated thousands: `1 234 567`.
pub fn format_points(value: f64) -> String {
    let negative = value < 0.0;
    let rounded = format!("{:.2}", value.abs());
    let (int_part, frac_part) = rounded.split_once('.').unwrap_or((rounded.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(ch);
    }

    let frac = frac_part.trim_end_matches('0');
    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push_str(&grouped);
    if !frac.is_empty() {
        out.push('.');
        out.push_str(frac);
    }
    out
}

/// Format an optional percentage with two decimals.
pub fn format_percent(percent: Option<f64>) -> String {
    match percent {
        Some(p) => format!("{p:.2}%"),
        None => "N/A".to_string(),
    }
}

/// Format an instant in local time, to the nearest second.
pub fn format_instant(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local)
        .round_subsecs(0)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

/// Format an estimate in local time, or `N/A` without one.
pub fn format_projection(projection: &Projection) -> String {
    projection
        .date()
        .map(format_instant)
        .unwrap_or_else(|| "N/A".to_string())
}

fn format_optional_points(value: Option<f64>) -> String {
    value.map(format_points).unwrap_or_else(|| "-".to_string())
}

/// Render the summary table, one line per streamer, with a header.
pub fn render_table(rows: &[StreamerSummary]) -> Vec<String> {
    let cells: Vec<[String; 6]> = rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            [
                (i + 1).to_string(),
                row.name.clone(),
                format_optional_points(row.current_value),
                format_optional_points(row.target),
                format_percent(row.percent_complete),
                format_projection(&row.estimate),
            ]
        })
        .collect();

    let header = ["#", "Streamer", "Points", "Target", "%", "Est. Date"];
    let mut widths: [usize; 6] = header.map(|h| h.chars().count());
    for row in &cells {
        for (w, cell) in widths.iter_mut().zip(row.iter()) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let render = |cols: [&str; 6]| -> String {
        format!(
            "{:>w0$}  {:<w1$}  {:>w2$}  {:>w3$}  {:>w4$}  {}",
            cols[0],
            cols[1],
            cols[2],
            cols[3],
            cols[4],
            cols[5],
            w0 = widths[0],
            w1 = widths[1],
            w2 = widths[2],
            w3 = widths[3],
            w4 = widths[4],
        )
        .trim_end()
        .to_string()
    };

    let mut lines = Vec::with_capacity(cells.len() + 1);
    lines.push(render(header));
    for row in &cells {
        lines.push(render([
            row[0].as_str(),
            row[1].as_str(),
            row[2].as_str(),
            row[3].as_str(),
            row[4].as_str(),
            row[5].as_str(),
        ]));
    }
    lines
}

/// Render an estimate report as labelled lines.
pub fn render_estimate(report: &EstimateReport) -> Vec<String> {
    let mut lines = vec![
        format!("Streamer:      {}", report.name),
        format!(
            "Observations:  {} ({} in window {})",
            report.observations, report.window_size, report.policy
        ),
        format!("Target:        {}", format_optional_points(report.target)),
    ];

    match report.model {
        Some(model) => {
            lines.push(format!(
                "Slope:         {} points/day",
                format_number(model.slope_per_day(), 2)
            ));
            lines.push(format!("Intercept:     {}", format_number(model.intercept, 2)));
            if let Some(r2) = report.r_squared {
                lines.push(format!("R²:            {r2:.4}"));
            }
        }
        None => lines.push("Model:         none (not enough data)".to_string()),
    }

    let estimate = match report.projection {
        Projection::Unknown { reason } => format!("N/A ({reason})"),
        Projection::Reached { .. } => format_projection(&report.projection),
    };
    lines.push(format!("Est. Date:     {estimate}"));

    if let Some((at, value)) = report.prediction {
        let value = value
            .map(|v| format_points(v.round()))
            .unwrap_or_else(|| "N/A".to_string());
        lines.push(format!("Predicted at {}: {value}", format_instant(at)));
    }
    lines
}

/// Render a chart overlay as `timestamp observed fitted` lines.
pub fn render_overlay(overlay: &TrendOverlay) -> Vec<String> {
    let mut lines = vec![format!("{:<20}  {:>14}  {:>14}", "Time", "Observed", "Fitted")];
    for p in &overlay.points {
        let fitted = p
            .fitted
            .map(|f| format_points(f.round()))
            .unwrap_or_else(|| "N/A".to_string());
        lines.push(format!(
            "{:<20}  {:>14}  {:>14}",
            format_instant(p.at),
            format_points(p.observed),
            fitted
        ));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use point_tracker::UnknownReason;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(1234.5, 2), "1234.5");
        assert_eq!(format_number(10.0, 2), "10");
        assert_eq!(format_number(2_500_000.0, 2), "2.50e6");
        assert_eq!(format_number(0.001, 2), "1.00e-3");
    }

    #[test]
    fn test_format_points() {
        assert_eq!(format_points(0.0), "0");
        assert_eq!(format_points(999.0), "999");
        assert_eq!(format_points(1_000.0), "1 000");
        assert_eq!(format_points(1_234_567.0), "1 234 567");
        assert_eq!(format_points(-12_345.5), "-12 345.5");
    }

    #[test]
    fn test_format_percent() {
        assert_eq!(format_percent(Some(33.333)), "33.33%");
        assert_eq!(format_percent(None), "N/A");
    }

    #[test]
    fn test_projection_shown_in_local_time() {
        let at = DateTime::from_timestamp(1_704_067_200, 600_000_000).unwrap();
        let expected = (at + chrono::Duration::milliseconds(400))
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();
        assert_eq!(format_projection(&Projection::Reached { at }), expected);
        assert_eq!(
            format_projection(&Projection::unknown(UnknownReason::NoTarget)),
            "N/A"
        );
    }

    #[test]
    fn test_render_table() {
        let rows = vec![
            StreamerSummary {
                name: "Alice".to_string(),
                current_value: Some(150_000.0),
                target: Some(300_000.0),
                percent_complete: Some(50.0),
                estimate: Projection::unknown(UnknownReason::FlatTrend),
            },
            StreamerSummary {
                name: "Bob".to_string(),
                current_value: Some(50.0),
                target: None,
                percent_complete: None,
                estimate: Projection::unknown(UnknownReason::NoTarget),
            },
        ];
        let lines = render_table(&rows);
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("#"));
        assert!(lines[1].contains("150 000"));
        assert!(lines[1].contains("50.00%"));
        assert!(lines[1].ends_with("N/A"));
        assert!(lines[2].contains(" - "));
    }
}
