// Alert report rendering - purely presentational
//
// Maps the aggregator's eligible rows to an HTML report body. Row order is
// whatever the aggregator supplied (ascending facility id); no filtering or
// arithmetic happens here.

use std::fmt::Write;

use chrono::NaiveDate;

use crate::occupancy::CapacityAlertRow;

const CELL_STYLE: &str = "border: 1px solid black; padding: 8px";

const TABLE_HEADERS: [&str; 6] = [
    "Id",
    "Name",
    "Total General Units",
    "General Units Occupied",
    "Total ICU Units",
    "ICU Units Occupied",
];

/// Subject line for one alert cycle, e.g.
/// `Daily Occupancy Alert: Facilities Exceeding 90% Capacity - 2026-08-06`.
pub fn subject(threshold: f64, as_of: NaiveDate) -> String {
    format!(
        "Daily Occupancy Alert: Facilities Exceeding {}% Capacity - {}",
        format_percent(threshold),
        as_of.format("%Y-%m-%d")
    )
}

/// Render the report body: a dated preamble plus one table row per eligible
/// facility, in the order supplied.
pub fn render(rows: &[CapacityAlertRow], threshold: f64, as_of: NaiveDate) -> String {
    let mut body = String::new();

    let _ = write!(
        body,
        "<p>Please find below the list of facilities whose occupancy exceeded {}% as of {}:</p>",
        format_percent(threshold),
        as_of.format("%Y-%m-%d")
    );

    body.push_str("<table style=\"border-collapse: collapse\">");
    body.push_str("<thead><tr>");
    for header in TABLE_HEADERS {
        let _ = write!(body, "<th style=\"{}\">{}</th>", CELL_STYLE, header);
    }
    body.push_str("</tr></thead>");

    body.push_str("<tbody>");
    for row in rows {
        body.push_str("<tr>");
        let _ = write!(body, "<td style=\"{}\">{}</td>", CELL_STYLE, row.facility_id);
        let _ = write!(body, "<td style=\"{}\">{}</td>", CELL_STYLE, row.facility_name);
        let _ = write!(body, "<td style=\"{}\">{}</td>", CELL_STYLE, row.general_units);
        let _ = write!(body, "<td style=\"{}\">{}</td>", CELL_STYLE, row.general_occupied);
        let _ = write!(body, "<td style=\"{}\">{}</td>", CELL_STYLE, row.icu_units);
        let _ = write!(body, "<td style=\"{}\">{}</td>", CELL_STYLE, row.icu_occupied);
        body.push_str("</tr>");
    }
    body.push_str("</tbody></table>");

    body
}

/// Format a ratio threshold as a percentage without trailing zeros
/// (0.9 -> "90", 0.85 -> "85", 0.925 -> "92.5").
fn format_percent(threshold: f64) -> String {
    let percent = threshold * 100.0;
    if (percent - percent.round()).abs() < 1e-9 {
        format!("{}", percent.round() as i64)
    } else {
        format!("{}", percent)
    }
}
