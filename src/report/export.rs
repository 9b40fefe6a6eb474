use std::fmt::Write as _;
use std::io;

use super::{Language, format_number};
use crate::core::{ResultTable, RowLabel, TableRow};
use crate::error::ExportError;

pub const CSV_FILE_NAME: &str = "csi_profitability.csv";

fn row_label(label: RowLabel, language: Language) -> String {
    match label {
        RowLabel::Total => language.labels().total.to_string(),
        RowLabel::Year(year) => year.to_string(),
    }
}

fn headers(language: Language) -> [&'static str; 4] {
    let labels = language.labels();
    [
        labels.year,
        labels.service_customers,
        labels.repeat_purchases,
        labels.total_profit,
    ]
}

fn row_values(row: &TableRow) -> [i64; 3] {
    [row.service_customers, row.repeat_purchases, row.total_profit]
}

/// Writes the table with localized headers, the totals row first and plain
/// integers in every numeric cell.
pub fn write_csv<W: io::Write>(
    table: &ResultTable,
    language: Language,
    writer: W,
) -> Result<(), ExportError> {
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(headers(language))?;
    for row in table.rows() {
        let mut record = vec![row_label(row.label, language)];
        record.extend(row_values(&row).iter().map(i64::to_string));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn csv_string(table: &ResultTable, language: Language) -> Result<String, ExportError> {
    let mut buf = Vec::new();
    write_csv(table, language, &mut buf)?;
    Ok(String::from_utf8(buf)?)
}

pub fn render_text_table(table: &ResultTable, language: Language) -> String {
    let header = headers(language);
    let cells = table
        .rows()
        .map(|row| {
            let mut line = vec![row_label(row.label, language)];
            line.extend(
                row_values(&row)
                    .iter()
                    .map(|value| format_number(*value, language)),
            );
            line
        })
        .collect::<Vec<_>>();

    let mut widths = header.map(|h| h.chars().count());
    for line in &cells {
        for (width, cell) in widths.iter_mut().zip(line) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    for (idx, (title, width)) in header.iter().zip(widths).enumerate() {
        if idx == 0 {
            let _ = write!(out, "{title:<width$}");
        } else {
            let _ = write!(out, "  {title:>width$}");
        }
    }
    out.push('\n');
    let rule = widths.iter().sum::<usize>() + 2 * (widths.len() - 1);
    out.push_str(&"-".repeat(rule));
    out.push('\n');

    for line in &cells {
        for (idx, (cell, width)) in line.iter().zip(widths).enumerate() {
            if idx == 0 {
                let _ = write!(out, "{cell:<width$}");
            } else {
                let _ = write!(out, "  {cell:>width$}");
            }
        }
        out.push('\n');
    }
    out
}

pub fn render_html_table(table: &ResultTable, language: Language) -> String {
    let mut html = String::from("<table class='custom'><thead><tr>");
    for title in headers(language) {
        let _ = write!(html, "<th>{title}</th>");
    }
    html.push_str("</tr></thead><tbody>");

    for row in table.rows() {
        if row.label == RowLabel::Total {
            html.push_str("<tr class='total-row'>");
        } else {
            html.push_str("<tr>");
        }
        let _ = write!(
            html,
            "<td class='left'>{}</td>",
            row_label(row.label, language)
        );
        for value in row_values(&row) {
            let _ = write!(html, "<td>{}</td>", format_number(value, language));
        }
        html.push_str("</tr>");
    }
    html.push_str("</tbody></table>");
    html
}
