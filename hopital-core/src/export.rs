//! Table exports: CSV, XLSX and print-ready HTML

use html_escape::encode_safe;
use rust_xlsxwriter::{Color, Format, FormatBorder, Workbook};

use crate::error::{HopitalError, Result};

/// Excel caps worksheet names at 31 characters
const MAX_SHEET_NAME: usize = 31;
const MAX_COLUMN_WIDTH: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Xlsx,
    Html,
}

impl ExportFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "csv" => Some(ExportFormat::Csv),
            "xlsx" | "excel" => Some(ExportFormat::Xlsx),
            "html" | "print" | "pdf" => Some(ExportFormat::Html),
            _ => None,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
            ExportFormat::Html => "text/html; charset=utf-8",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Html => "html",
        }
    }
}

/// Rows ready to be exported
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub title: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(title: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            title: title.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    /// Append a row, padding or truncating it to the column count
    pub fn push_row(&mut self, mut row: Vec<String>) {
        row.resize(self.columns.len(), String::new());
        self.rows.push(row);
    }

    pub fn render(&self, format: ExportFormat, generated_at: &str) -> Result<Vec<u8>> {
        match format {
            ExportFormat::Csv => Ok(to_csv(self).into_bytes()),
            ExportFormat::Xlsx => to_xlsx(self),
            ExportFormat::Html => Ok(to_print_html(self, generated_at).into_bytes()),
        }
    }
}

/// CSV with a UTF-8 BOM so spreadsheet tools pick the right encoding
pub fn to_csv(table: &Table) -> String {
    let mut out = String::from("\u{feff}");
    push_csv_line(&mut out, &table.columns);
    for row in &table.rows {
        push_csv_line(&mut out, row);
    }
    out
}

fn push_csv_line(out: &mut String, cells: &[String]) {
    let line = cells
        .iter()
        .map(|c| escape_csv(c))
        .collect::<Vec<_>>()
        .join(",");
    out.push_str(&line);
    out.push_str("\r\n");
}

fn escape_csv(cell: &str) -> String {
    if cell.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

pub fn to_xlsx(table: &Table) -> Result<Vec<u8>> {
    let xlsx_err = |e: rust_xlsxwriter::XlsxError| HopitalError::Export(e.to_string());

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(sheet_name(&table.title)).map_err(xlsx_err)?;

    let header_format = Format::new()
        .set_bold()
        .set_border(FormatBorder::Thin)
        .set_background_color(Color::RGB(0x1F6F8B))
        .set_font_color(Color::RGB(0xFFFFFF));

    for (col, name) in table.columns.iter().enumerate() {
        worksheet
            .write_with_format(0, col as u16, name.as_str(), &header_format)
            .map_err(xlsx_err)?;
    }

    for (row_idx, row) in table.rows.iter().enumerate() {
        for (col, cell) in row.iter().enumerate() {
            worksheet
                .write((row_idx + 1) as u32, col as u16, cell.as_str())
                .map_err(xlsx_err)?;
        }
    }

    for (col, name) in table.columns.iter().enumerate() {
        let widest = table
            .rows
            .iter()
            .filter_map(|row| row.get(col))
            .map(|cell| cell.chars().count())
            .chain(std::iter::once(name.chars().count()))
            .max()
            .unwrap_or(10)
            .min(MAX_COLUMN_WIDTH);
        worksheet
            .set_column_width(col as u16, (widest + 2) as f64)
            .map_err(xlsx_err)?;
    }

    workbook.save_to_buffer().map_err(xlsx_err)
}

fn sheet_name(title: &str) -> String {
    let name: String = title
        .chars()
        .filter(|c| !matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\'))
        .take(MAX_SHEET_NAME)
        .collect();
    let name = name.trim().to_string();
    if name.is_empty() {
        "Export".to_string()
    } else {
        name
    }
}

/// Standalone HTML document meant to be printed (or saved as PDF) from the browser
pub fn to_print_html(table: &Table, generated_at: &str) -> String {
    let mut html = String::with_capacity(1024 + table.rows.len() * 128);
    html.push_str("<!DOCTYPE html>\n<html lang=\"fr\">\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str(&format!("<title>{}</title>\n", encode_safe(&table.title)));
    html.push_str(PRINT_STYLE);
    html.push_str("</head>\n<body>\n");
    html.push_str(&format!("<h1>{}</h1>\n", encode_safe(&table.title)));
    html.push_str(&format!(
        "<p class=\"meta\">Généré le {} · {} ligne(s)</p>\n",
        encode_safe(generated_at),
        table.rows.len()
    ));
    html.push_str("<table>\n<thead><tr>");
    for column in &table.columns {
        html.push_str(&format!("<th>{}</th>", encode_safe(column)));
    }
    html.push_str("</tr></thead>\n<tbody>\n");
    for row in &table.rows {
        html.push_str("<tr>");
        for cell in row {
            html.push_str(&format!("<td>{}</td>", encode_safe(cell)));
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</tbody>\n</table>\n</body>\n</html>\n");
    html
}

const PRINT_STYLE: &str = r#"<style>
  body { font-family: "Segoe UI", Roboto, Arial, sans-serif; color: #222; margin: 24px; }
  h1 { font-size: 20px; margin-bottom: 4px; }
  .meta { color: #777; font-size: 12px; margin-top: 0; }
  table { width: 100%; border-collapse: collapse; font-size: 12px; }
  th { background: #1f6f8b; color: #fff; text-align: left; padding: 6px 8px; }
  td { padding: 5px 8px; border-bottom: 1px solid #ddd; vertical-align: top; }
  tr:nth-child(even) td { background: #f6f8f9; }
  @media print {
    body { margin: 0; }
    th { -webkit-print-color-adjust: exact; print-color-adjust: exact; }
    tr { page-break-inside: avoid; }
  }
</style>
"#;
