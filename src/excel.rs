//! Local spreadsheet access: preview a file before upload, and write a mapped preview to xlsx.

use crate::error::{Error, Result};
use crate::mapping::{display_value, parse_amount, MappedRow};
use calamine::{open_workbook_auto, Data, Reader};
use rust_xlsxwriter::{Color, Format, FormatAlign, Workbook, Worksheet, XlsxError};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::debug;

/// Column index to Excel letter (0→A, 1→B, 25→Z, 26→AA).
fn col_index_to_letter(index: u32) -> String {
    let mut n = index;
    let mut s = String::new();
    loop {
        let r = (n % 26) as u8;
        s.insert(0, (b'A' + r) as char);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    s
}

/// First rows of a local spreadsheet, keyed by header.
#[derive(Debug, Clone, Serialize)]
pub struct SheetPreview {
    pub file_name: String,
    pub sheet: Option<String>,
    pub headers: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
    /// Data rows in the sheet, not just the previewed ones.
    pub total_rows: usize,
}

/// Blank or repeated headers get a positional name so every column stays addressable.
fn unique_headers(raw: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(raw.len());
    for (i, header) in raw.into_iter().enumerate() {
        let header = header.trim().to_string();
        let name = if header.is_empty() || out.contains(&header) {
            format!("Column {}", col_index_to_letter(i as u32))
        } else {
            header
        };
        out.push(name);
    }
    out
}

fn cell_to_value(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Null,
        Data::String(s) if s.trim().is_empty() => Value::Null,
        Data::String(s) => Value::String(s.trim().to_string()),
        Data::Int(i) => Value::from(*i),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => Value::from(*f as i64),
        Data::Float(f) => Value::from(*f),
        Data::Bool(b) => Value::Bool(*b),
        other => Value::String(other.to_string()),
    }
}

fn text_to_value(s: &str) -> Value {
    let s = s.trim();
    if s.is_empty() {
        Value::Null
    } else {
        Value::String(s.to_string())
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Headers and first `max_rows` data rows. CSV (`,` or `;`) and anything calamine opens.
pub fn read_preview(path: &Path, max_rows: usize) -> Result<SheetPreview> {
    if !path.exists() {
        return Err(Error::NotFound(path.display().to_string()));
    }
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let preview = match ext.as_str() {
        "csv" | "txt" => read_csv_preview(path, max_rows)?,
        _ => read_workbook_preview(path, max_rows)?,
    };
    debug!(
        file = %preview.file_name,
        columns = preview.headers.len(),
        rows = preview.total_rows,
        "read local preview"
    );
    Ok(preview)
}

fn read_workbook_preview(path: &Path, max_rows: usize) -> Result<SheetPreview> {
    let mut workbook = open_workbook_auto(path)?;
    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| Error::NotFound(format!("worksheet in {}", path.display())))?;
    let range = workbook.worksheet_range(&sheet)?;

    let mut rows = range
        .rows()
        .skip_while(|row| row.iter().all(|c| matches!(cell_to_value(c), Value::Null)));
    let headers = match rows.next() {
        Some(row) => unique_headers(row.iter().map(|c| c.to_string()).collect()),
        None => Vec::new(),
    };

    let mut preview_rows = Vec::new();
    let mut total_rows = 0;
    for row in rows {
        if row.iter().all(|c| matches!(cell_to_value(c), Value::Null)) {
            continue;
        }
        total_rows += 1;
        if preview_rows.len() < max_rows {
            let record = headers
                .iter()
                .enumerate()
                .map(|(i, h)| (h.clone(), row.get(i).map(cell_to_value).unwrap_or(Value::Null)))
                .collect();
            preview_rows.push(record);
        }
    }

    Ok(SheetPreview {
        file_name: file_name_of(path),
        sheet: Some(sheet),
        headers,
        rows: preview_rows,
        total_rows,
    })
}

/// Billing extracts come out of French-locale tools as often as not, so `;` is common.
fn sniff_delimiter(path: &Path) -> Result<u8> {
    let mut first = String::new();
    BufReader::new(File::open(path)?).read_line(&mut first)?;
    let semicolons = first.matches(';').count();
    let commas = first.matches(',').count();
    Ok(if semicolons > commas { b';' } else { b',' })
}

fn read_csv_preview(path: &Path, max_rows: usize) -> Result<SheetPreview> {
    let delimiter = sniff_delimiter(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;
    let headers = unique_headers(reader.headers()?.iter().map(String::from).collect());

    let mut preview_rows = Vec::new();
    let mut total_rows = 0;
    for record in reader.records() {
        let record = record?;
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        total_rows += 1;
        if preview_rows.len() < max_rows {
            let row = headers
                .iter()
                .enumerate()
                .map(|(i, h)| (h.clone(), record.get(i).map(text_to_value).unwrap_or(Value::Null)))
                .collect();
            preview_rows.push(row);
        }
    }

    Ok(SheetPreview {
        file_name: file_name_of(path),
        sheet: None,
        headers,
        rows: preview_rows,
        total_rows,
    })
}

/// Drop characters that Excel refuses in cell text (control chars other than tab/newline/CR).
fn sanitize_cell(s: &str) -> String {
    s.chars()
        .filter(|&c| {
            let u = c as u32;
            c == '\t' || c == '\n' || c == '\r' || !(u < 0x20 || u == 0x7F || u == 0xFFFE || u == 0xFFFF)
        })
        .collect()
}

fn is_amount_column(key: &str) -> bool {
    let key = key.to_lowercase();
    key.contains("amount")
        || key.contains("receivable")
        || key.ends_with("_ht")
        || matches!(key.as_str(), "discount" | "stamp_duty" | "ht" | "ttc" | "tva")
}

/// Estimate column width from text length (char count × 1.2, clamped 10–50).
fn estimate_text_width(text: &str) -> f64 {
    let w = text.chars().count() as f64 * 1.2;
    w.clamp(10.0, 50.0)
}

fn write_row_cells(
    worksheet: &mut Worksheet,
    row_idx: u32,
    columns: &[String],
    row: &MappedRow,
    text_format: &Format,
    amount_format: &Format,
    widths: &mut [f64],
) -> std::result::Result<(), XlsxError> {
    for (col, key) in columns.iter().enumerate() {
        let value = row.get(key).cloned().unwrap_or(Value::Null);
        let amount = if is_amount_column(key) {
            parse_amount(&value)
        } else {
            None
        };
        match amount {
            Some(n) => {
                worksheet.write_number_with_format(row_idx, col as u16, n, amount_format)?;
            }
            None => {
                let text = match &value {
                    Value::Null => String::new(),
                    other => sanitize_cell(&display_value(other)),
                };
                widths[col] = widths[col].max(estimate_text_width(&text));
                worksheet.write_string_with_format(row_idx, col as u16, &text, text_format)?;
            }
        }
    }
    Ok(())
}

/// Write mapped rows to a new workbook: bold header, `#,##0.00` amounts, frozen header row.
pub fn write_preview_workbook(
    path: &Path,
    sheet_name: &str,
    columns: &[String],
    rows: &[MappedRow],
) -> Result<()> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    // Sheet names are capped at 31 chars and may not contain []:*?/\
    let sheet_name: String = sheet_name
        .chars()
        .filter(|c| !"[]:*?/\\".contains(*c))
        .take(31)
        .collect();
    if !sheet_name.trim().is_empty() {
        worksheet.set_name(&sheet_name)?;
    }

    let header_format = Format::new()
        .set_bold()
        .set_background_color(Color::RGB(0x2563EB))
        .set_font_color(Color::RGB(0xFFFFFF));
    let text_format = Format::new();
    let amount_format = Format::new()
        .set_num_format("#,##0.00")
        .set_align(FormatAlign::Right);

    let mut widths: Vec<f64> = columns.iter().map(|c| estimate_text_width(c)).collect();
    for (col, header) in columns.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, &sanitize_cell(header), &header_format)?;
    }
    for (i, row) in rows.iter().enumerate() {
        write_row_cells(
            worksheet,
            (i + 1) as u32,
            columns,
            row,
            &text_format,
            &amount_format,
            &mut widths,
        )?;
    }
    for (col, key) in columns.iter().enumerate() {
        let width = if is_amount_column(key) { widths[col].max(14.0) } else { widths[col] };
        worksheet.set_column_width(col as u16, width)?;
    }
    worksheet.set_freeze_panes(1, 0)?;
    workbook.save(path)?;
    debug!(path = %path.display(), rows = rows.len(), "wrote preview workbook");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::FieldMapper;
    use crate::models::FileType;
    use std::io::Write;

    #[test]
    fn test_col_letters() {
        assert_eq!(col_index_to_letter(0), "A");
        assert_eq!(col_index_to_letter(25), "Z");
        assert_eq!(col_index_to_letter(26), "AA");
    }

    #[test]
    fn test_csv_preview_sniffs_semicolon() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ca_periodique.csv");
        let mut f = File::create(&path).unwrap();
        writeln!(f, "DO;PRODUIT;HT;TTC").unwrap();
        writeln!(f, "Alger;Fibre;1 000,50;1 190,60").unwrap();
        writeln!(f, ";;;").unwrap();
        writeln!(f, "Oran;ADSL;200;238").unwrap();
        drop(f);

        let preview = read_preview(&path, 1).unwrap();
        assert_eq!(preview.headers, vec!["DO", "PRODUIT", "HT", "TTC"]);
        assert_eq!(preview.total_rows, 2);
        assert_eq!(preview.rows.len(), 1);
        assert_eq!(preview.rows[0]["HT"], Value::String("1 000,50".into()));
        assert_eq!(preview.file_name, "ca_periodique.csv");
    }

    #[test]
    fn test_blank_and_repeated_headers_are_named() {
        let headers = unique_headers(vec!["A".into(), "".into(), "A".into()]);
        assert_eq!(headers, vec!["A", "Column B", "Column C"]);
    }

    #[test]
    fn test_missing_file() {
        let err = read_preview(Path::new("/nonexistent/file.xlsx"), 5).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_written_workbook_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preview.xlsx");
        let raw: Map<String, Value> = serde_json::from_value(serde_json::json!({
            "DO": "Alger", "PRODUIT": "Fibre", "HT": "1 000,50", "NOTE": null
        }))
        .unwrap();
        let mapper = FieldMapper::new(FileType::CaPeriodique);
        let rows = mapper.map_rows(&[raw]);
        let columns = mapper.table_columns(&rows);
        write_preview_workbook(&path, "CA Periodique", &columns, &rows).unwrap();

        let preview = read_preview(&path, 10).unwrap();
        assert_eq!(preview.sheet.as_deref(), Some("CA Periodique"));
        assert_eq!(preview.headers, columns);
        assert_eq!(preview.rows[0]["dot"], Value::String("Alger".into()));
        assert_eq!(preview.rows[0]["amount_pre_tax"], Value::from(1000.5));
    }
}
