use calamine::{Data, Range, Reader, Xls, Xlsx};
use std::io::{Cursor, Read, Seek};

use super::columns::{dedupe_headers, map_row, ParseOptions, RowObject};
use super::error::ImportError;
use super::timestamps::excel_serial_to_iso;
use crate::models::{FileFormat, ParsedTrade, RawFile};

/// Parse a whole file into trades. Any unreadable content or rejected row
/// fails the file as a unit.
pub fn parse_file(file: &RawFile, options: &ParseOptions) -> Result<Vec<ParsedTrade>, ImportError> {
    let rows = read_rows(file)?;
    log::debug!("{}: {} data rows", file.name, rows.len());

    rows.iter()
        .enumerate()
        // +2: 1-based and the header line
        .map(|(idx, row)| map_row(row, idx + 2, options))
        .collect()
}

/// Header-based row objects. Blank lines are skipped.
pub fn read_rows(file: &RawFile) -> Result<Vec<RowObject>, ImportError> {
    match file.format {
        FileFormat::Csv => read_csv_rows(&file.bytes),
        FileFormat::Xlsx => {
            let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(&file.bytes[..]))?;
            let range = first_sheet(&mut workbook)?;
            Ok(sheet_rows(&range))
        }
        FileFormat::Xls => {
            let mut workbook: Xls<_> = Xls::new(Cursor::new(&file.bytes[..]))?;
            let range = first_sheet(&mut workbook)?;
            Ok(sheet_rows(&range))
        }
    }
}

fn read_csv_rows(bytes: &[u8]) -> Result<Vec<RowObject>, ImportError> {
    let bytes = bytes.strip_prefix(b"\xef\xbb\xbf").unwrap_or(bytes);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let headers = dedupe_headers(reader.headers()?.iter());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(|field| field.is_empty()) {
            continue;
        }
        rows.push(RowObject::from_pairs(headers.iter().zip(record.iter())));
    }

    Ok(rows)
}

fn first_sheet<RS, W>(workbook: &mut W) -> Result<Range<Data>, ImportError>
where
    RS: Read + Seek,
    W: Reader<RS>,
    W::Error: std::fmt::Display,
{
    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| ImportError::Spreadsheet("No sheets found in workbook".to_string()))?;

    workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| ImportError::Spreadsheet(format!("Failed to read sheet '{}': {}", sheet_name, e)))
}

/// First row is the header row. Fully empty rows are skipped.
pub fn sheet_rows(range: &Range<Data>) -> Vec<RowObject> {
    let mut rows = range.rows();
    let Some(header_row) = rows.next() else {
        return Vec::new();
    };

    let headers = dedupe_headers(header_row.iter().map(|cell| cell_text(cell).unwrap_or_default()));

    rows.filter_map(|row| {
        let pairs = headers
            .iter()
            .zip(row.iter())
            .filter_map(|(header, cell)| cell_text(cell).map(|value| (header, value)));
        let row = RowObject::from_pairs(pairs);
        (!row.is_empty()).then_some(row)
    })
    .collect()
}

/// Text form of a cell; `None` for blanks and error cells
fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Data::Float(f) => Some(format_float(*f)),
        Data::Int(i) => Some(i.to_string()),
        Data::Bool(b) => Some(b.to_string()),
        Data::DateTime(dt) => excel_serial_to_iso(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Some(s.clone()),
    }
}

/// Whole floats print without a fraction so numeric ids stay `"1001"`
fn format_float(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}
