use crate::error::{Result, SalesAnalysisError};
use crate::schema::Row;
use calamine::{Data, Reader};
use chrono::Timelike;
use log::{debug, info};
use serde_json::{Number, Value};
use std::io::Cursor;

/// Largest integer an `f64` holds exactly; integral floats below it become JSON integers.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Reads the first worksheet of an `.xlsx`/`.xls`/`.xlsb`/`.ods` file into rows keyed
/// by the header row.
///
/// Blank header cells drop their column, cells past the last header are ignored, empty
/// and error cells are left out of the row, and rows with no cells are skipped.
pub fn rows_from_workbook(bytes: &[u8]) -> Result<Vec<Row>> {
    if bytes.is_empty() {
        return Err(SalesAnalysisError::InputError(
            "Uploaded spreadsheet is empty".to_string(),
        ));
    }

    let mut workbook = calamine::open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| SalesAnalysisError::ParseError(e.to_string()))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| {
            SalesAnalysisError::InputError("Spreadsheet contains no worksheet".to_string())
        })?
        .map_err(|e| SalesAnalysisError::ParseError(e.to_string()))?;

    let mut sheet_rows = range.rows();
    let Some(header_row) = sheet_rows.next() else {
        info!("First worksheet is empty");
        return Ok(Vec::new());
    };

    let headers: Vec<Option<String>> = header_row
        .iter()
        .map(|cell| {
            let text = cell.to_string();
            let trimmed = text.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
        .collect();

    debug!("Worksheet headers: {:?}", headers);

    let rows: Vec<Row> = sheet_rows
        .map(|cells| {
            cells
                .iter()
                .zip(headers.iter())
                .filter_map(|(cell, header)| {
                    let header = header.as_ref()?;
                    cell_value(cell).map(|value| (header.clone(), value))
                })
                .collect::<Row>()
        })
        .filter(|row| !row.is_empty())
        .collect();

    info!("Parsed {} data rows from the first worksheet", rows.len());
    Ok(rows)
}

fn cell_value(cell: &Data) -> Option<Value> {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::Int(i) => Some(Value::from(*i)),
        Data::Float(f) => float_value(*f),
        Data::Bool(b) => Some(Value::Bool(*b)),
        Data::String(s) => {
            if s.trim().is_empty() {
                None
            } else {
                Some(Value::String(s.clone()))
            }
        }
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(naive) if naive.time().num_seconds_from_midnight() == 0 => {
                Some(Value::String(naive.date().format("%Y-%m-%d").to_string()))
            }
            Some(naive) => Some(Value::String(
                naive.format("%Y-%m-%dT%H:%M:%S").to_string(),
            )),
            None => float_value(dt.as_f64()),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => Some(Value::String(s.clone())),
    }
}

fn float_value(f: f64) -> Option<Value> {
    if !f.is_finite() {
        return None;
    }
    if f.fract() == 0.0 && f.abs() < MAX_EXACT_INTEGER {
        return Some(Value::from(f as i64));
    }
    Number::from_f64(f).map(Value::Number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_upload_is_input_error() {
        assert!(matches!(
            rows_from_workbook(&[]),
            Err(SalesAnalysisError::InputError(_))
        ));
    }

    #[test]
    fn test_garbage_bytes_are_parse_error() {
        let result = rows_from_workbook(b"definitely not a spreadsheet");
        assert!(matches!(result, Err(SalesAnalysisError::ParseError(_))));
    }

    #[test]
    fn test_cell_conversion() {
        assert_eq!(cell_value(&Data::Int(7)), Some(json!(7)));
        assert_eq!(cell_value(&Data::Float(1200.0)), Some(json!(1200)));
        assert_eq!(cell_value(&Data::Float(12.5)), Some(json!(12.5)));
        assert_eq!(cell_value(&Data::String("  ".into())), None);
        assert_eq!(cell_value(&Data::String("北區".into())), Some(json!("北區")));
        assert_eq!(cell_value(&Data::Bool(true)), Some(json!(true)));
        assert_eq!(cell_value(&Data::Empty), None);
        assert_eq!(
            cell_value(&Data::DateTimeIso("2024-01-05".into())),
            Some(json!("2024-01-05"))
        );
    }

    fn sales_workbook() -> Vec<u8> {
        use rust_xlsxwriter::{ExcelDateTime, Format, Workbook};

        let date_format = Format::new().set_num_format("yyyy-mm-dd");
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();

        // Column C has no header; nothing is headed past column D.
        sheet.write_string(0, 0, "日期").unwrap();
        sheet.write_string(0, 1, "產品").unwrap();
        sheet.write_string(0, 3, "銷售額").unwrap();

        let first = ExcelDateTime::from_ymd(2024, 1, 5).unwrap();
        sheet.write_datetime_with_format(1, 0, &first, &date_format).unwrap();
        sheet.write_string(1, 1, "筆記型電腦").unwrap();
        sheet.write_string(1, 2, "stray").unwrap();
        sheet.write_number(1, 3, 45000.0).unwrap();
        sheet.write_string(1, 5, "overflow").unwrap();

        // Row 2 stays empty.

        let second = ExcelDateTime::from_ymd(2024, 1, 6).unwrap();
        sheet.write_datetime_with_format(3, 0, &second, &date_format).unwrap();
        sheet.write_string(3, 1, "平板電腦").unwrap();
        sheet.write_number(3, 3, 12500.5).unwrap();

        // Only cells under missing headers: the row ends up empty.
        sheet.write_string(4, 2, "orphan").unwrap();

        workbook.save_to_buffer().unwrap()
    }

    #[test]
    fn test_reads_first_worksheet() {
        let rows = rows_from_workbook(&sales_workbook()).unwrap();
        assert_eq!(rows.len(), 2);

        let first = &rows[0];
        assert_eq!(first.len(), 3);
        assert_eq!(first.get("日期"), Some(&json!("2024-01-05")));
        assert_eq!(first.get("產品"), Some(&json!("筆記型電腦")));
        assert_eq!(first.get("銷售額"), Some(&json!(45000)));

        let second = &rows[1];
        assert_eq!(second.get("日期"), Some(&json!("2024-01-06")));
        assert_eq!(second.get("銷售額"), Some(&json!(12500.5)));
    }

    #[test]
    fn test_headerless_cells_are_dropped() {
        let rows = rows_from_workbook(&sales_workbook()).unwrap();
        for row in &rows {
            assert!(row
                .cells()
                .values()
                .all(|value| value != "stray" && value != "overflow"));
        }
        assert!(rows.iter().all(|row| row.get("orphan").is_none()));
    }
}
