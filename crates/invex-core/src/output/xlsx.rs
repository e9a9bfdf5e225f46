//! Tabular summary workbook.

use rust_xlsxwriter::{ColNum, Format, Workbook, Worksheet};
use serde_json::Value;
use tracing::warn;

use crate::error::OutputError;
use crate::models::invoice::{InvoiceRecord, summary_columns, value_to_text};

/// Largest number of columns an XLSX sheet can hold.
const MAX_COLUMNS: usize = 16_384;

/// Build the summary workbook: one header row with the union of record keys
/// (first-seen order), then one row per record. Missing keys stay empty.
pub fn to_xlsx(records: &[InvoiceRecord]) -> Result<Vec<u8>, OutputError> {
    let mut columns = summary_columns(records);
    if columns.len() > MAX_COLUMNS {
        warn!("Summary has {} columns, keeping the first {}", columns.len(), MAX_COLUMNS);
        columns.truncate(MAX_COLUMNS);
    }

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    let header = Format::new().set_bold();

    for (col, name) in columns.iter().enumerate() {
        worksheet.write_string_with_format(0, col as ColNum, *name, &header)?;
    }

    for (row, record) in (1u32..).zip(records) {
        for (col, name) in columns.iter().enumerate() {
            if let Some(value) = record.get(name) {
                write_cell(worksheet, row, col as ColNum, value)?;
            }
        }
    }

    Ok(workbook.save_to_buffer()?)
}

fn write_cell(
    worksheet: &mut Worksheet,
    row: u32,
    col: ColNum,
    value: &Value,
) -> Result<(), OutputError> {
    match value {
        Value::Null => {}
        Value::Bool(b) => {
            worksheet.write_boolean(row, col, *b)?;
        }
        Value::Number(n) => match n.as_f64() {
            Some(f) => {
                worksheet.write_number(row, col, f)?;
            }
            None => {
                worksheet.write_string(row, col, n.to_string())?;
            }
        },
        Value::String(s) => {
            worksheet.write_string(row, col, s)?;
        }
        Value::Array(_) | Value::Object(_) => {
            worksheet.write_string(row, col, value_to_text(value))?;
        }
    }
    Ok(())
}
