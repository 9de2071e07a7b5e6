//! Vertical card display for metrics records.
//!
//! Renders a single-row RecordBatch as a grouped, human-readable card:
//! identification, lab, then field columns.

use arrow::array::{Array, Float64Array, LargeStringArray, StringArray};
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use pagepulse_core::schema::{DATE, MARCA, SITE, field_columns, lab_columns};

/// Print a single metrics record as a vertical card grouped by column section.
pub fn print_record_card(batch: &RecordBatch) -> anyhow::Result<()> {
    let marca = get_utf8(batch, MARCA).unwrap_or_default();
    let site = get_utf8(batch, SITE).unwrap_or_default();

    if marca.is_empty() {
        println!("=== {site} ===");
    } else {
        println!("=== {marca} ({site}) ===");
    }
    println!();

    print_section(batch, "Identification", &[DATE, MARCA, SITE]);
    print_section(batch, "Lab (Lighthouse)", &lab_columns());
    print_section(batch, "Field (CrUX)", &field_columns());

    Ok(())
}

/// Render one cell of row 0 as text, or `None` for nulls and unknown types.
pub fn format_cell(batch: &RecordBatch, col_name: &str) -> Option<String> {
    let col = batch.column_by_name(col_name)?;
    if col.is_null(0) {
        return None;
    }
    match col.data_type() {
        DataType::Utf8 => col
            .as_any()
            .downcast_ref::<StringArray>()
            .map(|a| a.value(0).to_string()),
        DataType::LargeUtf8 => col
            .as_any()
            .downcast_ref::<LargeStringArray>()
            .map(|a| a.value(0).to_string()),
        DataType::Float64 => col
            .as_any()
            .downcast_ref::<Float64Array>()
            .map(|a| format_number(a.value(0))),
        _ => None,
    }
}

// ── Section rendering ──

fn print_section(batch: &RecordBatch, header: &str, cols: &[&str]) {
    let rows: Vec<(&str, String)> = cols
        .iter()
        .filter_map(|&col| format_cell(batch, col).map(|v| (col, v)))
        .collect();
    if rows.is_empty() {
        return;
    }

    println!("{header}");
    for (col_name, value) in rows {
        println!("  {:<26} {}", col_name, value);
    }
    println!();
}

/// Whole numbers print without a fractional part; others keep up to 3 decimals.
fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        let s = format!("{v:.3}");
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

fn get_utf8(batch: &RecordBatch, col_name: &str) -> Option<String> {
    match batch.column_by_name(col_name)?.data_type() {
        DataType::Utf8 | DataType::LargeUtf8 => format_cell(batch, col_name),
        _ => None,
    }
}
