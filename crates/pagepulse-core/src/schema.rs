//! Fixed, ordered column definitions for stored tables.
//!
//! Column order is declared here once and never derived from map key
//! iteration, so every writer and reader agrees on the header.

use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;

use crate::record::{FlatMetricsRecord, Scalar};

// ── Identification ──

pub const DATE: &str = "Date";
pub const MARCA: &str = "Marca";
pub const SITE: &str = "Site";

// ── Lab ──

pub const DEVICE: &str = "Device";
pub const SCORE: &str = "Score";

/// Required Lighthouse audit ids and the column each one's `numericValue` lands in.
pub const LAB_AUDIT_COLUMNS: [(&str, &str); 11] = [
    ("first-contentful-paint", "Lab_FCP"),
    ("first-meaningful-paint", "Lab_FMP"),
    ("first-cpu-idle", "Lab_FCPUIdle"),
    ("speed-index", "Lab_SpeedIndex"),
    ("interactive", "Lab_TTI"),
    ("estimated-input-latency", "Lab_InputLatency"),
    ("server-response-time", "Lab_TTFB"),
    ("render-blocking-resources", "Lab_RenderBlocking"),
    ("total-blocking-time", "Lab_TBT"),
    ("cumulative-layout-shift", "Lab_CLS"),
    ("largest-contentful-paint", "Lab_LCP"),
];

// ── Field ──

/// One CrUX metric and its pair of output columns.
#[derive(Debug, Clone, Copy)]
pub struct FieldMetricColumns {
    pub metric: &'static str,
    pub category: &'static str,
    pub percentile: &'static str,
}

pub const FIELD_METRIC_COLUMNS: [FieldMetricColumns; 4] = [
    FieldMetricColumns {
        metric: "CUMULATIVE_LAYOUT_SHIFT_SCORE",
        category: "Loading_CLS_Category",
        percentile: "Loading_CLS",
    },
    FieldMetricColumns {
        metric: "FIRST_CONTENTFUL_PAINT_MS",
        category: "Loading_FCP_Category",
        percentile: "Loading_FCP",
    },
    FieldMetricColumns {
        metric: "FIRST_INPUT_DELAY_MS",
        category: "Loading_FID_Category",
        percentile: "Loading_FID",
    },
    FieldMetricColumns {
        metric: "LARGEST_CONTENTFUL_PAINT_MS",
        category: "Loading_LCP_Category",
        percentile: "Loading_LCP",
    },
];

pub const OVERALL_CATEGORY: &str = "Loading_Overall_Category";

// ── Worklist ──

pub const WORKLIST_TIPO: &str = "Tipo";
pub const WORKLIST_URL: &str = "URL";
pub const WORKLIST_MARCA: &str = "Marca";
pub const WORKLIST_STRATEGY: &str = "Strategy";

/// Columns emitted by the lab normaliser, in order.
pub fn lab_columns() -> Vec<&'static str> {
    let mut cols = vec![DEVICE, SCORE];
    cols.extend(LAB_AUDIT_COLUMNS.iter().map(|(_, col)| *col));
    cols
}

/// Columns emitted by the field normaliser, in order.
pub fn field_columns() -> Vec<&'static str> {
    let mut cols: Vec<&'static str> = FIELD_METRIC_COLUMNS
        .iter()
        .flat_map(|m| [m.category, m.percentile])
        .collect();
    cols.push(OVERALL_CATEGORY);
    cols
}

/// Schema of the metrics table: identification, lab, then field columns.
///
/// `Date` is nullable because a field-only observation has no lab fetch time.
pub fn metrics_record_schema() -> Schema {
    let mut fields = vec![
        Field::new(DATE, DataType::Utf8, true),
        Field::new(MARCA, DataType::Utf8, false),
        Field::new(SITE, DataType::Utf8, false),
        Field::new(DEVICE, DataType::Utf8, true),
        Field::new(SCORE, DataType::Float64, true),
    ];
    fields.extend(
        LAB_AUDIT_COLUMNS
            .iter()
            .map(|(_, col)| Field::new(*col, DataType::Float64, true)),
    );
    for m in &FIELD_METRIC_COLUMNS {
        fields.push(Field::new(m.category, DataType::Utf8, true));
        fields.push(Field::new(m.percentile, DataType::Float64, true));
    }
    fields.push(Field::new(OVERALL_CATEGORY, DataType::Utf8, true));
    Schema::new(fields)
}

/// Schema of the worklist table.
pub fn worklist_schema() -> Schema {
    Schema::new(vec![
        Field::new(WORKLIST_TIPO, DataType::Utf8, true),
        Field::new(WORKLIST_URL, DataType::Utf8, false),
        Field::new(WORKLIST_MARCA, DataType::Utf8, true),
        Field::new(WORKLIST_STRATEGY, DataType::Utf8, true),
    ])
}

/// Lay out records as one RecordBatch under [`metrics_record_schema`].
///
/// Columns a record does not carry become nulls, so lab-only and field-only
/// records share the full header.
pub fn records_to_batch(records: &[FlatMetricsRecord]) -> Result<RecordBatch, ArrowError> {
    let schema = Arc::new(metrics_record_schema());
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(schema.fields().len());

    for field in schema.fields() {
        let name = field.name().as_str();
        let column: ArrayRef = match field.data_type() {
            DataType::Float64 => Arc::new(
                records
                    .iter()
                    .map(|r| r.get(name).and_then(Scalar::as_f64))
                    .collect::<Float64Array>(),
            ),
            DataType::Utf8 => Arc::new(
                records
                    .iter()
                    .map(|r| r.get(name).and_then(Scalar::as_str))
                    .collect::<StringArray>(),
            ),
            other => {
                return Err(ArrowError::SchemaError(format!(
                    "unsupported column type {other} for {name}"
                )));
            }
        };
        columns.push(column);
    }

    RecordBatch::try_new(schema, columns)
}
