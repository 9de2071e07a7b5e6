//! Lab (Lighthouse) result normalisation.

use tracing::debug;

use crate::CoreError;
use crate::model::LabTestResult;
use crate::record::{Columns, Scalar};
use crate::schema::{DEVICE, LAB_AUDIT_COLUMNS, SCORE};
use crate::score::compute_score;

/// Flatten a lab result into `Device`, `Score`, and one `Lab_*` column per
/// required audit.
///
/// Fails with [`CoreError::MissingField`] if `audits`, the performance
/// category, `configSettings.formFactor`, or any required audit is absent.
/// An audit without `numericValue` yields a null cell.
pub fn normalize_lab(result: &LabTestResult) -> Result<Columns, CoreError> {
    let audits = result
        .audits
        .as_ref()
        .ok_or_else(|| CoreError::missing("lighthouseResult.audits"))?;

    // Check every required audit before computing anything.
    for (audit_id, _) in LAB_AUDIT_COLUMNS {
        if !audits.contains_key(audit_id) {
            return Err(CoreError::missing(format!("audits.{audit_id}")));
        }
    }

    let refs = &result
        .categories
        .as_ref()
        .and_then(|c| c.performance.as_ref())
        .ok_or_else(|| CoreError::missing("categories.performance"))?
        .audit_refs;
    let device = result
        .config_settings
        .as_ref()
        .and_then(|c| c.form_factor.clone())
        .ok_or_else(|| CoreError::missing("configSettings.formFactor"))?;

    let score = compute_score(audits, refs);
    let score = if score.is_nan() { 0.0 } else { score };
    debug!(device = %device, score, audits = audits.len(), "normalised lab result");

    let mut columns = Vec::with_capacity(2 + LAB_AUDIT_COLUMNS.len());
    columns.push((DEVICE, Scalar::Text(device)));
    columns.push((SCORE, Scalar::Number(score)));
    for (audit_id, column) in LAB_AUDIT_COLUMNS {
        let value = audits[audit_id].numeric_value;
        columns.push((column, Scalar::from(value)));
    }
    Ok(columns)
}
