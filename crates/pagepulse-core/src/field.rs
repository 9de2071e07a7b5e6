//! Field (CrUX loading experience) normalisation.

use crate::CoreError;
use crate::model::FieldExperienceResult;
use crate::record::{Columns, Scalar};
use crate::schema::{FIELD_METRIC_COLUMNS, OVERALL_CATEGORY};

/// Placeholder written when a category is absent or blank.
pub const NOT_AVAILABLE: &str = "N/A";

/// Flatten a loading experience into a category and percentile column per
/// metric plus the overall category.
///
/// The `metrics` container and its four fixed keys are required. Inside each
/// metric, a missing or blank `category` becomes `"N/A"` and a missing, zero,
/// or non-numeric `percentile` becomes 0.
pub fn normalize_field(result: &FieldExperienceResult) -> Result<Columns, CoreError> {
    let metrics = result
        .metrics
        .as_ref()
        .ok_or_else(|| CoreError::missing("loadingExperience.metrics"))?;

    let mut columns = Vec::with_capacity(FIELD_METRIC_COLUMNS.len() * 2 + 1);
    for cols in &FIELD_METRIC_COLUMNS {
        let metric = metrics
            .get(cols.metric)
            .ok_or_else(|| CoreError::missing(format!("metrics.{}", cols.metric)))?;
        columns.push((cols.category, category_or_na(metric.category.as_deref())));
        let percentile = metric
            .percentile
            .as_f64()
            .filter(|p| p.is_finite())
            .unwrap_or(0.0);
        columns.push((cols.percentile, Scalar::Number(percentile)));
    }
    columns.push((
        OVERALL_CATEGORY,
        category_or_na(result.overall_category.as_deref()),
    ));
    Ok(columns)
}

fn category_or_na(category: Option<&str>) -> Scalar {
    match category {
        Some(c) if !c.is_empty() => Scalar::text(c),
        _ => Scalar::text(NOT_AVAILABLE),
    }
}
