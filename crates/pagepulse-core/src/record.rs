//! Flat output records and their assembly from lab and field results.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::CoreError;
use crate::field::normalize_field;
use crate::lab::normalize_lab;
use crate::model::{ExperienceSource, FieldExperienceResult, LabTestResult, PsiResponse};
use crate::schema::{DATE, MARCA, SITE};

/// A single cell value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Text(String),
    Number(f64),
    Null,
}

impl Scalar {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<Option<f64>> for Scalar {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Self::Null, Self::Number)
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{n}"),
            Self::Null => Ok(()),
        }
    }
}

/// Ordered `(column, value)` pairs emitted by a normaliser.
pub type Columns = Vec<(&'static str, Scalar)>;

/// One (site, strategy, date) observation ready for tabular storage.
///
/// Columns keep insertion order: identification, lab, then field.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlatMetricsRecord {
    columns: Columns,
}

impl FlatMetricsRecord {
    pub fn push(&mut self, column: &'static str, value: Scalar) {
        self.columns.push((column, value));
    }

    pub fn get(&self, column: &str) -> Option<&Scalar> {
        self.columns
            .iter()
            .find(|(name, _)| *name == column)
            .map(|(_, value)| value)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().map(|(name, _)| *name)
    }

    pub fn columns(&self) -> &[(&'static str, Scalar)] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Merge identification fields with normalised lab and field columns.
///
/// `Date` is the `YYYY-MM-DD` prefix of `lab.fetchTime`. Without a lab result
/// the record's `Date` is null; callers holding a response envelope should use
/// [`PsiResponse::into_record`], which dates field-only records from the
/// analysis timestamp instead.
pub fn assemble(
    lab: Option<&LabTestResult>,
    field: Option<&FieldExperienceResult>,
    site_id: &str,
    label: &str,
) -> Result<FlatMetricsRecord, CoreError> {
    if lab.is_none() && field.is_none() {
        return Err(CoreError::InvalidInput(format!(
            "no lab or field result for {site_id}"
        )));
    }

    let date = match lab {
        Some(lab) => {
            let fetch_time = lab
                .fetch_time
                .as_deref()
                .ok_or_else(|| CoreError::missing("lighthouseResult.fetchTime"))?;
            let day = fetch_time
                .get(..10)
                .ok_or_else(|| CoreError::missing("lighthouseResult.fetchTime (date part)"))?;
            Scalar::text(day)
        }
        None => Scalar::Null,
    };

    // Normalise both sides before building, so a failure leaves nothing behind.
    let lab_columns = lab.map(normalize_lab).transpose()?;
    let field_columns = field.map(normalize_field).transpose()?;

    let mut record = FlatMetricsRecord::default();
    record.push(DATE, date);
    record.push(MARCA, Scalar::text(label));
    record.push(SITE, Scalar::text(site_id));
    record.columns.extend(lab_columns.into_iter().flatten());
    record.columns.extend(field_columns.into_iter().flatten());
    Ok(record)
}

impl PsiResponse {
    /// Assemble the record for this response under the given brand label.
    ///
    /// The site id is the response `id`. Field columns come from the loading
    /// experience chosen by `source`. When there is no lab result, `Date` is
    /// taken from `analysisUTCTimestamp` if present.
    pub fn into_record(
        &self,
        label: &str,
        source: ExperienceSource,
    ) -> Result<FlatMetricsRecord, CoreError> {
        let site_id = self
            .id
            .as_deref()
            .ok_or_else(|| CoreError::missing("id"))?;
        let mut record = assemble(
            self.lighthouse_result.as_ref(),
            self.experience(source),
            site_id,
            label,
        )?;

        if self.lighthouse_result.is_none()
            && let Some(ts) = self.analysis_utc_timestamp.as_deref()
        {
            let analysed: DateTime<Utc> = ts
                .parse()
                .map_err(|_| CoreError::missing(format!("analysisUTCTimestamp ({ts:?})")))?;
            record.columns[0].1 = Scalar::text(analysed.format("%Y-%m-%d").to_string());
        }
        Ok(record)
    }
}
