//! Upstream payload shapes and worklist entries.
//!
//! The lab and field structures mirror the JSON returned by the PageSpeed
//! Insights v5 API (`lighthouseResult`, `loadingExperience`). Containers the
//! normalisers depend on are `Option`al here so that their absence surfaces
//! as [`CoreError::MissingField`] rather than a deserialisation failure.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::CoreError;

// ── Enumerated options ──

/// Whether a query targets a whole origin or one specific URL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum QueryType {
    #[default]
    Origin,
    Url,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Origin => "origin",
            Self::Url => "url",
        }
    }
}

impl FromStr for QueryType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "origin" => Ok(Self::Origin),
            "url" => Ok(Self::Url),
            other => Err(CoreError::InvalidOption {
                option: "query type",
                value: other.to_string(),
                expected: "origin, url",
            }),
        }
    }
}

/// Device strategy accepted by the analysis API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Strategy {
    #[default]
    Desktop,
    Mobile,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Desktop => "desktop",
            Self::Mobile => "mobile",
        }
    }
}

impl FromStr for Strategy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "desktop" => Ok(Self::Desktop),
            "mobile" => Ok(Self::Mobile),
            other => Err(CoreError::InvalidOption {
                option: "strategy",
                value: other.to_string(),
                expected: "desktop, mobile",
            }),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lighthouse category to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Category {
    #[default]
    Performance,
    Seo,
    BestPractices,
    Accessibility,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Performance => "performance",
            Self::Seo => "seo",
            Self::BestPractices => "best_practices",
            Self::Accessibility => "accessibility",
        }
    }
}

impl FromStr for Category {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "performance" => Ok(Self::Performance),
            "seo" => Ok(Self::Seo),
            "best_practices" => Ok(Self::BestPractices),
            "accessibility" => Ok(Self::Accessibility),
            other => Err(CoreError::InvalidOption {
                option: "category",
                value: other.to_string(),
                expected: "performance, seo, best_practices, accessibility",
            }),
        }
    }
}

/// CrUX form factor filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormFactor {
    Desktop,
    Phone,
    Tablet,
}

impl FormFactor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Desktop => "DESKTOP",
            Self::Phone => "PHONE",
            Self::Tablet => "TABLET",
        }
    }
}

impl FromStr for FormFactor {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DESKTOP" => Ok(Self::Desktop),
            "PHONE" => Ok(Self::Phone),
            "TABLET" => Ok(Self::Tablet),
            other => Err(CoreError::InvalidOption {
                option: "form factor",
                value: other.to_string(),
                expected: "DESKTOP, PHONE, TABLET",
            }),
        }
    }
}

// ── Worklist ──

/// Strategy column of a worklist row. `Both` and `Unset` expand to both devices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StrategySelection {
    Desktop,
    Mobile,
    Both,
    #[default]
    Unset,
}

impl StrategySelection {
    /// The concrete strategies one worklist row expands to.
    pub fn strategies(&self) -> &'static [Strategy] {
        match self {
            Self::Desktop => &[Strategy::Desktop],
            Self::Mobile => &[Strategy::Mobile],
            Self::Both | Self::Unset => &[Strategy::Desktop, Strategy::Mobile],
        }
    }
}

impl FromStr for StrategySelection {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" => Ok(Self::Unset),
            "desktop" => Ok(Self::Desktop),
            "mobile" => Ok(Self::Mobile),
            // "ambos" is the value used by existing Portuguese worklists.
            "both" | "ambos" => Ok(Self::Both),
            other => Err(CoreError::InvalidOption {
                option: "worklist strategy",
                value: other.to_string(),
                expected: "desktop, mobile, both, ambos, or blank",
            }),
        }
    }
}

/// One row of the worklist table (`Tipo`, `URL`, `Marca`, `Strategy`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorklistEntry {
    pub query_type: QueryType,
    pub url: String,
    /// Brand label, written to the `Marca` column.
    pub label: String,
    pub strategy: StrategySelection,
}

impl WorklistEntry {
    /// Build an entry from the raw cell values of a worklist row.
    ///
    /// A blank `Tipo` defaults to `origin`; a blank `Strategy` is `Unset`.
    pub fn from_cells(
        tipo: Option<&str>,
        url: &str,
        marca: Option<&str>,
        strategy: Option<&str>,
    ) -> Result<Self, CoreError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(CoreError::InvalidInput("worklist row without URL".into()));
        }
        let query_type = match tipo.map(str::trim) {
            None | Some("") => QueryType::default(),
            Some(t) => t.parse()?,
        };
        let strategy = strategy.unwrap_or_default().parse()?;
        Ok(Self {
            query_type,
            url: url.to_string(),
            label: marca.unwrap_or_default().trim().to_string(),
            strategy,
        })
    }
}

// ── Lab result (Lighthouse) ──

/// A single Lighthouse audit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Audit {
    #[serde(default)]
    pub id: String,
    /// 0–1, `null` for informative audits. Kept as raw JSON so that
    /// non-numeric values can be scored as zero instead of failing to parse.
    #[serde(default)]
    pub score: Value,
    #[serde(default)]
    pub numeric_value: Option<f64>,
}

impl Audit {
    /// The audit score, with a missing or non-numeric score read as 0.
    pub fn score_value(&self) -> f64 {
        self.score.as_f64().filter(|s| s.is_finite()).unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRef {
    pub id: String,
    #[serde(default)]
    pub weight: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryResult {
    #[serde(default)]
    pub audit_refs: Vec<AuditRef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Categories {
    pub performance: Option<CategoryResult>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSettings {
    pub form_factor: Option<String>,
}

/// `lighthouseResult` of a PSI response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabTestResult {
    pub audits: Option<BTreeMap<String, Audit>>,
    pub categories: Option<Categories>,
    pub config_settings: Option<ConfigSettings>,
    /// ISO 8601 timestamp string.
    pub fetch_time: Option<String>,
}

// ── Field result (CrUX loading experience) ──

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldMetric {
    #[serde(default)]
    pub percentile: Value,
    #[serde(default)]
    pub category: Option<String>,
}

/// `loadingExperience` / `originLoadingExperience` of a PSI response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldExperienceResult {
    pub metrics: Option<BTreeMap<String, FieldMetric>>,
    #[serde(default)]
    pub overall_category: Option<String>,
}

// ── Envelope ──

/// Which loading experience of a PSI response feeds the field columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExperienceSource {
    /// `loadingExperience`: data for the analysed URL.
    #[default]
    Url,
    /// `originLoadingExperience`: data aggregated over the whole origin.
    Origin,
}

/// The body returned by `runPagespeed`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PsiResponse {
    pub id: Option<String>,
    pub lighthouse_result: Option<LabTestResult>,
    pub loading_experience: Option<FieldExperienceResult>,
    pub origin_loading_experience: Option<FieldExperienceResult>,
    #[serde(rename = "analysisUTCTimestamp")]
    pub analysis_utc_timestamp: Option<String>,
}

impl PsiResponse {
    pub fn experience(&self, source: ExperienceSource) -> Option<&FieldExperienceResult> {
        match source {
            ExperienceSource::Url => self.loading_experience.as_ref(),
            ExperienceSource::Origin => self.origin_loading_experience.as_ref(),
        }
    }
}
