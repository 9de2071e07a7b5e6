//! Normalisation core: turns PageSpeed Insights lab results and CrUX field
//! data into flat, fixed-schema records, and shapes the requests that fetch them.

mod error;
pub mod field;
pub mod lab;
pub mod model;
pub mod query;
pub mod record;
pub mod schema;
pub mod score;

pub use error::CoreError;
pub use field::normalize_field;
pub use lab::normalize_lab;
pub use model::{
    Category, ExperienceSource, FieldExperienceResult, FormFactor, LabTestResult, PsiResponse,
    QueryType, Strategy, StrategySelection, WorklistEntry,
};
pub use query::{AnalysisOptions, ApiConfig, FieldQueryOptions, Method, MetricsApiClient, RequestSpec};
pub use record::{FlatMetricsRecord, Scalar, assemble};
pub use score::compute_score;
