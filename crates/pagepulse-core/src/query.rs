//! Request shaping for the CrUX `records:queryRecord` and PSI `runPagespeed` APIs.
//!
//! Builders validate their options and return a [`RequestSpec`]; executing it
//! is the fetch layer's job. API keys and endpoints are injected through
//! [`ApiConfig`] at construction.

use serde_json::{Map, Value};
use tracing::warn;

use crate::CoreError;
use crate::model::{Category, FormFactor, QueryType, Strategy};

pub const PSI_ENDPOINT: &str = "https://www.googleapis.com/pagespeedonline/v5/runPagespeed";
pub const CRUX_ENDPOINT: &str = "https://chromeuxreport.googleapis.com/v1/records:queryRecord";

/// Keys and endpoints for the two upstream APIs.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub psi_key: String,
    pub crux_key: String,
    pub psi_endpoint: String,
    pub crux_endpoint: String,
}

impl ApiConfig {
    /// Config with the public Google endpoints.
    pub fn new(psi_key: impl Into<String>, crux_key: impl Into<String>) -> Self {
        Self {
            psi_key: psi_key.into(),
            crux_key: crux_key.into(),
            psi_endpoint: PSI_ENDPOINT.to_string(),
            crux_endpoint: CRUX_ENDPOINT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// A fully validated request, ready for the HTTP layer.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    pub base_endpoint: String,
    pub api_key: String,
    pub method: Method,
    /// Sent after `key`, in this order.
    pub query_params: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl RequestSpec {
    /// All query pairs including the API key, in send order.
    pub fn query_pairs(&self) -> Vec<(&str, &str)> {
        let mut pairs = Vec::with_capacity(self.query_params.len() + 1);
        pairs.push(("key", self.api_key.as_str()));
        pairs.extend(
            self.query_params
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str())),
        );
        pairs
    }

    /// Value of the first query parameter named `key`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.query_params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Endpoint and parameters with the API key masked, for logs.
    pub fn redacted_url(&self) -> String {
        let mut url = format!("{}?key=***", self.base_endpoint);
        for (k, v) in &self.query_params {
            url.push('&');
            url.push_str(k);
            url.push('=');
            url.push_str(v);
        }
        url
    }
}

/// Options for a CrUX record query.
#[derive(Debug, Clone, Copy)]
pub struct FieldQueryOptions<'a> {
    /// `origin` or `url`.
    pub query_type: &'a str,
    /// `DESKTOP`, `PHONE` or `TABLET`; anything else is dropped.
    pub form_factor: Option<&'a str>,
}

impl Default for FieldQueryOptions<'_> {
    fn default() -> Self {
        Self {
            query_type: QueryType::Origin.as_str(),
            form_factor: None,
        }
    }
}

/// Options for a PSI analysis run.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisOptions<'a> {
    pub query_type: &'a str,
    pub locale: &'a str,
    pub strategy: &'a str,
    pub category: &'a str,
    pub utm_campaign: Option<&'a str>,
    pub utm_source: Option<&'a str>,
}

impl Default for AnalysisOptions<'_> {
    fn default() -> Self {
        Self {
            query_type: QueryType::Origin.as_str(),
            locale: "pt-BR",
            strategy: Strategy::Desktop.as_str(),
            category: Category::Performance.as_str(),
            utm_campaign: None,
            utm_source: None,
        }
    }
}

/// Builds requests for both upstream APIs from an injected [`ApiConfig`].
#[derive(Debug, Clone)]
pub struct MetricsApiClient {
    config: ApiConfig,
}

impl MetricsApiClient {
    pub fn new(config: ApiConfig) -> Self {
        Self { config }
    }

    /// POST body `{ "<queryType>": site, "formFactor"? }` for `records:queryRecord`.
    ///
    /// An unknown query type is an error. An unknown form factor is omitted
    /// (the query then covers all devices) and logged.
    pub fn build_field_query(
        &self,
        site: &str,
        opts: FieldQueryOptions<'_>,
    ) -> Result<RequestSpec, CoreError> {
        let query_type: QueryType = opts.query_type.parse()?;

        let mut body = Map::new();
        body.insert(query_type.as_str().to_string(), Value::from(site));
        if let Some(raw) = opts.form_factor {
            match raw.parse::<FormFactor>() {
                Ok(ff) => {
                    body.insert("formFactor".into(), Value::from(ff.as_str()));
                }
                Err(_) => warn!(form_factor = raw, "ignoring unknown form factor"),
            }
        }

        Ok(RequestSpec {
            base_endpoint: self.config.crux_endpoint.clone(),
            api_key: self.config.crux_key.clone(),
            method: Method::Post,
            query_params: Vec::new(),
            body: Some(Value::Object(body)),
        })
    }

    /// GET parameters for `runPagespeed`.
    ///
    /// `url` is sent verbatim for `url` queries and as `origin:<url>` for
    /// origin queries. UTM parameters are appended only when given.
    pub fn build_analysis_query(
        &self,
        url: &str,
        opts: AnalysisOptions<'_>,
    ) -> Result<RequestSpec, CoreError> {
        let query_type: QueryType = opts.query_type.parse()?;
        let strategy: Strategy = opts.strategy.parse()?;
        let category: Category = opts.category.parse()?;

        let target = match query_type {
            QueryType::Url => url.to_string(),
            QueryType::Origin => format!("origin:{url}"),
        };
        let mut params = vec![
            ("url".to_string(), target),
            ("category".to_string(), category.as_str().to_string()),
            ("locale".to_string(), opts.locale.to_string()),
            ("strategy".to_string(), strategy.as_str().to_string()),
        ];
        if let Some(campaign) = opts.utm_campaign {
            params.push(("utm_campaign".to_string(), campaign.to_string()));
        }
        if let Some(source) = opts.utm_source {
            params.push(("utm_source".to_string(), source.to_string()));
        }

        Ok(RequestSpec {
            base_endpoint: self.config.psi_endpoint.clone(),
            api_key: self.config.psi_key.clone(),
            method: Method::Get,
            query_params: params,
            body: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> MetricsApiClient {
        MetricsApiClient::new(ApiConfig::new("psi-key", "crux-key"))
    }

    #[test]
    fn analysis_defaults() {
        let spec = client()
            .build_analysis_query("https://web.dev", AnalysisOptions::default())
            .unwrap();
        assert_eq!(spec.method, Method::Get);
        assert_eq!(spec.base_endpoint, PSI_ENDPOINT);
        assert_eq!(spec.api_key, "psi-key");
        assert_eq!(spec.param("url"), Some("origin:https://web.dev"));
        assert_eq!(spec.param("category"), Some("performance"));
        assert_eq!(spec.param("locale"), Some("pt-BR"));
        assert_eq!(spec.param("strategy"), Some("desktop"));
        assert_eq!(spec.param("utm_campaign"), None);
        assert!(spec.body.is_none());
    }

    #[test]
    fn analysis_accepts_mobile_verbatim() {
        let opts = AnalysisOptions {
            query_type: "url",
            strategy: "mobile",
            ..Default::default()
        };
        let spec = client().build_analysis_query("https://web.dev/", opts).unwrap();
        assert_eq!(spec.param("strategy"), Some("mobile"));
        assert_eq!(spec.param("url"), Some("https://web.dev/"));
    }

    #[test]
    fn analysis_rejects_tablet() {
        let opts = AnalysisOptions {
            strategy: "tablet",
            ..Default::default()
        };
        let err = client().build_analysis_query("https://web.dev", opts).unwrap_err();
        assert!(matches!(err, CoreError::InvalidOption { option: "strategy", .. }));
    }

    #[test]
    fn analysis_rejects_unknown_category_and_query_type() {
        let bad_category = AnalysisOptions {
            category: "pwa",
            ..Default::default()
        };
        assert!(matches!(
            client().build_analysis_query("https://web.dev", bad_category),
            Err(CoreError::InvalidOption { option: "category", .. })
        ));

        let bad_type = AnalysisOptions {
            query_type: "domain",
            ..Default::default()
        };
        assert!(matches!(
            client().build_analysis_query("https://web.dev", bad_type),
            Err(CoreError::InvalidOption { option: "query type", .. })
        ));
    }

    #[test]
    fn analysis_appends_utm_params_in_order() {
        let opts = AnalysisOptions {
            query_type: "url",
            utm_campaign: Some("spring"),
            utm_source: Some("newsletter"),
            ..Default::default()
        };
        let spec = client().build_analysis_query("https://web.dev", opts).unwrap();
        let keys: Vec<&str> = spec.query_pairs().iter().map(|(k, _)| *k).collect();
        assert_eq!(
            keys,
            ["key", "url", "category", "locale", "strategy", "utm_campaign", "utm_source"]
        );
        assert_eq!(spec.param("utm_source"), Some("newsletter"));
    }

    #[test]
    fn field_query_body_and_key() {
        let spec = client()
            .build_field_query("https://web.dev", FieldQueryOptions::default())
            .unwrap();
        assert_eq!(spec.method, Method::Post);
        assert_eq!(spec.base_endpoint, CRUX_ENDPOINT);
        assert_eq!(spec.api_key, "crux-key");
        assert_eq!(spec.body, Some(json!({ "origin": "https://web.dev" })));
    }

    #[test]
    fn field_query_with_form_factor() {
        let opts = FieldQueryOptions {
            query_type: "url",
            form_factor: Some("PHONE"),
        };
        let spec = client().build_field_query("https://web.dev/", opts).unwrap();
        assert_eq!(
            spec.body,
            Some(json!({ "url": "https://web.dev/", "formFactor": "PHONE" }))
        );
    }

    #[test]
    fn field_query_drops_unknown_form_factor() {
        let opts = FieldQueryOptions {
            form_factor: Some("WATCH"),
            ..Default::default()
        };
        let spec = client().build_field_query("https://web.dev", opts).unwrap();
        assert_eq!(spec.body, Some(json!({ "origin": "https://web.dev" })));
    }

    #[test]
    fn field_query_rejects_unknown_query_type() {
        let opts = FieldQueryOptions {
            query_type: "site",
            ..Default::default()
        };
        assert!(matches!(
            client().build_field_query("https://web.dev", opts),
            Err(CoreError::InvalidOption { .. })
        ));
    }

    #[test]
    fn redacted_url_hides_key() {
        let spec = client()
            .build_analysis_query("https://web.dev", AnalysisOptions::default())
            .unwrap();
        let url = spec.redacted_url();
        assert!(!url.contains("psi-key"));
        assert!(url.starts_with(PSI_ENDPOINT));
        assert!(url.contains("&strategy=desktop"));
    }
}
