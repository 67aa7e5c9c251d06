//! Fetch capability: pulls raw markup or rendered page text for a source.
//!
//! An empty page is not an error here. Only transport failures, timeouts,
//! and unexpected statuses come back as [`FetchError`].

pub mod http;
pub mod render;
pub mod retry;

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use http::WebFetcher;
pub use retry::RetryPolicy;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{url} returned {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },
    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("response from {url} has no {field:?} field")]
    MissingField { url: String, field: String },
    #[error("rendered fetch requested but no render service is configured")]
    NoRenderService,
}

impl FetchError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::NoRenderService)
    }
}

fn default_scroll_passes() -> u32 {
    80
}

/// Where and how a source's content is fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FetchSpec {
    /// Plain HTML document via GET.
    Html { url: String },
    /// AJAX endpoint that takes the day as a form field. When `json_field`
    /// is set the markup is read from that field of a JSON response.
    /// `landing_url`, if given, is fetched as a second document.
    Form {
        url: String,
        date_field: String,
        #[serde(default)]
        json_field: Option<String>,
        #[serde(default)]
        landing_url: Option<String>,
    },
    /// Page that only exists after client-side rendering.
    Rendered {
        url: String,
        #[serde(default = "default_scroll_passes")]
        scroll_passes: u32,
    },
}

impl FetchSpec {
    pub fn url(&self) -> &str {
        match self {
            Self::Html { url } | Self::Form { url, .. } | Self::Rendered { url, .. } => url,
        }
    }
}

/// One fetched document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawContent {
    Markup(String),
    Rendered {
        text: String,
        accessibility: Option<String>,
    },
}

impl RawContent {
    /// The text an extractor should read. Rendered pages contribute their
    /// accessibility-tree text after the visible text.
    pub fn text(&self) -> String {
        match self {
            Self::Markup(html) => html.clone(),
            Self::Rendered {
                text,
                accessibility: Some(extra),
            } if !extra.trim().is_empty() => format!("{text} ||ARIA|| {extra}"),
            Self::Rendered { text, .. } => text.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Markup(html) => html.trim().is_empty(),
            Self::Rendered {
                text,
                accessibility,
            } => {
                text.trim().is_empty()
                    && accessibility.as_deref().is_none_or(|a| a.trim().is_empty())
            }
        }
    }
}

/// Fetches a source's documents for one day.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, spec: &FetchSpec, date: NaiveDate)
    -> Result<Vec<RawContent>, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_spec_from_toml_like_json() {
        let spec: FetchSpec = serde_json::from_str(
            r#"{"kind": "form", "url": "https://example.test/load", "date_field": "date",
                "json_field": "answer", "landing_url": "https://example.test/"}"#,
        )
        .unwrap();
        assert_eq!(spec.url(), "https://example.test/load");
        let FetchSpec::Form {
            json_field,
            landing_url,
            ..
        } = spec
        else {
            panic!("expected form spec");
        };
        assert_eq!(json_field.as_deref(), Some("answer"));
        assert_eq!(landing_url.as_deref(), Some("https://example.test/"));

        let rendered: FetchSpec =
            serde_json::from_str(r#"{"kind": "rendered", "url": "https://app.test"}"#).unwrap();
        assert_eq!(
            rendered,
            FetchSpec::Rendered {
                url: "https://app.test".into(),
                scroll_passes: 80
            }
        );
    }

    #[test]
    fn rendered_text_appends_accessibility() {
        let content = RawContent::Rendered {
            text: "Jan 8, 2026".into(),
            accessibility: Some("10:00 AM 1 2 3".into()),
        };
        assert_eq!(content.text(), "Jan 8, 2026 ||ARIA|| 10:00 AM 1 2 3");

        let blank_aria = RawContent::Rendered {
            text: "Jan 8".into(),
            accessibility: Some("  ".into()),
        };
        assert_eq!(blank_aria.text(), "Jan 8");
    }

    #[test]
    fn empty_content_is_not_an_error_but_is_detectable() {
        assert!(RawContent::Markup("  \n".into()).is_empty());
        assert!(
            RawContent::Rendered {
                text: String::new(),
                accessibility: None
            }
            .is_empty()
        );
        assert!(!RawContent::Markup("<tr></tr>".into()).is_empty());
    }

    #[test]
    fn only_configuration_errors_are_final() {
        assert!(!FetchError::NoRenderService.is_retryable());
        assert!(FetchError::Timeout(Duration::from_secs(30)).is_retryable());
        assert!(
            FetchError::Status {
                url: "https://example.test".into(),
                status: 503,
                body: String::new()
            }
            .is_retryable()
        );
    }
}
