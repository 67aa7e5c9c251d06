//! HTTP fetcher for static pages, AJAX form endpoints, and the render service.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::{debug, info};

use crate::render::RenderClient;
use crate::{FetchError, FetchSpec, Fetcher, RawContent};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Fetcher backed by a shared [`reqwest::Client`].
pub struct WebFetcher {
    client: reqwest::Client,
    render: Option<RenderClient>,
}

impl WebFetcher {
    /// `request_timeout` bounds each HTTP exchange; the retry policy adds
    /// its own deadline on top.
    pub fn new(
        user_agent: &str,
        request_timeout: Duration,
        render_service: Option<String>,
    ) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(request_timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;
        let render = render_service.map(|base| RenderClient::new(client.clone(), base));
        Ok(Self { client, render })
    }

    async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        debug!(url, "GET");
        let resp = self.client.get(url).send().await?;
        read_body(url, resp).await
    }

    async fn post_form(
        &self,
        url: &str,
        date_field: &str,
        date: NaiveDate,
    ) -> Result<String, FetchError> {
        let day = date.format("%Y-%m-%d").to_string();
        debug!(url, field = date_field, date = %day, "POST form");
        let resp = self
            .client
            .post(url)
            .header("X-Requested-With", "XMLHttpRequest")
            .form(&[(date_field, day.as_str())])
            .send()
            .await?;
        read_body(url, resp).await
    }
}

async fn read_body(url: &str, resp: reqwest::Response) -> Result<String, FetchError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(FetchError::Status {
            url: url.to_string(),
            status: status.as_u16(),
            body,
        });
    }
    Ok(resp.text().await?)
}

/// Pull the markup out of a JSON envelope like `{"answer": "<tr>..."}`.
/// A `null` field means the endpoint had nothing for the day.
pub fn markup_from_json(url: &str, body: &str, field: &str) -> Result<String, FetchError> {
    let value: serde_json::Value = serde_json::from_str(body)?;
    match value.get(field) {
        Some(serde_json::Value::String(s)) => Ok(s.clone()),
        Some(serde_json::Value::Null) => Ok(String::new()),
        Some(other) => Ok(other.to_string()),
        None => Err(FetchError::MissingField {
            url: url.to_string(),
            field: field.to_string(),
        }),
    }
}

#[async_trait]
impl Fetcher for WebFetcher {
    async fn fetch(
        &self,
        spec: &FetchSpec,
        date: NaiveDate,
    ) -> Result<Vec<RawContent>, FetchError> {
        let docs = match spec {
            FetchSpec::Html { url } => vec![RawContent::Markup(self.get_text(url).await?)],
            FetchSpec::Form {
                url,
                date_field,
                json_field,
                landing_url,
            } => {
                let body = self.post_form(url, date_field, date).await?;
                let markup = match json_field {
                    Some(field) => markup_from_json(url, &body, field)?,
                    None => body,
                };
                let mut docs = vec![RawContent::Markup(markup)];
                if let Some(landing) = landing_url {
                    docs.push(RawContent::Markup(self.get_text(landing).await?));
                }
                docs
            }
            FetchSpec::Rendered { url, scroll_passes } => {
                let render = self.render.as_ref().ok_or(FetchError::NoRenderService)?;
                vec![render.render(url, *scroll_passes).await?]
            }
        };
        info!(
            url = spec.url(),
            documents = docs.len(),
            bytes = docs.iter().map(|d| d.text().len()).sum::<usize>(),
            "fetched"
        );
        Ok(docs)
    }
}
