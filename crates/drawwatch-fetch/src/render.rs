//! Client for an external headless-browser render service.
//!
//! The service loads a page, scrolls it `scroll_passes` times so lazily
//! loaded history appears, and returns the visible text plus the text of
//! the accessibility tree.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{FetchError, RawContent};

#[derive(Debug, Serialize)]
pub struct RenderRequest<'a> {
    pub url: &'a str,
    pub scroll_passes: u32,
}

#[derive(Debug, Deserialize)]
pub struct RenderResponse {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub accessibility_text: Option<String>,
}

impl From<RenderResponse> for RawContent {
    fn from(resp: RenderResponse) -> Self {
        RawContent::Rendered {
            text: resp.text,
            accessibility: resp.accessibility_text,
        }
    }
}

pub struct RenderClient {
    client: reqwest::Client,
    endpoint: String,
}

impl RenderClient {
    pub fn new(client: reqwest::Client, base_url: String) -> Self {
        let endpoint = format!("{}/render", base_url.trim_end_matches('/'));
        Self { client, endpoint }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn render(&self, url: &str, scroll_passes: u32) -> Result<RawContent, FetchError> {
        debug!(url, scroll_passes, endpoint = %self.endpoint, "render request");
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&RenderRequest { url, scroll_passes })
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        let rendered: RenderResponse = resp.json().await?;
        Ok(rendered.into())
    }
}
