use crate::error::{MonitoringError, Result};
use crate::types::{ErrorEnvelope, ListDashboardsResponse};
use reqwest::{Client, Response};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Upper bound on pages fetched by one list call. A server that keeps
/// handing out tokens past this is treated as broken.
const MAX_PAGES: usize = 100;

/// Client for the project-scoped dashboards collection.
pub struct MonitoringClient {
    http: Client,
    endpoint: String,
    project: String,
    token: String,
}

impl MonitoringClient {
    pub fn new(endpoint: &str, project: &str, token: &str) -> Result<Self> {
        let http = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            project: project.to_string(),
            token: token.to_string(),
        })
    }

    fn collection_url(&self) -> String {
        format!("{}/v1/projects/{}/dashboards", self.endpoint, self.project)
    }

    fn resource_url(&self, name: &str) -> String {
        format!("{}/v1/{}", self.endpoint, name.trim_start_matches('/'))
    }

    /// Every dashboard in the project, following `nextPageToken`.
    pub async fn list_dashboards(&self) -> Result<Vec<Value>> {
        let mut all = Vec::new();
        let mut page_token: Option<String> = None;
        for page in 0..MAX_PAGES {
            let mut req = self.http.get(self.collection_url()).bearer_auth(&self.token);
            if let Some(token) = &page_token {
                req = req.query(&[("pageToken", token.as_str())]);
            }
            let resp: ListDashboardsResponse = decode(req.send().await?).await?;
            debug!(page, count = resp.dashboards.len(), "listed dashboards page");
            all.extend(resp.dashboards);
            match resp.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => page_token = Some(next),
                None => return Ok(all),
            }
        }
        Err(MonitoringError::Decode(format!(
            "dashboard listing did not terminate after {MAX_PAGES} pages"
        )))
    }

    pub async fn get_dashboard(&self, name: &str) -> Result<Value> {
        let resp = self
            .http
            .get(self.resource_url(name))
            .bearer_auth(&self.token)
            .send()
            .await?;
        decode(resp).await
    }

    /// Replace a dashboard. The body must carry the etag from the latest
    /// get; the server rejects stale etags.
    pub async fn update_dashboard(&self, name: &str, body: &Value) -> Result<Value> {
        let resp = self
            .http
            .patch(self.resource_url(name))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?;
        decode(resp).await
    }

    pub async fn create_dashboard(&self, body: &Value) -> Result<Value> {
        let resp = self
            .http
            .post(self.collection_url())
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?;
        decode(resp).await
    }
}

async fn decode<T: serde::de::DeserializeOwned>(resp: Response) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorEnvelope>(&text)
            .map(|env| match env.error.status {
                Some(code) => format!("{code}: {}", env.error.message),
                None => env.error.message,
            })
            .unwrap_or(text);
        return Err(MonitoringError::Api {
            status: status.as_u16(),
            message,
        });
    }
    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| MonitoringError::Decode(e.to_string()))
}
