use crate::client::MonitoringClient;
use crate::error::MonitoringError;
use rollgate_core::dashboard::{
    DashboardStore, DescribedDashboard, RemoteDashboardSummary, StoreError,
};
use serde_json::Value;

/// [`DashboardStore`] backed by the Cloud Monitoring API.
pub struct MonitoringStore {
    client: MonitoringClient,
}

impl MonitoringStore {
    pub fn new(client: MonitoringClient) -> Self {
        Self { client }
    }
}

fn classify(err: MonitoringError) -> StoreError {
    match err.status() {
        Some(404) => StoreError::NotFound(err.to_string()),
        // Google APIs report a stale etag as ABORTED (409) or FAILED_PRECONDITION (412 on some surfaces).
        Some(409) | Some(412) => StoreError::EtagMismatch(err.to_string()),
        _ => StoreError::Unavailable(err.to_string()),
    }
}

fn string_field<'a>(body: &'a Value, field: &str) -> Option<&'a str> {
    body.get(field).and_then(Value::as_str)
}

impl DashboardStore for MonitoringStore {
    async fn list(&self) -> Result<Vec<RemoteDashboardSummary>, StoreError> {
        let dashboards = self.client.list_dashboards().await.map_err(classify)?;
        Ok(dashboards
            .iter()
            .filter_map(|d| {
                Some(RemoteDashboardSummary {
                    name: string_field(d, "name")?.to_string(),
                    display_name: string_field(d, "displayName").unwrap_or_default().to_string(),
                })
            })
            .collect())
    }

    async fn describe(&self, name: &str) -> Result<DescribedDashboard, StoreError> {
        let body = self.client.get_dashboard(name).await.map_err(classify)?;
        let etag = string_field(&body, "etag")
            .ok_or_else(|| StoreError::Unavailable(format!("dashboard {name} has no etag")))?
            .to_string();
        Ok(DescribedDashboard { etag, body })
    }

    async fn update(&self, name: &str, etag: &str, body: &Value) -> Result<(), StoreError> {
        let mut body = body.clone();
        if let Value::Object(map) = &mut body {
            map.insert("etag".into(), Value::String(etag.to_string()));
        }
        self.client
            .update_dashboard(name, &body)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn create(&self, body: &Value) -> Result<String, StoreError> {
        let created = self.client.create_dashboard(body).await.map_err(classify)?;
        string_field(&created, "name")
            .map(str::to_string)
            .ok_or_else(|| StoreError::Unavailable("create response has no name".into()))
    }
}
