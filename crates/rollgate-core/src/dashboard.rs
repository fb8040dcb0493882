//! Dashboard reconciliation: bring a remote dashboard store in line with a
//! directory of local JSON definitions.
//!
//! Identity is the `displayName`. Each definition is upserted on its own:
//! look the display name up in the remote inventory, re-describe the match
//! for a fresh etag and update it, or create it when nothing matches. The
//! etag is the only guard against lost updates, so an update is never sent
//! without describing first.

use crate::error::{Result, RollgateError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Fields owned by the remote store; stripped from local bodies on create
/// and overwritten on update.
const SERVER_FIELDS: [&str; 2] = ["name", "etag"];

// ---------------------------------------------------------------------------
// Local definitions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardDefinition {
    pub display_name: String,
    /// Where the definition came from, for error messages.
    pub source: String,
    pub body: Value,
}

impl DashboardDefinition {
    pub fn from_value(source: impl Into<String>, body: Value) -> Result<Self> {
        let source = source.into();
        if !body.is_object() {
            return Err(RollgateError::Config(format!(
                "dashboard definition {source} must be a JSON object"
            )));
        }
        let display_name = body
            .get("displayName")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| RollgateError::MissingDisplayName(source.clone()))?
            .to_string();
        Ok(Self {
            display_name,
            source,
            body,
        })
    }

    /// Body sent on create: the local definition without server-owned fields.
    pub fn creation_body(&self) -> Value {
        strip_server_fields(&self.body)
    }

    /// Body sent on update: the local definition with `name` and `etag`
    /// overwritten by the remote values.
    pub fn update_body(&self, name: &str, etag: &str) -> Value {
        let mut body = strip_server_fields(&self.body);
        if let Value::Object(map) = &mut body {
            map.insert("name".to_string(), Value::String(name.to_string()));
            map.insert("etag".to_string(), Value::String(etag.to_string()));
        }
        body
    }

    /// True when `remote` already matches this definition, ignoring the
    /// server-owned fields.
    pub fn matches_remote(&self, remote: &Value) -> bool {
        strip_server_fields(remote) == strip_server_fields(&self.body)
    }
}

fn strip_server_fields(body: &Value) -> Value {
    let mut body = body.clone();
    if let Value::Object(map) = &mut body {
        for field in SERVER_FIELDS {
            map.remove(field);
        }
    }
    body
}

/// Load every `*.json` file in `dir`, in file-name order.
pub fn load_definitions(dir: &Path) -> Result<Vec<DashboardDefinition>> {
    if !dir.is_dir() {
        return Err(RollgateError::Config(format!(
            "dashboards directory {} does not exist",
            dir.display()
        )));
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();

    let mut defs = Vec::with_capacity(files.len());
    for path in files {
        let data = std::fs::read_to_string(&path)?;
        let body: Value = serde_json::from_str(&data)
            .map_err(|e| RollgateError::Config(format!("{}: {e}", path.display())))?;
        defs.push(DashboardDefinition::from_value(
            path.display().to_string(),
            body,
        )?);
    }
    Ok(defs)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Two local definitions with the same display name are a configuration error.
    #[default]
    Reject,
    /// The later definition (in file order) replaces the earlier one.
    LastWins,
}

pub fn resolve_duplicates(
    defs: Vec<DashboardDefinition>,
    policy: DuplicatePolicy,
) -> Result<Vec<DashboardDefinition>> {
    let mut out: Vec<DashboardDefinition> = Vec::with_capacity(defs.len());
    for def in defs {
        match out.iter().position(|d| d.display_name == def.display_name) {
            None => out.push(def),
            Some(idx) => match policy {
                DuplicatePolicy::Reject => {
                    return Err(RollgateError::DuplicateDisplayName {
                        display_name: def.display_name,
                        first: out[idx].source.clone(),
                        second: def.source,
                    });
                }
                DuplicatePolicy::LastWins => {
                    warn!(
                        display_name = %def.display_name,
                        replaced = %out[idx].source,
                        by = %def.source,
                        "duplicate dashboard displayName, last one wins"
                    );
                    out.remove(idx);
                    out.push(def);
                }
            },
        }
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Remote store capability
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteDashboardSummary {
    /// Opaque server-side identifier.
    pub name: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DescribedDashboard {
    pub etag: String,
    pub body: Value,
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("etag mismatch: {0}")]
    EtagMismatch(String),

    #[error("{0}")]
    Unavailable(String),
}

/// Project-scoped dashboard store.
#[allow(async_fn_in_trait)]
pub trait DashboardStore {
    async fn list(&self) -> std::result::Result<Vec<RemoteDashboardSummary>, StoreError>;

    async fn describe(&self, name: &str) -> std::result::Result<DescribedDashboard, StoreError>;

    /// Replace the dashboard. `etag` must be the value from the latest
    /// describe; a stale one is rejected with [`StoreError::EtagMismatch`].
    async fn update(
        &self,
        name: &str,
        etag: &str,
        body: &Value,
    ) -> std::result::Result<(), StoreError>;

    /// Returns the server-assigned name.
    async fn create(&self, body: &Value) -> std::result::Result<String, StoreError>;
}

// ---------------------------------------------------------------------------
// Reconcile
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SyncAction {
    Created { name: String },
    Updated { name: String },
    Unchanged { name: String },
}

impl SyncAction {
    pub fn name(&self) -> &str {
        match self {
            SyncAction::Created { name }
            | SyncAction::Updated { name }
            | SyncAction::Unchanged { name } => name,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SyncAction::Created { .. } => "created",
            SyncAction::Updated { .. } => "updated",
            SyncAction::Unchanged { .. } => "unchanged",
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ReconcileError {
    #[error("dashboard '{display_name}' was modified concurrently; re-run the sync")]
    ConcurrentModification { display_name: String },

    #[error("dashboard '{display_name}': {operation} failed: {source}")]
    Store {
        display_name: String,
        operation: &'static str,
        #[source]
        source: StoreError,
    },
}

impl ReconcileError {
    pub fn kind(&self) -> &'static str {
        match self {
            ReconcileError::ConcurrentModification { .. } => "concurrent-modification",
            ReconcileError::Store { .. } => "store",
        }
    }

    /// Re-running the whole pass is safe because it is idempotent.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ReconcileError::ConcurrentModification { .. })
    }
}

#[derive(Debug, Clone)]
pub struct DashboardOutcome {
    pub display_name: String,
    pub result: std::result::Result<SyncAction, ReconcileError>,
}

/// Reconcile every definition independently; one result per definition, in
/// input order. A failure never stops the remaining definitions.
pub async fn reconcile<S: DashboardStore>(
    defs: &[DashboardDefinition],
    store: &S,
) -> Vec<DashboardOutcome> {
    let mut outcomes = Vec::with_capacity(defs.len());
    for def in defs {
        let result = reconcile_one(def, store).await;
        match &result {
            Ok(action) => info!(
                display_name = %def.display_name,
                name = action.name(),
                action = action.label(),
                "dashboard reconciled"
            ),
            Err(e) => warn!(display_name = %def.display_name, error = %e, "dashboard reconcile failed"),
        }
        outcomes.push(DashboardOutcome {
            display_name: def.display_name.clone(),
            result,
        });
    }
    outcomes
}

async fn reconcile_one<S: DashboardStore>(
    def: &DashboardDefinition,
    store: &S,
) -> std::result::Result<SyncAction, ReconcileError> {
    let store_err = |operation: &'static str| {
        let display_name = def.display_name.clone();
        move |source: StoreError| ReconcileError::Store {
            display_name,
            operation,
            source,
        }
    };

    let inventory = match store.list().await {
        Ok(items) => items,
        Err(StoreError::NotFound(_)) => Vec::new(),
        Err(e) => return Err(store_err("list")(e)),
    };

    // Remote duplicates are pre-existing drift; the first match is used.
    let Some(existing) = inventory
        .iter()
        .find(|r| r.display_name == def.display_name)
    else {
        return create(def, store).await;
    };

    let described = match store.describe(&existing.name).await {
        Ok(d) => d,
        Err(StoreError::NotFound(_)) => {
            debug!(name = %existing.name, "listed dashboard vanished before describe");
            return create(def, store).await;
        }
        Err(e) => return Err(store_err("describe")(e)),
    };

    if def.matches_remote(&described.body) {
        return Ok(SyncAction::Unchanged {
            name: existing.name.clone(),
        });
    }

    let body = def.update_body(&existing.name, &described.etag);
    match store.update(&existing.name, &described.etag, &body).await {
        Ok(()) => Ok(SyncAction::Updated {
            name: existing.name.clone(),
        }),
        Err(StoreError::EtagMismatch(_)) => Err(ReconcileError::ConcurrentModification {
            display_name: def.display_name.clone(),
        }),
        Err(e) => Err(store_err("update")(e)),
    }
}

async fn create<S: DashboardStore>(
    def: &DashboardDefinition,
    store: &S,
) -> std::result::Result<SyncAction, ReconcileError> {
    let name = store
        .create(&def.creation_body())
        .await
        .map_err(|source| ReconcileError::Store {
            display_name: def.display_name.clone(),
            operation: "create",
            source,
        })?;
    Ok(SyncAction::Created { name })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Debug, Clone)]
    struct Stored {
        name: String,
        etag: u32,
        body: Value,
    }

    /// In-memory store that mimics server behavior: bodies come back with
    /// `name` and `etag` filled in, and updates check the etag.
    #[derive(Default)]
    struct FakeStore {
        items: Mutex<Vec<Stored>>,
        calls: Mutex<Vec<String>>,
        /// Simulates another writer landing between describe and update.
        concurrent_writer: AtomicBool,
        fail_create: Mutex<Option<String>>,
    }

    impl FakeStore {
        fn seed(&self, name: &str, body: Value) {
            self.items.lock().unwrap().push(Stored {
                name: name.to_string(),
                etag: 1,
                body,
            });
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn clear_calls(&self) {
            self.calls.lock().unwrap().clear();
        }

        fn mutating_calls(&self) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter(|c| c.starts_with("update") || c.starts_with("create"))
                .collect()
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    impl DashboardStore for FakeStore {
        async fn list(&self) -> std::result::Result<Vec<RemoteDashboardSummary>, StoreError> {
            self.record("list".into());
            Ok(self
                .items
                .lock()
                .unwrap()
                .iter()
                .map(|s| RemoteDashboardSummary {
                    name: s.name.clone(),
                    display_name: s.body["displayName"].as_str().unwrap_or("").to_string(),
                })
                .collect())
        }

        async fn describe(
            &self,
            name: &str,
        ) -> std::result::Result<DescribedDashboard, StoreError> {
            self.record(format!("describe:{name}"));
            let items = self.items.lock().unwrap();
            let item = items
                .iter()
                .find(|s| s.name == name)
                .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
            let mut body = item.body.clone();
            body["name"] = json!(item.name);
            body["etag"] = json!(item.etag.to_string());
            Ok(DescribedDashboard {
                etag: item.etag.to_string(),
                body,
            })
        }

        async fn update(
            &self,
            name: &str,
            etag: &str,
            body: &Value,
        ) -> std::result::Result<(), StoreError> {
            self.record(format!("update:{name}:{etag}"));
            let mut items = self.items.lock().unwrap();
            let item = items
                .iter_mut()
                .find(|s| s.name == name)
                .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
            if self.concurrent_writer.swap(false, Ordering::SeqCst) {
                item.etag += 1;
            }
            if item.etag.to_string() != etag || body["etag"] != json!(etag) {
                return Err(StoreError::EtagMismatch(name.to_string()));
            }
            item.body = strip_server_fields(body);
            item.etag += 1;
            Ok(())
        }

        async fn create(&self, body: &Value) -> std::result::Result<String, StoreError> {
            let display = body["displayName"].as_str().unwrap_or("").to_string();
            self.record(format!("create:{display}"));
            if self.fail_create.lock().unwrap().as_deref() == Some(display.as_str()) {
                return Err(StoreError::Unavailable("quota exceeded".into()));
            }
            assert!(body.get("name").is_none(), "create must not carry a name");
            assert!(body.get("etag").is_none(), "create must not carry an etag");
            let mut items = self.items.lock().unwrap();
            let name = format!("projects/demo/dashboards/{}", items.len() + 1);
            items.push(Stored {
                name: name.clone(),
                etag: 1,
                body: body.clone(),
            });
            Ok(name)
        }
    }

    fn def(display_name: &str, widgets: u32) -> DashboardDefinition {
        DashboardDefinition::from_value(
            format!("{display_name}.json"),
            json!({
                "displayName": display_name,
                "gridLayout": { "columns": widgets },
            }),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn unmatched_definition_is_created() {
        let store = FakeStore::default();
        store.seed("projects/demo/dashboards/x", json!({"displayName": "Other"}));
        let outcomes = reconcile(&[def("Frontend", 2)], &store).await;
        assert!(matches!(
            outcomes[0].result,
            Ok(SyncAction::Created { .. })
        ));
        assert_eq!(store.calls(), vec!["list", "create:Frontend"]);
    }

    #[tokio::test]
    async fn matched_definition_is_described_then_updated_with_fresh_etag() {
        let store = FakeStore::default();
        store.seed(
            "projects/demo/dashboards/7",
            json!({"displayName": "Frontend", "gridLayout": {"columns": 1}}),
        );
        // Bump the stored etag so a value cached from list time would be stale.
        store.items.lock().unwrap()[0].etag = 4;

        let outcomes = reconcile(&[def("Frontend", 2)], &store).await;
        assert_eq!(
            outcomes[0].result.as_ref().unwrap(),
            &SyncAction::Updated {
                name: "projects/demo/dashboards/7".into()
            }
        );
        assert_eq!(
            store.calls(),
            vec![
                "list",
                "describe:projects/demo/dashboards/7",
                "update:projects/demo/dashboards/7:4",
            ]
        );
        assert_eq!(
            store.items.lock().unwrap()[0].body["gridLayout"]["columns"],
            json!(2)
        );
    }

    #[tokio::test]
    async fn second_pass_without_drift_mutates_nothing() {
        let store = FakeStore::default();
        let defs = vec![def("Frontend", 2), def("Checkout", 3)];

        let first = reconcile(&defs, &store).await;
        assert!(first.iter().all(|o| o.result.is_ok()));
        assert_eq!(store.mutating_calls().len(), 2);

        store.clear_calls();
        let second = reconcile(&defs, &store).await;
        assert!(second
            .iter()
            .all(|o| matches!(o.result, Ok(SyncAction::Unchanged { .. }))));
        assert!(store.mutating_calls().is_empty());

        store.clear_calls();
        let third = reconcile(&defs, &store).await;
        let names = |v: &[DashboardOutcome]| -> Vec<String> {
            v.iter()
                .map(|o| o.result.as_ref().unwrap().name().to_string())
                .collect()
        };
        assert_eq!(names(&second), names(&third));
    }

    #[tokio::test]
    async fn padded_display_name_is_matched_exactly_on_resync() {
        let store = FakeStore::default();
        let defs = vec![def("Frontend ", 2)];

        let first = reconcile(&defs, &store).await;
        assert!(matches!(first[0].result, Ok(SyncAction::Created { .. })));

        store.clear_calls();
        let second = reconcile(&defs, &store).await;
        assert_eq!(
            second[0].result.as_ref().unwrap(),
            &SyncAction::Unchanged {
                name: first[0].result.as_ref().unwrap().name().to_string()
            }
        );
        assert!(store.mutating_calls().is_empty());
        assert_eq!(store.items.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn padded_display_name_does_not_match_trimmed_remote() {
        let store = FakeStore::default();
        store.seed("projects/demo/dashboards/a", json!({"displayName": "Frontend"}));
        let outcomes = reconcile(&[def(" Frontend", 1)], &store).await;
        assert!(matches!(outcomes[0].result, Ok(SyncAction::Created { .. })));
    }

    #[tokio::test]
    async fn stale_etag_surfaces_concurrent_modification_without_retry() {
        let store = FakeStore::default();
        store.seed(
            "projects/demo/dashboards/1",
            json!({"displayName": "Frontend", "gridLayout": {"columns": 1}}),
        );
        store.concurrent_writer.store(true, Ordering::SeqCst);

        let outcomes = reconcile(&[def("Frontend", 2)], &store).await;
        let err = outcomes[0].result.as_ref().unwrap_err();
        assert!(matches!(err, ReconcileError::ConcurrentModification { .. }));
        assert!(err.is_retryable());
        let updates = store
            .calls()
            .iter()
            .filter(|c| c.starts_with("update"))
            .count();
        assert_eq!(updates, 1, "reconciler must not retry internally");

        let rerun = reconcile(&[def("Frontend", 2)], &store).await;
        assert!(matches!(rerun[0].result, Ok(SyncAction::Updated { .. })));
    }

    #[tokio::test]
    async fn one_failure_does_not_block_the_rest() {
        let store = FakeStore::default();
        *store.fail_create.lock().unwrap() = Some("Broken".into());
        let outcomes = reconcile(&[def("Broken", 1), def("Healthy", 1)], &store).await;
        assert_eq!(outcomes.len(), 2);
        let err = outcomes[0].result.as_ref().unwrap_err();
        assert_eq!(err.kind(), "store");
        assert!(!err.is_retryable());
        assert!(matches!(outcomes[1].result, Ok(SyncAction::Created { .. })));
    }

    #[tokio::test]
    async fn first_remote_match_wins_on_remote_duplicates() {
        let store = FakeStore::default();
        store.seed("projects/demo/dashboards/a", json!({"displayName": "Frontend"}));
        store.seed("projects/demo/dashboards/b", json!({"displayName": "Frontend"}));
        let outcomes = reconcile(&[def("Frontend", 2)], &store).await;
        assert_eq!(
            outcomes[0].result.as_ref().unwrap().name(),
            "projects/demo/dashboards/a"
        );
    }

    #[test]
    fn update_body_overwrites_server_fields() {
        let d = DashboardDefinition::from_value(
            "x.json",
            json!({"displayName": "X", "name": "local", "etag": "old"}),
        )
        .unwrap();
        let body = d.update_body("projects/p/dashboards/9", "e42");
        assert_eq!(body["name"], json!("projects/p/dashboards/9"));
        assert_eq!(body["etag"], json!("e42"));
        let created = d.creation_body();
        assert!(created.get("name").is_none());
        assert!(created.get("etag").is_none());
    }

    #[test]
    fn definition_requires_display_name() {
        let err = DashboardDefinition::from_value("a.json", json!({"gridLayout": {}})).unwrap_err();
        assert!(matches!(err, RollgateError::MissingDisplayName(_)));
        let err = DashboardDefinition::from_value("b.json", json!([1, 2])).unwrap_err();
        assert!(err.to_string().contains("JSON object"));
    }

    #[test]
    fn display_name_is_kept_verbatim_but_blank_is_missing() {
        let d = DashboardDefinition::from_value("a.json", json!({"displayName": "  Latency "}))
            .unwrap();
        assert_eq!(d.display_name, "  Latency ");
        let err = DashboardDefinition::from_value("b.json", json!({"displayName": "   "}))
            .unwrap_err();
        assert!(matches!(err, RollgateError::MissingDisplayName(_)));
    }

    #[test]
    fn names_differing_only_in_whitespace_are_not_duplicates() {
        let defs = resolve_duplicates(
            vec![def("Frontend", 1), def("Frontend ", 2)],
            DuplicatePolicy::Reject,
        )
        .unwrap();
        assert_eq!(defs.len(), 2);
    }

    #[test]
    fn duplicates_rejected_by_default() {
        let err = resolve_duplicates(
            vec![def("Frontend", 1), def("Frontend", 2)],
            DuplicatePolicy::default(),
        )
        .unwrap_err();
        assert!(matches!(err, RollgateError::DuplicateDisplayName { .. }));
    }

    #[test]
    fn duplicates_last_wins_when_configured() {
        let defs = resolve_duplicates(
            vec![def("Frontend", 1), def("Checkout", 1), def("Frontend", 2)],
            DuplicatePolicy::LastWins,
        )
        .unwrap();
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].display_name, "Checkout");
        assert_eq!(defs[1].body["gridLayout"]["columns"], json!(2));
    }

    #[test]
    fn load_definitions_reads_json_in_file_order() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("b-frontend.json"),
            r#"{"displayName": "Frontend"}"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("a-checkout.json"),
            r#"{"displayName": "Checkout"}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("README.md"), "not a dashboard").unwrap();

        let defs = load_definitions(dir.path()).unwrap();
        let names: Vec<_> = defs.iter().map(|d| d.display_name.as_str()).collect();
        assert_eq!(names, vec!["Checkout", "Frontend"]);
    }

    #[test]
    fn load_definitions_skips_directories_named_like_json() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("archive.json")).unwrap();
        std::fs::write(dir.path().join("a.json"), r#"{"displayName": "A"}"#).unwrap();
        let defs = load_definitions(dir.path()).unwrap();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].source, dir.path().join("a.json").display().to_string());
    }

    #[test]
    fn load_definitions_reports_bad_json_with_path() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("broken.json"), "{ nope").unwrap();
        let err = load_definitions(dir.path()).unwrap_err();
        assert!(err.to_string().contains("broken.json"));
    }

    #[test]
    fn load_definitions_missing_dir_is_config_error() {
        let dir = TempDir::new().unwrap();
        let err = load_definitions(&dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, RollgateError::Config(_)));
    }
}
