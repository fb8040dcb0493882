use crate::error::{KubeError, Result};
use crate::rollout::deployment_rollout_status;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{ListParams, PostParams};
use kube::{Api, Client};
use rollgate_core::readiness::{OrchestratorError, RolloutStatus, Workload, WorkloadOrchestrator};
use tracing::{debug, info};

/// Namespace whose UID serves as the cluster's incarnation token. It exists
/// from cluster creation and is never deleted, so its UID changes only when
/// the cluster itself is recreated.
const IDENTITY_NAMESPACE: &str = "kube-system";

/// Deployments in a namespace, observed through the Kubernetes API.
#[derive(Clone)]
pub struct KubeOrchestrator {
    client: Client,
}

impl KubeOrchestrator {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect using the ambient kubeconfig or in-cluster service account.
    pub async fn connect() -> Result<Self> {
        let client = Client::try_default().await?;
        Ok(Self::new(client))
    }

    /// Opaque token for the current incarnation of the cluster.
    pub async fn cluster_identity(&self) -> Result<String> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        let ns = namespaces.get(IDENTITY_NAMESPACE).await?;
        ns.metadata.uid.ok_or_else(|| {
            KubeError::ClusterIdentity(format!("namespace {IDENTITY_NAMESPACE} has no uid"))
        })
    }

    /// Create `name` if it does not exist. Returns true when it was created.
    pub async fn ensure_namespace(&self, name: &str) -> Result<bool> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        if namespaces.get_opt(name).await?.is_some() {
            debug!(namespace = name, "namespace exists");
            return Ok(false);
        }
        let ns = Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        match namespaces.create(&PostParams::default(), &ns).await {
            Ok(_) => {
                info!(namespace = name, "namespace created");
                Ok(true)
            }
            // Lost a race with another creator; the namespace is there either way.
            Err(kube::Error::Api(resp)) if resp.code == 409 => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn deployments(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

impl WorkloadOrchestrator for KubeOrchestrator {
    async fn list_workloads(
        &self,
        namespace: &str,
    ) -> std::result::Result<Vec<Workload>, OrchestratorError> {
        let list = self
            .deployments(namespace)
            .list(&ListParams::default())
            .await
            .map_err(|e| OrchestratorError(e.to_string()))?;
        Ok(list
            .items
            .into_iter()
            .filter_map(|d| d.metadata.name)
            .map(Workload::deployment)
            .collect())
    }

    async fn rollout_status(
        &self,
        namespace: &str,
        workload: &str,
    ) -> std::result::Result<RolloutStatus, OrchestratorError> {
        let deployment = self
            .deployments(namespace)
            .get_opt(workload)
            .await
            .map_err(|e| OrchestratorError(e.to_string()))?;
        Ok(match deployment {
            Some(d) => deployment_rollout_status(&d),
            None => RolloutStatus::Failed(format!(
                "deployment {workload:?} no longer exists in {namespace}"
            )),
        })
    }
}
