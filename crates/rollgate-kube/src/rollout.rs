use k8s_openapi::api::apps::v1::Deployment;
use rollgate_core::readiness::RolloutStatus;

/// Derive a Deployment's rollout status the way `kubectl rollout status` does.
///
/// Until the controller has observed the latest generation nothing else in
/// the status can be trusted. After that, an exceeded progress deadline is a
/// hard failure; otherwise the rollout is complete once every desired
/// replica is updated, no old replicas remain and every updated replica is
/// available.
pub fn deployment_rollout_status(deployment: &Deployment) -> RolloutStatus {
    let name = deployment.metadata.name.as_deref().unwrap_or("<unnamed>");
    let generation = deployment.metadata.generation.unwrap_or(0);
    let Some(status) = deployment.status.as_ref() else {
        return RolloutStatus::InProgress(format!(
            "waiting for deployment {name:?} status to be reported"
        ));
    };

    if generation > status.observed_generation.unwrap_or(0) {
        return RolloutStatus::InProgress(format!(
            "waiting for deployment {name:?} spec update to be observed"
        ));
    }

    let deadline_exceeded = status
        .conditions
        .as_deref()
        .unwrap_or_default()
        .iter()
        .find(|c| c.type_ == "Progressing")
        .is_some_and(|c| c.reason.as_deref() == Some("ProgressDeadlineExceeded"));
    if deadline_exceeded {
        return RolloutStatus::Failed(format!(
            "deployment {name:?} exceeded its progress deadline"
        ));
    }

    let updated = status.updated_replicas.unwrap_or(0);
    let replicas = status.replicas.unwrap_or(0);
    let available = status.available_replicas.unwrap_or(0);

    if let Some(desired) = deployment.spec.as_ref().and_then(|s| s.replicas) {
        if updated < desired {
            return RolloutStatus::InProgress(format!(
                "{updated} out of {desired} new replicas have been updated"
            ));
        }
    }
    if replicas > updated {
        return RolloutStatus::InProgress(format!(
            "{} old replicas are pending termination",
            replicas - updated
        ));
    }
    if available < updated {
        return RolloutStatus::InProgress(format!(
            "{available} of {updated} updated replicas are available"
        ));
    }
    RolloutStatus::Succeeded
}
