//! NginxOperator controller implementation
//!
//! Each reconcile reads the NginxOperator, renders the Deployment it asks for,
//! creates it or overwrites the existing Deployment's spec under optimistic
//! concurrency, and records the outcome as the `OperatorDegraded` condition.

use std::sync::Arc;

use k8s_openapi::api::apps::v1::Deployment;
use kube::runtime::controller::Action;
use kube::ResourceExt;
use tracing::{debug, error, info, instrument, warn};

use crate::crd::{Condition, ConditionStatus, NginxOperator, NginxOperatorSpec};
use crate::metrics::{self, ReconcileTimer};
use crate::retry::retry_on_conflict;
use crate::template::DeploymentParams;
use crate::Error;

use super::context::Context;
use super::ownership::set_controller_reference;

/// Condition type reported on every reconcile
pub const CONDITION_DEGRADED: &str = "OperatorDegraded";
/// The NginxOperator could not be read
pub const REASON_OPERATOR_NOT_AVAILABLE: &str = "OperatorResourceNotAvailable";
/// The Deployment could not be created
pub const REASON_DEPLOYMENT_NOT_AVAILABLE: &str = "OperandDeploymentNotAvailable";
/// The Deployment could not be updated
pub const REASON_UPDATE_FAILED: &str = "OperandUpdateDeploymentFailed";
/// The Deployment matches the NginxOperator
pub const REASON_SUCCEEDED: &str = "OperatorSucceeded";

/// Reconcile an NginxOperator
///
/// Entry point for `kube::runtime::Controller`. Re-reads the object by
/// identity so the loop always acts on the latest stored spec.
#[instrument(skip(operator, ctx), fields(operator = %operator.name_any()))]
pub async fn reconcile(operator: Arc<NginxOperator>, ctx: Arc<Context>) -> Result<Action, Error> {
    let timer = ReconcileTimer::start();
    let name = operator.name_any();
    let namespace = operator
        .namespace()
        .ok_or_else(|| Error::serialization(format!("NginxOperator {name} has no namespace")))?;

    let result = match ctx.config.reconcile_timeout {
        Some(after) => tokio::time::timeout(after, reconcile_identity(&namespace, &name, &ctx))
            .await
            .unwrap_or(Err(Error::DeadlineExceeded { after })),
        None => reconcile_identity(&namespace, &name, &ctx).await,
    };

    match &result {
        Ok(_) => timer.success(),
        Err(_) => timer.error(),
    }
    result
}

/// One pass of the fetch, render, apply, report sequence for a single identity
pub async fn reconcile_identity(
    namespace: &str,
    name: &str,
    ctx: &Context,
) -> Result<Action, Error> {
    let mut operator = match ctx.guard(ctx.kube.get_operator(namespace, name)).await {
        Ok(operator) => operator,
        Err(e) if e.is_not_found() => {
            info!("NginxOperator no longer exists, nothing to reconcile");
            return Ok(Action::await_change());
        }
        Err(e) => {
            warn!(error = %e, "Unable to read NginxOperator");
            let mut stub = NginxOperator::new(name, NginxOperatorSpec::default());
            stub.metadata.namespace = Some(namespace.to_string());
            stub.set_condition(degraded(
                REASON_OPERATOR_NOT_AVAILABLE,
                format!("unable to get operator custom resource: {e}"),
            ));
            return Err(report_failure(ctx, &stub, e).await);
        }
    };

    let mut target = render_target(&operator, namespace, ctx)?;
    set_controller_reference(&ctx.scheme, &operator, &mut target.metadata)?;

    let stored = operator.status.clone();
    let was_degraded = operator
        .condition(CONDITION_DEGRADED)
        .is_some_and(Condition::is_true);

    let primary = match create_or_update(&target, &operator, ctx).await {
        Ok(()) => {
            operator.set_condition(Condition::new(
                CONDITION_DEGRADED,
                ConditionStatus::False,
                REASON_SUCCEEDED,
                "operator successfully reconciling",
            ));
            None
        }
        Err(ApplyError::Fetch(e)) => return Err(e),
        Err(ApplyError::Create(e)) => {
            operator.set_condition(degraded(
                REASON_DEPLOYMENT_NOT_AVAILABLE,
                format!("unable to get operand deployment: {e}"),
            ));
            Some(e)
        }
        Err(ApplyError::Update(e)) => {
            operator.set_condition(degraded(
                REASON_UPDATE_FAILED,
                format!("unable to update deployment: {e}"),
            ));
            Some(e)
        }
    };

    // Every status write bumps resourceVersion and re-triggers the watch.
    let status_err = match &primary {
        Some(Error::Cancelled) => None,
        _ if operator.status == stored => {
            debug!("Status unchanged, skipping write");
            None
        }
        _ => ctx
            .guard(ctx.kube.update_operator_status(&operator))
            .await
            .inspect_err(|e| warn!(error = %e, "Unable to persist status"))
            .err(),
    };
    Error::aggregate(primary.into_iter().chain(status_err))?;

    if was_degraded {
        info!("NginxOperator recovered");
    }
    info!(
        deployment = %target.name_any(),
        replicas = ?target.spec.as_ref().and_then(|s| s.replicas),
        "NginxOperator reconciled"
    );
    Ok(Action::requeue(ctx.config.resync_interval))
}

fn degraded(reason: &str, message: String) -> Condition {
    Condition::new(CONDITION_DEGRADED, ConditionStatus::True, reason, message)
}

/// Persist the degraded condition for an NginxOperator that could not be
/// read, returning the fetch error with the status-write error attached if
/// that failed too.
async fn report_failure(ctx: &Context, operator: &NginxOperator, primary: Error) -> Error {
    if matches!(primary, Error::Cancelled) {
        return primary;
    }
    match ctx.guard(ctx.kube.update_operator_status(operator)).await {
        Ok(()) => primary,
        Err(status_err) => {
            warn!(error = %status_err, "Unable to persist degraded condition");
            primary.with(status_err)
        }
    }
}

/// Render the Deployment the NginxOperator asks for
fn render_target(
    operator: &NginxOperator,
    namespace: &str,
    ctx: &Context,
) -> Result<Deployment, Error> {
    let mut target = ctx
        .renderer
        .render(&DeploymentParams::default())
        .inspect_err(|e| error!(error = %e, "Unable to render Deployment manifest"))?;
    target.metadata.namespace = Some(namespace.to_string());
    apply_overrides(&mut target, &operator.spec);
    Ok(target)
}

/// Apply the NginxOperator's optional overrides to a rendered Deployment
///
/// Replicas are always applied when set. The port only replaces the first
/// container's first port, and only when that slot exists.
pub fn apply_overrides(deployment: &mut Deployment, spec: &NginxOperatorSpec) {
    if let Some(replicas) = spec.replicas {
        deployment.spec.get_or_insert_with(Default::default).replicas = Some(replicas);
    }

    if let Some(port) = spec.port {
        let slot = deployment
            .spec
            .as_mut()
            .and_then(|s| s.template.spec.as_mut())
            .and_then(|pod| pod.containers.first_mut())
            .and_then(|container| container.ports.as_mut())
            .and_then(|ports| ports.first_mut());
        match slot {
            Some(slot) => slot.container_port = port,
            None => debug!(port, "Template has no container port to override"),
        }
    }
}

/// Which step of create-or-update failed
#[derive(Debug)]
enum ApplyError {
    /// Create failed with something other than AlreadyExists
    Create(Error),
    /// The existing Deployment could not be read before updating
    Fetch(Error),
    /// The update failed or ran out of conflict retries
    Update(Error),
}

async fn create_or_update(
    target: &Deployment,
    owner: &NginxOperator,
    ctx: &Context,
) -> Result<(), ApplyError> {
    match ctx.guard(ctx.kube.create_deployment(target)).await {
        Ok(()) => {
            info!(deployment = %target.name_any(), "Created Deployment");
            Ok(())
        }
        Err(e) if e.is_already_exists() => {
            debug!(deployment = %target.name_any(), "Deployment exists, updating");
            update_existing(target, owner, ctx).await
        }
        Err(e) => Err(ApplyError::Create(e)),
    }
}

/// Overwrite the stored Deployment's spec, retrying on version conflicts
///
/// Each attempt re-reads the object so the write carries its latest
/// resourceVersion. A Deployment controlled by another object is left alone.
async fn update_existing(
    target: &Deployment,
    owner: &NginxOperator,
    ctx: &Context,
) -> Result<(), ApplyError> {
    let name = target.name_any();
    let namespace = target.namespace().unwrap_or_default();

    ctx.guard(ctx.kube.get_deployment(&namespace, &name))
        .await
        .map_err(ApplyError::Fetch)?;

    let (name, namespace) = (name.as_str(), namespace.as_str());
    retry_on_conflict(
        &ctx.retry,
        ctx.sleeper.as_ref(),
        "update_deployment",
        move || async move {
            let mut current = ctx.guard(ctx.kube.get_deployment(namespace, name)).await?;
            set_controller_reference(&ctx.scheme, owner, &mut current.metadata)?;
            current.spec = target.spec.clone();
            ctx.guard(ctx.kube.update_deployment(&current))
                .await
                .inspect_err(|e| {
                    if e.is_conflict() {
                        metrics::record_update_conflict();
                    }
                })
        },
    )
    .await
    .map_err(ApplyError::Update)
}

/// Error policy for the controller
///
/// Failures that retrying cannot fix wait for the resync interval; everything
/// else is retried after the short error requeue.
pub fn error_policy(operator: Arc<NginxOperator>, error: &Error, ctx: Arc<Context>) -> Action {
    error!(
        operator = %operator.name_any(),
        error = %error,
        kind = error.kind_label(),
        "Reconciliation failed"
    );
    metrics::record_reconcile_error(error.kind_label());

    if error.is_retryable() {
        Action::requeue(ctx.config.error_requeue)
    } else {
        Action::requeue(ctx.config.resync_interval)
    }
}
