//! Controller for NginxOperator resources
//!
//! The reconcile loop follows the Kubernetes controller pattern: observe the
//! desired state, compute the Deployment it implies, apply it, and report.

mod client;
mod context;
mod operator;
mod ownership;

pub use client::{KubeClient, KubeClientImpl};
pub use context::{Context, ContextBuilder, OperatorConfig};
pub use operator::{
    apply_overrides, error_policy, reconcile, reconcile_identity, CONDITION_DEGRADED,
    REASON_DEPLOYMENT_NOT_AVAILABLE, REASON_OPERATOR_NOT_AVAILABLE, REASON_SUCCEEDED,
    REASON_UPDATE_FAILED,
};
pub use ownership::{set_controller_reference, Scheme};
