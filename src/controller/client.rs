//! Typed access to the objects the operator reads and writes
//!
//! Every call is keyed by (namespace, name). API status codes are mapped
//! into the operator's error taxonomy by [`Error::from_kube`].

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};

#[cfg(test)]
use mockall::automock;

use crate::crd::NginxOperator;
use crate::Error;

const OPERATOR_KIND: &str = "NginxOperator";
const DEPLOYMENT_KIND: &str = "Deployment";

/// Trait abstracting Kubernetes client operations for the reconcile loop
///
/// This trait allows mocking the Kubernetes client in tests while using
/// the real client in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KubeClient: Send + Sync {
    /// Fetch an NginxOperator; `NotFound` if it was deleted
    async fn get_operator(&self, namespace: &str, name: &str) -> Result<NginxOperator, Error>;

    /// Fetch a Deployment; `NotFound` if it does not exist
    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment, Error>;

    /// Create a Deployment; `AlreadyExists` if one with the same name exists
    async fn create_deployment(&self, deployment: &Deployment) -> Result<(), Error>;

    /// Replace a Deployment
    ///
    /// The object's resourceVersion is sent as a precondition, so a stale
    /// object fails with `Conflict`.
    async fn update_deployment(&self, deployment: &Deployment) -> Result<(), Error>;

    /// Write the status subresource of an NginxOperator
    ///
    /// If the object carries a resourceVersion the write is conditional on
    /// it and may fail with `Conflict`.
    async fn update_operator_status(&self, operator: &NginxOperator) -> Result<(), Error>;
}

/// Real Kubernetes client implementation
pub struct KubeClientImpl {
    client: Client,
    field_manager: String,
}

impl KubeClientImpl {
    /// Create a new KubeClientImpl wrapping the given client
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }

    fn post_params(&self) -> PostParams {
        PostParams {
            dry_run: false,
            field_manager: Some(self.field_manager.clone()),
        }
    }
}

/// Namespace and name of an object about to be written
fn identity(deployment: &Deployment) -> Result<(String, String), Error> {
    let name = deployment.name_any();
    let namespace = deployment.namespace().ok_or_else(|| {
        Error::serialization(format!("{DEPLOYMENT_KIND} {name} has no namespace"))
    })?;
    Ok((namespace, name))
}

#[async_trait]
impl KubeClient for KubeClientImpl {
    async fn get_operator(&self, namespace: &str, name: &str) -> Result<NginxOperator, Error> {
        let api: Api<NginxOperator> = Api::namespaced(self.client.clone(), namespace);
        api.get(name)
            .await
            .map_err(|e| Error::from_kube(OPERATOR_KIND, name, e))
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment, Error> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        api.get(name)
            .await
            .map_err(|e| Error::from_kube(DEPLOYMENT_KIND, name, e))
    }

    async fn create_deployment(&self, deployment: &Deployment) -> Result<(), Error> {
        let (namespace, name) = identity(deployment)?;
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), &namespace);
        api.create(&self.post_params(), deployment)
            .await
            .map_err(|e| Error::from_kube(DEPLOYMENT_KIND, &name, e))?;
        Ok(())
    }

    async fn update_deployment(&self, deployment: &Deployment) -> Result<(), Error> {
        let (namespace, name) = identity(deployment)?;
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), &namespace);
        api.replace(&name, &self.post_params(), deployment)
            .await
            .map_err(|e| Error::from_kube(DEPLOYMENT_KIND, &name, e))?;
        Ok(())
    }

    async fn update_operator_status(&self, operator: &NginxOperator) -> Result<(), Error> {
        let name = operator.name_any();
        let namespace = operator.namespace().ok_or_else(|| {
            Error::serialization(format!("{OPERATOR_KIND} {name} has no namespace"))
        })?;
        let api: Api<NginxOperator> = Api::namespaced(self.client.clone(), &namespace);

        let mut status_patch = serde_json::json!({
            "status": operator.status,
        });
        if let Some(version) = operator.resource_version() {
            status_patch["metadata"] = serde_json::json!({ "resourceVersion": version });
        }

        api.patch_status(
            &name,
            &PatchParams {
                field_manager: Some(self.field_manager.clone()),
                ..Default::default()
            },
            &Patch::Merge(&status_patch),
        )
        .await
        .map_err(|e| Error::from_kube(OPERATOR_KIND, &name, e))?;

        Ok(())
    }
}
