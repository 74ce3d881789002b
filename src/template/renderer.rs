//! Deployment renderer
//!
//! Renders the embedded nginx manifest with minijinja and decodes the
//! result into a typed Deployment. Rendering is pure and deterministic: the
//! same parameters always produce the same object.

use k8s_openapi::api::apps::v1::Deployment;
use minijinja::{context, Environment, UndefinedBehavior};
use serde::{Deserialize, Serialize};

use super::error::TemplateError;

/// Name of the embedded nginx Deployment manifest
pub const DEPLOYMENT_MANIFEST: &str = "manifests/nginx_deployment.yaml";

/// Manifests compiled into the binary
const ASSETS: &[(&str, &str)] = &[(
    DEPLOYMENT_MANIFEST,
    include_str!("../../manifests/nginx_deployment.yaml"),
)];

/// Parameters substituted into the manifest
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentParams {
    /// Replica count written into `spec.replicas`
    pub replicas: i32,
    /// Port written into the first container's first port
    pub port: i32,
    /// Container image
    pub image: String,
}

impl Default for DeploymentParams {
    fn default() -> Self {
        Self {
            replicas: 1,
            port: 80,
            image: "nginx:latest".to_string(),
        }
    }
}

/// Produces the managed Deployment from a parameter set
#[cfg_attr(test, mockall::automock)]
pub trait Renderer: Send + Sync {
    /// Render a Deployment
    fn render(&self, params: &DeploymentParams) -> Result<Deployment, TemplateError>;
}

/// Renderer backed by an embedded manifest
pub struct ManifestRenderer {
    env: Environment<'static>,
}

impl ManifestRenderer {
    /// Renderer for the embedded nginx Deployment manifest
    pub fn new() -> Result<Self, TemplateError> {
        Self::from_asset(DEPLOYMENT_MANIFEST)
    }

    /// Renderer for a named embedded manifest
    pub fn from_asset(name: &str) -> Result<Self, TemplateError> {
        let source = ASSETS
            .iter()
            .find(|(asset, _)| *asset == name)
            .map(|(_, source)| *source)
            .ok_or_else(|| TemplateError::MissingAsset(name.to_string()))?;
        Self::from_source(source)
    }

    /// Renderer for an arbitrary manifest source
    ///
    /// The template is compiled once here, so syntax errors surface at
    /// startup rather than on the first reconcile.
    pub fn from_source(source: impl Into<String>) -> Result<Self, TemplateError> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.add_template_owned(DEPLOYMENT_MANIFEST, source.into())
            .map_err(|e| TemplateError::Syntax(e.to_string()))?;
        Ok(Self { env })
    }
}

impl Renderer for ManifestRenderer {
    fn render(&self, params: &DeploymentParams) -> Result<Deployment, TemplateError> {
        let rendered = self.env.get_template(DEPLOYMENT_MANIFEST)?.render(context! {
            replicas => params.replicas,
            port => params.port,
            image => &params.image,
        })?;
        Ok(serde_yaml::from_str(&rendered)?)
    }
}
