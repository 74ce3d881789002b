//! Templating for the managed nginx Deployment
//!
//! The Deployment manifest is embedded at compile time and rendered with
//! minijinja in strict-undefined mode, so a parameter the manifest expects
//! but the caller did not provide is an error instead of an empty string.
//! The rendered YAML is decoded into `k8s_openapi`'s typed Deployment.

mod error;
mod renderer;

pub use error::TemplateError;
pub use renderer::{DeploymentParams, ManifestRenderer, Renderer, DEPLOYMENT_MANIFEST};

#[cfg(test)]
pub(crate) use renderer::MockRenderer;
