//! nginx-operator - keeps an nginx Deployment in line with an NginxOperator resource
//!
//! Each `NginxOperator` custom resource declares the replica count and container
//! port of one nginx Deployment in its namespace. The controller renders the
//! Deployment from an embedded manifest, applies those overrides, creates or
//! updates it under optimistic concurrency, and reports the outcome through an
//! `OperatorDegraded` status condition.
//!
//! # Modules
//!
//! - [`crd`] - The NginxOperator Custom Resource Definition and status conditions
//! - [`controller`] - Reconcile loop, client abstraction, owner references
//! - [`template`] - Embedded Deployment manifest and renderer
//! - [`retry`] - Backoff for optimistic-concurrency conflicts
//! - [`metrics`] - OpenTelemetry instruments
//! - [`telemetry`] - Logging and OTLP export setup
//! - [`error`] - Error types for the operator

#![deny(missing_docs)]

pub mod controller;
pub mod crd;
pub mod error;
pub mod metrics;
pub mod retry;
pub mod telemetry;
pub mod template;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Field manager recorded on every write the operator makes
pub const DEFAULT_FIELD_MANAGER: &str = "nginx-operator";

/// Timeout for the Kubernetes watch request, kept under common proxy idle limits
pub const WATCH_TIMEOUT_SECS: u32 = 25;
