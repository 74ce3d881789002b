//! NginxOperator Custom Resource Definition
//!
//! An NginxOperator declares the desired shape of a single nginx Deployment
//! in its namespace. Unset fields fall back to the values in the embedded
//! manifest.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{find_condition, set_condition, Condition};

/// Specification for an NginxOperator
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "operator.example.com",
    version = "v1alpha1",
    kind = "NginxOperator",
    plural = "nginxoperators",
    shortname = "nginxop",
    status = "NginxOperatorStatus",
    namespaced,
    printcolumn = r#"{"name":"Replicas","type":"integer","jsonPath":".spec.replicas"}"#,
    printcolumn = r#"{"name":"Port","type":"integer","jsonPath":".spec.port"}"#,
    printcolumn = r#"{"name":"Degraded","type":"string","jsonPath":".status.conditions[?(@.type==\"OperatorDegraded\")].status"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct NginxOperatorSpec {
    /// Number of nginx replicas; the manifest default is used when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 0))]
    pub replicas: Option<i32>,

    /// Container port nginx listens on; the manifest default is used when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 1, max = 65535))]
    pub port: Option<i32>,
}

/// Status for an NginxOperator
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NginxOperatorStatus {
    /// Conditions, at most one per type
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl NginxOperatorStatus {
    /// Look up a condition by type
    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        find_condition(&self.conditions, type_)
    }

    /// Replace-or-append a condition
    pub fn set_condition(&mut self, condition: Condition) {
        set_condition(&mut self.conditions, condition);
    }
}

impl NginxOperator {
    /// Set a condition, creating the status block if needed
    pub fn set_condition(&mut self, condition: Condition) {
        self.status
            .get_or_insert_with(NginxOperatorStatus::default)
            .set_condition(condition);
    }

    /// Look up a condition by type
    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.status.as_ref().and_then(|s| s.condition(type_))
    }
}
