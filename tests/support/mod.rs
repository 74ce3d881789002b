//! In-memory object store for driving the reconcile loop without a cluster
//!
//! Every write bumps a global resourceVersion counter. Writes carrying a
//! stale resourceVersion fail with `Conflict`, and a configurable number of
//! conflicts can be injected to simulate a competing writer.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use kube::ResourceExt;

use nginx_operator::controller::{Context, KubeClient};
use nginx_operator::crd::{NginxOperator, NginxOperatorSpec};
use nginx_operator::retry::Sleeper;
use nginx_operator::Error;

/// Calls observed by the store, in order
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    GetOperator,
    GetDeployment,
    CreateDeployment,
    UpdateDeployment,
    UpdateStatus,
}

impl Call {
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Call::CreateDeployment | Call::UpdateDeployment | Call::UpdateStatus
        )
    }
}

type Key = (String, String);

#[derive(Default)]
struct State {
    version: u64,
    operators: BTreeMap<Key, NginxOperator>,
    deployments: BTreeMap<Key, Deployment>,
    injected_conflicts: u32,
    calls: Vec<Call>,
}

impl State {
    fn next_version(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }
}

/// Versioned in-memory implementation of [`KubeClient`]
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Store an NginxOperator, assigning uid and resourceVersion
    pub fn put_operator(&self, namespace: &str, name: &str, spec: NginxOperatorSpec) {
        let mut state = self.state.lock().unwrap();
        let mut op = NginxOperator::new(name, spec);
        op.metadata.namespace = Some(namespace.to_string());
        op.metadata.uid = Some(format!("uid-{namespace}-{name}"));
        op.metadata.resource_version = Some(state.next_version());
        state
            .operators
            .insert((namespace.to_string(), name.to_string()), op);
    }

    /// Store a Deployment directly, bypassing create semantics
    pub fn put_deployment(&self, mut deployment: Deployment) {
        let mut state = self.state.lock().unwrap();
        deployment.metadata.resource_version = Some(state.next_version());
        let key = (
            deployment.namespace().unwrap_or_default(),
            deployment.name_any(),
        );
        state.deployments.insert(key, deployment);
    }

    /// Make the next `n` Deployment updates lose a race with another writer
    pub fn inject_conflicts(&self, n: u32) {
        self.state.lock().unwrap().injected_conflicts = n;
    }

    pub fn operator(&self, namespace: &str, name: &str) -> Option<NginxOperator> {
        let state = self.state.lock().unwrap();
        state
            .operators
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn deployment(&self, namespace: &str, name: &str) -> Option<Deployment> {
        let state = self.state.lock().unwrap();
        state
            .deployments
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    fn record(&self, call: Call) -> std::sync::MutexGuard<'_, State> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        state
    }
}

fn key_of(deployment: &Deployment) -> Key {
    (
        deployment.namespace().unwrap_or_default(),
        deployment.name_any(),
    )
}

#[async_trait]
impl KubeClient for InMemoryStore {
    async fn get_operator(&self, namespace: &str, name: &str) -> Result<NginxOperator, Error> {
        let state = self.record(Call::GetOperator);
        state
            .operators
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| Error::not_found("NginxOperator", name))
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment, Error> {
        let state = self.record(Call::GetDeployment);
        state
            .deployments
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| Error::not_found("Deployment", name))
    }

    async fn create_deployment(&self, deployment: &Deployment) -> Result<(), Error> {
        let mut state = self.record(Call::CreateDeployment);
        let key = key_of(deployment);
        if state.deployments.contains_key(&key) {
            return Err(Error::already_exists("Deployment", key.1));
        }
        let mut stored = deployment.clone();
        stored.metadata.resource_version = Some(state.next_version());
        state.deployments.insert(key, stored);
        Ok(())
    }

    async fn update_deployment(&self, deployment: &Deployment) -> Result<(), Error> {
        let mut state = self.record(Call::UpdateDeployment);
        let key = key_of(deployment);
        if !state.deployments.contains_key(&key) {
            return Err(Error::not_found("Deployment", key.1));
        }

        if state.injected_conflicts > 0 {
            state.injected_conflicts -= 1;
            let version = state.next_version();
            if let Some(stored) = state.deployments.get_mut(&key) {
                stored.metadata.resource_version = Some(version);
            }
            return Err(Error::conflict("Deployment", key.1, "object was modified"));
        }

        let current = state
            .deployments
            .get(&key)
            .and_then(|d| d.metadata.resource_version.clone());
        if deployment.metadata.resource_version != current {
            return Err(Error::conflict("Deployment", key.1, "stale resourceVersion"));
        }

        let mut stored = deployment.clone();
        stored.metadata.resource_version = Some(state.next_version());
        state.deployments.insert(key, stored);
        Ok(())
    }

    async fn update_operator_status(&self, operator: &NginxOperator) -> Result<(), Error> {
        let mut state = self.record(Call::UpdateStatus);
        let key = (operator.namespace().unwrap_or_default(), operator.name_any());
        let version = state.next_version();
        let stored = state
            .operators
            .get_mut(&key)
            .ok_or_else(|| Error::not_found("NginxOperator", operator.name_any()))?;

        if operator.metadata.resource_version.is_some()
            && operator.metadata.resource_version != stored.metadata.resource_version
        {
            return Err(Error::conflict(
                "NginxOperator",
                operator.name_any(),
                "stale resourceVersion",
            ));
        }

        stored.status = operator.status.clone();
        stored.metadata.resource_version = Some(version);
        Ok(())
    }
}

/// Sleeper that returns immediately
pub struct NoSleep;

#[async_trait]
impl Sleeper for NoSleep {
    async fn sleep(&self, _duration: Duration) {}
}

/// Context wired to the store, with retries that never wait
pub fn context(store: &Arc<InMemoryStore>) -> Context {
    Context::builder(store.clone())
        .sleeper(Arc::new(NoSleep))
        .build()
        .expect("context builds")
}
