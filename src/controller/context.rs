//! Shared state handed to every reconcile

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::crd::NginxOperator;
use crate::retry::{RetryConfig, Sleeper, TokioSleeper};
use crate::template::{ManifestRenderer, Renderer};
use crate::{Error, DEFAULT_FIELD_MANAGER};

use super::client::KubeClient;
use super::ownership::Scheme;

/// Runtime settings for the operator
#[derive(Clone, Debug)]
pub struct OperatorConfig {
    /// Requeue delay after a successful reconcile
    pub resync_interval: Duration,
    /// Requeue delay after a failed reconcile
    pub error_requeue: Duration,
    /// Upper bound on a single reconcile, if any
    pub reconcile_timeout: Option<Duration>,
    /// Namespace to watch; all namespaces when unset
    pub namespace: Option<String>,
    /// Field manager recorded on writes
    pub field_manager: String,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            resync_interval: Duration::from_secs(300),
            error_requeue: Duration::from_secs(5),
            reconcile_timeout: None,
            namespace: None,
            field_manager: DEFAULT_FIELD_MANAGER.to_string(),
        }
    }
}

/// Controller context for reconcile and error_policy
pub struct Context {
    /// Kubernetes client for API operations (trait object for testability)
    pub kube: Arc<dyn KubeClient>,
    /// Renders the managed Deployment
    pub renderer: Arc<dyn Renderer>,
    /// Owner kinds this process may set references for
    pub scheme: Arc<Scheme>,
    /// Backoff used when a Deployment update conflicts
    pub retry: RetryConfig,
    /// Waits between conflict retries
    pub sleeper: Arc<dyn Sleeper>,
    /// Cancelled on shutdown; in-flight remote calls abort
    pub cancel: CancellationToken,
    /// Runtime settings
    pub config: OperatorConfig,
}

impl Context {
    /// Create a builder around the given Kubernetes client implementation
    pub fn builder(kube: Arc<dyn KubeClient>) -> ContextBuilder {
        ContextBuilder::new(kube)
    }

    /// Run a remote call, aborting with `Error::Cancelled` if the token fires first
    pub async fn guard<T, F>(&self, call: F) -> Result<T, Error>
    where
        F: Future<Output = Result<T, Error>>,
    {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            result = call => result,
        }
    }
}

/// Builder for [`Context`]
pub struct ContextBuilder {
    kube: Arc<dyn KubeClient>,
    renderer: Option<Arc<dyn Renderer>>,
    scheme: Option<Arc<Scheme>>,
    retry: RetryConfig,
    sleeper: Arc<dyn Sleeper>,
    cancel: CancellationToken,
    config: OperatorConfig,
}

impl ContextBuilder {
    fn new(kube: Arc<dyn KubeClient>) -> Self {
        Self {
            kube,
            renderer: None,
            scheme: None,
            retry: RetryConfig::conflict(),
            sleeper: Arc::new(TokioSleeper),
            cancel: CancellationToken::new(),
            config: OperatorConfig::default(),
        }
    }

    /// Override the renderer (primarily for testing)
    pub fn renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Override the scheme
    pub fn scheme(mut self, scheme: Scheme) -> Self {
        self.scheme = Some(Arc::new(scheme));
        self
    }

    /// Override the conflict retry policy
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Override the sleeper used between retries (primarily for testing)
    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Use an externally owned cancellation token
    pub fn cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Set runtime settings
    pub fn config(mut self, config: OperatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the Context
    ///
    /// Fails only if the embedded manifest cannot be compiled.
    pub fn build(self) -> Result<Context, Error> {
        let renderer = match self.renderer {
            Some(renderer) => renderer,
            None => Arc::new(ManifestRenderer::new()?),
        };
        let scheme = self
            .scheme
            .unwrap_or_else(|| Arc::new(Scheme::new().register::<NginxOperator>()));

        Ok(Context {
            kube: self.kube,
            renderer,
            scheme,
            retry: self.retry,
            sleeper: self.sleeper,
            cancel: self.cancel,
            config: self.config,
        })
    }
}
