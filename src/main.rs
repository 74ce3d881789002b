//! nginx-operator - reconciles NginxOperator resources into nginx Deployments

use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser};
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, CustomResourceExt};
use tokio_util::sync::CancellationToken;

use nginx_operator::controller::{error_policy, reconcile, Context, KubeClientImpl, OperatorConfig};
use nginx_operator::crd::NginxOperator;
use nginx_operator::telemetry::{init_telemetry, LogFormat, TelemetryConfig};
use nginx_operator::{DEFAULT_FIELD_MANAGER, WATCH_TIMEOUT_SECS};

/// nginx-operator - keeps nginx Deployments in line with NginxOperator resources
#[derive(Parser, Debug)]
#[command(name = "nginx-operator", version, about, long_about = None)]
struct Cli {
    /// Print the NginxOperator CRD manifest and exit
    #[arg(long)]
    crd: bool,

    #[command(flatten)]
    run: RunArgs,
}

/// Controller settings
#[derive(Args, Debug)]
struct RunArgs {
    /// Namespace to watch (all namespaces when unset)
    #[arg(long, env = "WATCH_NAMESPACE")]
    namespace: Option<String>,

    /// Seconds between resyncs of a healthy NginxOperator
    #[arg(long, env = "RESYNC_INTERVAL_SECS", default_value_t = 300)]
    resync_interval_secs: u64,

    /// Seconds before retrying a failed reconcile
    #[arg(long, env = "ERROR_REQUEUE_SECS", default_value_t = 5)]
    error_requeue_secs: u64,

    /// Abort a single reconcile after this many seconds
    #[arg(long, env = "RECONCILE_TIMEOUT_SECS")]
    reconcile_timeout_secs: Option<u64>,

    /// Field manager recorded on writes
    #[arg(long, env = "FIELD_MANAGER", default_value = DEFAULT_FIELD_MANAGER)]
    field_manager: String,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    log_format: LogFormat,

    /// Do not install the CRD on startup
    #[arg(long)]
    skip_crd_install: bool,
}

impl RunArgs {
    fn operator_config(&self) -> OperatorConfig {
        OperatorConfig {
            resync_interval: Duration::from_secs(self.resync_interval_secs),
            error_requeue: Duration::from_secs(self.error_requeue_secs),
            reconcile_timeout: self.reconcile_timeout_secs.map(Duration::from_secs),
            namespace: self.namespace.clone(),
            field_manager: self.field_manager.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        let crd = serde_yaml::to_string(&NginxOperator::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    let telemetry = init_telemetry(TelemetryConfig {
        log_format: cli.run.log_format,
        ..Default::default()
    })?;

    let result = run_controller(cli.run).await;
    telemetry.shutdown();
    result
}

/// Install the NginxOperator CRD with server-side apply
async fn ensure_crd_installed(client: &Client, field_manager: &str) -> anyhow::Result<()> {
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
    use kube::api::{Patch, PatchParams};

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(field_manager).force();

    tracing::info!("Installing NginxOperator CRD...");
    crds.patch(
        "nginxoperators.operator.example.com",
        &params,
        &Patch::Apply(&NginxOperator::crd()),
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to install NginxOperator CRD: {}", e))?;

    Ok(())
}

/// Resolve on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

async fn run_controller(args: RunArgs) -> anyhow::Result<()> {
    tracing::info!("nginx-operator starting...");

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    if !args.skip_crd_install {
        ensure_crd_installed(&client, &args.field_manager).await?;
    }

    let config = args.operator_config();
    let (operators, deployments): (Api<NginxOperator>, Api<Deployment>) = match &config.namespace {
        Some(ns) => {
            tracing::info!(namespace = %ns, "Watching a single namespace");
            (
                Api::namespaced(client.clone(), ns),
                Api::namespaced(client.clone(), ns),
            )
        }
        None => (Api::all(client.clone()), Api::all(client.clone())),
    };

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received, cancelling in-flight reconciles");
        on_signal.cancel();
    });

    let ctx = Arc::new(
        Context::builder(Arc::new(KubeClientImpl::new(
            client,
            config.field_manager.clone(),
        )))
        .config(config)
        .cancellation(cancel)
        .build()?,
    );

    tracing::info!("Starting NginxOperator controller...");

    Controller::new(
        operators,
        WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS),
    )
    .owns(
        deployments,
        WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS),
    )
    .shutdown_on_signal()
    .run(reconcile, error_policy, ctx)
    .for_each(|result| async move {
        match result {
            Ok((obj, action)) => {
                tracing::debug!(operator = %obj.name, ?action, "Reconciliation completed");
            }
            Err(e) => {
                tracing::error!(error = ?e, "Reconciliation error");
            }
        }
    })
    .await;

    tracing::info!("NginxOperator controller stopped");
    Ok(())
}
