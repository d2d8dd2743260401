//! ROSA operator - manages hosted control planes for Cluster API clusters

use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, CustomResourceExt};

use rosa_common::crd::ROSAControlPlane;
use rosa_common::registry::{registry, KnownKind};
use rosa_common::telemetry::{init_telemetry, TelemetryConfig};
use rosa_common::FIELD_MANAGER;
use rosa_controlplane::{Context, ControllerConfig};

mod controller_runner;

/// ROSA operator - reconciles ROSAControlPlane resources against OpenShift Cluster Manager
#[derive(Parser, Debug)]
#[command(name = "rosa-operator", version, about, long_about = None)]
struct Cli {
    /// Print CRD manifests and exit
    #[arg(long)]
    crd: bool,

    /// Emit human-readable logs instead of JSON
    #[arg(long, env = "ROSA_LOG_TEXT")]
    log_text: bool,

    // controller settings, accepted before or after the subcommand
    #[command(flatten)]
    controller: ControllerArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the controller (default mode)
    Controller,
}

#[derive(Args, Debug, Clone, Default)]
struct ControllerArgs {
    /// Only reconcile objects labelled cluster.x-k8s.io/watch-filter=<value>
    #[arg(long, env = "WATCH_FILTER", global = true)]
    watch_filter: Option<String>,

    /// Base URL of the cluster-management service
    #[arg(long, env = "OCM_URL", global = true)]
    ocm_url: Option<String>,

    /// Token endpoint used to exchange offline tokens
    #[arg(long, env = "OCM_TOKEN_URL", global = true)]
    token_url: Option<String>,

    /// Seconds between checks while a cluster installs or uninstalls
    #[arg(long, env = "WAIT_INFRA_PERIOD_SECS", global = true)]
    wait_infra_period_secs: Option<u64>,

    /// Seconds before retrying a failed cluster-management call
    #[arg(long, env = "EXTERNAL_RETRY_SECS", global = true)]
    external_retry_secs: Option<u64>,

    /// Deadline in seconds for a single reconcile
    #[arg(long, env = "RECONCILE_TIMEOUT_SECS", global = true)]
    reconcile_timeout_secs: Option<u64>,

    /// Hours until a newly created cluster expires
    #[arg(long, env = "CLUSTER_EXPIRATION_HOURS", global = true)]
    expiration_hours: Option<u64>,

    /// Skip installing CRDs on startup
    #[arg(long, env = "SKIP_CRD_INSTALL", global = true)]
    skip_crd_install: bool,
}

impl ControllerArgs {
    fn controller_config(&self) -> ControllerConfig {
        let defaults = ControllerConfig::default();
        let secs =
            |v: Option<u64>, default: Duration| v.map(Duration::from_secs).unwrap_or(default);
        ControllerConfig {
            watch_filter: self.watch_filter.clone().filter(|v| !v.is_empty()),
            wait_infra_period: secs(self.wait_infra_period_secs, defaults.wait_infra_period),
            external_retry_delay: secs(self.external_retry_secs, defaults.external_retry_delay),
            reconcile_timeout: secs(self.reconcile_timeout_secs, defaults.reconcile_timeout),
            expiration_horizon: self
                .expiration_hours
                .map(|h| Duration::from_secs(h * 3600))
                .unwrap_or(defaults.expiration_horizon),
            ocm_url: self.ocm_url.clone().unwrap_or(defaults.ocm_url.clone()),
            token_url: self.token_url.clone().unwrap_or(defaults.token_url.clone()),
            ..defaults
        }
    }
}

/// CRDs for every registered kind the operator owns
fn owned_crds() -> Vec<CustomResourceDefinition> {
    registry()
        .kinds()
        .filter(KnownKind::owns_crd)
        .filter_map(|kind| match kind {
            KnownKind::ControlPlane => Some(ROSAControlPlane::crd()),
            KnownKind::Cluster | KnownKind::RosaCluster => None,
        })
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        for crd in owned_crds() {
            let yaml = serde_yaml::to_string(&crd)
                .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
            println!("---\n{yaml}");
        }
        return Ok(());
    }

    init_telemetry(TelemetryConfig {
        json: !cli.log_text,
        ..Default::default()
    })?;

    match cli.command {
        Some(Commands::Controller) | None => run_controller(cli.controller).await,
    }
}

/// Install the CRDs the operator owns using server-side apply
async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();

    for crd in owned_crds() {
        let name = crd.metadata.name.clone().unwrap_or_default();
        tracing::info!(crd = %name, "Installing CRD...");
        crds.patch(&name, &params, &Patch::Apply(&crd))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to install CRD {}: {}", name, e))?;
    }
    Ok(())
}

async fn run_controller(args: ControllerArgs) -> anyhow::Result<()> {
    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    if args.skip_crd_install {
        tracing::info!("Skipping CRD installation");
    } else {
        ensure_crds_installed(&client).await?;
    }

    let config = args.controller_config();
    let ctx = Context::builder(client.clone(), config)
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build controller context: {}", e))?;

    tracing::info!("Starting ROSA controllers:");
    let tasks = controller_runner::build_control_plane_controllers(client, Arc::new(ctx));

    // The reflector runs until the process exits; the controller returns on shutdown.
    futures::future::select_all(tasks).await;
    tracing::info!("Controller shut down");
    Ok(())
}
