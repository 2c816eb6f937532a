//! Node Operation Validator - admission webhook for Node lifecycle operations

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use kube::Client;
use tracing::info;

use node_operation_validator::events::KubeAuditEmitter;
use node_operation_validator::manifest::{self, ManifestConfig};
use node_operation_validator::policy::{parse_list, ConfigMapPolicySource};
use node_operation_validator::server::{self, ServerConfig, DEFAULT_CERT_DIR};
use node_operation_validator::telemetry::{init_telemetry, LogFormat, TelemetryConfig};
use node_operation_validator::validator::NodeValidator;
use node_operation_validator::webhook::WebhookState;
use node_operation_validator::{Error, DEFAULT_CONFIG_NAME, DEFAULT_CONFIG_NAMESPACE};

/// Node Operation Validator - require a reason before Nodes are deleted or cordoned
///
/// Without a subcommand the webhook is served, reading the serve flags below.
#[derive(Parser, Debug)]
#[command(
    name = "node-operation-validator",
    version,
    about,
    long_about = None,
    args_conflicts_with_subcommands = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the admission webhook (default mode)
    Serve(ServeArgs),

    /// Print the webhook registration and RBAC manifests and exit
    Manifest(ManifestArgs),
}

/// Serve mode arguments
#[derive(Args, Debug)]
struct ServeArgs {
    /// Address the HTTPS server binds to
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:9443")]
    listen_addr: SocketAddr,

    /// Directory holding tls.crt and tls.key
    #[arg(long, env = "CERT_DIR", default_value = DEFAULT_CERT_DIR)]
    cert_dir: PathBuf,

    /// Namespace of the policy ConfigMap
    #[arg(long, env = "CONFIG_NAMESPACE", default_value = DEFAULT_CONFIG_NAMESPACE)]
    config_namespace: String,

    /// Name of the policy ConfigMap
    #[arg(long, env = "CONFIG_NAME", default_value = DEFAULT_CONFIG_NAME)]
    config_name: String,

    /// Comma-separated usernames barred from Node operations
    ///
    /// `system:admin` is always included.
    #[arg(long, env = "forbiddenUsers", default_value = "")]
    forbidden_users: String,

    /// Timeout for each policy ConfigMap fetch in seconds
    #[arg(long, env = "POLICY_TIMEOUT_SECS", default_value = "5")]
    policy_timeout_secs: u64,

    /// Log encoding: json or text
    #[arg(long, env = "LOG_FORMAT", default_value = "json")]
    log_format: LogFormat,

    /// Reporting component recorded on emitted Events
    #[arg(long, default_value = "node-operation-validator")]
    reporter: String,
}

/// Manifest mode arguments
#[derive(Args, Debug)]
struct ManifestArgs {
    /// Name of the webhook Service
    #[arg(long, default_value = "node-operation-validator-webhook-service")]
    service_name: String,

    /// Namespace of the webhook Service and its ServiceAccount
    #[arg(long, default_value = DEFAULT_CONFIG_NAMESPACE)]
    service_namespace: String,

    /// Port of the webhook Service
    #[arg(long, default_value = "443")]
    service_port: i32,

    /// ServiceAccount the webhook Deployment runs as
    #[arg(long, default_value = "node-operation-validator")]
    service_account: String,

    /// PEM file with the CA that signed the serving certificate
    #[arg(long)]
    ca_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install crypto provider - FIPS-validated aws-lc-rs
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!(
            "CRITICAL: Failed to install FIPS-validated crypto provider: {:?}. \
             The webhook cannot serve TLS without it.",
            e
        );
        std::process::exit(1);
    }

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Manifest(args)) => run_manifest(args).await,
        Some(Commands::Serve(args)) => run_serve(args).await,
        None => run_serve(cli.serve).await,
    }
}

/// Print the webhook registration and the RBAC it needs
async fn run_manifest(args: ManifestArgs) -> anyhow::Result<()> {
    let ca_bundle = match &args.ca_file {
        Some(path) => Some(
            tokio::fs::read_to_string(path)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to read CA file {:?}: {}", path, e))?,
        ),
        None => None,
    };

    let yaml = manifest::render(&ManifestConfig {
        service_name: args.service_name,
        service_namespace: args.service_namespace,
        service_port: args.service_port,
        service_account: args.service_account,
        ca_bundle,
    })?;
    println!("{yaml}");
    Ok(())
}

/// Run the admission webhook until the server exits
async fn run_serve(args: ServeArgs) -> anyhow::Result<()> {
    init_telemetry(TelemetryConfig {
        log_format: args.log_format,
        ..Default::default()
    })?;

    let forbidden_users = parse_list(&args.forbidden_users);
    info!(
        config = %format!("{}/{}", args.config_namespace, args.config_name),
        forbidden_users = ?forbidden_users,
        "Starting node operation validator"
    );

    let client = Client::try_default().await.map_err(Error::Kube)?;

    let policy_source = ConfigMapPolicySource::new(
        client.clone(),
        args.config_name,
        forbidden_users,
        Duration::from_secs(args.policy_timeout_secs),
    );
    let emitter = KubeAuditEmitter::new(client, &args.reporter);
    let validator = NodeValidator::new(
        Arc::new(policy_source),
        Arc::new(emitter),
        args.config_namespace,
    );

    let config = ServerConfig::from_cert_dir(args.listen_addr, &args.cert_dir).await?;
    server::start_server(config, Arc::new(WebhookState::new(validator))).await?;

    Ok(())
}
