//! Alibaba Cloud Disk Provisioner
//!
//! Command line entry point. Creates ECS disks for volume claims and
//! deletes the disks behind released volumes.

use clap::{Parser, Subcommand};
use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim};
use kube::api::Api;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use std::path::{Path, PathBuf};
use tracing::{error, info};

use alicloud_disk_provisioner::logging::{init_logging, LogConfig};
use alicloud_disk_provisioner::{
    DeleteOutcome, DiskProvisioner, Error, ProvisionerConfig, Result, VolumeOptions,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Dynamic provisioner for Alibaba Cloud ECS disks
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Name of the provisioner storage classes refer to
    #[arg(long, env = "PROVISIONER", default_value = "alicloud/disk")]
    provisioner: String,

    /// Master URL to build a client config from
    #[arg(long, env = "KUBE_MASTER")]
    master: Option<String>,

    /// Path to a kubeconfig file
    #[arg(long, env = "KUBECONFIG")]
    kubeconfig: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    /// Write logs to <prefix>.log instead of stderr
    #[arg(long, env = "LOG_FILE_PREFIX")]
    log_file_prefix: Option<PathBuf>,

    /// ECS API endpoint
    #[arg(long, env = "ECS_ENDPOINT", default_value = "https://ecs.aliyuncs.com")]
    ecs_endpoint: String,

    /// Instance metadata base URL
    #[arg(
        long,
        env = "METADATA_URL",
        default_value = "http://100.100.100.200/latest/meta-data/"
    )]
    metadata_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a disk for a claim and print the resulting PersistentVolume
    Provision {
        /// PersistentVolumeClaim manifest (YAML or JSON)
        #[arg(long)]
        claim: PathBuf,

        /// Storage class parameter as key=value
        #[arg(long = "parameter", value_parser = parse_key_val)]
        parameters: Vec<(String, String)>,

        /// Reclaim policy of the new volume
        #[arg(long, default_value = "Delete")]
        reclaim_policy: String,
    },
    /// Delete the disk behind a PersistentVolume
    Delete {
        /// Name of the PersistentVolume in the cluster
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        volume: Option<String>,

        /// PersistentVolume manifest (YAML or JSON)
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Print version information
    Version,
}

fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got {}", s))
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Command::Version = args.command {
        println!("{} {}", alicloud_disk_provisioner::NAME, alicloud_disk_provisioner::VERSION);
        println!("{}", alicloud_disk_provisioner::identity());
        return Ok(());
    }

    init_logging(&LogConfig {
        level: args.log_level.clone(),
        json: args.log_json,
        file_prefix: args.log_file_prefix.clone(),
    })?;

    info!("Starting Alicloud Disk Provisioner");
    info!("  Version: {}", alicloud_disk_provisioner::VERSION);
    info!("  Provisioner: {}", args.provisioner);
    info!("  ECS endpoint: {}", args.ecs_endpoint);

    let mut config = ProvisionerConfig::default();
    config.name = args.provisioner.clone();
    config.ecs.endpoint = args.ecs_endpoint.clone();
    config.metadata.base_url = args.metadata_url.clone();

    let provisioner = DiskProvisioner::new(config)?;

    let result = run(&args, &provisioner).await;
    if let Err(e) = &result {
        error!("{} failed: {} (action: {:?})", command_name(&args.command), e, e.action());
    }
    result
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Provision { .. } => "provision",
        Command::Delete { .. } => "delete",
        Command::Version => "version",
    }
}

async fn run(args: &Args, provisioner: &DiskProvisioner) -> Result<()> {
    match &args.command {
        Command::Provision {
            claim,
            parameters,
            reclaim_policy,
        } => {
            let pvc: PersistentVolumeClaim = read_manifest(claim)?;
            let options = parameters
                .iter()
                .fold(VolumeOptions::new(pvc), |options, (k, v)| {
                    options.with_parameter(k.as_str(), v.as_str())
                })
                .with_reclaim_policy(reclaim_policy.as_str());

            let pv = provisioner.provision(&options).await?;
            print!("{}", serde_yaml::to_string(&pv)?);
        }
        Command::Delete { volume, file } => {
            let pv: PersistentVolume = match (volume, file) {
                (_, Some(path)) => read_manifest(path)?,
                (Some(name), None) => {
                    let client = kube_client(args).await?;
                    Api::<PersistentVolume>::all(client).get(name).await?
                }
                (None, None) => {
                    return Err(Error::Configuration(
                        "either --volume or --file is required".into(),
                    ))
                }
            };

            match provisioner.delete(&pv).await? {
                DeleteOutcome::Deleted => println!("deleted"),
                DeleteOutcome::Ignored { reason } => println!("ignored: {}", reason),
            }
        }
        Command::Version => {}
    }
    Ok(())
}

/// Read a YAML or JSON manifest
fn read_manifest<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&content)?)
}

// =============================================================================
// Kubernetes Client
// =============================================================================

async fn kube_client(args: &Args) -> Result<Client> {
    let master = match &args.master {
        Some(master) => match master.parse() {
            Ok(url) => Some(url),
            Err(e) => {
                return Err(Error::Configuration(format!(
                    "Invalid master URL {}: {}",
                    master, e
                )))
            }
        },
        None => None,
    };

    let config = match (&args.kubeconfig, master) {
        (Some(path), master) => {
            info!("Building kube config from {}", path.display());
            let kubeconfig = Kubeconfig::read_from(path)
                .map_err(|e| Error::Configuration(format!("Invalid kubeconfig: {}", e)))?;
            let mut config =
                Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                    .await
                    .map_err(|e| Error::Configuration(format!("Invalid kubeconfig: {}", e)))?;
            if let Some(url) = master {
                config.cluster_url = url;
            }
            config
        }
        (None, Some(url)) => {
            info!("Building kube config for master {}", url);
            Config::new(url)
        }
        (None, None) => {
            info!("Inferring kube config");
            Config::infer()
                .await
                .map_err(|e| Error::Configuration(format!("Failed to infer kube config: {}", e)))?
        }
    };

    let client = Client::try_from(config)?;
    let version = client.apiserver_version().await?;
    info!("Connected to API server {}", version.git_version);
    Ok(client)
}
