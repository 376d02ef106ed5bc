//! Courier - collects foundation data into an archive and sends it to the data loader.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use courier_collector::network::new_client;
use courier_collector::sources::auth::{Grant, PLATFORM_MANAGER_CLIENT_ID};
use courier_collector::sources::{PlatformManagerSource, UsageSource};
use courier_collector::{CollectExecutor, DataSource, SendExecutor, TarReader, TarWriter};
use courier_common::{EnvType, Error, Timestamp};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const OUTPUT_FILE_PREFIX: &str = "FoundationDetails_";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "courier")]
#[command(
    author,
    version,
    about = "Collect foundation details and send them to the data loader"
)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect information from the platform manager into a tar file
    Collect(CollectArgs),

    /// Validate a collected tar file and send it to the data loader
    Send(SendArgs),
}

#[derive(Args)]
struct CollectArgs {
    /// URL of the platform manager to collect from
    #[arg(long, env = "OPS_MANAGER_URL")]
    url: String,

    /// Platform manager username (not required with client/secret authentication)
    #[arg(long, env = "OPS_MANAGER_USERNAME")]
    username: Option<String>,

    /// Platform manager password (not required with client/secret authentication)
    #[arg(long, env = "OPS_MANAGER_PASSWORD")]
    password: Option<String>,

    /// Platform manager client id (not required with username/password authentication)
    #[arg(long, env = "OPS_MANAGER_CLIENT_ID")]
    client_id: Option<String>,

    /// Platform manager client secret (not required with username/password authentication)
    #[arg(long, env = "OPS_MANAGER_CLIENT_SECRET")]
    client_secret: Option<String>,

    /// Timeout in seconds for platform manager requests
    #[arg(long, env = "OPS_MANAGER_TIMEOUT", default_value = "30")]
    ops_manager_timeout: u64,

    /// Type of environment collected from (development, qa, pre-production, production)
    #[arg(long, env = "ENV_TYPE")]
    env_type: String,

    /// Local directory to write the tar file to
    #[arg(long, env = "OUTPUT_DIR")]
    output_dir: PathBuf,

    /// Skip TLS validation on HTTP requests
    #[arg(long)]
    insecure_skip_tls_verify: bool,

    /// URL of the usage service (enables usage collection)
    #[arg(long, env = "USAGE_SERVICE_URL")]
    usage_service_url: Option<String>,

    /// URL of the Cloud Foundry API, used to discover the usage service UAA
    #[arg(long, env = "CF_API_URL")]
    cf_api_url: Option<String>,

    /// Usage service client id
    #[arg(long, env = "USAGE_SERVICE_CLIENT_ID")]
    usage_service_client_id: Option<String>,

    /// Usage service client secret
    #[arg(long, env = "USAGE_SERVICE_CLIENT_SECRET")]
    usage_service_client_secret: Option<String>,
}

#[derive(Args)]
struct SendArgs {
    /// Path to the tar file to send
    #[arg(long)]
    path: PathBuf,

    /// API key for the data loader
    #[arg(long, env = "API_KEY")]
    api_key: String,

    /// URL of the data loader
    #[arg(long, env = "DATA_LOADER_URL")]
    data_loader_url: String,

    /// Timeout in seconds for the upload
    #[arg(long, default_value = "300")]
    timeout: u64,
}

/// Usage service settings, present only when every value was supplied.
struct UsageConfig {
    usage_service_url: String,
    cf_api_url: String,
    client_id: String,
    client_secret: String,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

impl CollectArgs {
    fn grant(&self) -> Result<Grant, Error> {
        if let (Some(username), Some(password)) =
            (non_empty(&self.username), non_empty(&self.password))
        {
            return Ok(Grant::Password {
                client_id: PLATFORM_MANAGER_CLIENT_ID.to_string(),
                username: username.to_string(),
                password: password.to_string(),
            });
        }
        if let (Some(client_id), Some(client_secret)) =
            (non_empty(&self.client_id), non_empty(&self.client_secret))
        {
            return Ok(Grant::ClientCredentials {
                client_id: client_id.to_string(),
                client_secret: client_secret.to_string(),
            });
        }
        Err(Error::Config(
            "Invalid auth configuration. Requires username/password or client/secret to be set."
                .to_string(),
        ))
    }

    fn usage(&self) -> Result<Option<UsageConfig>, Error> {
        let values = [
            non_empty(&self.usage_service_url),
            non_empty(&self.cf_api_url),
            non_empty(&self.usage_service_client_id),
            non_empty(&self.usage_service_client_secret),
        ];
        match values {
            [None, None, None, None] => Ok(None),
            [Some(usage_service_url), Some(cf_api_url), Some(client_id), Some(client_secret)] => {
                Ok(Some(UsageConfig {
                    usage_service_url: usage_service_url.to_string(),
                    cf_api_url: cf_api_url.to_string(),
                    client_id: client_id.to_string(),
                    client_secret: client_secret.to_string(),
                }))
            }
            _ => Err(Error::Config(
                "Invalid usage service configuration. Requires usage service URL, CF API URL, \
                 client id and client secret to be set together."
                    .to_string(),
            )),
        }
    }
}

fn output_path(output_dir: &Path, now: Timestamp) -> PathBuf {
    output_dir.join(format!("{}{}.tar", OUTPUT_FILE_PREFIX, now.unix_seconds()))
}

async fn collect(args: CollectArgs) -> anyhow::Result<()> {
    let grant = args.grant()?;
    let usage = args.usage()?;
    let env_type: EnvType = args.env_type.parse()?;

    let client = new_client(
        args.insecure_skip_tls_verify,
        CONNECT_TIMEOUT,
        Some(Duration::from_secs(args.ops_manager_timeout)),
    )
    .context("Failed to build HTTP client")?;

    let platform_manager = PlatformManagerSource::new(client.clone(), args.url.as_str(), grant);
    let usage = usage.map(|config| {
        Box::new(UsageSource::new(
            client.clone(),
            config.cf_api_url,
            config.usage_service_url,
            config.client_id,
            config.client_secret,
        )) as Box<dyn DataSource>
    });

    let path = output_path(&args.output_dir, Timestamp::now());
    let writer = TarWriter::create(&path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    let mut executor = CollectExecutor::new(Box::new(platform_manager), None, usage, writer);

    info!("Collecting data from the platform manager at {}", args.url);
    if let Err(e) = executor
        .collect(env_type.as_str(), env!("CARGO_PKG_VERSION"))
        .await
    {
        if let Err(remove_err) = std::fs::remove_file(&path) {
            warn!("Failed to remove {}: {}", path.display(), remove_err);
        }
        return Err(anyhow::Error::new(e).context("Failed to collect data"));
    }

    info!("Wrote output to {}", path.display());
    println!("{}", path.display());
    Ok(())
}

async fn send(args: SendArgs) -> anyhow::Result<()> {
    let client = new_client(
        false,
        CONNECT_TIMEOUT,
        Some(Duration::from_secs(args.timeout)),
    )
    .context("Failed to build HTTP client")?;

    let reader = TarReader::new(&args.path);
    SendExecutor::new(client)
        .send(&reader, &args.data_loader_url, &args.api_key)
        .await
        .with_context(|| format!("Failed to send data from {}", args.path.display()))?;

    info!("Sent {} to {}", args.path.display(), args.data_loader_url);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    match cli.command {
        Commands::Collect(args) => collect(args).await,
        Commands::Send(args) => send(args).await,
    }
}
