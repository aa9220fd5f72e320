use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sluice_mirror::{
  LocalRegistry, LoggingService, MirrorService, ProxyRegistry, UpstreamClient, UpstreamConfig,
};
use sluice_server::ApiKeys;
use sluice_storage::{FsStorage, ProviderFilter, Storage};

/// Sluice - A pull-through caching network mirror for providers
#[derive(Parser)]
#[command(name = "sluice")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.sluice)
  #[arg(long, global = true, env = "SLUICE_DATA_DIR")]
  data_dir: Option<PathBuf>,

  /// Increase log verbosity (-v debug, -vv trace); RUST_LOG takes precedence
  #[arg(short, long, global = true, action = clap::ArgAction::Count)]
  verbose: u8,

  /// Log output format
  #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
  log_format: LogFormat,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
  Text,
  Json,
}

#[derive(Subcommand)]
enum Commands {
  /// Serve the provider network mirror protocol
  Serve(ServeArgs),

  /// Show what is in storage
  Inspect {
    #[command(subcommand)]
    target: InspectTarget,
  },
}

#[derive(Args)]
struct ServeArgs {
  /// Address to listen on
  #[arg(long, env = "SLUICE_LISTEN", default_value = "127.0.0.1:5601")]
  listen: SocketAddr,

  /// Accepted API keys
  #[arg(
    long = "api-key",
    env = "SLUICE_API_KEYS",
    value_delimiter = ',',
    required = true
  )]
  api_keys: Vec<String>,

  /// Scheme used to reach upstream registries
  #[arg(long, default_value = "https")]
  upstream_scheme: String,

  /// Path of the providers API on upstream registries
  #[arg(long, default_value = "v1/providers")]
  upstream_base_path: String,

  /// Timeout for each upstream request, in seconds
  #[arg(long, default_value_t = 10)]
  upstream_timeout_secs: u64,

  /// Don't store archives fetched from upstream
  #[arg(long)]
  no_pull_through: bool,
}

#[derive(Subcommand)]
enum InspectTarget {
  /// Providers mirrored from upstream registries
  Mirror {
    /// Provider address: hostname/namespace/name
    provider: String,

    /// Only show this version
    #[arg(long)]
    version: Option<String>,
  },

  /// Providers uploaded by an operator
  Custom {
    /// Provider address: namespace/name
    provider: String,

    /// Only show this version
    #[arg(long)]
    version: Option<String>,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();
  init_logging(cli.verbose, cli.log_format);

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".sluice"),
  };

  match cli.command {
    Some(Commands::Serve(args)) => {
      serve(args, data_dir)?;
    }
    Some(Commands::Inspect { target }) => {
      inspect(target, data_dir)?;
    }
    None => {
      println!("sluice - use --help to see available commands");
    }
  }

  Ok(())
}

fn init_logging(verbose: u8, format: LogFormat) {
  let default = match verbose {
    0 => "sluice=info",
    1 => "sluice=debug",
    _ => "sluice=trace",
  };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

  let builder = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr);
  match format {
    LogFormat::Text => builder.with_target(false).init(),
    LogFormat::Json => builder.json().init(),
  }
}

fn serve(args: ServeArgs, data_dir: PathBuf) -> Result<()> {
  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async { serve_async(args, data_dir).await })
}

async fn serve_async(args: ServeArgs, data_dir: PathBuf) -> Result<()> {
  let keys = ApiKeys::new(args.api_keys);
  if keys.is_empty() {
    bail!("at least one non-empty api key is required");
  }

  tokio::fs::create_dir_all(&data_dir)
    .await
    .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;
  let storage: Arc<dyn Storage> = Arc::new(
    FsStorage::new(&data_dir)
      .with_context(|| format!("failed to open storage at {}", data_dir.display()))?,
  );

  let upstream = UpstreamClient::new(UpstreamConfig {
    scheme: args.upstream_scheme,
    base_path: args.upstream_base_path,
    timeout: Duration::from_secs(args.upstream_timeout_secs),
  })
  .context("failed to create upstream client")?;

  let shutdown = CancellationToken::new();
  let mut proxy =
    ProxyRegistry::new(LocalRegistry::new(storage.clone()), upstream).with_shutdown(shutdown.clone());
  if !args.no_pull_through {
    proxy = proxy.with_pull_through(storage);
  }
  let service: Arc<dyn MirrorService> = Arc::new(LoggingService::new(proxy));

  let listener = TcpListener::bind(args.listen)
    .await
    .with_context(|| format!("failed to bind {}", args.listen))?;

  info!(
    data_dir = %data_dir.display(),
    pull_through = !args.no_pull_through,
    api_keys = keys.len(),
    "mirror_starting"
  );

  let signal = shutdown.clone();
  tokio::spawn(async move {
    match tokio::signal::ctrl_c().await {
      Ok(()) => {
        info!("shutdown_requested");
        signal.cancel();
      }
      Err(e) => warn!(error = %e, "failed to listen for ctrl-c"),
    }
  });

  let app = sluice_server::router(service, Arc::new(keys));
  sluice_server::serve(listener, app, shutdown)
    .await
    .context("server failed")
}

fn inspect(target: InspectTarget, data_dir: PathBuf) -> Result<()> {
  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async { inspect_async(target, data_dir).await })
}

async fn inspect_async(target: InspectTarget, data_dir: PathBuf) -> Result<()> {
  let storage = FsStorage::new(&data_dir)
    .with_context(|| format!("failed to open storage at {}", data_dir.display()))?;

  let output = match target {
    InspectTarget::Mirror { provider, version } => {
      let [hostname, namespace, name] = split_address::<3>(&provider)?;
      let filter = with_version(ProviderFilter::new(hostname, namespace, name), version);

      let providers = storage
        .mirrored_providers(&filter)
        .await
        .with_context(|| format!("failed to list mirrored providers for {}", filter))?;
      serde_json::json!({ "providers": providers })
    }
    InspectTarget::Custom { provider, version } => {
      let [namespace, name] = split_address::<2>(&provider)?;
      let filter = with_version(ProviderFilter::new("", namespace, name), version);

      let providers = storage
        .custom_providers(&filter)
        .await
        .with_context(|| format!("failed to list custom providers for {}/{}", namespace, name))?;
      let signing_keys = storage
        .signing_keys(namespace)
        .await
        .with_context(|| format!("failed to read signing keys for {}", namespace))?;
      serde_json::json!({ "providers": providers, "signing_keys": signing_keys })
    }
  };

  println!("{}", serde_json::to_string_pretty(&output)?);
  Ok(())
}

fn with_version(filter: ProviderFilter, version: Option<String>) -> ProviderFilter {
  match version {
    Some(version) => filter.with_version(version),
    None => filter,
  }
}

/// Split a `/`-separated provider address into exactly `N` non-empty parts.
fn split_address<const N: usize>(address: &str) -> Result<[&str; N]> {
  let parts: Vec<&str> = address.split('/').collect();
  match <[&str; N]>::try_from(parts) {
    Ok(parts) if parts.iter().all(|p| !p.is_empty()) => Ok(parts),
    _ => bail!("expected {} '/'-separated parts in {:?}", N, address),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_split_address() {
    let [hostname, namespace, name] =
      split_address::<3>("registry.terraform.io/hashicorp/random").unwrap();
    assert_eq!((hostname, namespace, name), ("registry.terraform.io", "hashicorp", "random"));

    assert!(split_address::<3>("hashicorp/random").is_err());
    assert!(split_address::<2>("hashicorp//random").is_err());
    assert!(split_address::<2>("hashicorp/").is_err());
  }

  #[test]
  fn test_cli_parses_serve() {
    let cli = Cli::try_parse_from([
      "sluice",
      "serve",
      "--api-key",
      "a,b",
      "--no-pull-through",
      "--log-format",
      "json",
    ])
    .unwrap();

    assert_eq!(cli.log_format, LogFormat::Json);
    match cli.command {
      Some(Commands::Serve(args)) => {
        assert_eq!(args.api_keys, vec!["a", "b"]);
        assert!(args.no_pull_through);
        assert_eq!(args.upstream_base_path, "v1/providers");
        assert_eq!(args.upstream_timeout_secs, 10);
      }
      _ => panic!("expected serve command"),
    }
  }
}
