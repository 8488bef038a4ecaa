use std::path::PathBuf;

use anyhow::Context;
use cherry_cloud::{CancellationToken, ReplacePolicy};
use cherry_cloud_projects::{ProviderConfig, check_inputs, provider_schema};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "cherry-provider")]
#[command(about = "Cherry Servers resource provider (Project)", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the provider over stdio JSON-RPC
    Serve {
        /// API token. CHERRY_AUTH_TOKEN takes precedence when set.
        #[arg(long)]
        token: Option<String>,

        /// API base URL [env: CHERRY_API_URL]
        #[arg(long)]
        api_url: Option<String>,

        /// create-before-delete or delete-before-create [env: CHERRY_REPLACE_POLICY]
        #[arg(long)]
        replace_policy: Option<ReplacePolicy>,

        /// Log file (stdout is reserved for the protocol)
        #[arg(long, env = "CHERRY_PROVIDER_LOG")]
        log_file: Option<PathBuf>,
    },
    /// Print the provider schema as JSON
    Schema,
    /// Validate Project inputs without contacting Cherry Servers
    Check {
        /// Logical resource name, used when the inputs carry no name
        #[arg(short, long, default_value = "project")]
        name: String,

        /// Inputs as a JSON object, e.g. '{"team": 148226, "bgp": true}'
        inputs: String,
    },
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Serve {
        token,
        api_url,
        replace_policy,
        log_file,
    } = cli.command
    {
        init_file_logging(log_file);

        let mut config = ProviderConfig::new(token.unwrap_or_default()).with_env_overrides()?;
        if let Some(url) = api_url {
            config = config.with_api_url(url);
        }
        if let Some(policy) = replace_policy {
            config = config.with_replace_policy(policy);
        }
        config.validate()?;

        let shutdown = CancellationToken::new();
        let on_signal = shutdown.clone();
        tokio::spawn(async move {
            match shutdown_signal().await {
                Ok(signal) => {
                    tracing::warn!("Received {}, shutting down...", signal);
                    on_signal.cancel();
                }
                Err(e) => tracing::error!("Failed to listen for shutdown signals: {}", e),
            }
        });

        return cherry_cloud_rpc::run_server(config, shutdown).await;
    }

    // Other commands log to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match cli.command {
        Commands::Schema => {
            println!("{}", serde_json::to_string_pretty(&provider_schema())?);
        }
        Commands::Check { name, inputs } => {
            let inputs: serde_json::Value =
                serde_json::from_str(&inputs).context("inputs are not valid JSON")?;
            let spec = check_inputs(&name, &inputs, None)?;
            println!("{}", serde_json::to_string_pretty(&spec)?);
        }
        Commands::Version => {
            println!("cherry-provider {}", env!("CARGO_PKG_VERSION"));
        }
        Commands::Serve { .. } => unreachable!("Serve is handled before logging setup"),
    }

    Ok(())
}

/// Wait for SIGINT or, on unix, SIGTERM
async fn shutdown_signal() -> std::io::Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.map(|_| "SIGINT"),
            _ = sigterm.recv() => Ok("SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.map(|_| "SIGINT")
    }
}

fn init_file_logging(path: Option<PathBuf>) {
    use std::fs::OpenOptions;

    let path = path.unwrap_or_else(|| std::env::temp_dir().join("cherry-provider.log"));
    let log_file = OpenOptions::new().create(true).append(true).open(&path).ok();

    if let Some(file) = log_file {
        tracing_subscriber::fmt()
            .with_writer(file)
            .with_env_filter(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive(tracing::Level::DEBUG.into()),
            )
            .with_ansi(false)
            .init();
    }
}
