//! peerhost daemon and management commands.
//!
//! ```text
//! peerhost serve                       run until SIGINT/SIGTERM; SIGHUP restarts
//! peerhost add-site <host> [<key>]     --directory <dir> | --proxy [<host:port>]
//! peerhost remove-site <host>
//! peerhost add-sitelist <key>
//! peerhost remove-sitelist <key>
//! peerhost list
//! ```
//!
//! Management commands only edit the config record. A running daemon with
//! `watch` enabled picks the change up and restarts; otherwise restart it.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use peerhost::config::loader::load_options;
use peerhost::config::store::{read_sitelists, read_sites};
use peerhost::config::{JsonFileStore, ProxySetting, SiteConfig};
use peerhost::lifecycle::{next_signal, RestartReason, SignalEvent};
use peerhost::observability::{logging, metrics};
use peerhost::SiteHost;

#[derive(Parser)]
#[command(name = "peerhost")]
#[command(about = "Host peer-replicated websites under local hostnames", long_about = None)]
struct Cli {
    /// Options file (TOML). Defaults apply when absent.
    #[arg(short, long, global = true)]
    options: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the host until interrupted
    Serve,
    /// Add or update a site
    AddSite {
        hostname: String,
        /// Archive key or dat:// url to mirror
        key: Option<String>,
        /// Publish this directory
        #[arg(short, long)]
        directory: Option<PathBuf>,
        /// Forward to an upstream host:port (or serve a placeholder when bare)
        #[arg(long, num_args = 0..=1, default_missing_value = "true")]
        proxy: Option<String>,
    },
    /// Remove a site
    RemoveSite { hostname: String },
    /// Subscribe to a site-list archive
    AddSitelist { key: String },
    /// Unsubscribe from a site-list archive
    RemoveSitelist { key: String },
    /// Print the configured sites and site-lists
    List,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let options = match load_options(cli.options.as_deref()) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    logging::init_logging(&options.observability.log_level);

    let result = match cli.command {
        Commands::Serve => serve(options).await,
        Commands::List => list(&options.config_path).await,
        command => manage(options, command).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Fatal error");
            ExitCode::FAILURE
        }
    }
}

async fn serve(options: peerhost::HostOptions) -> peerhost::Result<()> {
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?options.config_path,
        directory = ?options.directory,
        "peerhost starting"
    );

    if options.observability.metrics_enabled {
        match options.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %options.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let host = SiteHost::new(options)?;
    let Some(mut restarts) = host.take_restart_requests() else {
        return Ok(());
    };
    host.start().await?;
    if let Some(addr) = host.local_addr().await {
        tracing::info!(address = %addr, sites = host.registry().len(), "Serving");
    }

    loop {
        tokio::select! {
            signal = next_signal() => match signal {
                Ok(SignalEvent::Restart) => host.request_restart(RestartReason::Signal),
                Ok(SignalEvent::Shutdown) => break,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to listen for signals");
                    break;
                }
            },
            Some(reason) = restarts.recv() => {
                tracing::info!(reason = ?reason, "Restarting");
                if let Err(e) = host.restart().await {
                    tracing::error!(error = %e, "Restart failed");
                    break;
                }
            }
        }
    }

    tracing::info!("Shutdown signal received");
    host.stop().await?;
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn manage(options: peerhost::HostOptions, command: Commands) -> peerhost::Result<()> {
    let host = SiteHost::new(options)?;
    match command {
        Commands::AddSite {
            hostname,
            key,
            directory,
            proxy,
        } => {
            let proxy = proxy.map(|p| match p.as_str() {
                "true" => ProxySetting::Enabled(true),
                _ => ProxySetting::Target(p),
            });
            let config = SiteConfig {
                directory,
                proxy,
                ..Default::default()
            };
            host.add_site(&hostname, key.as_deref(), config).await?;
            println!("Added {hostname}. Restart the host to apply.");
        }
        Commands::RemoveSite { hostname } => {
            host.remove_site(&hostname).await?;
            println!("Removed {hostname}. Restart the host to apply.");
        }
        Commands::AddSitelist { key } => {
            host.add_site_list(&key).await?;
            println!("Subscribed to {key}. Restart the host to apply.");
        }
        Commands::RemoveSitelist { key } => {
            host.remove_site_list(&key).await?;
            println!("Unsubscribed from {key}. Restart the host to apply.");
        }
        Commands::Serve | Commands::List => {}
    }
    Ok(())
}

async fn list(config_path: &std::path::Path) -> peerhost::Result<()> {
    let store = JsonFileStore::new(config_path);
    let sites = read_sites(&store).await?;
    let sitelists = read_sitelists(&store).await?;
    let record = serde_json::json!({ "sites": sites, "sitelists": sitelists });
    println!(
        "{}",
        serde_json::to_string_pretty(&record).unwrap_or_default()
    );
    Ok(())
}
