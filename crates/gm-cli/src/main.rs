//! gmash
//!
//! Serves the local shell over SSH with a one-time password and, unless
//! told to stay local, publishes the server through an ngrok tunnel.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gm_core::config::{self, GmashConfig, TunnelConfig};
use gm_core::{ErrorSink, ShellConfig};
use gm_sshd::auth::{fingerprint, load_or_generate_host_key, MasterPassword};
use gm_sshd::{RusshHandshaker, SshServer};
use gm_tunnel::{FailureReason, Tunnel, TunnelExecutor};

use gmash::address::local_address;
use gmash::output::{
    connect_command, print_command, print_info, print_success, print_warning,
    tunnel_failure_message, ConsoleErrorSink,
};

/// How often a running tunnel's agent is checked
const AGENT_CHECK_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "gmash")]
#[command(author, version, about = "Share your shell over SSH through a public tunnel")]
struct Cli {
    /// Only allow connections over the local network (no tunnel)
    #[arg(short, long)]
    local: bool,

    /// Bind address (overrides config)
    #[arg(short, long)]
    bind: Option<String>,

    /// Shell started for each session (overrides config)
    #[arg(short, long)]
    shell: Option<String>,

    /// Forwarding agent executable (overrides config)
    #[arg(long)]
    agent: Option<String>,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { &cli.log_level };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    print_info(&format!("gmash {}", env!("CARGO_PKG_VERSION")));

    let config = load_config(&cli)?;
    let tunnel_wanted = !cli.local && config.tunnel.enabled;

    // Generate a random password for this session
    let password = MasterPassword::generate(config.password_length);

    let host_key = load_or_generate_host_key(&config.host_key_path).await?;
    let fingerprint = fingerprint(&host_key)?;

    let error_sink: Arc<dyn ErrorSink> = Arc::new(ConsoleErrorSink);
    let shell = ShellConfig::new(config.shell.clone(), Arc::clone(&error_sink));
    let handshaker = RusshHandshaker::new(host_key, Arc::new(password.clone()), error_sink);

    let server = SshServer::new(Arc::new(handshaker), shell)
        .listen(&config.bind_address)
        .await
        .context("Failed to start SSH server")?;

    // Create cancellation token for graceful shutdown
    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    let mut tunnel = if tunnel_wanted {
        open_tunnel(&config.tunnel, &cancel, server.port()).await
    } else {
        None
    };

    if cancel.is_cancelled() {
        server.close().await;
        return Ok(());
    }

    let (host, port) = match &tunnel {
        Some(tunnel) => (tunnel.host().to_string(), tunnel.port()),
        None => (local_address(server.local_addr()).to_string(), server.port()),
    };

    print_success(&format!(
        "Started server on port {} with key {}",
        server.port(),
        fingerprint
    ));
    print_info("To connect type:");
    print_command(&connect_command(&host, port));
    print_success(&format!("password: {}", password.as_str()));
    print_info("Press Ctrl+C to stop");

    wait_for_shutdown(&cancel, tunnel.as_mut()).await;

    server.close().await;
    if let Some(tunnel) = tunnel {
        tunnel.shutdown();
    }

    print_info("Bubye");
    Ok(())
}

/// Load the config file and apply command-line overrides
fn load_config(cli: &Cli) -> Result<GmashConfig> {
    let mut config: GmashConfig = if let Some(config_path) = &cli.config {
        config::load_config(config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        let default_path = config::default_config_path();
        config::load_config_or_default(&default_path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config from {:?}: {}", default_path, e);
            GmashConfig::default()
        })
    };

    if let Some(bind) = &cli.bind {
        config.bind_address = bind.clone();
    }
    if let Some(shell) = &cli.shell {
        config.shell = shell.clone();
    }
    if let Some(agent) = &cli.agent {
        config.tunnel.agent = agent.clone();
    }

    tracing::debug!("Using configuration: {:?}", config);
    Ok(config)
}

/// Run the forwarding agent; `None` means serve on the local network only
async fn open_tunnel(config: &TunnelConfig, cancel: &CancellationToken, port: u16) -> Option<Tunnel> {
    print_info("Starting tunnel...");

    match TunnelExecutor::from_config(config).execute(cancel, port).await {
        Ok(tunnel) => {
            tracing::info!(
                "Tunnel established at {} (agent pid {:?})",
                tunnel.address(),
                tunnel.pid()
            );
            Some(tunnel)
        }
        Err(e) if e.reason() == FailureReason::Canceled && cancel.is_cancelled() => {
            tracing::debug!("Tunnel attempt canceled");
            None
        }
        Err(e) => {
            if e.reason().is_misconfiguration() {
                tracing::debug!("Tunnel agent misconfigured: {}", e);
            } else {
                tracing::warn!("Tunnel failed: {}", e);
            }
            print_warning(&tunnel_failure_message(&e));
            print_warning(
                "Due to errors executing ngrok, the SSH server is only available over the local network",
            );
            None
        }
    }
}

/// Wait for `cancel`, warning once if the tunnel's agent exits first
async fn wait_for_shutdown(cancel: &CancellationToken, mut tunnel: Option<&mut Tunnel>) {
    let mut check = tokio::time::interval(AGENT_CHECK_INTERVAL);
    check.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,

            _ = check.tick(), if tunnel.is_some() => {
                if let Some(agent) = tunnel.as_deref_mut() {
                    if !agent.is_running() {
                        tracing::warn!("Forwarding agent for {} exited", agent.address());
                        print_warning("ngrok exited; the server is now only reachable over the local network");
                        tunnel = None;
                    }
                }
            }
        }
    }
}

/// Cancel `cancel` on Ctrl+C or SIGTERM
fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C, initiating shutdown...");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, initiating shutdown...");
            }
        }

        cancel.cancel();
    });
}
