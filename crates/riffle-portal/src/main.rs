// ============================================
// File: crates/riffle-portal/src/main.rs
// ============================================
//! # Riffle Portal Entry Point
//!
//! ## Creation Reason
//! Command line host for a portal: serves a catch-all echo realm, calls a
//! remote portal, or checks a configuration file.
//!
//! ## Main Functionality
//! - CLI argument parsing with clap
//! - Logging initialization with tracing
//! - Configuration loading
//! - Portal execution
//!
//! ## Usage
//! ```bash
//! riffle-portal serve --config /etc/riffle/portal.toml
//! riffle-portal call --config /etc/riffle/client.toml --peer 10.0.0.5:8016 ping
//! riffle-portal validate --config /etc/riffle/portal.toml
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Both ends need certificates signed by the same CA
//! - `call` arguments are parsed as int, then bool, then fall back to str
//!
//! ## Last Modified
//! v0.1.0 - Initial CLI implementation

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use riffle_common::Identity;
use riffle_core::{RemoteFault, Value};
use riffle_portal::{Avatar, AvatarHandler, Matcher, Portal, PortalConfig};

// ============================================
// CLI Definition
// ============================================

/// Riffle identity-routed RPC portal
#[derive(Parser, Debug)]
#[command(name = "riffle-portal")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Accept peers and serve the echo realm until interrupted
    Serve {
        /// Path to configuration file
        #[arg(short, long, default_value = "/etc/riffle/portal.toml")]
        config: PathBuf,
    },

    /// Log in to a remote portal and invoke one method on its avatar
    Call {
        /// Path to configuration file
        #[arg(short, long, default_value = "/etc/riffle/portal.toml")]
        config: PathBuf,

        /// Remote portal address
        #[arg(short, long)]
        peer: SocketAddr,

        /// Method name
        method: String,

        /// Method arguments
        args: Vec<String>,
    },

    /// Validate configuration file
    Validate {
        /// Path to configuration file
        #[arg(short, long, default_value = "/etc/riffle/portal.toml")]
        config: PathBuf,
    },
}

// ============================================
// Main
// ============================================

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve { config } => cmd_serve(config).await,
        Commands::Call {
            config,
            peer,
            method,
            args,
        } => cmd_call(config, peer, method, args).await,
        Commands::Validate { config } => cmd_validate(config).await,
    };

    if let Err(e) = result {
        init_logging("info");
        error!("{:#}", e);
        std::process::exit(1);
    }
}

// ============================================
// Echo Realm
// ============================================

/// Avatar served by `serve`: answers `ping` and echoes `echo`.
struct EchoAvatar;

#[async_trait]
impl AvatarHandler for EchoAvatar {
    async fn invoke(
        &self,
        avatar: &Avatar,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value, RemoteFault> {
        match method {
            "ping" => Ok("pong".into()),
            "echo" => Ok(Value::List(args)),
            "whoami" => Ok(avatar.identity().to_string().into()),
            other => Err(RemoteFault::no_such_method(other)),
        }
    }
}

/// Client-side avatar for `call`; the remote end has nothing to ask us.
struct SilentAvatar;

#[async_trait]
impl AvatarHandler for SilentAvatar {
    async fn invoke(
        &self,
        _avatar: &Avatar,
        method: &str,
        _args: Vec<Value>,
    ) -> Result<Value, RemoteFault> {
        Err(RemoteFault::no_such_method(method))
    }
}

// ============================================
// Commands
// ============================================

/// Runs the portal until Ctrl-C.
async fn cmd_serve(config_path: PathBuf) -> anyhow::Result<()> {
    let config = PortalConfig::load(&config_path).await?;
    init_logging(&config.logging.level);

    let material = config.material().await?;
    let portal = Portal::new(config.settings());
    portal.add_realm(Matcher::any(), |_: &Identity| {
        Arc::new(EchoAvatar) as Arc<dyn AvatarHandler>
    });

    let listener = portal.open(config.listen_addr(), &material).await?;
    info!(addr = %listener.local_addr(), "Riffle portal started");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    listener.shutdown();
    listener.join().await;
    portal.dump_realms();

    Ok(())
}

/// Connects, performs one call, logs out.
async fn cmd_call(
    config_path: PathBuf,
    peer: SocketAddr,
    method: String,
    args: Vec<String>,
) -> anyhow::Result<()> {
    let config = PortalConfig::load(&config_path).await?;
    init_logging(&config.logging.level);

    let material = config.material().await?;
    let portal = Portal::new(config.settings());
    portal.add_realm(Matcher::any(), |_: &Identity| {
        Arc::new(SilentAvatar) as Arc<dyn AvatarHandler>
    });

    let proxy = portal.connect(peer, &material).await?;
    info!(peer = %proxy.peer_identity(), "Logged in");

    let args = args.iter().map(|arg| parse_arg(arg)).collect();
    let outcome = proxy.call(&method, args).await;
    proxy.logout()?;

    println!("{:?}", outcome?);
    Ok(())
}

/// Validates configuration file.
async fn cmd_validate(config_path: PathBuf) -> anyhow::Result<()> {
    let config = PortalConfig::load(&config_path).await?;

    println!("✅ Configuration is valid");
    println!();
    println!("Network:");
    println!("   Listen:        {}", config.listen_addr());
    println!();
    println!("TLS:");
    println!("   CA:            {}", config.tls.ca_file.display());
    println!("   Certificate:   {}", config.tls.cert_file.display());
    if let Some(key) = &config.tls.key_file {
        println!("   Key:           {}", key.display());
    }
    println!("   Server Name:   {}", config.tls.server_name);
    println!();
    println!("Limits:");
    println!("   Handshake Timeout:   {}s", config.limits.handshake_timeout_secs);
    println!("   Initialize Timeout:  {}s", config.limits.initialize_timeout_secs);
    println!("   Max Frame Size:      {}", config.limits.max_frame_size);
    println!();

    Ok(())
}

// ============================================
// Helper Functions
// ============================================

/// Initializes the tracing subscriber.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .try_init()
        .ok();
}

fn parse_arg(raw: &str) -> Value {
    if let Ok(v) = raw.parse::<i64>() {
        return Value::Int(v);
    }
    if let Ok(v) = raw.parse::<bool>() {
        return Value::Bool(v);
    }
    Value::Str(raw.to_string())
}
