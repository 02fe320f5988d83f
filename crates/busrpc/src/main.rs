// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! busrpc CLI
//!
//! Runs a self-contained RPC demo over the in-memory broker and manages
//! configuration files.
//!
//! # Usage
//!
//! ```bash
//! # Ping/calculator demo with default settings
//! busrpc demo
//!
//! # Same, then keep the server up until Ctrl+C
//! busrpc demo --serve
//!
//! # Demo using a configuration file
//! busrpc --config busrpc.toml demo
//!
//! # Generate / check a configuration file
//! busrpc gen-config --output busrpc.toml
//! busrpc validate --config busrpc.toml
//! ```

use busrpc::{
    CallContext, CallOptions, MemoryBroker, MethodResolver, RpcClient, RpcConfig, RpcError,
    RpcFault, RpcServer, ServiceBuilder,
};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Request/response RPC over publish/subscribe buses
#[derive(Parser, Debug)]
#[command(name = "busrpc")]
#[command(about = "busrpc - Request/response RPC over publish/subscribe message buses")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a ping/calculator demo over the in-memory broker
    Demo {
        /// Client peer id
        #[arg(long, default_value = "demo-client")]
        client_id: String,

        /// Keep the server running after the demo calls until Ctrl+C
        #[arg(long)]
        serve: bool,
    },

    /// Generate example configuration file
    GenConfig {
        /// Output file path
        #[arg(short, long, default_value = "busrpc.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => RpcConfig::from_file(path)?,
        None => RpcConfig::default(),
    };

    // Initialize logging
    let level = args.log_level.as_deref().unwrap_or(&config.log_level);
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match args.command {
        Commands::Demo { client_id, serve } => cmd_demo(config, &client_id, serve).await,
        Commands::GenConfig { output } => cmd_gen_config(output),
        Commands::Validate { config } => cmd_validate(config),
    }
}

/// Answers "Ping" with "Pong".
struct PingService;

/// Integer arithmetic with a call counter.
#[derive(Default)]
struct Calculator {
    calls: AtomicU64,
}

#[derive(Debug, Serialize, Deserialize)]
struct Operands {
    a: i64,
    b: i64,
}

fn build_methods() -> Result<MethodResolver, RpcError> {
    let ping = ServiceBuilder::new(Arc::new(PingService))
        .method("Ping", |_svc, ctx: CallContext, msg: String| async move {
            tracing::info!("Ping from '{}'", ctx.caller());
            Ok(if msg == "Ping" { "Pong".to_string() } else { msg })
        })
        .method("Log", |_svc, ctx: CallContext, line: String| async move {
            println!("  [server] log from {}: {}", ctx.caller(), line);
            Ok(())
        });

    let calculator = ServiceBuilder::new(Arc::new(Calculator::default()))
        .method("Add", |calc: Arc<Calculator>, _ctx, ops: Operands| async move {
            calc.calls.fetch_add(1, Ordering::Relaxed);
            ops.a
                .checked_add(ops.b)
                .ok_or_else(|| RpcFault::invalid_argument("overflow"))
        })
        .blocking_method("Divide", |calc: &Calculator, _ctx, ops: Operands| {
            calc.calls.fetch_add(1, Ordering::Relaxed);
            if ops.b == 0 {
                return Err(RpcFault::invalid_argument("division by zero"));
            }
            Ok(ops.a / ops.b)
        })
        .method0("Calls", |calc: Arc<Calculator>, _ctx| async move {
            Ok(calc.calls.load(Ordering::Relaxed))
        })
        .method("Sleep", |_calc, ctx: CallContext, millis: u64| async move {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(millis)) => Ok(millis),
                _ = ctx.cancellation().cancelled() => Err(RpcFault::unavailable()),
            }
        });

    MethodResolver::new()
        .with_service(ping)?
        .with_service(calculator)
}

async fn cmd_demo(
    config: RpcConfig,
    client_id: &str,
    serve: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let broker = MemoryBroker::new();

    let server = RpcServer::new(
        broker.connect(&config.peer_id)?,
        config.codec_registry()?,
        build_methods()?,
        config.server_options(),
    )?;
    server.start().await?;

    let client = RpcClient::with_options(
        broker.connect(client_id)?,
        config.codec_registry()?,
        config.client_options(),
    )?;
    let target = config.peer_id.as_str();

    println!("busrpc demo v{}", env!("CARGO_PKG_VERSION"));
    println!("=====================================");
    println!("Server: {} ({} methods)", target, server.methods().len());
    for name in server.methods().names() {
        println!("  - {}", name);
    }
    println!("Client: {}", client_id);
    println!();

    let pong: String = client.call(target, "Ping", "Ping", CallOptions::new()).await?;
    println!("Ping -> {}", pong);

    let sum: i64 = client
        .call(target, "Add", &Operands { a: 40, b: 2 }, CallOptions::new())
        .await?;
    println!("Add(40, 2) -> {}", sum);

    match client
        .call::<_, i64>(target, "Divide", &Operands { a: 1, b: 0 }, CallOptions::new())
        .await
    {
        Ok(value) => println!("Divide(1, 0) -> {}", value),
        Err(e) => println!("Divide(1, 0) -> {}", e),
    }

    match client
        .call::<_, String>(target, "Missing", &(), CallOptions::new())
        .await
    {
        Ok(value) => println!("Missing -> {}", value),
        Err(e) => println!("Missing -> {} (method not found: {})", e, e.is_method_not_found()),
    }

    match client
        .call::<_, u64>(
            target,
            "Sleep",
            &500u64,
            CallOptions::new().timeout(Duration::from_millis(50)),
        )
        .await
    {
        Ok(value) => println!("Sleep(500ms) -> {}", value),
        Err(e) => println!("Sleep(500ms) with 50ms timeout -> {}", e),
    }

    client
        .fire_and_forget(Some(target), "Log", "hello from the demo", CallOptions::new())
        .await?;

    let calls: u64 = client.call(target, "Calls", &(), CallOptions::new()).await?;
    println!("Calculator calls -> {}", calls);
    println!();

    if serve {
        println!("Serving '{}' (Ctrl+C to stop)", target);
        // Wait for Ctrl+C
        tokio::signal::ctrl_c().await?;
        println!();
    }

    println!("Shutting down...");
    client.close().await?;
    server.stop(config.server_options().drain_timeout).await?;
    server.wait().await;
    println!("Server state: {:?}", server.state());
    Ok(())
}

fn cmd_gen_config(output: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = RpcConfig {
        peer_id: "calculator".into(),
        ..Default::default()
    };

    let toml_str = toml::to_string_pretty(&config)?;

    // Add comments
    let content = format!(
        r#"# busrpc Configuration
# Generated by busrpc gen-config
#
# Timeouts are in milliseconds; client.default_timeout_ms = 0 waits forever.
# QoS levels: "at_most_once", "at_least_once", "exactly_once".

{}
"#,
        toml_str
    );

    std::fs::write(&output, content)?;
    println!("Generated configuration file: {}", output.display());
    Ok(())
}

fn cmd_validate(config_path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    match RpcConfig::from_file(&config_path) {
        Ok(config) => {
            println!("Configuration valid!");
            println!();
            println!("Peer: {}", config.peer_id);
            println!("Codecs: {}", config.codecs.join(", "));
            println!(
                "Client: timeout {} ms, {:?}",
                config.client.default_timeout_ms, config.client.default_qos
            );
            println!(
                "Server: drain {} ms, broadcasts {}, responses {:?}",
                config.server.drain_timeout_ms,
                if config.server.serve_broadcasts {
                    "served"
                } else {
                    "ignored"
                },
                config.server.response_qos
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration invalid: {}", e);
            std::process::exit(1);
        }
    }
}
