//! Switchboard - line-delimited JSON command server

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use switchboard::{
    auth::{InMemoryUserDirectory, UserDirectory},
    bridge::{Bridge, BridgeConfig, BridgeState, BRIDGE_PATH},
    config::{Args, LogFormat},
    handlers,
    registry::CommandRegistry,
    server::{Listener, ListenerConfig},
    session::{spawn_sweep_task, SessionStore},
    shutdown::Shutdown,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    let (text_layer, json_layer) = match args.log_format {
        LogFormat::Text => (Some(tracing_subscriber::fmt::layer()), None),
        LogFormat::Json => (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_span_list(true),
            ),
        ),
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("switchboard={},info", log_level).into()),
        )
        .with(text_layer)
        .with(json_layer)
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Switchboard");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Workers: {}", args.worker_count);
    info!("Session timeout: {} ms", args.session_timeout_ms);
    match args.request_timeout() {
        Some(limit) => info!("Request timeout: {:?}", limit),
        None => info!("Request timeout: disabled"),
    }
    if args.bridge_enabled {
        info!(
            "Bridge: {}{} -> {}",
            args.bridge_listen,
            BRIDGE_PATH,
            args.bridge_upstream()
        );
    } else {
        info!("Bridge: disabled");
    }
    info!("======================================");

    // Accounts
    let directory = Arc::new(InMemoryUserDirectory::new());
    if let Some(seed) = &args.seed_users {
        for user in InMemoryUserDirectory::parse_seed(seed)? {
            directory.create(user).await?;
        }
        info!("Seeded {} user(s)", directory.len());
    }

    // Registry is complete before the listener binds
    let mut builder = CommandRegistry::builder().request_timeout(args.request_timeout());
    for handler in handlers::default_handlers(directory) {
        info!("Registered command {}", handler.command_type());
        builder = builder.register(handler)?;
    }
    let registry = Arc::new(builder.build());

    let sessions = Arc::new(SessionStore::new(args.session_timeout()));
    let shutdown = Shutdown::new();

    let sweep = spawn_sweep_task(
        Arc::clone(&sessions),
        args.sweep_interval(),
        shutdown.signal(),
    );

    let listener = Listener::bind(
        ListenerConfig::from(&args),
        Arc::clone(&registry),
        Arc::clone(&sessions),
    )
    .await?;
    let listener_stats = listener.stats();
    let listener_task = tokio::spawn(listener.run(shutdown.signal()));

    let bridge_task = if args.bridge_enabled {
        let state = BridgeState::new(
            BridgeConfig::from(&args),
            Arc::clone(&sessions),
            listener_stats,
            registry.len(),
        );
        let bridge = Bridge::bind(state).await?;
        Some(tokio::spawn(bridge.run(shutdown.signal())))
    } else {
        None
    };

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");
    shutdown.trigger();

    match listener_task.await {
        Ok(Err(e)) => error!("Listener error: {}", e),
        Err(e) => error!("Listener task error: {}", e),
        Ok(Ok(())) => {}
    }
    if let Some(task) = bridge_task {
        match task.await {
            Ok(Err(e)) => error!("Bridge error: {}", e),
            Err(e) => error!("Bridge task error: {}", e),
            Ok(Ok(())) => {}
        }
    }
    let _ = sweep.await;

    info!("Switchboard stopped");
    Ok(())
}
