use std::sync::Arc;

use clap::Parser;
use idp_callback::{
    AppState, build_app,
    cache,
    config::CallbackConfig,
    crypto::AesGcmKeyRing,
    idp::StaticProviderStore,
    intent::{IntentLifecycle, MemoryIntentStore},
    links::{MemoryUserLinkStore, UserLinkResolver},
    logout::FederatedLogoutCorrelator,
    observability::init_tracing,
    urls::CallbackUrls,
};

/// CLI arguments for the callback service
#[derive(Parser, Debug)]
#[command(version, about = "Federated login callback service", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to config file
    #[arg(short, long, global = true, default_value = "idp-callback.toml")]
    config: String,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Start the callback server (default)
    Serve,
    /// Validate the configuration file and exit
    Check,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match CallbackConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    if let Some(Command::Check) = args.command {
        println!(
            "Configuration OK: {} provider(s), listening on {}",
            config.providers.len(),
            config.server.socket_addr()
        );
        return;
    }

    if let Err(e) = init_tracing(&config.observability) {
        eprintln!("{e}");
        std::process::exit(1);
    }

    if let Err(e) = run_server(config).await {
        tracing::error!(error = %e, "Server failed");
        std::process::exit(1);
    }
}

async fn run_server(config: CallbackConfig) -> Result<(), Box<dyn std::error::Error>> {
    let cache = cache::from_config(&config.cache).await?;
    let encryption = AesGcmKeyRing::from_config(&config.encryption)?;
    let providers = StaticProviderStore::from_config(&config.providers);
    tracing::info!(providers = providers.len(), "Loaded identity providers");

    // Intents and links are owned by the embedding platform; the standalone
    // server keeps them in memory.
    let state = AppState {
        providers: Arc::new(providers),
        intents: IntentLifecycle::new(Arc::new(MemoryIntentStore::new())),
        links: UserLinkResolver::new(Arc::new(MemoryUserLinkStore::new())),
        logout: FederatedLogoutCorrelator::new(cache, config.server.instance_id.clone()),
        encryption: Arc::new(encryption),
        urls: CallbackUrls::from_config(&config.server),
    };
    let app = build_app(&config.server, state);

    let addr = config.server.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        address = %addr,
        public_url = %config.server.public_url,
        "Callback server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
