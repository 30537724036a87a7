use clap::Parser; // for cli
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use portfolio_site::{
    ContentLoader, FetchOptions, HttpTransport, ProjectRecord, RateLimiter, RequestClient,
    ResponseCache,
    config::{Args, Command, ProjectsArgs, ServeArgs},
    handlers,
    state::{AppState, ChatUpstream},
};

// this is main async function with tokio
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // parse cli arguments
    let args = Args::parse();
    init_tracing(&args.log_level, args.log_json);

    match args.command {
        Command::Serve(serve_args) => serve(serve_args).await,
        Command::Projects(projects_args) => print_projects(projects_args).await,
    }
}

fn init_tracing(log_level: &str, json: bool) {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let limiter = Arc::new(RateLimiter::new(args.sweep_interval()));
    limiter.spawn_sweeper();

    let chat = args.chat_upstream.clone().map(|base_url| ChatUpstream {
        base_url,
        api_key: args.chat_api_key.clone(),
        model: args.chat_model.clone(),
    });
    if chat.is_none() {
        warn!("no chat upstream configured, /api/chat will answer 503");
    }

    // creating shared state
    let state = Arc::new(AppState {
        client: reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?,
        limiter: Arc::clone(&limiter),
        limits: args.route_limits(),
        content: ContentLoader::new(args.content_dir.clone()),
        chat,
    });

    let app = handlers::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = TcpListener::bind(addr).await?;

    info!(
        %addr,
        content_dir = %args.content_dir.display(),
        contact_limit = args.contact_max,
        contact_window_secs = args.contact_window_secs,
        chat_limit = args.chat_max,
        chat_window_secs = args.chat_window_secs,
        "portfolio server listening"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(limiter))
    .await?;

    info!("server stopped");
    Ok(())
}

// Waits for Ctrl-C or SIGTERM, then stops the limiter's sweep and drops its state
async fn shutdown_signal(limiter: Arc<RateLimiter>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
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
                warn!(error = %e, "failed to listen for SIGTERM");
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

    info!("shutdown signal received");
    limiter.shutdown();
}

async fn print_projects(args: ProjectsArgs) -> anyhow::Result<()> {
    let client = RequestClient::new(
        HttpTransport::default(),
        ResponseCache::new(Duration::from_secs(args.cache_ttl_secs), args.cache_capacity),
    );

    let mut url = format!("{}/api/projects", args.base_url.trim_end_matches('/'));
    if args.featured {
        url.push_str("?featured=true");
    }

    let data = client.cached_fetch(&url, FetchOptions::default()).await?;
    let projects: Vec<ProjectRecord> = serde_json::from_value(data)?;

    for project in &projects {
        println!("{}  {:<24} {}", project.date, project.slug, project.title);
    }
    info!(count = projects.len(), %url, "projects fetched");
    Ok(())
}
