use mailflow::config::AppConfig;
use mailflow::email::hub::ChangeHub;
use mailflow::email::repository::EmailRepository;
use mailflow::{api, email, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = AppConfig::from_env()?;
    tracing::info!("Mailflow starting...");
    tracing::info!("Server: {}:{}", config.server.host, config.server.port);
    tracing::info!(
        "Identity: {} <{}>",
        config.identity.name,
        config.identity.address
    );

    // Connect the configured backend
    let provider = email::connect(&config.backend).await?;
    let repo = EmailRepository::new(
        provider,
        ChangeHub::global().clone(),
        config.identity.clone().into(),
    );
    if let Err(e) = repo.health_check().await {
        tracing::warn!("Backend {} is not healthy yet: {}", repo.provider_name(), e);
    }
    let state = AppState::new(repo);

    // Keep folder badges in the log current after every mutation
    let runtime = tokio::runtime::Handle::current();
    let folders = state.folders.clone();
    let badges = ChangeHub::global().subscribe(move || {
        let folders = folders.clone();
        runtime.spawn(async move {
            let summary: Vec<String> = folders
                .list_all()
                .await
                .iter()
                .filter(|f| f.count > 0)
                .map(|f| format!("{}={}", f.slug, f.count))
                .collect();
            tracing::info!("Folder counts: {}", summary.join(" "));
        });
    });

    // Build router
    let app = api::router::build_router(state);

    // Start server
    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Mailflow API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await?;

    badges.unsubscribe();
    tracing::info!("Mailflow stopped");
    Ok(())
}
