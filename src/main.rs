use archipelago::config::Settings;
use archipelago::handlers::AppState;
use archipelago::web_app::build_app;
use dotenv::dotenv;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::from_env()?;
    settings.evolution.validate()?;

    // fitness evaluation runs on the global rayon pool
    rayon::ThreadPoolBuilder::new()
        .num_threads(settings.evolution.max_concurrency)
        .build_global()?;

    let app = build_app(AppState::new(settings.evolution.clone()));
    let listener = tokio::net::TcpListener::bind(settings.bind_address).await?;
    info!(
        address = %settings.bind_address,
        population_size = settings.evolution.population_size,
        "Island worker listening"
    );
    axum::serve(listener, app).await?;

    Ok(())
}
