use campus::{auth, jobs, jwks, settings, storage, web};
use clap::Parser;
use miette::Result;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "campus",
    version,
    about = "Training-course management service"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    // load settings
    let settings = settings::Settings::load(&cli.config)?;
    tracing::info!(
        host = %settings.server.host,
        port = settings.server.port,
        backend = ?settings.storage.backend,
        "Loaded configuration"
    );

    // init storage (database, or fixtures when configured / unreachable)
    let store = storage::init(&settings).await?;

    // bootstrap administrator
    if let Some(password) = auth::ensure_admin(store.as_ref(), &settings).await? {
        tracing::warn!(
            username = %settings.auth.admin_username,
            %password,
            "Created bootstrap administrator with a generated password; change it"
        );
    }

    // init jwks (generate if missing)
    let jwks_mgr = jwks::JwksManager::new(settings.keys.clone()).await?;

    // background jobs; the handle lives as long as the server
    let _scheduler = jobs::init_scheduler(store.clone()).await?;

    // start web server
    web::serve(settings, store, jwks_mgr).await?;
    Ok(())
}
