use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use boardshelf::account::{AccountService, CredentialStore, InMemoryCredentials, RegisterRequest};
use boardshelf::api::{self, AppState};
use boardshelf::catalog::CatalogService;
use boardshelf::config::{LoggingSettings, SeedAccount, Settings};
use boardshelf::database::{DataStore, InMemoryStore};
use boardshelf::query::QueryCompiler;
use boardshelf::security::TokenService;
use boardshelf::server::Server;

/// Board game catalog server.
#[derive(Parser, Debug)]
#[command(name = "boardshelf", version, about)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Address to listen on; overrides `server.listen`.
    #[arg(short, long, value_name = "ADDR")]
    listen: Option<String>,
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(listen) = cli.listen {
        settings.server.listen = listen;
    }

    init_tracing(&settings.logging);
    debug!(?settings, "configuration loaded");

    let mut runtime = tokio::runtime::Builder::new_multi_thread();
    runtime.enable_all();
    if let Some(workers) = settings.server.worker_threads {
        runtime.worker_threads(workers);
    }
    runtime.build()?.block_on(run(settings))
}

fn init_tracing(logging: &LoggingSettings) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(logging.ansi)
        .init();
}

async fn run(settings: Settings) -> Result<(), Box<dyn Error>> {
    let tokens = Arc::new(
        TokenService::new(
            settings.auth.signing_key.as_bytes(),
            settings.auth.issuer.clone(),
            settings.auth.audience.clone(),
        )
        .with_lifetime(settings.auth.token_lifetime()),
    );

    let store: Arc<dyn DataStore> = if settings.seed.demo_games {
        Arc::new(InMemoryStore::demo())
    } else {
        Arc::new(InMemoryStore::new())
    };
    let compiler = QueryCompiler::new(
        settings.query.default_page_size,
        settings.query.max_page_size,
    );
    let catalog = Arc::new(CatalogService::with_settings(
        store,
        compiler,
        settings.cache.ttl(),
    ));

    let credentials = Arc::new(InMemoryCredentials::new());
    let accounts = Arc::new(AccountService::new(
        Arc::clone(&credentials) as Arc<dyn CredentialStore>,
        Arc::clone(&tokens),
    ));
    seed_accounts(&accounts, &credentials, &settings.seed.accounts).await?;

    if let Some(interval) = settings.cache.sweep_interval() {
        let catalog = Arc::clone(&catalog);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let purged = catalog.purge_expired();
                debug!(purged, "cache sweep finished");
            }
        });
    }

    let app = api::pipeline(Arc::new(AppState {
        catalog,
        accounts,
        tokens,
    }));

    let server = Server::bind(&settings.server.listen)
        .await?
        .max_request_bytes(settings.server.max_request_bytes);

    server
        .run_until(
            move |request| {
                let app = app.clone();
                async move { app.handle(request).await }
            },
            shutdown_signal(),
        )
        .await?;

    info!("boardshelf stopped");
    Ok(())
}

async fn seed_accounts(
    accounts: &AccountService,
    credentials: &InMemoryCredentials,
    seeds: &[SeedAccount],
) -> Result<(), Box<dyn Error>> {
    for seed in seeds {
        accounts
            .register(&RegisterRequest {
                username: Some(seed.username.clone()),
                email: Some(seed.email.clone()),
                password: Some(seed.password.clone()),
            })
            .await?;
        for role in &seed.roles {
            credentials.grant_role(&seed.username, *role).await?;
        }
        info!(user = %seed.username, roles = ?seed.roles, "seeded account");
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c; shutdown must be forced");
        std::future::pending::<()>().await;
    }
    info!("ctrl-c received");
}
