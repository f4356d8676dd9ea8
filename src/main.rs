use interview_backend::{
    config::{init_config, StoreBackend},
    database::{
        pool::{create_pool, run_migrations},
        MemoryStore, PgStore, Store,
    },
    routes::build_router,
    services::task_service::spawn_workers,
    utils::time::{Clock, SystemClock},
    AppState, Collaborators,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info,sqlx=warn"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = init_config()?;

    let store: Arc<dyn Store> = match config.store_backend {
        StoreBackend::Postgres => {
            let pool = create_pool(config).await?;
            run_migrations(&pool).await?;
            info!("connected to postgres, migrations applied");
            Arc::new(PgStore::new(pool))
        }
        StoreBackend::Memory => {
            tracing::warn!("STORE=memory: state is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let collaborators = Collaborators::from_config(config, clock.clone())?;
    let app_state = AppState::new(store, config, collaborators, clock)?;

    if let Some(password) = &config.admin_password {
        app_state
            .identity
            .ensure_admin(&config.admin_email, password)
            .await?;
    }

    let workers = spawn_workers(
        app_state.tasks.clone(),
        app_state.handler.clone(),
        config.task_workers,
    );
    info!(count = workers.len(), "task workers started");

    {
        let lifecycle = app_state.lifecycle.clone();
        let interval = Duration::from_secs(config.sweep_interval_secs.max(1));
        tokio::spawn(async move {
            loop {
                if let Err(e) = lifecycle.sweep().await {
                    tracing::error!(error = ?e, "deadline sweep error");
                }
                tokio::time::sleep(interval).await;
            }
        });
    }

    let app = build_router(app_state, config);

    let listener = TcpListener::bind(&config.server_address).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = ?e, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
}
