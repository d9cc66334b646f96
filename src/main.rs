use std::net::SocketAddr;

use sqlx::{migrate::MigrateDatabase, Sqlite};
use tokio::time::{self, Duration as TokioDuration};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use presenze::{config, db, leave, routes, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logging: stdout plus a daily rotated file under ./logs
    std::fs::create_dir_all("logs").ok();
    let (stdout_nb, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    let file_appender = tracing_appender::rolling::daily("logs", "presenze.log");
    let (file_nb, file_guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(stdout_nb))
        .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(file_nb))
        .init();
    // Guards must outlive the server so the non-blocking writers flush
    let _log_guards = (stdout_guard, file_guard);

    // embedded defaults -> presenze.toml -> PRESENZE_CONFIG -> env/.env
    let app_cfg = config::load()?;

    let db_url = &app_cfg.database.url;
    config::ensure_sqlite_parent_dir(db_url)?;
    if !Sqlite::database_exists(db_url).await.unwrap_or(false) {
        info!("Creating SQLite database at {}", db_url);
        Sqlite::create_database(db_url).await?;
    }
    let pool = db::connect_pool(db_url, app_cfg.database.max_connections).await?;

    db::init_db(&pool).await?;
    if db::seed_company_schedule(&pool, &app_cfg.work_schedule).await? {
        info!("Seeded company work schedule from configuration");
    }

    let state = AppState::new(pool.clone(), app_cfg.clone());

    // Per-endpoint limiter cleanup to avoid memory growth
    {
        let rl = state.rate_limiter.clone();
        let shutdown = state.shutdown.clone();
        tokio::spawn(async move {
            let mut ticker = time::interval(TokioDuration::from_secs(300));
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => rl.cleanup_all().await,
                }
            }
        });
    }

    let reconciler = if app_cfg.reconciler.interval_secs > 0 {
        let every = TokioDuration::from_secs(app_cfg.reconciler.interval_secs);
        info!("Balance reconciler running every {}s", app_cfg.reconciler.interval_secs);
        Some(tokio::spawn(leave::run_reconciler(state.leave.clone(), every, state.shutdown.clone())))
    } else {
        info!("Balance reconciler disabled");
        None
    };

    let shutdown = state.shutdown.clone();
    let app = routes::router(state);

    let port: u16 = app_cfg.server.port;
    let host: String = app_cfg.server.host.clone();
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid listen addr {}:{} - {}", host, port, e))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("presenze listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    if let Some(handle) = reconciler {
        let _ = handle.await;
    }
    pool.close().await;
    Ok(())
}

async fn shutdown_signal(token: CancellationToken) {
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!("SIGTERM handler unavailable: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("Shutdown signal received. Stopping server...");
    token.cancel();
}
