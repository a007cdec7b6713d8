// book rental store

use chrono::Utc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use book_rental::{
	app,
	config::Config,
	error::{AppError, AppResult},
	sql,
};

#[tokio::main]
async fn main() -> AppResult<()> {
	tracing_subscriber::registry()
		.with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
		.with(tracing_subscriber::fmt::layer())
		.init();

	let cfg = Config::from_env()?;

	// set up connection pool, schema and default book types
	let pool = sql::open(&cfg).await?;
	sql::seed_book_types(&pool).await?;
	if cfg.seed_demo {
		sql::seed_demo_books(&pool, Utc::now()).await?;
	}

	let listen = cfg.listen;
	let app = app::router(app::AppState::new(pool, cfg));

	tracing::info!(%listen, "book_rental starting");
	let listener = tokio::net::TcpListener::bind(listen)
		.await
		.map_err(|e| AppError::Config(format!("can't bind {listen}: {e}")))?;
	axum::serve(listener, app)
		.with_graceful_shutdown(shutdown_signal())
		.await
		.map_err(|err| {
			tracing::error!(%err, "server failed");
			AppError::from(err)
		})
}

async fn shutdown_signal() {
	let ctrl_c = async {
		if let Err(err) = tokio::signal::ctrl_c().await {
			tracing::error!(%err, "failed to install Ctrl+C handler");
			std::future::pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
			Ok(mut signal) => {
				signal.recv().await;
			}
			Err(err) => {
				tracing::error!(%err, "failed to install signal handler");
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
	tracing::info!("signal received, starting graceful shutdown");
}
