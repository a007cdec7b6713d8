//! Service configuration, read from the environment (and `.env` when present).

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone)]
pub struct Config {
	pub database_url: String,
	pub listen: SocketAddr,
	pub max_connections: u32,
	pub acquire_timeout: Duration,
	/// Longest rental a single request may ask for, in days.
	pub max_rental_days: u32,
	pub static_dir: String,
	pub seed_demo: bool,
}

impl Config {
	pub fn from_env() -> AppResult<Self> {
		// a missing .env is fine, the variables may come from the process
		if let Err(err) = dotenvy::dotenv() {
			if !err.not_found() {
				return Err(AppError::Config(format!(".env: {err}")));
			}
		}
		Self::from_lookup(|key| std::env::var(key).ok())
	}

	pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
	where
		F: Fn(&str) -> Option<String>,
	{
		let database_url = lookup("DATABASE_URL")
			.filter(|url| !url.trim().is_empty())
			.ok_or_else(|| AppError::Config("DATABASE_URL not set in env".into()))?;

		let cfg = Config {
			database_url,
			listen: parse_or(&lookup, "LISTEN_ADDR", default_listen())?,
			max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 5)?,
			acquire_timeout: Duration::from_secs(parse_or(&lookup, "DB_ACQUIRE_TIMEOUT_SECS", 3)?),
			max_rental_days: parse_or(&lookup, "MAX_RENTAL_DAYS", 29)?,
			static_dir: lookup("STATIC_DIR").unwrap_or_else(|| "static".into()),
			seed_demo: parse_or(&lookup, "SEED_DEMO", false)?,
		};
		cfg.validate()?;
		Ok(cfg)
	}

	pub fn validate(&self) -> AppResult<()> {
		if !(1..=64).contains(&self.max_connections) {
			return Err(AppError::Config("DB_MAX_CONNECTIONS must be between 1 and 64".into()));
		}
		if !(1..=60).contains(&self.acquire_timeout.as_secs()) {
			return Err(AppError::Config("DB_ACQUIRE_TIMEOUT_SECS must be between 1 and 60".into()));
		}
		if !(1..=365).contains(&self.max_rental_days) {
			return Err(AppError::Config("MAX_RENTAL_DAYS must be between 1 and 365".into()));
		}
		Ok(())
	}
}

fn default_listen() -> SocketAddr {
	SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> AppResult<T>
where
	F: Fn(&str) -> Option<String>,
	T: FromStr,
	T::Err: std::fmt::Display,
{
	match lookup(key) {
		None => Ok(default),
		Some(raw) => raw
			.trim()
			.parse()
			.map_err(|e| AppError::Config(format!("{key}={raw:?}: {e}"))),
	}
}
