// accounts: password hashes, browser sessions, api credentials

use axum::{
	async_trait,
	extract::FromRequestParts,
	http::{header, request::Parts},
	response::{IntoResponse, Redirect, Response},
	RequestPartsExt,
};
use axum_extra::{
	headers::{authorization::Basic, Authorization},
	TypedHeader,
};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tower_cookies::{cookie::SameSite, Cookie, Cookies};

use crate::app::AppState;
use crate::error::{AppError, AppResult, HtmlError};
use crate::rental::Uid;
use crate::sql;
use crate::types::{Account, SessionToken};

pub const SESSION_COOKIE: &str = "session";
pub const LOGIN_PATH: &str = "/accounts/login";
pub const SIGNUP_PATH: &str = "/accounts/signup";

// bcrypt is slow on purpose, so it runs on the blocking pool

pub async fn hash_password(password: &str) -> AppResult<String> {
	let password = password.to_owned();
	tokio::task::spawn_blocking(move || hash_with_cost(&password, bcrypt::DEFAULT_COST)).await?
}

fn hash_with_cost(password: &str, cost: u32) -> AppResult<String> {
	Ok(bcrypt::hash(password, cost)?)
}

pub async fn verify_password(password: &str, hash: &str) -> AppResult<bool> {
	let (password, hash) = (password.to_owned(), hash.to_owned());
	tokio::task::spawn_blocking(move || -> AppResult<bool> { Ok(bcrypt::verify(password, &hash)?) }).await?
}

/// Where an unknown user can sign up. Absolute when the request named its
/// host.
pub fn signup_url(host: Option<&str>) -> String {
	match host {
		Some(host) => format!("http://{host}{SIGNUP_PATH}"),
		None => SIGNUP_PATH.to_string(),
	}
}

/// Checks a username/password pair, telling apart unknown users and wrong
/// passwords.
pub async fn authenticate(db: &SqlitePool, username: &str, password: &str, host: Option<&str>) -> AppResult<Account> {
	let account = sql::fetch_account_by_name(db, username).await?.ok_or_else(|| {
		AppError::BadCredentials(format!("Incorrect username.  To sign up, visit {}", signup_url(host)))
	})?;
	if !verify_password(password, &account.pass_hash).await? {
		return Err(AppError::BadCredentials("Incorrect password.".into()));
	}
	Ok(account)
}

pub async fn register(db: &SqlitePool, username: &str, password: &str, now: DateTime<Utc>) -> AppResult<Account> {
	let username = username.trim();
	if username.is_empty() || username.len() > 150 {
		return Err(AppError::Validation("username must be 1 to 150 characters".into()));
	}
	if password.len() < 8 {
		return Err(AppError::Validation("password must be at least 8 characters".into()));
	}
	let pass_hash = hash_password(password).await?;
	let uid = sql::insert_account(db, username, &pass_hash, now).await?;
	tracing::info!(user_id = uid, username, "account created");
	Ok(Account {
		uid,
		name: username.to_string(),
		pass_hash,
	})
}

pub async fn start_session(db: &SqlitePool, cookies: &Cookies, uid: Uid, now: DateTime<Utc>) -> AppResult<()> {
	let token = SessionToken::new_v4();
	sql::insert_session(db, token, uid, now).await?;
	cookies.add(
		Cookie::build((SESSION_COOKIE, token.to_string()))
			.path("/")
			.http_only(true)
			.same_site(SameSite::Lax)
			.build(),
	);
	Ok(())
}

pub async fn end_session(db: &SqlitePool, cookies: &Cookies) -> AppResult<()> {
	if let Some(token) = session_token(cookies) {
		sql::delete_session(db, token).await?;
	}
	cookies.remove(Cookie::build(SESSION_COOKIE).path("/").build());
	Ok(())
}

fn session_token(cookies: &Cookies) -> Option<SessionToken> {
	cookies
		.get(SESSION_COOKIE)
		.and_then(|cookie| SessionToken::parse_str(cookie.value()).ok())
}

pub fn login_url(next: &str) -> String {
	format!("{LOGIN_PATH}?next={next}")
}

/// Only local paths are followed after login. Browsers read `\` as `/`, so
/// any backslash is refused along with `//host`.
pub fn safe_next(next: Option<&str>) -> &str {
	match next {
		Some(path) if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') => path,
		_ => "/books/",
	}
}

/// Logged in browser user. Anyone else is sent to the login page.
#[derive(Debug)]
pub struct SessionAccount(pub Account);

#[async_trait]
impl FromRequestParts<AppState> for SessionAccount {
	type Rejection = Response;

	async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
		let to_login = Redirect::to(&login_url(parts.uri.path())).into_response();
		let cookies = Cookies::from_request_parts(parts, state)
			.await
			.map_err(IntoResponse::into_response)?;
		let Some(token) = session_token(&cookies) else {
			return Err(to_login);
		};
		match sql::fetch_session_account(&state.db, token).await {
			Ok(Some(account)) => Ok(SessionAccount(account)),
			Ok(None) => Err(to_login),
			Err(err) => Err(HtmlError(err).into_response()),
		}
	}
}

/// Api user, from HTTP Basic credentials.
#[derive(Debug)]
pub struct ApiAccount(pub Account);

#[async_trait]
impl FromRequestParts<AppState> for ApiAccount {
	type Rejection = AppError;

	async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
		let TypedHeader(Authorization(basic)) = parts
			.extract::<TypedHeader<Authorization<Basic>>>()
			.await
			.map_err(|_| AppError::Unauthenticated)?;
		let host = parts.headers.get(header::HOST).and_then(|value| value.to_str().ok());
		let account = authenticate(&state.db, basic.username(), basic.password(), host).await?;
		Ok(ApiAccount(account))
	}
}
