use std::sync::Arc;

use axum::{
	response::Redirect,
	routing::{get, post},
	Router,
};
use sqlx::SqlitePool;
use tower_cookies::CookieManagerLayer;
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::config::Config;
use crate::{api, web};

#[derive(Clone)]
pub struct AppState {
	pub db: SqlitePool,
	pub config: Arc<Config>,
}

impl AppState {
	pub fn new(db: SqlitePool, config: Config) -> Self {
		AppState {
			db,
			config: Arc::new(config),
		}
	}
}

pub fn router(state: AppState) -> Router {
	let static_dir = ServeDir::new(&state.config.static_dir);

	Router::new()
		.route("/", get(|| async { Redirect::to("/books/") }))
		.route("/books/", get(web::display_books))
		.route("/books/mybooks", get(web::display_my_books))
		.route("/books/:id", get(web::display_book))
		.route("/books/:id/rent", post(web::perform_rent))
		.route("/accounts/login", get(web::display_login).post(web::perform_login))
		.route("/accounts/signup", get(web::display_signup).post(web::perform_signup))
		.route("/accounts/logout", post(web::perform_logout))
		.route("/api/v1/resources/books", get(api::list_books))
		.route("/api/v1/resources/books/mybooks", get(api::my_books))
		.route("/api/v1/resources/books/:id", get(api::show_book).post(api::rent_book))
		.nest_service("/static", static_dir)
		.layer(CookieManagerLayer::new())
		.layer(TraceLayer::new_for_http())
		.with_state(state)
}
