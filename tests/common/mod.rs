#![allow(dead_code)]

use chrono::{DateTime, Utc};

use book_rental::{
	app::AppState,
	auth,
	config::Config,
	library,
	rental::{Bid, Tid, Uid},
	sql,
	types::{Account, NewBook},
};

pub const REGULAR: Tid = 1;
pub const NOVEL: Tid = 2;

pub async fn state() -> AppState {
	let cfg = Config::from_lookup(|key| match key {
		"DATABASE_URL" => Some("sqlite::memory:".to_string()),
		_ => None,
	})
	.expect("config");
	let db = sql::open(&cfg).await.expect("open db");
	sql::seed_book_types(&db).await.expect("seed");
	AppState::new(db, cfg)
}

pub async fn user(state: &AppState, name: &str, password: &str) -> Account {
	auth::register(&state.db, name, password, Utc::now()).await.expect("register")
}

pub async fn book(state: &AppState, title: &str, author: &str, book_type: Tid) -> Bid {
	let book = NewBook {
		title: title.to_string(),
		author: author.to_string(),
		book_type,
	};
	sql::insert_book(&state.db, &book, Utc::now()).await.expect("insert book")
}

/// Rents `id` as if the request happened at `at`.
pub async fn rent_at(state: &AppState, id: Bid, uid: Uid, days: u32, at: DateTime<Utc>) {
	library::rent(&state.db, id, uid, days, at).await.expect("rent");
}
