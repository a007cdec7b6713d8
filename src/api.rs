//! JSON api under `/api/v1/resources/books`.

use axum::{
	extract::{Path, Query, State},
	Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::app::AppState;
use crate::auth::ApiAccount;
use crate::error::AppResult;
use crate::library;
use crate::rental::Bid;
use crate::sql;
use crate::types::{Book, BookFilter};

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct BookJson {
	pub id: Bid,
	pub title: String,
	pub author: String,
	pub status: String,
	#[serde(rename = "type")]
	pub book_type: String,
}

impl BookJson {
	pub fn new(book: &Book, now: DateTime<Utc>) -> Self {
		BookJson {
			id: book.item.id,
			title: book.item.title.clone(),
			author: book.item.author.clone(),
			status: book.item.status(now).to_string(),
			book_type: book.tier.name.clone(),
		}
	}
}

/// A book as its renter sees it, bill included.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct MyBookJson {
	#[serde(flatten)]
	pub book: BookJson,
	pub due_date: String,
	pub days_remaining: i64,
	#[serde(with = "rust_decimal::serde::float")]
	pub rental_minimum_charge: Decimal,
	pub rental_minimum_days: u32,
	#[serde(with = "rust_decimal::serde::float")]
	pub regular_rental_charge: Decimal,
	#[serde(with = "rust_decimal::serde::float")]
	pub total_rental_charge: Decimal,
}

impl MyBookJson {
	pub fn new(book: &Book, now: DateTime<Utc>) -> AppResult<Self> {
		let item = &book.item;
		let tier = &book.tier;
		Ok(MyBookJson {
			book: BookJson::new(book, now),
			due_date: item.rental_due_date.format("%Y-%m-%d %H:%M").to_string(),
			days_remaining: item.days_remaining(now),
			rental_minimum_charge: tier.minimum_charge(),
			rental_minimum_days: tier.minimum_days,
			regular_rental_charge: item.excess_charge(tier)?,
			total_rental_charge: item.rental_charge(tier)?,
		})
	}
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BooksJson {
	pub books: Vec<BookJson>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MyBooksJson {
	pub my_books: Vec<MyBookJson>,
}

#[derive(Debug, Deserialize)]
pub struct RentRequest {
	pub days_rented: i64,
}

pub async fn list_books(
	State(state): State<AppState>,
	Query(filter): Query<BookFilter>,
) -> AppResult<Json<BooksJson>> {
	let now = Utc::now();
	let books = sql::fetch_books(&state.db, &filter).await?;
	Ok(Json(BooksJson {
		books: books.iter().map(|book| BookJson::new(book, now)).collect(),
	}))
}

pub async fn show_book(State(state): State<AppState>, Path(id): Path<Bid>) -> AppResult<Json<BookJson>> {
	let book = library::book(&state.db, id).await?;
	Ok(Json(BookJson::new(&book, Utc::now())))
}

pub async fn rent_book(
	State(state): State<AppState>,
	ApiAccount(account): ApiAccount,
	Path(id): Path<Bid>,
	Json(request): Json<RentRequest>,
) -> AppResult<Json<MyBookJson>> {
	let days = library::check_days(request.days_rented, state.config.max_rental_days)?;
	let now = Utc::now();
	let book = library::rent(&state.db, id, account.uid, days, now).await?;
	Ok(Json(MyBookJson::new(&book, now)?))
}

pub async fn my_books(
	State(state): State<AppState>,
	ApiAccount(account): ApiAccount,
	Query(filter): Query<BookFilter>,
) -> AppResult<Json<MyBooksJson>> {
	let now = Utc::now();
	let books = library::rented_by(&state.db, account.uid, &filter, now).await?;
	let my_books = books
		.iter()
		.map(|book| MyBookJson::new(book, now))
		.collect::<AppResult<_>>()?;
	Ok(Json(MyBooksJson { my_books }))
}
