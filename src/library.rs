// load, decide, commit

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::error::{AppError, AppResult};
use crate::rental::{Bid, RentalError, Uid};
use crate::sql;
use crate::types::{Book, BookFilter};

pub async fn book(db: &SqlitePool, id: Bid) -> AppResult<Book> {
	sql::fetch_book(db, id)
		.await?
		.ok_or_else(|| AppError::EntityNotFound(format!("no book with id {id}")))
}

/// Books anyone could rent right now.
pub async fn available_books(db: &SqlitePool, now: DateTime<Utc>) -> AppResult<Vec<Book>> {
	let mut books = sql::fetch_books(db, &BookFilter::default()).await?;
	books.retain(|book| book.item.is_available(now));
	Ok(books)
}

/// Books `uid` is currently renting, soonest due first.
pub async fn rented_by(db: &SqlitePool, uid: Uid, filter: &BookFilter, now: DateTime<Utc>) -> AppResult<Vec<Book>> {
	let mut books = sql::fetch_books_of(db, uid).await?;
	books.retain(|book| book.item.is_rented_by(uid, now) && filter.matches(&book.item));
	books.sort_by_key(|book| book.item.rental_due_date);
	Ok(books)
}

/// Rents book `id` to `uid` for `days` days and returns the stored result.
///
/// `days` must already be range checked. If someone else commits a rental of
/// the same book between our read and our write, the loser gets
/// [`RentalError::AlreadyRentedByOther`].
pub async fn rent(db: &SqlitePool, id: Bid, uid: Uid, days: u32, now: DateTime<Utc>) -> AppResult<Book> {
	let before = book(db, id).await?;
	let item = before.item.request_rental(uid, days, now).map_err(|err| {
		tracing::info!(book_id = id, user_id = uid, %err, "rental rejected");
		err
	})?;

	if !sql::commit_rental(db, &item, before.version).await? {
		tracing::warn!(book_id = id, user_id = uid, "lost a concurrent rental");
		return Err(RentalError::AlreadyRentedByOther.into());
	}

	tracing::info!(book_id = id, user_id = uid, days, due = %item.rental_due_date, "book rented");
	Ok(Book {
		item,
		tier: before.tier,
		version: before.version + 1,
	})
}

/// Range check of the requested rental length, shared by both front ends.
pub fn parse_days(raw: &str, max_days: u32) -> AppResult<u32> {
	let days: i64 = raw
		.trim()
		.parse()
		.map_err(|_| AppError::Validation(format!("days_rented must be a number, got {raw:?}")))?;
	check_days(days, max_days)
}

pub fn check_days(days: i64, max_days: u32) -> AppResult<u32> {
	match u32::try_from(days) {
		Ok(days) if (1..=max_days).contains(&days) => Ok(days),
		_ => Err(AppError::Validation(format!("days_rented must be between 1 and {max_days}"))),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::sql::tests::memory_db;
	use crate::types::NewBook;
	use chrono::Duration;

	async fn fixture() -> (SqlitePool, Uid, Uid) {
		let db = memory_db().await;
		let now = Utc::now();
		let alice = sql::insert_account(&db, "alice", "x", now).await.unwrap();
		let bob = sql::insert_account(&db, "bob", "x", now).await.unwrap();
		(db, alice, bob)
	}

	async fn add_book(db: &SqlitePool, title: &str) -> Bid {
		let book = NewBook { title: title.into(), author: "Test Author".into(), book_type: 1 };
		sql::insert_book(db, &book, Utc::now()).await.unwrap()
	}

	#[tokio::test]
	async fn rent_then_reject() {
		let (db, alice, bob) = fixture().await;
		let id = add_book(&db, "Test Book").await;
		let now = Utc::now();

		let book = rent(&db, id, alice, 10, now).await.unwrap();
		assert_eq!(book.item.renting_user, Some(alice));
		assert_eq!(book.item.days_rented, Some(10));

		let again = rent(&db, id, alice, 2, now).await.unwrap_err();
		assert!(matches!(again, AppError::Rental(RentalError::AlreadyRentedBySelf)));
		let other = rent(&db, id, bob, 2, now).await.unwrap_err();
		assert!(matches!(other, AppError::Rental(RentalError::AlreadyRentedByOther)));

		let missing = rent(&db, id + 100, bob, 2, now).await.unwrap_err();
		assert!(matches!(missing, AppError::EntityNotFound(_)));
	}

	#[tokio::test]
	async fn past_due_book_can_be_rented_again() {
		let (db, alice, bob) = fixture().await;
		let id = add_book(&db, "Test Book").await;
		let then = Utc::now() - Duration::days(5);
		rent(&db, id, bob, 1, then).await.unwrap();

		let book = rent(&db, id, alice, 10, Utc::now()).await.unwrap();
		assert_eq!(book.item.renting_user, Some(alice));
		assert_eq!(book.version, 2);
	}

	#[tokio::test]
	async fn listings_follow_the_clock() {
		let (db, alice, bob) = fixture().await;
		let now = Utc::now();
		let mine = add_book(&db, "Rented Book").await;
		let free = add_book(&db, "No User Book").await;
		let old = add_book(&db, "Past Due Book").await;
		let theirs = add_book(&db, "Their Book").await;

		rent(&db, mine, alice, 3, now).await.unwrap();
		rent(&db, old, alice, 1, now - Duration::days(4)).await.unwrap();
		rent(&db, theirs, bob, 3, now).await.unwrap();

		let available: Vec<Bid> = available_books(&db, now).await.unwrap().iter().map(|b| b.item.id).collect();
		assert_eq!(available, vec![free, old]);

		let my_books = rented_by(&db, alice, &BookFilter::default(), now).await.unwrap();
		assert_eq!(my_books.len(), 1);
		assert_eq!(my_books[0].item.id, mine);

		let later = now + Duration::days(4);
		assert!(rented_by(&db, alice, &BookFilter::default(), later).await.unwrap().is_empty());
		assert_eq!(available_books(&db, later).await.unwrap().len(), 4);
	}

	#[tokio::test]
	async fn my_books_sorted_by_due_date() {
		let (db, alice, _) = fixture().await;
		let now = Utc::now();
		let long = add_book(&db, "Long").await;
		let short = add_book(&db, "Short").await;
		rent(&db, long, alice, 5, now).await.unwrap();
		rent(&db, short, alice, 3, now).await.unwrap();

		let ids: Vec<Bid> = rented_by(&db, alice, &BookFilter::default(), now)
			.await
			.unwrap()
			.iter()
			.map(|b| b.item.id)
			.collect();
		assert_eq!(ids, vec![short, long]);

		let filter = BookFilter { title: Some("Long".into()), author: None };
		assert_eq!(rented_by(&db, alice, &filter, now).await.unwrap().len(), 1);
	}

	#[test]
	fn days_bounds() {
		assert_eq!(parse_days("10", 29).unwrap(), 10);
		assert_eq!(parse_days(" 29 ", 29).unwrap(), 29);
		assert!(parse_days("0", 29).is_err());
		assert!(parse_days("30", 29).is_err());
		assert!(parse_days("-3", 29).is_err());
		assert!(parse_days("ten", 29).is_err());
		assert!(check_days(i64::MAX, 29).is_err());
	}
}
