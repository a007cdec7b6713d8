use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Executor;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::rental::{Bid, Item, PricingTier, Tid, Uid};
use crate::types::{Account, AccountQuery, Book, BookFilter, BookQuery, BookTypeQuery, NewBook, NewBookType, SessionToken};

pub const TABLE_SCHEMA: &str = r#"

CREATE TABLE IF NOT EXISTS accounts (
	id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
	username TEXT NOT NULL UNIQUE,
	pass_hash TEXT NOT NULL,
	created_at DATETIME NOT NULL
);

CREATE TABLE IF NOT EXISTS sessions (
	token TEXT NOT NULL PRIMARY KEY,
	account_id INTEGER NOT NULL,
	created_at DATETIME NOT NULL,
	FOREIGN KEY(account_id) REFERENCES accounts(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS book_types (
	id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
	name TEXT NOT NULL,
	base_rate TEXT NOT NULL,
	minimum_days INTEGER NOT NULL DEFAULT 0,
	minimum_day_rate TEXT NOT NULL DEFAULT '0',
	CHECK(minimum_days >= 0)
);

CREATE TABLE IF NOT EXISTS books (
	id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
	title TEXT NOT NULL,
	author TEXT NOT NULL,
	book_type_id INTEGER NOT NULL,
	days_rented INTEGER DEFAULT NULL,
	rental_due_date DATETIME NOT NULL,
	renting_user_id INTEGER DEFAULT NULL,
	rental_version INTEGER NOT NULL DEFAULT 0,
	CHECK(days_rented IS NULL OR days_rented >= 0),
	FOREIGN KEY(book_type_id) REFERENCES book_types(id) ON DELETE RESTRICT,
	FOREIGN KEY(renting_user_id) REFERENCES accounts(id) ON DELETE SET NULL
);

CREATE INDEX IF NOT EXISTS books_renting_user ON books(renting_user_id);

"#;

const SELECT_BOOKS: &str = r#"
SELECT
	b.id, b.title, b.author, b.days_rented, b.rental_due_date,
	b.renting_user_id, b.rental_version, b.book_type_id,
	t.name AS type_name, t.base_rate, t.minimum_days, t.minimum_day_rate
FROM
	books b
	JOIN book_types t ON t.id = b.book_type_id
"#;

pub async fn open(cfg: &Config) -> AppResult<SqlitePool> {
	let options = SqliteConnectOptions::from_str(&cfg.database_url)?
		.create_if_missing(true)
		.foreign_keys(true);

	let pool = SqlitePoolOptions::new().acquire_timeout(cfg.acquire_timeout);
	// every connection to :memory: is a database of its own
	let pool = if cfg.database_url.contains(":memory:") {
		pool.max_connections(1).idle_timeout(None).max_lifetime(None)
	} else {
		pool.max_connections(cfg.max_connections)
	};

	let pool = pool.connect_with(options).await?;
	migrate(&pool).await?;
	Ok(pool)
}

pub async fn migrate(db: &SqlitePool) -> AppResult<()> {
	db.execute(TABLE_SCHEMA).await?;
	Ok(())
}

pub fn default_book_types() -> Vec<NewBookType> {
	let money = |cents: i64| Decimal::new(cents, 2);
	vec![
		NewBookType { name: "Regular".into(), base_rate: money(150), minimum_days: 2, minimum_day_rate: money(100) },
		NewBookType { name: "Novel".into(), base_rate: money(150), minimum_days: 3, minimum_day_rate: money(150) },
		NewBookType { name: "Fiction".into(), base_rate: money(300), minimum_days: 0, minimum_day_rate: money(0) },
	]
}

/// Inserts the default book types, unless some type already exists.
pub async fn seed_book_types(db: &SqlitePool) -> AppResult<()> {
	let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM book_types;")
		.fetch_one(db)
		.await?;
	if count > 0 {
		return Ok(());
	}
	for book_type in default_book_types() {
		insert_book_type(db, &book_type).await?;
	}
	tracing::info!("seeded default book types");
	Ok(())
}

pub async fn seed_demo_books(db: &SqlitePool, now: DateTime<Utc>) -> AppResult<()> {
	let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM books;")
		.fetch_one(db)
		.await?;
	if count > 0 {
		return Ok(());
	}
	let types = fetch_book_types(db).await?;
	let type_id = |name: &str| types.iter().find(|t| t.name == name).or(types.first()).map(|t| t.id);

	let demo = [
		("A Study in Scarlet", "Arthur Conan Doyle", "Novel"),
		("The Left Hand of Darkness", "Ursula K. Le Guin", "Fiction"),
		("Dune", "Frank Herbert", "Fiction"),
		("The Pragmatic Programmer", "Andrew Hunt", "Regular"),
		("Middlemarch", "George Eliot", "Novel"),
	];
	for (title, author, kind) in demo {
		let book_type = type_id(kind).ok_or_else(|| AppError::Conflict("no book types to seed books with".into()))?;
		insert_book(db, &NewBook { title: title.into(), author: author.into(), book_type }, now).await?;
	}
	tracing::info!(books = demo.len(), "seeded demo books");
	Ok(())
}

pub async fn insert_book_type(db: &SqlitePool, book_type: &NewBookType) -> AppResult<Tid> {
	let id = sqlx::query(r#"
INSERT INTO book_types
	(name, base_rate, minimum_days, minimum_day_rate)
VALUES
	(?, ?, ?, ?);
	"#)
		.bind(&book_type.name)
		.bind(book_type.base_rate.to_string())
		.bind(i64::from(book_type.minimum_days))
		.bind(book_type.minimum_day_rate.to_string())
		.execute(db)
		.await?
		.last_insert_rowid();
	Ok(id)
}

pub async fn fetch_book_types(db: &SqlitePool) -> AppResult<Vec<PricingTier>> {
	sqlx::query_as::<_, BookTypeQuery>(
		"SELECT id, name, base_rate, minimum_days, minimum_day_rate FROM book_types ORDER BY id;",
	)
	.fetch_all(db)
	.await?
	.into_iter()
	.map(BookTypeQuery::into_tier)
	.collect()
}

/// A type still referenced by some book can't go away.
pub async fn delete_book_type(db: &SqlitePool, id: Tid) -> AppResult<()> {
	let result = sqlx::query("DELETE FROM book_types WHERE id = ?;")
		.bind(id)
		.execute(db)
		.await
		.map_err(|e| match e {
			sqlx::Error::Database(ref dbe) if dbe.is_foreign_key_violation() => {
				AppError::Conflict(format!("book type {id} is still used by some book"))
			}
			e => e.into(),
		})?;
	if result.rows_affected() == 0 {
		return Err(AppError::EntityNotFound(format!("no book type with id {id}")));
	}
	Ok(())
}

pub async fn insert_book(db: &SqlitePool, book: &NewBook, now: DateTime<Utc>) -> AppResult<Bid> {
	let id = sqlx::query(r#"
INSERT INTO books
	(title, author, book_type_id, rental_due_date)
VALUES
	(?, ?, ?, ?);
	"#)
		.bind(&book.title)
		.bind(&book.author)
		.bind(book.book_type)
		.bind(now)
		.execute(db)
		.await
		.map_err(|e| match e {
			sqlx::Error::Database(ref dbe) if dbe.is_foreign_key_violation() => {
				AppError::EntityNotFound(format!("no book type with id {}", book.book_type))
			}
			e => e.into(),
		})?
		.last_insert_rowid();
	Ok(id)
}

pub async fn fetch_books(db: &SqlitePool, filter: &BookFilter) -> AppResult<Vec<Book>> {
	let query = format!(
		"{SELECT_BOOKS} WHERE (?1 IS NULL OR b.title = ?1) AND (?2 IS NULL OR b.author = ?2) ORDER BY b.id;"
	);
	sqlx::query_as::<_, BookQuery>(&query)
		.bind(filter.title.as_deref())
		.bind(filter.author.as_deref())
		.fetch_all(db)
		.await?
		.into_iter()
		.map(Book::from_query)
		.collect()
}

pub async fn fetch_book(db: &SqlitePool, id: Bid) -> AppResult<Option<Book>> {
	let query = format!("{SELECT_BOOKS} WHERE b.id = ?;");
	sqlx::query_as::<_, BookQuery>(&query)
		.bind(id)
		.fetch_optional(db)
		.await?
		.map(Book::from_query)
		.transpose()
}

/// Every book that names `uid` as its renter, past due ones included.
pub async fn fetch_books_of(db: &SqlitePool, uid: Uid) -> AppResult<Vec<Book>> {
	let query = format!("{SELECT_BOOKS} WHERE b.renting_user_id = ? ORDER BY b.rental_due_date, b.id;");
	sqlx::query_as::<_, BookQuery>(&query)
		.bind(uid)
		.fetch_all(db)
		.await?
		.into_iter()
		.map(Book::from_query)
		.collect()
}

/// Stores the outcome of a rental, only if the row is still at `version`.
/// Returns false when another rental got committed first.
pub async fn commit_rental(db: &SqlitePool, item: &Item, version: i64) -> AppResult<bool> {
	let result = sqlx::query(r#"
UPDATE books SET
	renting_user_id = ?,
	days_rented = ?,
	rental_due_date = ?,
	rental_version = rental_version + 1
WHERE
	id = ? AND rental_version = ?;
	"#)
		.bind(item.renting_user)
		.bind(item.days_rented.map(i64::from))
		.bind(item.rental_due_date)
		.bind(item.id)
		.bind(version)
		.execute(db)
		.await?;
	Ok(result.rows_affected() == 1)
}

pub async fn insert_account(db: &SqlitePool, username: &str, pass_hash: &str, now: DateTime<Utc>) -> AppResult<Uid> {
	let id = sqlx::query("INSERT INTO accounts (username, pass_hash, created_at) VALUES (?, ?, ?);")
		.bind(username)
		.bind(pass_hash)
		.bind(now)
		.execute(db)
		.await
		.map_err(|e| match e {
			sqlx::Error::Database(ref dbe) if dbe.is_unique_violation() => {
				AppError::Conflict("A user with that username already exists.".into())
			}
			e => e.into(),
		})?
		.last_insert_rowid();
	Ok(id)
}

pub async fn fetch_account(db: &SqlitePool, uid: Uid) -> AppResult<Option<Account>> {
	let account = sqlx::query_as::<_, AccountQuery>("SELECT id, username, pass_hash FROM accounts WHERE id = ?;")
		.bind(uid)
		.fetch_optional(db)
		.await?;
	Ok(account.map(Account::from))
}

pub async fn fetch_account_by_name(db: &SqlitePool, username: &str) -> AppResult<Option<Account>> {
	let account = sqlx::query_as::<_, AccountQuery>("SELECT id, username, pass_hash FROM accounts WHERE username = ?;")
		.bind(username)
		.fetch_optional(db)
		.await?;
	Ok(account.map(Account::from))
}

/// Drops the account and its sessions; books it was renting lose their renter.
pub async fn delete_account(db: &SqlitePool, uid: Uid) -> AppResult<()> {
	let result = sqlx::query("DELETE FROM accounts WHERE id = ?;")
		.bind(uid)
		.execute(db)
		.await?;
	if result.rows_affected() == 0 {
		return Err(AppError::EntityNotFound(format!("no account with id {uid}")));
	}
	Ok(())
}

pub async fn insert_session(db: &SqlitePool, token: SessionToken, uid: Uid, now: DateTime<Utc>) -> AppResult<()> {
	sqlx::query("INSERT INTO sessions (token, account_id, created_at) VALUES (?, ?, ?);")
		.bind(token.to_string())
		.bind(uid)
		.bind(now)
		.execute(db)
		.await?;
	Ok(())
}

pub async fn fetch_session_account(db: &SqlitePool, token: SessionToken) -> AppResult<Option<Account>> {
	let account = sqlx::query_as::<_, AccountQuery>(r#"
SELECT
	a.id, a.username, a.pass_hash
FROM
	sessions s
	JOIN accounts a ON a.id = s.account_id
WHERE
	s.token = ?;
	"#)
		.bind(token.to_string())
		.fetch_optional(db)
		.await?;
	Ok(account.map(Account::from))
}

pub async fn delete_session(db: &SqlitePool, token: SessionToken) -> AppResult<()> {
	sqlx::query("DELETE FROM sessions WHERE token = ?;")
		.bind(token.to_string())
		.execute(db)
		.await?;
	Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
	use super::*;
	use chrono::Duration;

	pub(crate) async fn memory_db() -> SqlitePool {
		let cfg = Config::from_lookup(|key| (key == "DATABASE_URL").then(|| "sqlite::memory:".to_string())).unwrap();
		let db = open(&cfg).await.unwrap();
		seed_book_types(&db).await.unwrap();
		db
	}

	fn new_book(title: &str, author: &str) -> NewBook {
		NewBook { title: title.into(), author: author.into(), book_type: 1 }
	}

	#[tokio::test]
	async fn seeding_is_idempotent() {
		let db = memory_db().await;
		seed_book_types(&db).await.unwrap();
		let types = fetch_book_types(&db).await.unwrap();
		assert_eq!(types.len(), 3);
		assert_eq!(types[0].name, "Regular");
		assert_eq!(types[0].minimum_charge(), Decimal::new(200, 2));

		seed_demo_books(&db, Utc::now()).await.unwrap();
		seed_demo_books(&db, Utc::now()).await.unwrap();
		assert_eq!(fetch_books(&db, &BookFilter::default()).await.unwrap().len(), 5);
	}

	#[tokio::test]
	async fn books_round_trip() {
		let db = memory_db().await;
		let now = Utc::now();
		let id = insert_book(&db, &new_book("Test Title", "Test Author"), now).await.unwrap();

		let book = fetch_book(&db, id).await.unwrap().unwrap();
		assert_eq!(book.item.title, "Test Title");
		assert_eq!(book.item.renting_user, None);
		assert_eq!(book.item.days_rented, None);
		assert_eq!(book.item.rental_due_date, now);
		assert_eq!(book.tier.name, "Regular");
		assert_eq!(book.version, 0);

		assert!(fetch_book(&db, id + 1).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn book_needs_existing_type() {
		let db = memory_db().await;
		let book = NewBook { book_type: 42, ..new_book("T", "A") };
		let err = insert_book(&db, &book, Utc::now()).await.unwrap_err();
		assert!(matches!(err, AppError::EntityNotFound(_)));
	}

	#[tokio::test]
	async fn filters_match_exactly() {
		let db = memory_db().await;
		let now = Utc::now();
		insert_book(&db, &new_book("Not returned", "TestAuthor"), now).await.unwrap();
		insert_book(&db, &new_book("TestTitle", "TestAuthor"), now).await.unwrap();
		insert_book(&db, &new_book("TestTitle", "Not returned"), now).await.unwrap();

		let by_author = BookFilter { title: None, author: Some("TestAuthor".into()) };
		assert_eq!(fetch_books(&db, &by_author).await.unwrap().len(), 2);

		let both = BookFilter { title: Some("TestTitle".into()), author: Some("TestAuthor".into()) };
		let books = fetch_books(&db, &both).await.unwrap();
		assert_eq!(books.len(), 1);
		assert_eq!(books[0].item.title, "TestTitle");
		assert_eq!(books[0].item.author, "TestAuthor");
	}

	#[tokio::test]
	async fn stale_version_is_not_committed() {
		let db = memory_db().await;
		let now = Utc::now();
		let alice = insert_account(&db, "alice", "x", now).await.unwrap();
		let bob = insert_account(&db, "bob", "x", now).await.unwrap();
		let id = insert_book(&db, &new_book("T", "A"), now).await.unwrap();
		let snapshot = fetch_book(&db, id).await.unwrap().unwrap();

		let first = snapshot.item.request_rental(alice, 3, now).unwrap();
		let second = snapshot.item.request_rental(bob, 5, now).unwrap();
		assert!(commit_rental(&db, &first, snapshot.version).await.unwrap());
		assert!(!commit_rental(&db, &second, snapshot.version).await.unwrap());

		let stored = fetch_book(&db, id).await.unwrap().unwrap();
		assert_eq!(stored.item.renting_user, Some(alice));
		assert_eq!(stored.item.days_rented, Some(3));
		assert_eq!(stored.item.rental_due_date, now + Duration::days(3));
		assert_eq!(stored.version, 1);
	}

	#[tokio::test]
	async fn referenced_book_type_is_kept() {
		let db = memory_db().await;
		insert_book(&db, &new_book("T", "A"), Utc::now()).await.unwrap();

		let err = delete_book_type(&db, 1).await.unwrap_err();
		assert!(matches!(err, AppError::Conflict(_)));
		delete_book_type(&db, 3).await.unwrap();
		assert!(matches!(delete_book_type(&db, 3).await, Err(AppError::EntityNotFound(_))));
	}

	#[tokio::test]
	async fn deleted_renter_frees_the_book() {
		let db = memory_db().await;
		let now = Utc::now();
		let uid = insert_account(&db, "alice", "x", now).await.unwrap();
		let id = insert_book(&db, &new_book("T", "A"), now).await.unwrap();
		let snapshot = fetch_book(&db, id).await.unwrap().unwrap();
		let rented = snapshot.item.request_rental(uid, 3, now).unwrap();
		assert!(commit_rental(&db, &rented, snapshot.version).await.unwrap());

		let token = SessionToken::new_v4();
		insert_session(&db, token, uid, now).await.unwrap();
		delete_account(&db, uid).await.unwrap();

		let book = fetch_book(&db, id).await.unwrap().unwrap();
		assert_eq!(book.item.renting_user, None);
		assert!(book.item.is_available(now));
		assert!(fetch_session_account(&db, token).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn accounts_and_sessions() {
		let db = memory_db().await;
		let now = Utc::now();
		let uid = insert_account(&db, "alice", "hash", now).await.unwrap();
		let dup = insert_account(&db, "alice", "other", now).await.unwrap_err();
		assert!(matches!(dup, AppError::Conflict(_)));

		let account = fetch_account_by_name(&db, "alice").await.unwrap().unwrap();
		assert_eq!(account.uid, uid);
		assert_eq!(fetch_account(&db, uid).await.unwrap().unwrap().name, "alice");
		assert!(fetch_account_by_name(&db, "bob").await.unwrap().is_none());

		let token = SessionToken::new_v4();
		insert_session(&db, token, uid, now).await.unwrap();
		assert_eq!(fetch_session_account(&db, token).await.unwrap().unwrap().uid, uid);
		delete_session(&db, token).await.unwrap();
		assert!(fetch_session_account(&db, token).await.unwrap().is_none());
	}
}
