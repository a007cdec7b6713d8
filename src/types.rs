use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::rental::{Bid, Item, PricingTier, Tid, Uid};

/// A stored book: the rentable item, its pricing tier and the row version
/// used to detect concurrent rentals.
#[derive(Debug, Clone)]
pub struct Book {
	pub item: Item,
	pub tier: PricingTier,
	pub version: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BookQuery {
	pub id: Bid,
	pub title: String,
	pub author: String,
	pub days_rented: Option<i64>,
	pub rental_due_date: DateTime<Utc>,
	pub renting_user_id: Option<Uid>,
	pub rental_version: i64,
	pub book_type_id: Tid,
	pub type_name: String,
	pub base_rate: String,
	pub minimum_days: i64,
	pub minimum_day_rate: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BookTypeQuery {
	pub id: Tid,
	pub name: String,
	pub base_rate: String,
	pub minimum_days: i64,
	pub minimum_day_rate: String,
}

impl Book {
	pub fn from_query(info: BookQuery) -> AppResult<Self> {
		let tier = BookTypeQuery {
			id: info.book_type_id,
			name: info.type_name,
			base_rate: info.base_rate,
			minimum_days: info.minimum_days,
			minimum_day_rate: info.minimum_day_rate,
		}
		.into_tier()?;

		let days_rented = info
			.days_rented
			.map(|days| {
				u32::try_from(days).map_err(|_| {
					AppError::Conversion(format!("book {}: days_rented out of range ({days})", info.id))
				})
			})
			.transpose()?;

		Ok(Book {
			item: Item {
				id: info.id,
				title: info.title,
				author: info.author,
				pricing_tier: tier.id,
				days_rented,
				rental_due_date: info.rental_due_date,
				renting_user: info.renting_user_id,
			},
			tier,
			version: info.rental_version,
		})
	}
}

impl BookTypeQuery {
	pub fn into_tier(self) -> AppResult<PricingTier> {
		let minimum_days = u32::try_from(self.minimum_days).map_err(|_| {
			AppError::Conversion(format!("book type {}: minimum_days out of range", self.id))
		})?;
		Ok(PricingTier {
			base_rate: parse_money(self.id, "base_rate", &self.base_rate)?,
			minimum_day_rate: parse_money(self.id, "minimum_day_rate", &self.minimum_day_rate)?,
			id: self.id,
			name: self.name,
			minimum_days,
		})
	}
}

fn parse_money(id: Tid, column: &str, raw: &str) -> AppResult<Decimal> {
	Decimal::from_str(raw)
		.map_err(|e| AppError::Conversion(format!("book type {id}: bad {column} {raw:?}: {e}")))
}

#[derive(Debug, Clone)]
pub struct NewBook {
	pub title: String,
	pub author: String,
	pub book_type: Tid,
}

#[derive(Debug, Clone)]
pub struct NewBookType {
	pub name: String,
	pub base_rate: Decimal,
	pub minimum_days: u32,
	pub minimum_day_rate: Decimal,
}

/// Exact-match title/author filter, both optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookFilter {
	pub title: Option<String>,
	pub author: Option<String>,
}

impl BookFilter {
	pub fn matches(&self, item: &Item) -> bool {
		self.title.as_deref().map_or(true, |t| t == item.title)
			&& self.author.as_deref().map_or(true, |a| a == item.author)
	}
}

#[derive(Debug, Clone)]
pub struct Account {
	pub uid: Uid,
	pub name: String,
	pub pass_hash: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AccountQuery {
	pub id: Uid,
	pub username: String,
	pub pass_hash: String,
}

impl From<AccountQuery> for Account {
	fn from(info: AccountQuery) -> Self {
		Account {
			uid: info.id,
			name: info.username,
			pass_hash: info.pass_hash,
		}
	}
}

pub type SessionToken = Uuid;

#[derive(Deserialize, Debug)]
pub struct FormLogin {
	pub username: String,
	pub password: String,
	pub next: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct FormRegister {
	pub username: String,
	pub password: String,
	pub password_confirm: String,
}

#[derive(Deserialize, Debug)]
pub struct FormRent {
	pub days_rented: String,
}

#[derive(Deserialize, Debug, Default)]
pub struct NextParam {
	pub next: Option<String>,
}
