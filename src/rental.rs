// rental pricing & availability

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

pub type Uid = i64;
pub type Bid = i64;
pub type Tid = i64;

/// Book category: how a rental of a book of this type is billed.
///
/// Rates are not validated here, a negative rate is a misconfiguration that
/// [`Item::rental_charge`] absorbs by clamping at zero.
#[derive(Debug, Clone, PartialEq)]
pub struct PricingTier {
	pub id: Tid,
	pub name: String,
	pub base_rate: Decimal,
	pub minimum_days: u32,
	pub minimum_day_rate: Decimal,
}

impl PricingTier {
	/// Flat charge of the minimum block. Not clamped, display only.
	pub fn minimum_charge(&self) -> Decimal {
		Decimal::from(self.minimum_days) * self.minimum_day_rate
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct Item {
	pub id: Bid,
	pub title: String,
	pub author: String,
	pub pricing_tier: Tid,
	pub days_rented: Option<u32>,
	pub rental_due_date: DateTime<Utc>,
	pub renting_user: Option<Uid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RentalStatus {
	Available,
	Rented,
}

impl RentalStatus {
	pub fn as_str(self) -> &'static str {
		match self {
			RentalStatus::Available => "Available",
			RentalStatus::Rented => "Rented",
		}
	}
}

impl std::fmt::Display for RentalStatus {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RentalError {
	#[error("Error: days_rented is undefined")]
	DaysRentedUndefined,
	#[error("You're already renting this book.")]
	AlreadyRentedBySelf,
	#[error("Sorry, someone else is renting this right now.")]
	AlreadyRentedByOther,
}

impl Item {
	/// A fresh, never rented item. Its due date starts at `now`.
	pub fn new(id: Bid, title: String, author: String, pricing_tier: Tid, now: DateTime<Utc>) -> Self {
		Item {
			id,
			title,
			author,
			pricing_tier,
			days_rented: None,
			rental_due_date: now,
			renting_user: None,
		}
	}

	// past due OR nobody holding it; a stale renter on a past due item is ignored
	pub fn is_available(&self, now: DateTime<Utc>) -> bool {
		self.rental_due_date < now || self.renting_user.is_none()
	}

	/// Derived from the renter and the due date on every call, never stored.
	pub fn status(&self, now: DateTime<Utc>) -> RentalStatus {
		if self.is_available(now) {
			RentalStatus::Available
		} else {
			RentalStatus::Rented
		}
	}

	pub fn is_rented_by(&self, user: Uid, now: DateTime<Utc>) -> bool {
		!self.is_available(now) && self.renting_user == Some(user)
	}

	/// Whole days left until the due date, truncated, never negative.
	pub fn days_remaining(&self, now: DateTime<Utc>) -> i64 {
		(self.rental_due_date - now).num_days().max(0)
	}

	/// Per-day part of the bill: days beyond the minimum block at `base_rate`.
	pub fn excess_charge(&self, tier: &PricingTier) -> Result<Decimal, RentalError> {
		let days = self.days_rented.ok_or(RentalError::DaysRentedUndefined)?;
		let excess_days = days.saturating_sub(tier.minimum_days);
		Ok(Decimal::from(excess_days) * tier.base_rate)
	}

	/// Minimum block (billed in full even if fewer days were rented) plus the
	/// excess days. Never negative.
	pub fn rental_charge(&self, tier: &PricingTier) -> Result<Decimal, RentalError> {
		let excess = self.excess_charge(tier)?;
		Ok((tier.minimum_charge() + excess).max(Decimal::ZERO))
	}

	/// Validates a rent request and returns the item as it should be stored.
	///
	/// `days` is expected to be positive and already bounds checked by the
	/// caller. Persisting the result, and making sure no other rental was
	/// committed in between, is the caller's job.
	pub fn request_rental(&self, user: Uid, days: u32, now: DateTime<Utc>) -> Result<Item, RentalError> {
		if !self.is_available(now) {
			return Err(if self.renting_user == Some(user) {
				RentalError::AlreadyRentedBySelf
			} else {
				RentalError::AlreadyRentedByOther
			});
		}

		Ok(Item {
			renting_user: Some(user),
			days_rented: Some(days),
			rental_due_date: now
				.checked_add_signed(Duration::days(i64::from(days)))
				.unwrap_or(DateTime::<Utc>::MAX_UTC),
			..self.clone()
		})
	}
}
