// browser side, rendered with maud

use axum::{
	extract::{Path, Query, State},
	http::StatusCode,
	response::{IntoResponse, Redirect, Response},
	Form,
};
use chrono::{DateTime, Utc};
use maud::{html, Markup, DOCTYPE};
use rust_decimal::Decimal;
use tower_cookies::Cookies;

use crate::app::AppState;
use crate::auth::{self, SessionAccount};
use crate::error::{AppError, HtmlError};
use crate::library;
use crate::rental::Bid;
use crate::types::{Account, Book, FormLogin, FormRegister, FormRent, NextParam};

fn money(amount: Decimal) -> String {
	format!("${:.2}", amount)
}

fn date(at: DateTime<Utc>) -> String {
	at.format("%Y-%m-%d %H:%M UTC").to_string()
}

fn page(title: &str, account: Option<&Account>, content: Markup) -> Markup {
	html! {
		(DOCTYPE)
		html {
			head {
				meta charset="utf-8";
				title { (title) " | Book Rental" }
				link rel="stylesheet" href="/static/style.css";
			}
			body {
				nav {
					a href="/books/" { "Books" }
					@if let Some(account) = account {
						" | " a href="/books/mybooks" { "My books" }
						" | " span { (account.name) }
						form.inline method="POST" action="/accounts/logout" {
							button { "Log out" }
						}
					} @else {
						" | " a href=(auth::LOGIN_PATH) { "Log in" }
						" | " a href=(auth::SIGNUP_PATH) { "Sign up" }
					}
				}
				main { (content) }
			}
		}
	}
}

fn book_rows(books: &[Book]) -> Markup {
	html! {
		table {
			thead { tr {
				th { "Title" }
				th { "Author" }
				th { "Type" }
			} }
			tbody {
				@for book in books {
					tr {
						td { a href={ "/books/" (book.item.id) } { (book.item.title) } }
						td { (book.item.author) }
						td { (book.tier.name) }
					}
				}
			}
		}
	}
}

pub async fn display_books(
	State(state): State<AppState>,
	account: Option<SessionAccount>,
) -> Result<Markup, HtmlError> {
	let books = library::available_books(&state.db, Utc::now()).await?;
	let account = account.map(|SessionAccount(account)| account);

	Ok(page("Books", account.as_ref(), html! {
		h1 { "Available books" }
		@if books.is_empty() {
			p { "There are currently no books available." }
		} @else {
			(book_rows(&books))
		}
	}))
}

pub async fn display_my_books(
	State(state): State<AppState>,
	SessionAccount(account): SessionAccount,
) -> Result<Markup, HtmlError> {
	let now = Utc::now();
	let books = library::rented_by(&state.db, account.uid, &Default::default(), now).await?;

	Ok(page("My books", Some(&account), html! {
		h1 { "My books" }
		@if books.is_empty() {
			p { "You currently have no rented books." }
		} @else {
			table {
				thead { tr {
					th { "Title" }
					th { "Author" }
					th { "Due" }
					th { "Days remaining" }
				} }
				tbody {
					@for book in &books {
						tr {
							td { a href={ "/books/" (book.item.id) } { (book.item.title) } }
							td { (book.item.author) }
							td { (date(book.item.rental_due_date)) }
							td { (book.item.days_remaining(now)) }
						}
					}
				}
			}
		}
	}))
}

pub async fn display_book(
	State(state): State<AppState>,
	SessionAccount(account): SessionAccount,
	Path(id): Path<Bid>,
) -> Result<Markup, HtmlError> {
	let now = Utc::now();
	let book = library::book(&state.db, id).await?;
	let item = &book.item;
	let tier = &book.tier;

	// only the renter gets to see the bill
	let charge = if item.is_rented_by(account.uid, now) {
		Some((item.excess_charge(tier)?, item.rental_charge(tier)?))
	} else {
		None
	};

	Ok(page(&item.title, Some(&account), html! {
		h1 { (item.title) }
		p { "Author: " (item.author) }
		p { "Type: " (tier.name) }
		p.pricing {
			"Minimum charge: " (money(tier.minimum_charge()))
			" for the first " (tier.minimum_days) " days, then "
			(money(tier.base_rate)) " per day."
		}
		@if item.is_available(now) {
			p { "Status: " b { "Available" } }
			form method="POST" action={ "/books/" (item.id) "/rent" } {
				label for="days_rented" { "Days to borrow:" }
				select id="days_rented" name="days_rented" {
					@for days in 1..=state.config.max_rental_days {
						option value=(days) { (days) }
					}
				}
				button { "Rent" }
			}
		} @else {
			p { "Status: In use" }
			p { "Due: " (date(item.rental_due_date)) }
			@if let Some((excess, total)) = charge {
				p { "Days remaining: " (item.days_remaining(now)) }
				ul {
					li { "Minimum charge: " (money(tier.minimum_charge())) }
					li { "Regular rental charge: " (money(excess)) }
				}
				p { "Total rental charge: " b { (money(total)) } }
			}
		}
	}))
}

pub async fn perform_rent(
	State(state): State<AppState>,
	SessionAccount(account): SessionAccount,
	Path(id): Path<Bid>,
	Form(form): Form<FormRent>,
) -> Result<Redirect, HtmlError> {
	let days = library::parse_days(&form.days_rented, state.config.max_rental_days)?;
	library::rent(&state.db, id, account.uid, days, Utc::now()).await?;
	Ok(Redirect::to(&format!("/books/{id}")))
}

fn login_form(next: &str, error: Option<&str>) -> Markup {
	page("Log in", None, html! {
		h1 { "Log in" }
		@if let Some(error) = error {
			p.error { (error) }
		}
		form method="POST" action=(auth::LOGIN_PATH) {
			input name="username" type="text" placeholder="username" required;
			input name="password" type="password" placeholder="password" required;
			input name="next" type="hidden" value=(next);
			button { "Log in" }
		}
		p { "No account? " a href=(auth::SIGNUP_PATH) { "Sign up" } }
	})
}

pub async fn display_login(Query(param): Query<NextParam>) -> Markup {
	login_form(auth::safe_next(param.next.as_deref()), None)
}

pub async fn perform_login(
	State(state): State<AppState>,
	cookies: Cookies,
	Form(login): Form<FormLogin>,
) -> Result<Response, HtmlError> {
	let next = auth::safe_next(login.next.as_deref());
	match auth::authenticate(&state.db, &login.username, &login.password, None).await {
		Ok(account) => {
			auth::start_session(&state.db, &cookies, account.uid, Utc::now()).await?;
			tracing::info!(user_id = account.uid, "logged in");
			Ok(Redirect::to(next).into_response())
		}
		Err(AppError::BadCredentials(_)) => {
			let form = login_form(next, Some("Please enter a correct username and password."));
			Ok((StatusCode::UNAUTHORIZED, form).into_response())
		}
		Err(err) => Err(err.into()),
	}
}

fn signup_form(error: Option<&str>) -> Markup {
	page("Sign up", None, html! {
		h1 { "Sign up" }
		@if let Some(error) = error {
			p.error { (error) }
		}
		form method="POST" action=(auth::SIGNUP_PATH) {
			input name="username" type="text" placeholder="username" required;
			input name="password" type="password" placeholder="password" required;
			input name="password_confirm" type="password" placeholder="password again" required;
			button { "Sign up" }
		}
	})
}

pub async fn display_signup() -> Markup {
	signup_form(None)
}

pub async fn perform_signup(
	State(state): State<AppState>,
	cookies: Cookies,
	Form(register): Form<FormRegister>,
) -> Result<Response, HtmlError> {
	if register.password != register.password_confirm {
		let form = signup_form(Some("The two password fields didn't match."));
		return Ok((StatusCode::BAD_REQUEST, form).into_response());
	}
	let now = Utc::now();
	match auth::register(&state.db, &register.username, &register.password, now).await {
		Ok(account) => {
			auth::start_session(&state.db, &cookies, account.uid, now).await?;
			Ok(Redirect::to("/books/").into_response())
		}
		Err(err @ (AppError::Validation(_) | AppError::Conflict(_))) => {
			let form = signup_form(Some(&err.to_string()));
			Ok((err.status_code(), form).into_response())
		}
		Err(err) => Err(err.into()),
	}
}

pub async fn perform_logout(State(state): State<AppState>, cookies: Cookies) -> Result<Redirect, HtmlError> {
	auth::end_session(&state.db, &cookies).await?;
	Ok(Redirect::to("/books/"))
}
