use axum::{
	http::StatusCode,
	response::{IntoResponse, Response},
	Json,
};
use maud::html;
use serde_json::json;
use thiserror::Error;

use crate::rental::RentalError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
	#[error("invalid configuration: {0}")]
	Config(String),
	#[error("database operation failed")]
	Database(#[from] sqlx::Error),
	#[error("{0}")]
	Rental(#[from] RentalError),
	#[error("{0}")]
	EntityNotFound(String),
	#[error("{0}")]
	Validation(String),
	#[error("{0}")]
	Conflict(String),
	#[error("Unauthorized")]
	Unauthenticated,
	#[error("{0}")]
	BadCredentials(String),
	#[error("password hashing failed")]
	Password(#[from] bcrypt::BcryptError),
	#[error("blocking task failed")]
	Task(#[from] tokio::task::JoinError),
	#[error("server io failed")]
	Io(#[from] std::io::Error),
	#[error("{0}")]
	Conversion(String),
}

impl AppError {
	pub fn client_code(&self) -> &'static str {
		match self {
			AppError::EntityNotFound(_) => "NOT_FOUND",
			AppError::Validation(_) => "BAD_REQUEST",
			AppError::Rental(RentalError::DaysRentedUndefined) => "NOT_RENTED",
			AppError::Rental(RentalError::AlreadyRentedBySelf) => "ALREADY_RENTED_BY_YOU",
			AppError::Rental(RentalError::AlreadyRentedByOther) => "ALREADY_RENTED",
			AppError::Conflict(_) => "CONFLICT",
			AppError::Unauthenticated | AppError::BadCredentials(_) => "UNAUTHORIZED",
			AppError::Config(_)
			| AppError::Database(_)
			| AppError::Password(_)
			| AppError::Task(_)
			| AppError::Io(_)
			| AppError::Conversion(_) => "INTERNAL",
		}
	}

	pub fn status_code(&self) -> StatusCode {
		match self {
			AppError::EntityNotFound(_) => StatusCode::NOT_FOUND,
			AppError::Validation(_) => StatusCode::BAD_REQUEST,
			AppError::Rental(RentalError::DaysRentedUndefined) => StatusCode::UNPROCESSABLE_ENTITY,
			AppError::Rental(_) => StatusCode::FORBIDDEN,
			AppError::Conflict(_) => StatusCode::CONFLICT,
			AppError::Unauthenticated | AppError::BadCredentials(_) => StatusCode::UNAUTHORIZED,
			AppError::Config(_)
			| AppError::Database(_)
			| AppError::Password(_)
			| AppError::Task(_)
			| AppError::Io(_)
			| AppError::Conversion(_) => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}

	// internal details stay in the log
	fn public_message(&self) -> String {
		let status = self.status_code();
		if status == StatusCode::INTERNAL_SERVER_ERROR {
			tracing::error!(
				error.cause_chain = ?self,
				error.message = %self,
				"Unexpected error happened"
			);
			"Internal server error".to_string()
		} else {
			self.to_string()
		}
	}
}

impl IntoResponse for AppError {
	fn into_response(self) -> Response {
		let status = self.status_code();
		let body = Json(json!({
			"error": self.client_code(),
			"message": self.public_message(),
		}));
		(status, body).into_response()
	}
}

/// Same errors, rendered as a page for the browser side.
#[derive(Debug)]
pub struct HtmlError(pub AppError);

impl From<AppError> for HtmlError {
	fn from(err: AppError) -> Self {
		HtmlError(err)
	}
}

impl From<sqlx::Error> for HtmlError {
	fn from(err: sqlx::Error) -> Self {
		HtmlError(err.into())
	}
}

impl From<RentalError> for HtmlError {
	fn from(err: RentalError) -> Self {
		HtmlError(err.into())
	}
}

impl IntoResponse for HtmlError {
	fn into_response(self) -> Response {
		let status = self.0.status_code();
		let message = self.0.public_message();
		let page = html! { body {
			h1 { (status.as_u16()) " " (status.canonical_reason().unwrap_or("Error")) }
			p { (message) }
			a href="/books/" { "Back to books" }
		} };
		(status, page).into_response()
	}
}
