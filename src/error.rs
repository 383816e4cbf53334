use std::borrow::Cow;

use axum::{
	body::Body,
	extract::{multipart::MultipartError, rejection},
	http::{Response, StatusCode},
	response::IntoResponse,
	Json,
};
use serde::Serialize;

use crate::{extract::AuthError, upstream::UpstreamError};

/// Error type for the application.
///
/// The Display trait of the internal variants can show sensitive
/// information; those are logged here and replaced with a generic message
/// before reaching the client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("validation error: {0}")]
	Validation(#[from] validator::ValidationErrors),
	#[error("{0}")]
	Invalid(Cow<'static, str>),
	#[error("json error: {0}")]
	Json(#[from] rejection::JsonRejection),
	#[error("query error: {0}")]
	Query(#[from] rejection::QueryRejection),
	#[error("multipart error: {0}")]
	Multipart(#[from] MultipartError),
	#[error("{0}")]
	Auth(#[from] AuthError),
	#[error("{0} not found")]
	NotFound(&'static str),
	#[error("{0}")]
	Conflict(Cow<'static, str>),
	#[error("upstream error: {0}")]
	Upstream(#[from] UpstreamError),
	#[error("database error: {0}")]
	Database(#[from] sqlx::Error),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
	pub message: String,
}

impl Error {
	pub fn status(&self) -> StatusCode {
		match self {
			// Conflicts (handle taken, self-follow, duplicate follow) are
			// 400 in the public contract, not 409.
			Self::Validation(..)
			| Self::Invalid(..)
			| Self::Json(..)
			| Self::Query(..)
			| Self::Multipart(..)
			| Self::Conflict(..) => StatusCode::BAD_REQUEST,
			Self::Auth(..) => StatusCode::UNAUTHORIZED,
			Self::NotFound(..) => StatusCode::NOT_FOUND,
			Self::Upstream(..) => StatusCode::BAD_GATEWAY,
			Self::Database(..) => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}
}

impl IntoResponse for Error {
	fn into_response(self) -> Response<Body> {
		let status = self.status();

		let message = match &self {
			Error::Database(error) => {
				tracing::error!(%error, "database failure");
				"Server error".to_owned()
			}
			Error::Upstream(error) => {
				tracing::error!(%error, "upstream failure");
				"Upstream service failure".to_owned()
			}
			error => error.to_string(),
		};

		(status, Json(ErrorResponse { message })).into_response()
	}
}
