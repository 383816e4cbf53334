use axum::{
	body::Body,
	extract::{FromRef, FromRequest, FromRequestParts, Request},
	http::{header, request, Response},
	response::IntoResponse,
};
use serde::de;

use crate::{error::Error, model, route, upstream::UpstreamError};

/// Extractor that deserializes a JSON body and validates it.
pub struct Json<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for Json<T>
where
	T: de::DeserializeOwned + validator::Validate,
	S: Send + Sync,
{
	type Rejection = Error;

	async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
		let result = axum::extract::Json::<T>::from_request(req, state).await?.0;

		result.validate().map_err(Error::Validation)?;
		Ok(Self(result))
	}
}

impl<T> IntoResponse for Json<T>
where
	T: serde::Serialize,
{
	fn into_response(self) -> Response<Body> {
		axum::extract::Json(self.0).into_response()
	}
}

/// Extractor that deserializes a query string and validates it.
pub struct Query<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequestParts<S> for Query<T>
where
	T: de::DeserializeOwned + validator::Validate,
	S: Send + Sync,
{
	type Rejection = Error;

	async fn from_request_parts(
		parts: &mut request::Parts,
		state: &S,
	) -> Result<Self, Self::Rejection> {
		let result = axum::extract::Query::<T>::from_request_parts(parts, state)
			.await?
			.0;

		result.validate().map_err(Error::Validation)?;
		Ok(Self(result))
	}
}

/// An error that can occur while authenticating a request.
///
/// The message is presented to the client, so it stays deliberately vague.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
	#[error("Not authorized")]
	MissingToken,
	#[error("Not authorized")]
	InvalidToken,
}

/// Extracts the authenticated user from the request.
///
/// The bearer token is resolved through the identity provider, and the local
/// user record is loaded by external id. A resolved identity with no local
/// record is provisioned on the spot, so a first authenticated request is
/// enough to bring a user into existence.
#[derive(Debug)]
pub struct Auth {
	pub user: model::User,
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Auth
where
	crate::State: FromRef<S>,
	S: Sync + Send,
{
	type Rejection = Error;

	async fn from_request_parts(
		parts: &mut request::Parts,
		state: &S,
	) -> Result<Self, Self::Rejection> {
		let token = parts
			.headers
			.get(header::AUTHORIZATION)
			.and_then(|value| value.to_str().ok())
			.and_then(|value| value.strip_prefix("Bearer "))
			.ok_or(AuthError::MissingToken)?;

		let state = crate::State::from_ref(state);

		let identity = state.identity.resolve(token).await.map_err(|e| match e {
			UpstreamError::InvalidToken => Error::Auth(AuthError::InvalidToken),
			e => Error::Upstream(e),
		})?;

		let user = route::auth::provision(&state.database, &identity.id, &identity.email).await?;

		Ok(Self { user })
	}
}
