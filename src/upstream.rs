//! External collaborators, kept behind narrow traits: the identity provider
//! that resolves bearer tokens, and the blob store that turns uploaded bytes
//! into a public URL. The HTTP implementations speak the hosted service's
//! protocol; tests substitute in-process fakes.

use axum::{
	body::Bytes,
	http::{header, StatusCode},
};
use serde::Deserialize;

/// A stable external identity, as reported by the identity provider.
#[derive(Debug, Clone)]
pub struct Identity {
	pub id: String,
	pub email: String,
}

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
	#[error("credential rejected by the identity provider")]
	InvalidToken,
	#[error("request failed: {0}")]
	Http(#[from] reqwest::Error),
	#[error("unexpected status {0}")]
	Status(StatusCode),
}

/// Resolves an externally-issued bearer credential to a stable identity.
#[axum::async_trait]
pub trait IdentityProvider: Send + Sync {
	async fn resolve(&self, token: &str) -> Result<Identity, UpstreamError>;
}

/// Stores a binary object and returns its public URL.
///
/// With `upsert` set an existing object under the same key is replaced;
/// otherwise keys are expected to be unique per upload.
#[axum::async_trait]
pub trait MediaSink: Send + Sync {
	async fn store(
		&self,
		bucket: &str,
		key: &str,
		content_type: &str,
		bytes: Bytes,
		upsert: bool,
	) -> Result<String, UpstreamError>;
}

pub struct SupabaseIdentity {
	client: reqwest::Client,
	base_url: String,
	api_key: String,
}

impl SupabaseIdentity {
	pub fn new(base_url: String, api_key: String) -> Self {
		Self {
			client: reqwest::Client::new(),
			base_url,
			api_key,
		}
	}
}

#[derive(Debug, Deserialize)]
struct IdentityResponse {
	id: String,
	email: String,
}

#[axum::async_trait]
impl IdentityProvider for SupabaseIdentity {
	async fn resolve(&self, token: &str) -> Result<Identity, UpstreamError> {
		let response = self
			.client
			.get(format!("{}/auth/v1/user", self.base_url))
			.bearer_auth(token)
			.header("apikey", &self.api_key)
			.send()
			.await?;

		match response.status() {
			StatusCode::OK => {}
			StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
				return Err(UpstreamError::InvalidToken)
			}
			status => return Err(UpstreamError::Status(status)),
		}

		let identity: IdentityResponse = response.json().await?;

		Ok(Identity {
			id: identity.id,
			email: identity.email,
		})
	}
}

pub struct SupabaseStorage {
	client: reqwest::Client,
	base_url: String,
	api_key: String,
}

impl SupabaseStorage {
	pub fn new(base_url: String, api_key: String) -> Self {
		Self {
			client: reqwest::Client::new(),
			base_url,
			api_key,
		}
	}
}

#[axum::async_trait]
impl MediaSink for SupabaseStorage {
	async fn store(
		&self,
		bucket: &str,
		key: &str,
		content_type: &str,
		bytes: Bytes,
		upsert: bool,
	) -> Result<String, UpstreamError> {
		let response = self
			.client
			.post(format!("{}/storage/v1/object/{bucket}/{key}", self.base_url))
			.bearer_auth(&self.api_key)
			.header("apikey", &self.api_key)
			.header("x-upsert", if upsert { "true" } else { "false" })
			.header(header::CONTENT_TYPE, content_type)
			.body(bytes)
			.send()
			.await?;

		if !response.status().is_success() {
			return Err(UpstreamError::Status(response.status()));
		}

		Ok(format!(
			"{}/storage/v1/object/public/{bucket}/{key}",
			self.base_url
		))
	}
}
