#![warn(clippy::pedantic)]

//! Backend for a social micro-posting service: short posts with optional
//! media, reverse-chronological cursor feeds, likes, and follows. Identity
//! and blob storage live behind the narrow traits in [`upstream`].

pub mod error;
pub mod extract;
pub mod model;
pub mod route;
pub mod upstream;

use std::sync::Arc;

use axum::{extract::DefaultBodyLimit, routing::get, Router};
use tower_http::trace::TraceLayer;

pub use error::Error;

use upstream::{IdentityProvider, MediaSink};

pub type Database = sqlx::Pool<sqlx::Sqlite>;
pub type AppState = State;

/// Largest request body we accept, sized to fit a tweet media upload plus
/// multipart framing. Per-field limits are enforced in the handlers.
const MAX_BODY_BYTES: usize = 12 * 1024 * 1024;

/// The shared application state.
///
/// The identity provider and media sink are trait objects so tests can swap
/// the hosted services for in-process fakes.
#[derive(Clone, axum::extract::FromRef)]
pub struct State {
	pub database: Database,
	pub identity: Arc<dyn IdentityProvider>,
	pub media: Arc<dyn MediaSink>,
}

/// Builds the full application router.
pub fn app(state: State) -> Router {
	Router::new()
		.nest("/api/auth", route::auth::routes())
		.nest("/api/tweets", route::tweets::routes())
		.nest("/api/users", route::users::routes())
		.route("/health", get(|| async { "OK" }))
		.layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
		.layer(TraceLayer::new_for_http())
		.with_state(state)
}
