#![warn(clippy::pedantic)]

use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use chirp::{
	upstream::{SupabaseIdentity, SupabaseStorage},
	Database, State,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tower_http::cors::CorsLayer;

#[tokio::main]
async fn main() {
	tracing_subscriber::fmt::init();
	dotenvy::dotenv().ok();

	let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
	let supabase_url = std::env::var("SUPABASE_URL").expect("SUPABASE_URL must be set");
	let supabase_key =
		std::env::var("SUPABASE_SERVICE_KEY").expect("SUPABASE_SERVICE_KEY must be set");

	let options = database_url
		.parse::<SqliteConnectOptions>()
		.expect("DATABASE_URL must be a sqlite url")
		.create_if_missing(true);

	let database: Database = SqlitePoolOptions::new()
		.connect_with(options)
		.await
		.expect("failed to open database");

	sqlx::migrate!()
		.run(&database)
		.await
		.expect("failed to run migrations");

	let state = State {
		database,
		identity: Arc::new(SupabaseIdentity::new(
			supabase_url.clone(),
			supabase_key.clone(),
		)),
		media: Arc::new(SupabaseStorage::new(supabase_url, supabase_key)),
	};

	let cors = match std::env::var("FRONTEND_URL") {
		Ok(origin) => CorsLayer::new()
			.allow_origin(
				origin
					.parse::<HeaderValue>()
					.expect("FRONTEND_URL must be a valid origin"),
			)
			.allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
			.allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
			.allow_credentials(true),
		Err(_) => CorsLayer::permissive(),
	};

	let app = chirp::app(state).layer(cors);

	let port = std::env::var("PORT").map_or_else(
		|_| 3000,
		|port| port.parse().expect("PORT must be a number"),
	);

	let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
		.await
		.expect("failed to bind to port");

	tracing::info!("listening on port {}", port);

	axum::serve(listener, app).await.unwrap();
}
