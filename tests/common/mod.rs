#![allow(dead_code)]

use std::{
	collections::HashMap,
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc, Mutex,
	},
};

use axum::{
	body::Bytes,
	http::{header, HeaderValue, StatusCode},
};
use axum_test::{TestRequest, TestServer};
use chirp::{
	upstream::{Identity, IdentityProvider, MediaSink, UpstreamError},
	Database, State,
};
use serde_json::Value;
use sqlx::sqlite::SqlitePoolOptions;

/// Identity provider fake backed by a static token table.
pub struct StaticIdentity {
	identities: HashMap<String, Identity>,
}

impl StaticIdentity {
	pub fn new(identities: &[(&str, &str, &str)]) -> Self {
		Self {
			identities: identities
				.iter()
				.map(|(token, id, email)| {
					(
						(*token).to_owned(),
						Identity {
							id: (*id).to_owned(),
							email: (*email).to_owned(),
						},
					)
				})
				.collect(),
		}
	}
}

#[axum::async_trait]
impl IdentityProvider for StaticIdentity {
	async fn resolve(&self, token: &str) -> Result<Identity, UpstreamError> {
		self.identities
			.get(token)
			.cloned()
			.ok_or(UpstreamError::InvalidToken)
	}
}

/// Media sink fake that records uploads and can be switched to fail.
#[derive(Default)]
pub struct RecordingSink {
	pub uploads: Mutex<Vec<(String, String, usize)>>,
	pub fail: AtomicBool,
}

impl RecordingSink {
	pub fn fail_next(&self) {
		self.fail.store(true, Ordering::SeqCst);
	}

	pub fn upload_count(&self) -> usize {
		self.uploads.lock().unwrap().len()
	}
}

#[axum::async_trait]
impl MediaSink for RecordingSink {
	async fn store(
		&self,
		bucket: &str,
		key: &str,
		_content_type: &str,
		bytes: Bytes,
		_upsert: bool,
	) -> Result<String, UpstreamError> {
		if self.fail.load(Ordering::SeqCst) {
			return Err(UpstreamError::Status(StatusCode::SERVICE_UNAVAILABLE));
		}

		self.uploads
			.lock()
			.unwrap()
			.push((bucket.to_owned(), key.to_owned(), bytes.len()));

		Ok(format!("https://cdn.example.com/{bucket}/{key}"))
	}
}

pub struct TestApp {
	pub server: TestServer,
	pub database: Database,
	pub sink: Arc<RecordingSink>,
}

/// Boots the application against a fresh in-memory database.
///
/// The pool is pinned to a single connection so the `:memory:` database is
/// shared by every request.
pub async fn spawn(identities: &[(&str, &str, &str)]) -> TestApp {
	let database: Database = SqlitePoolOptions::new()
		.max_connections(1)
		.idle_timeout(None)
		.max_lifetime(None)
		.connect("sqlite::memory:")
		.await
		.unwrap();

	sqlx::migrate!().run(&database).await.unwrap();

	let sink = Arc::new(RecordingSink::default());
	let state = State {
		database: database.clone(),
		identity: Arc::new(StaticIdentity::new(identities)),
		media: sink.clone(),
	};

	TestApp {
		server: TestServer::new(chirp::app(state)).unwrap(),
		database,
		sink,
	}
}

pub fn authed(request: TestRequest, token: &str) -> TestRequest {
	request.add_header(
		header::AUTHORIZATION,
		HeaderValue::try_from(format!("Bearer {token}")).unwrap(),
	)
}

pub async fn provision(server: &TestServer, id: &str, email: &str) -> Value {
	let response = server
		.post("/api/auth/user")
		.json(&serde_json::json!({ "user_id": id, "email": email }))
		.await;

	assert_eq!(response.status_code(), StatusCode::OK);
	response.json::<Value>()
}

/// Posts a text-only tweet and returns its id.
pub async fn post_tweet(server: &TestServer, token: &str, content: &str) -> i64 {
	let form = MultipartBuilder::new().text("content", content);
	let response = authed(server.post("/api/tweets"), token)
		.add_header(
			header::CONTENT_TYPE,
			HeaderValue::try_from(form.content_type()).unwrap(),
		)
		.bytes(form.finish().into())
		.await;

	assert_eq!(response.status_code(), StatusCode::CREATED);
	response.json::<Value>()["id"].as_i64().unwrap()
}

pub async fn tweet_count(database: &Database) -> i64 {
	sqlx::query_scalar("SELECT COUNT(*) FROM tweets")
		.fetch_one(database)
		.await
		.unwrap()
}

pub async fn like_count(database: &Database, tweet_id: i64) -> i64 {
	sqlx::query_scalar("SELECT COUNT(*) FROM likes WHERE tweet_id = ?")
		.bind(tweet_id)
		.fetch_one(database)
		.await
		.unwrap()
}

/// Minimal multipart/form-data body builder, enough for the routes under
/// test without pulling in a client-side multipart implementation.
pub struct MultipartBuilder {
	boundary: &'static str,
	body: Vec<u8>,
}

impl MultipartBuilder {
	pub fn new() -> Self {
		Self {
			boundary: "chirp-test-boundary",
			body: Vec::new(),
		}
	}

	pub fn text(mut self, name: &str, value: &str) -> Self {
		self.body.extend_from_slice(
			format!(
				"--{}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n",
				self.boundary
			)
			.as_bytes(),
		);
		self
	}

	pub fn file(mut self, name: &str, file_name: &str, content_type: &str, bytes: &[u8]) -> Self {
		self.body.extend_from_slice(
			format!(
				"--{}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n",
				self.boundary
			)
			.as_bytes(),
		);
		self.body.extend_from_slice(bytes);
		self.body.extend_from_slice(b"\r\n");
		self
	}

	pub fn content_type(&self) -> String {
		format!("multipart/form-data; boundary={}", self.boundary)
	}

	pub fn finish(mut self) -> Vec<u8> {
		self.body
			.extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
		self.body
	}
}
