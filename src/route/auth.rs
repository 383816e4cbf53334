use axum::{
	extract::State,
	routing::{get, post},
};
use serde::Deserialize;
use validator::Validate;

use crate::{
	extract::{Auth, Json},
	model, AppState, Database, Error,
};

/// Avatar assigned to freshly provisioned accounts.
const DEFAULT_AVATAR_URL: &str =
	"https://img.freepik.com/free-vector/user-circles-set_78370-4704.jpg";

pub fn routes() -> axum::Router<AppState> {
	axum::Router::new()
		.route("/user", post(provision_user))
		.route("/me", get(me))
}

#[derive(Deserialize, Validate)]
pub struct ProvisionInput {
	#[validate(length(min = 1))]
	pub user_id: String,
	#[validate(email)]
	pub email: String,
}

/// Returns the authenticated user.
async fn me(auth: Auth) -> Json<model::User> {
	Json(auth.user)
}

/// Provisioning entry point, called by the client after the identity
/// provider issues a session. Idempotent.
async fn provision_user(
	State(database): State<Database>,
	Json(input): Json<ProvisionInput>,
) -> Result<Json<model::User>, Error> {
	let user = provision(&database, &input.user_id, &input.email).await?;

	Ok(Json(user))
}

/// Looks up the local user mirroring an external identity, creating one on
/// first use with the handle defaulted to the email local-part.
///
/// Provisioning can race with itself when two requests arrive for a
/// freshly-registered identity, so the create is an optimistic insert: the
/// primary key either takes the row or observes that it is taken, and a
/// losing insert reconciles by re-reading by id, then by email. Only when
/// all of that misses did the insert collide with an unrelated user's
/// handle, which is surfaced as a conflict.
pub async fn provision(database: &Database, id: &str, email: &str) -> Result<model::User, Error> {
	if let Some(user) = fetch_by_id(database, id).await? {
		return Ok(user);
	}

	let username = email.split('@').next().unwrap_or(email);

	let created = sqlx::query_as::<_, model::User>(
		r"
			INSERT INTO users (id, email, username, avatar_url, created_at)
			VALUES (?, ?, ?, ?, ?)
			ON CONFLICT DO NOTHING
			RETURNING *
		",
	)
	.bind(id)
	.bind(email)
	.bind(username)
	.bind(DEFAULT_AVATAR_URL)
	.bind(chrono::Utc::now())
	.fetch_optional(database)
	.await?;

	if let Some(user) = created {
		return Ok(user);
	}

	if let Some(user) = fetch_by_id(database, id).await? {
		return Ok(user);
	}

	let user = sqlx::query_as::<_, model::User>("SELECT * FROM users WHERE email = ?")
		.bind(email)
		.fetch_optional(database)
		.await?;

	user.ok_or(Error::Conflict("Username already taken".into()))
}

async fn fetch_by_id(database: &Database, id: &str) -> Result<Option<model::User>, Error> {
	let user = sqlx::query_as::<_, model::User>("SELECT * FROM users WHERE id = ?")
		.bind(id)
		.fetch_optional(database)
		.await?;

	Ok(user)
}
