use axum::{
	extract::{Multipart, Path, State},
	routing::{get, post, put},
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
	extract::{Auth, Json},
	model,
	route::tweets::ALLOWED_MEDIA_TYPES,
	AppState, Database, Error,
};

pub const MAX_AVATAR_BYTES: usize = 2 * 1024 * 1024;

pub const AVATAR_BUCKET: &str = "profile-pictures";

pub fn routes() -> axum::Router<AppState> {
	axum::Router::new()
		.route("/profile", put(update_profile))
		.route("/profile-picture", put(update_avatar))
		.route("/follow/:user_id", post(follow))
		.route("/:username", get(profile))
}

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileInput {
	#[validate(length(min = 3, max = 30))]
	pub username: Option<String>,
	#[validate(length(max = 50))]
	pub full_name: Option<String>,
	#[validate(length(max = 160))]
	pub bio: Option<String>,
	#[validate(url)]
	pub avatar_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Ack {
	pub message: &'static str,
}

/// Public profile, with counts derived from the related tables on read.
async fn profile(
	State(database): State<Database>,
	Path(username): Path<String>,
) -> Result<Json<model::UserProfile>, Error> {
	let profile = sqlx::query_as::<_, model::UserProfile>(
		r"
			SELECT u.id, u.username, u.full_name, u.bio, u.avatar_url, u.created_at,
				(SELECT COUNT(*) FROM tweets t WHERE t.user_id = u.id) AS tweets,
				(SELECT COUNT(*) FROM follows f WHERE f.following_id = u.id) AS followers,
				(SELECT COUNT(*) FROM follows f WHERE f.follower_id = u.id) AS following
			FROM users u
			WHERE u.username = ?
		",
	)
	.bind(&username)
	.fetch_optional(&database)
	.await?;

	Ok(Json(profile.ok_or(Error::NotFound("User"))?))
}

/// Partial profile update. A requested handle held by a different user is a
/// conflict; the unique constraint catches the race when two updates claim
/// the same handle at once.
async fn update_profile(
	State(database): State<Database>,
	auth: Auth,
	Json(input): Json<UpdateProfileInput>,
) -> Result<Json<model::User>, Error> {
	if let Some(username) = &input.username {
		let holder: Option<String> = sqlx::query_scalar("SELECT id FROM users WHERE username = ?")
			.bind(username)
			.fetch_optional(&database)
			.await?;

		if holder.is_some_and(|id| id != auth.user.id) {
			return Err(Error::Conflict("Username already taken".into()));
		}
	}

	let user = sqlx::query_as::<_, model::User>(
		r"
			UPDATE users
			SET username = COALESCE(?, username),
				full_name = COALESCE(?, full_name),
				bio = COALESCE(?, bio),
				avatar_url = COALESCE(?, avatar_url)
			WHERE id = ?
			RETURNING *
		",
	)
	.bind(&input.username)
	.bind(&input.full_name)
	.bind(&input.bio)
	.bind(&input.avatar_url)
	.bind(&auth.user.id)
	.fetch_one(&database)
	.await
	.map_err(|e| match &e {
		sqlx::Error::Database(d) if d.is_unique_violation() => {
			Error::Conflict("Username already taken".into())
		}
		_ => Error::Database(e),
	})?;

	Ok(Json(user))
}

/// Replaces the profile picture. The object key is stable per user and the
/// upload upserts, so the previous picture is overwritten in place.
async fn update_avatar(
	State(state): State<AppState>,
	auth: Auth,
	mut multipart: Multipart,
) -> Result<Json<model::User>, Error> {
	let mut upload = None;

	while let Some(field) = multipart.next_field().await? {
		let name = field.name().map(str::to_owned);

		if name.as_deref() == Some("avatar") {
			let content_type = field
				.content_type()
				.map(str::to_owned)
				.ok_or(Error::Invalid("Avatar is missing a content type".into()))?;
			let file_name = field.file_name().map(str::to_owned);

			upload = Some((content_type, file_name, field.bytes().await?));
		}
	}

	let (content_type, file_name, bytes) = upload.ok_or(Error::Invalid("No file uploaded".into()))?;

	if !ALLOWED_MEDIA_TYPES.contains(&content_type.as_str()) {
		return Err(Error::Invalid(
			"Invalid file type. Only images and certain videos are allowed.".into(),
		));
	}

	if bytes.len() > MAX_AVATAR_BYTES {
		return Err(Error::Invalid("Avatar cannot exceed 2 MiB".into()));
	}

	let key = match file_name.as_deref().and_then(|name| name.rsplit_once('.')) {
		Some((_, ext)) => format!("avatar-{}.{ext}", auth.user.id),
		None => format!("avatar-{}", auth.user.id),
	};

	let url = state
		.media
		.store(AVATAR_BUCKET, &key, &content_type, bytes, true)
		.await?;

	let user = sqlx::query_as::<_, model::User>(
		"UPDATE users SET avatar_url = ? WHERE id = ? RETURNING *",
	)
	.bind(&url)
	.bind(&auth.user.id)
	.fetch_one(&state.database)
	.await?;

	Ok(Json(user))
}

/// Creates a follow edge. The composite primary key detects duplicates;
/// there is no unfollow.
async fn follow(
	State(database): State<Database>,
	auth: Auth,
	Path(user_id): Path<String>,
) -> Result<Json<Ack>, Error> {
	if user_id == auth.user.id {
		return Err(Error::Conflict("You cannot follow yourself".into()));
	}

	let target: Option<String> = sqlx::query_scalar("SELECT id FROM users WHERE id = ?")
		.bind(&user_id)
		.fetch_optional(&database)
		.await?;

	if target.is_none() {
		return Err(Error::NotFound("User"));
	}

	let inserted = sqlx::query(
		"INSERT INTO follows (follower_id, following_id, created_at) VALUES (?, ?, ?) ON CONFLICT DO NOTHING",
	)
	.bind(&auth.user.id)
	.bind(&user_id)
	.bind(chrono::Utc::now())
	.execute(&database)
	.await?;

	if inserted.rows_affected() == 0 {
		return Err(Error::Conflict("Already following this user".into()));
	}

	Ok(Json(Ack {
		message: "Successfully followed user",
	}))
}
