use std::collections::HashMap;

use axum::{
	extract::{Multipart, Path, State},
	http::StatusCode,
	routing::{get, post},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::{
	extract::{Auth, Json, Query},
	model::{self, MediaKind},
	AppState, Database, Error,
};

pub const MAX_TWEET_CHARS: usize = 280;
pub const MAX_MEDIA_BYTES: usize = 10 * 1024 * 1024;

pub const MEDIA_BUCKET: &str = "tweet-media";

pub(crate) const ALLOWED_MEDIA_TYPES: &[&str] = &[
	"image/jpeg",
	"image/png",
	"image/gif",
	"image/webp",
	"video/mp4",
	"video/quicktime",
];

pub fn routes() -> axum::Router<AppState> {
	axum::Router::new()
		.route("/", get(global_feed).post(create_tweet))
		.route("/user/:username", get(user_feed))
		.route("/:id/like", post(toggle_like))
}

fn twenty() -> i64 {
	20
}

#[derive(Deserialize, Validate)]
pub struct FeedQuery {
	/// Id of the last tweet of the previous page; exclusive.
	pub cursor: Option<i64>,
	#[validate(range(min = 1, max = 100))]
	#[serde(default = "twenty")]
	pub limit: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedPage {
	pub tweets: Vec<model::FeedTweet>,
	pub next_cursor: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct LikeOutcome {
	pub liked: bool,
}

/// Global reverse-chronological feed.
async fn global_feed(
	State(database): State<Database>,
	Query(query): Query<FeedQuery>,
) -> Result<Json<FeedPage>, Error> {
	Ok(Json(
		feed_page(&database, None, query.cursor, query.limit).await?,
	))
}

/// Feed scoped to one author. An unknown handle is a 404 before any
/// pagination runs.
async fn user_feed(
	State(database): State<Database>,
	Path(username): Path<String>,
	Query(query): Query<FeedQuery>,
) -> Result<Json<FeedPage>, Error> {
	let author: Option<String> = sqlx::query_scalar("SELECT id FROM users WHERE username = ?")
		.bind(&username)
		.fetch_optional(&database)
		.await?;

	let author = author.ok_or(Error::NotFound("User"))?;

	Ok(Json(
		feed_page(&database, Some(&author), query.cursor, query.limit).await?,
	))
}

/// Assembles one page of the feed: a page of tweets joined with the author
/// projection, then a separate read-time aggregation for like counts. The
/// counts are point-in-time; a like landing between the two reads may or may
/// not show, which is accepted.
///
/// The cursor filters on `id` alone while the page sorts by
/// `(created_at, id)`; the two agree because ids are assigned in creation
/// order, so `created_at` never decreases as `id` grows.
///
/// A full page sets `next_cursor` to its last id and a short page ends the
/// feed, so a total count that is an exact multiple of the limit costs one
/// extra empty fetch. Clients rely on the empty page as the termination
/// signal, so that behavior is kept.
pub async fn feed_page(
	database: &Database,
	author_id: Option<&str>,
	cursor: Option<i64>,
	limit: i64,
) -> Result<FeedPage, Error> {
	let mut query = sqlx::QueryBuilder::<sqlx::Sqlite>::new(
		"SELECT t.id, t.content, t.media_url, t.media_type, t.created_at, \
		 t.user_id, u.username, u.avatar_url \
		 FROM tweets t JOIN users u ON u.id = t.user_id",
	);

	let mut clause = " WHERE";

	if let Some(author_id) = author_id {
		query.push(clause).push(" t.user_id = ").push_bind(author_id);
		clause = " AND";
	}

	if let Some(cursor) = cursor {
		query.push(clause).push(" t.id < ").push_bind(cursor);
	}

	query
		.push(" ORDER BY t.created_at DESC, t.id DESC LIMIT ")
		.push_bind(limit);

	let mut tweets: Vec<model::FeedTweet> = query.build_query_as().fetch_all(database).await?;

	let counts = like_counts(database, tweets.iter().map(|tweet| tweet.id)).await?;

	for tweet in &mut tweets {
		tweet.likes = counts.get(&tweet.id).copied().unwrap_or(0);
	}

	let next_cursor = if tweets.len() as i64 == limit {
		tweets.last().map(|tweet| tweet.id)
	} else {
		None
	};

	Ok(FeedPage {
		tweets,
		next_cursor,
	})
}

/// Like counts are the cardinality of the ledger at read time, never stored.
async fn like_counts(
	database: &Database,
	ids: impl Iterator<Item = i64>,
) -> Result<HashMap<i64, i64>, Error> {
	let ids: Vec<i64> = ids.collect();

	if ids.is_empty() {
		return Ok(HashMap::new());
	}

	let mut query = sqlx::QueryBuilder::<sqlx::Sqlite>::new(
		"SELECT tweet_id, COUNT(*) FROM likes WHERE tweet_id IN (",
	);

	let mut separated = query.separated(", ");
	for id in &ids {
		separated.push_bind(*id);
	}
	query.push(") GROUP BY tweet_id");

	let counts: Vec<(i64, i64)> = query.build_query_as().fetch_all(database).await?;

	Ok(counts.into_iter().collect())
}

/// Accepts a new tweet (multipart: `content`, optional `media`).
///
/// Media is validated and uploaded before anything is written, so a failed
/// upload leaves no tweet behind. There is no retry; a failed submission is
/// terminal and must be resubmitted.
async fn create_tweet(
	State(state): State<AppState>,
	auth: Auth,
	mut multipart: Multipart,
) -> Result<(StatusCode, Json<model::FeedTweet>), Error> {
	let mut content = None;
	let mut media = None;

	while let Some(field) = multipart.next_field().await? {
		let name = field.name().map(str::to_owned);

		match name.as_deref() {
			Some("content") => content = Some(field.text().await?),
			Some("media") => {
				let content_type = field
					.content_type()
					.map(str::to_owned)
					.ok_or(Error::Invalid("Media is missing a content type".into()))?;
				let file_name = field.file_name().map(str::to_owned);

				media = Some((content_type, file_name, field.bytes().await?));
			}
			_ => {}
		}
	}

	let content = content.ok_or(Error::Invalid("Content is required".into()))?;
	validate_content(&content)?;

	let mut media_url = None;
	let mut media_kind = None;

	if let Some((content_type, file_name, bytes)) = media {
		if !ALLOWED_MEDIA_TYPES.contains(&content_type.as_str()) {
			return Err(Error::Invalid(
				"Invalid file type. Only images and certain videos are allowed.".into(),
			));
		}

		if bytes.len() > MAX_MEDIA_BYTES {
			return Err(Error::Invalid("Media cannot exceed 10 MiB".into()));
		}

		let kind = if content_type.starts_with("image/") {
			MediaKind::Image
		} else {
			MediaKind::Video
		};

		let key = object_key(file_name.as_deref());
		let url = state
			.media
			.store(MEDIA_BUCKET, &key, &content_type, bytes, false)
			.await?;

		media_url = Some(url);
		media_kind = Some(kind);
	}

	let created_at = chrono::Utc::now();

	let id: i64 = sqlx::query_scalar(
		r"
			INSERT INTO tweets (user_id, content, media_url, media_type, created_at)
			VALUES (?, ?, ?, ?, ?)
			RETURNING id
		",
	)
	.bind(&auth.user.id)
	.bind(&content)
	.bind(&media_url)
	.bind(media_kind)
	.bind(created_at)
	.fetch_one(&state.database)
	.await?;

	let tweet = model::FeedTweet {
		id,
		content,
		media_url,
		media_type: media_kind,
		created_at,
		author: model::TweetAuthor {
			id: auth.user.id,
			username: auth.user.username,
			avatar_url: auth.user.avatar_url,
		},
		likes: 0,
	};

	Ok((StatusCode::CREATED, Json(tweet)))
}

/// Flips the (tweet, user) like pair.
///
/// The pair's primary key is the serialization point: the insert either
/// takes the slot or observes that it is taken, so concurrent toggles from
/// the same user settle to last-committed-wins without any in-process lock,
/// and correctness holds across independent server processes.
async fn toggle_like(
	State(database): State<Database>,
	auth: Auth,
	Path(tweet_id): Path<i64>,
) -> Result<Json<LikeOutcome>, Error> {
	let tweet: Option<i64> = sqlx::query_scalar("SELECT id FROM tweets WHERE id = ?")
		.bind(tweet_id)
		.fetch_optional(&database)
		.await?;

	if tweet.is_none() {
		return Err(Error::NotFound("Tweet"));
	}

	let mut tx = database.begin().await?;

	let inserted = sqlx::query(
		"INSERT INTO likes (tweet_id, user_id, created_at) VALUES (?, ?, ?) ON CONFLICT DO NOTHING",
	)
	.bind(tweet_id)
	.bind(&auth.user.id)
	.bind(chrono::Utc::now())
	.execute(&mut *tx)
	.await?;

	let liked = if inserted.rows_affected() == 1 {
		true
	} else {
		sqlx::query("DELETE FROM likes WHERE tweet_id = ? AND user_id = ?")
			.bind(tweet_id)
			.bind(&auth.user.id)
			.execute(&mut *tx)
			.await?;

		false
	};

	tx.commit().await?;

	Ok(Json(LikeOutcome { liked }))
}

fn validate_content(content: &str) -> Result<(), Error> {
	if content.trim().is_empty() {
		return Err(Error::Invalid("Content is required".into()));
	}

	if content.chars().count() > MAX_TWEET_CHARS {
		return Err(Error::Invalid("Tweet cannot exceed 280 characters".into()));
	}

	Ok(())
}

/// Random object key, keeping the uploaded file's extension when present.
fn object_key(file_name: Option<&str>) -> String {
	match file_name.and_then(|name| name.rsplit_once('.')) {
		Some((_, ext)) => format!("{}.{ext}", Uuid::new_v4()),
		None => Uuid::new_v4().to_string(),
	}
}
