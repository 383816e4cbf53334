use serde::Serialize;
use sqlx::FromRow;

/// A model representing a single user.
///
/// The `id` is issued by the external identity provider and never changes;
/// the `username` is the unique, user-chosen handle. The `email` field is
/// not serialized to the client.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
	pub id: String,
	#[serde(skip_serializing)]
	pub email: String,
	pub username: String,
	pub full_name: Option<String>,
	pub bio: Option<String>,
	pub avatar_url: String,
	pub created_at: chrono::DateTime<chrono::Utc>,
}

/// The kind of a tweet's media attachment, derived from its MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum MediaKind {
	Image,
	Video,
}

/// The minimal author projection attached to every tweet in a feed.
#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TweetAuthor {
	#[sqlx(rename = "user_id")]
	pub id: String,
	pub username: String,
	pub avatar_url: String,
}

/// A tweet as served in a feed page: the stored row, its author projection,
/// and a like count computed from the ledger at read time.
#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct FeedTweet {
	/// Monotonically increasing in creation order; doubles as the cursor.
	pub id: i64,
	pub content: String,
	pub media_url: Option<String>,
	pub media_type: Option<MediaKind>,
	pub created_at: chrono::DateTime<chrono::Utc>,
	#[sqlx(flatten)]
	#[serde(rename = "user")]
	pub author: TweetAuthor,
	#[sqlx(default)]
	pub likes: i64,
}

/// Counts derived from the related tables, never stored.
#[derive(Debug, Serialize, FromRow)]
pub struct ProfileCounts {
	pub tweets: i64,
	pub followers: i64,
	pub following: i64,
}

/// A public user profile.
#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
	pub id: String,
	pub username: String,
	pub full_name: Option<String>,
	pub bio: Option<String>,
	pub avatar_url: String,
	pub created_at: chrono::DateTime<chrono::Utc>,
	#[sqlx(flatten)]
	#[serde(rename = "_count")]
	pub counts: ProfileCounts,
}
