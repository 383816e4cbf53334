pub mod auth;
pub mod tweets;
pub mod users;
