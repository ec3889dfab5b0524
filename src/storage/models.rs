use chrono::{DateTime, Utc};

/// A persisted user row.
///
/// `username` is globally unique and immutable; `password_hash` is a
/// bcrypt string and never leaves the process over the RPC surface.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: u64,
    pub username: String,
    pub password_hash: String,
    pub nickname: String,
    pub profile_picture: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
