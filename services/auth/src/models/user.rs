//! User model and related functionality

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// User account entity
///
/// `confirmed_at` is set exactly when `confirmed` is true; the repository
/// writes both together and the schema enforces it with a CHECK constraint.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub profile_pic: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub confirmed: bool,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New account creation payload; `password` is the plaintext the repository
/// hashes before the row is written.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub profile_pic: Option<String>,
    pub password: String,
}
