//! User repository for database operations

use anyhow::Result;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use chrono::Utc;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::models::{NewUser, User};

const USER_COLUMNS: &str = "id, email, username, first_name, last_name, profile_pic, \
     password_hash, confirmed, confirmed_at, created_at, updated_at";

/// Hash a plaintext password into an argon2 PHC string
pub(crate) fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut rand::thread_rng());
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
        .to_string();
    Ok(hash)
}

/// Verify a plaintext password against a stored argon2 PHC string
pub(crate) fn verify_password_hash(hash: &str, password: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| anyhow::anyhow!("Failed to parse password hash: {}", e))?;

    let argon2 = Argon2::default();
    Ok(argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// User repository
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    /// Create a new user repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new account; the row starts unconfirmed
    pub async fn create(&self, new_user: &NewUser) -> Result<User> {
        info!("Creating new user: {}", new_user.username);

        let password_hash = hash_password(&new_user.password)?;

        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (email, username, first_name, last_name, profile_pic, password_hash)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {USER_COLUMNS}
            "#,
        ))
        .bind(&new_user.email)
        .bind(&new_user.username)
        .bind(&new_user.first_name)
        .bind(&new_user.last_name)
        .bind(&new_user.profile_pic)
        .bind(&password_hash)
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }

    /// Find a user by email
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1",
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Find a user by username
    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1",
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Find a user by ID
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let user =
            sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1",))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(user)
    }

    /// Verify a user's password
    pub fn verify_password(&self, user: &User, password: &str) -> Result<bool> {
        verify_password_hash(&user.password_hash, password)
    }

    /// Mark an account as confirmed, stamping the confirmation time
    ///
    /// The flag and the timestamp are written together so the row never
    /// carries one without the other.
    pub async fn confirm(&self, id: Uuid) -> Result<User> {
        info!("Confirming user: {}", id);

        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET confirmed = TRUE, confirmed_at = $2, updated_at = $2
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#,
        ))
        .bind(id)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }

    /// Overwrite an account's credential with a re-hashed password
    pub async fn update_password(&self, id: Uuid, new_password: &str) -> Result<()> {
        info!("Updating password for user: {}", id);

        let password_hash = hash_password(new_password)?;

        sqlx::query("UPDATE users SET password_hash = $2, updated_at = $3 WHERE id = $1")
            .bind(id)
            .bind(&password_hash)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_not_plaintext() {
        let hash = hash_password("Sup3r-secret!").unwrap();
        assert_ne!(hash, "Sup3r-secret!");
        assert!(hash.starts_with("$argon2"));
    }

    #[test]
    fn test_hash_verifies_original_password() {
        let hash = hash_password("Sup3r-secret!").unwrap();
        assert!(verify_password_hash(&hash, "Sup3r-secret!").unwrap());
        assert!(!verify_password_hash(&hash, "wrong-password").unwrap());
    }

    #[test]
    fn test_rehash_invalidates_old_hash_check() {
        // Same password hashes to different strings (fresh salt), and a new
        // hash never verifies a different password.
        let first = hash_password("Old-passw0rd!").unwrap();
        let second = hash_password("New-passw0rd!").unwrap();
        assert_ne!(first, second);
        assert!(!verify_password_hash(&second, "Old-passw0rd!").unwrap());
    }

    #[test]
    fn test_garbage_hash_is_an_error() {
        assert!(verify_password_hash("not-a-phc-string", "whatever").is_err());
    }

    #[tokio::test]
    #[ignore = "requires a running PostgreSQL with DATABASE_URL set"]
    async fn test_account_lifecycle_against_database() -> Result<()> {
        let config = common::database::DatabaseConfig::from_env()?;
        let pool = common::database::init_pool(&config).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;

        let repo = UserRepository::new(pool);

        let suffix = Uuid::new_v4().simple().to_string();
        let email = format!("camper-{suffix}@example.com");
        let user = repo
            .create(&NewUser {
                email: email.clone(),
                username: format!("camper_{suffix}"),
                first_name: "Ada".to_string(),
                last_name: "Lovelace".to_string(),
                profile_pic: None,
                password: "Sup3r-secret!".to_string(),
            })
            .await?;

        // Fresh accounts start unconfirmed with a hashed credential.
        assert!(!user.confirmed);
        assert!(user.confirmed_at.is_none());
        assert_ne!(user.password_hash, "Sup3r-secret!");

        // Unknown email and wrong password land in the same place: no
        // verified credentials.
        assert!(repo.find_by_email("missing@example.com").await?.is_none());
        assert!(!repo.verify_password(&user, "wrong-password")?);
        assert!(repo.verify_password(&user, "Sup3r-secret!")?);

        // Confirming stamps the flag and the timestamp together.
        let confirmed = repo.confirm(user.id).await?;
        assert!(confirmed.confirmed);
        assert!(confirmed.confirmed_at.is_some());

        // A password reset invalidates the old credential.
        repo.update_password(user.id, "N3w-secret!").await?;
        let reloaded = repo
            .find_by_id(user.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("account disappeared"))?;
        assert!(!repo.verify_password(&reloaded, "Sup3r-secret!")?);
        assert!(repo.verify_password(&reloaded, "N3w-secret!")?);

        Ok(())
    }
}
