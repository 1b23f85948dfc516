//! Signed email tokens for confirmation and password reset links
//!
//! This module provides functionality for creating and validating the
//! short-lived signed tokens that prove control of an email inbox. A token
//! is an HS256 JWT binding the email address to a purpose (confirmation or
//! password reset) with an expiry; nothing is persisted server-side, so
//! validity is purely a function of signature and expiry at verification
//! time.

use anyhow::Result;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Email token configuration
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// Secret used to sign and verify tokens
    pub secret: String,
    /// Token expiration time in seconds (default: 1 hour)
    pub token_expiry: u64,
}

impl TokenConfig {
    /// Create a new TokenConfig from environment variables
    ///
    /// # Environment Variables
    /// - `EMAIL_TOKEN_SECRET`: Secret used to sign tokens
    /// - `EMAIL_TOKEN_EXPIRY`: Token expiry in seconds (default: 3600)
    pub fn from_env() -> Result<Self> {
        let secret = std::env::var("EMAIL_TOKEN_SECRET")
            .map_err(|_| anyhow::anyhow!("EMAIL_TOKEN_SECRET environment variable not set"))?;

        let token_expiry = std::env::var("EMAIL_TOKEN_EXPIRY")
            .unwrap_or_else(|_| "3600".to_string()) // 1 hour
            .parse()
            .unwrap_or(3600);

        Ok(TokenConfig {
            secret,
            token_expiry,
        })
    }
}

/// What a token entitles its bearer to do
///
/// Kept as a claim so a confirmation token cannot be replayed against the
/// password-reset endpoint or vice versa.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum TokenPurpose {
    /// Email confirmation link
    Confirm,
    /// Password reset link
    Reset,
}

/// Email token claims structure
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    /// Email address the token is bound to
    sub: String,
    /// Token purpose
    purpose: TokenPurpose,
    /// Issued at time
    iat: u64,
    /// Expiration time
    exp: u64,
}

/// Email token service
#[derive(Clone)]
pub struct EmailTokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    config: TokenConfig,
}

impl EmailTokenService {
    /// Initialize a new email token service
    pub fn new(config: TokenConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());
        let mut validation = Validation::new(jsonwebtoken::Algorithm::HS256);
        validation.validate_exp = true;

        EmailTokenService {
            encoding_key,
            decoding_key,
            validation,
            config,
        }
    }

    /// Generate a token binding an email address to a purpose
    pub fn generate(&self, email: &str, purpose: TokenPurpose) -> Result<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| anyhow::anyhow!("Failed to get current time: {}", e))?
            .as_secs();

        let claims = Claims {
            sub: email.to_string(),
            purpose,
            iat: now,
            exp: now + self.config.token_expiry,
        };

        let token = encode(
            &Header::new(jsonwebtoken::Algorithm::HS256),
            &claims,
            &self.encoding_key,
        )?;
        Ok(token)
    }

    /// Verify a token and recover the bound email address
    ///
    /// Fails on a bad signature, an expired token, or a purpose mismatch.
    pub fn verify(&self, token: &str, purpose: TokenPurpose) -> Result<String> {
        let token_data = decode::<Claims>(token, &self.decoding_key, &self.validation)?;

        if token_data.claims.purpose != purpose {
            return Err(anyhow::anyhow!("Token purpose mismatch"));
        }

        Ok(token_data.claims.sub)
    }

    /// Get the token expiry time
    pub fn token_expiry(&self) -> u64 {
        self.config.token_expiry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn test_service() -> EmailTokenService {
        EmailTokenService::new(TokenConfig {
            secret: "test-secret".to_string(),
            token_expiry: 3600,
        })
    }

    #[test]
    fn test_generate_and_verify_round_trip() {
        let service = test_service();
        let token = service.generate("a@x.com", TokenPurpose::Confirm).unwrap();
        let email = service.verify(&token, TokenPurpose::Confirm).unwrap();
        assert_eq!(email, "a@x.com");
    }

    #[test]
    fn test_purpose_mismatch_is_rejected() {
        let service = test_service();
        let token = service.generate("a@x.com", TokenPurpose::Confirm).unwrap();
        assert!(service.verify(&token, TokenPurpose::Reset).is_err());
    }

    #[test]
    fn test_tampered_token_is_rejected() {
        let service = test_service();
        let token = service.generate("a@x.com", TokenPurpose::Confirm).unwrap();
        let mut tampered = token.clone();
        tampered.pop();
        tampered.push(if token.ends_with('A') { 'B' } else { 'A' });
        assert!(service.verify(&tampered, TokenPurpose::Confirm).is_err());
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let service = test_service();
        let other = EmailTokenService::new(TokenConfig {
            secret: "another-secret".to_string(),
            token_expiry: 3600,
        });
        let token = service.generate("a@x.com", TokenPurpose::Reset).unwrap();
        assert!(other.verify(&token, TokenPurpose::Reset).is_err());
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let service = test_service();

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        // Expired well past the default validation leeway.
        let claims = Claims {
            sub: "a@x.com".to_string(),
            purpose: TokenPurpose::Confirm,
            iat: now - 7200,
            exp: now - 3600,
        };
        let token = encode(
            &Header::new(jsonwebtoken::Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();

        assert!(service.verify(&token, TokenPurpose::Confirm).is_err());
    }

    #[test]
    fn test_reuse_before_expiry_is_accepted() {
        // No server-side revocation: a token verifies as often as asked
        // until it expires.
        let service = test_service();
        let token = service.generate("a@x.com", TokenPurpose::Confirm).unwrap();
        assert!(service.verify(&token, TokenPurpose::Confirm).is_ok());
        assert!(service.verify(&token, TokenPurpose::Confirm).is_ok());
    }

    #[test]
    #[serial]
    fn test_token_config_from_env() {
        unsafe {
            std::env::set_var("EMAIL_TOKEN_SECRET", "env-secret");
            std::env::remove_var("EMAIL_TOKEN_EXPIRY");
        }

        let config = TokenConfig::from_env().unwrap();
        assert_eq!(config.secret, "env-secret");
        assert_eq!(config.token_expiry, 3600);

        unsafe {
            std::env::remove_var("EMAIL_TOKEN_SECRET");
        }
    }

    #[test]
    #[serial]
    fn test_token_config_requires_secret() {
        unsafe {
            std::env::remove_var("EMAIL_TOKEN_SECRET");
        }

        assert!(TokenConfig::from_env().is_err());
    }
}
