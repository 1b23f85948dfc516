//! Outbound email delivery
//!
//! Confirmation and password-reset flows hand a recipient, subject, and HTML
//! body to the [`Mailer`]. Delivery goes through an HTTP mail API when one is
//! configured; without one the service falls back to a logging sender so
//! local development works end to end without credentials.

use anyhow::Result;
use serde::Serialize;
use tracing::info;

/// Email delivery configuration
#[derive(Debug, Clone)]
pub struct EmailConfig {
    /// Address the application sends from
    pub sender_address: String,
    /// Display name for the sender
    pub sender_name: Option<String>,
    /// HTTP mail API endpoint; unset selects the logging sender
    pub api_url: Option<String>,
    /// HTTP mail API key
    pub api_key: Option<String>,
}

impl EmailConfig {
    /// Create a new EmailConfig from environment variables
    ///
    /// # Environment Variables
    /// - `EMAIL_SENDER_ADDRESS`: From address (default: "no-reply@campstead.dev")
    /// - `EMAIL_SENDER_NAME`: From display name (optional)
    /// - `EMAIL_API_URL`: HTTP mail API endpoint (optional)
    /// - `EMAIL_API_KEY`: HTTP mail API key (optional)
    pub fn from_env() -> Result<Self> {
        let sender_address = std::env::var("EMAIL_SENDER_ADDRESS")
            .unwrap_or_else(|_| "no-reply@campstead.dev".to_string());
        let sender_name = std::env::var("EMAIL_SENDER_NAME").ok();
        let api_url = std::env::var("EMAIL_API_URL").ok().filter(|v| !v.is_empty());
        let api_key = std::env::var("EMAIL_API_KEY").ok().filter(|v| !v.is_empty());

        Ok(EmailConfig {
            sender_address,
            sender_name,
            api_url,
            api_key,
        })
    }
}

#[derive(Debug, Serialize)]
struct ApiEmailAddress {
    email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiSendEmailBody {
    sender: ApiEmailAddress,
    to: Vec<ApiEmailAddress>,
    subject: String,
    html_content: String,
}

/// Sender that posts to a transactional mail HTTP API
#[derive(Clone)]
pub struct ApiEmailSender {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    sender_address: String,
    sender_name: Option<String>,
}

impl ApiEmailSender {
    async fn send(&self, to_address: &str, subject: &str, html_body: &str) -> Result<()> {
        let body = ApiSendEmailBody {
            sender: ApiEmailAddress {
                email: self.sender_address.clone(),
                name: self.sender_name.clone(),
            },
            to: vec![ApiEmailAddress {
                email: to_address.to_string(),
                name: None,
            }],
            subject: subject.to_string(),
            html_content: html_body.to_string(),
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!(
                "Mail API returned status {}",
                response.status()
            ));
        }

        Ok(())
    }
}

/// Local dev sender that logs the message instead of sending real email
#[derive(Clone, Debug)]
pub struct LogEmailSender;

impl LogEmailSender {
    fn send(&self, to_address: &str, subject: &str, html_body: &str) {
        info!(
            to_address = %to_address,
            subject = %subject,
            body = %html_body,
            "email send stub"
        );
    }
}

/// Outbound email collaborator; fire-and-forget from the caller's view
#[derive(Clone)]
pub enum Mailer {
    Log(LogEmailSender),
    Api(ApiEmailSender),
}

impl Mailer {
    /// Build a mailer from configuration; API url and key together select
    /// the HTTP sender, anything else the logging stub
    pub fn from_config(config: &EmailConfig) -> Self {
        match (&config.api_url, &config.api_key) {
            (Some(api_url), Some(api_key)) => Mailer::Api(ApiEmailSender {
                client: reqwest::Client::new(),
                api_url: api_url.clone(),
                api_key: api_key.clone(),
                sender_address: config.sender_address.clone(),
                sender_name: config.sender_name.clone(),
            }),
            _ => Mailer::Log(LogEmailSender),
        }
    }

    /// Deliver a message or return an error
    pub async fn send(&self, to_address: &str, subject: &str, html_body: &str) -> Result<()> {
        match self {
            Mailer::Log(sender) => {
                sender.send(to_address, subject, html_body);
                Ok(())
            }
            Mailer::Api(sender) => sender.send(to_address, subject, html_body).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_email_config_defaults_to_log_sender() {
        unsafe {
            std::env::remove_var("EMAIL_SENDER_ADDRESS");
            std::env::remove_var("EMAIL_API_URL");
            std::env::remove_var("EMAIL_API_KEY");
        }

        let config = EmailConfig::from_env().unwrap();
        assert_eq!(config.sender_address, "no-reply@campstead.dev");
        assert!(matches!(Mailer::from_config(&config), Mailer::Log(_)));
    }

    #[test]
    #[serial]
    fn test_email_config_selects_api_sender() {
        unsafe {
            std::env::set_var("EMAIL_API_URL", "https://mail.example/v3/send");
            std::env::set_var("EMAIL_API_KEY", "key");
        }

        let config = EmailConfig::from_env().unwrap();
        assert!(matches!(Mailer::from_config(&config), Mailer::Api(_)));

        unsafe {
            std::env::remove_var("EMAIL_API_URL");
            std::env::remove_var("EMAIL_API_KEY");
        }
    }

    #[tokio::test]
    async fn test_log_sender_always_succeeds() {
        let mailer = Mailer::Log(LogEmailSender);
        assert!(
            mailer
                .send("a@x.com", "Please confirm your email", "<p>hi</p>")
                .await
                .is_ok()
        );
    }

    #[test]
    fn test_api_body_shape() {
        let body = ApiSendEmailBody {
            sender: ApiEmailAddress {
                email: "no-reply@campstead.dev".to_string(),
                name: None,
            },
            to: vec![ApiEmailAddress {
                email: "a@x.com".to_string(),
                name: None,
            }],
            subject: "Please confirm your email".to_string(),
            html_content: "<p>hi</p>".to_string(),
        };

        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"htmlContent\""));
        assert!(!json.contains("\"name\""));
    }
}
