use anyhow::Result;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

mod email;
mod middleware;
mod models;
mod rate_limiter;
mod repositories;
mod routes;
mod session;
mod tokens;
mod validation;

use sqlx::PgPool;

use crate::{
    email::Mailer, rate_limiter::RateLimiter, repositories::UserRepository,
    session::SessionManager, tokens::EmailTokenService,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub users: UserRepository,
    pub sessions: SessionManager,
    pub tokens: EmailTokenService,
    pub mailer: Mailer,
    pub rate_limiter: RateLimiter,
    pub base_url: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    info!("Starting account service");

    // Initialize database connection pool
    let db_config = common::database::DatabaseConfig::from_env()?;
    let pool = common::database::init_pool(&db_config).await?;

    // Check database connectivity
    if common::database::health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied");

    // Initialize Redis connection pool
    let redis_config = common::cache::RedisConfig::from_env()?;
    let redis_pool = common::cache::RedisPool::new(&redis_config).await?;

    let token_config = tokens::TokenConfig::from_env()?;
    let token_service = EmailTokenService::new(token_config);

    let email_config = email::EmailConfig::from_env()?;
    let mailer = Mailer::from_config(&email_config);

    let session_config = session::SessionConfig::from_env()?;
    let sessions = SessionManager::new(redis_pool, session_config);

    let users = UserRepository::new(pool.clone());
    let rate_limiter = RateLimiter::new(rate_limiter::RateLimiterConfig::default());

    let base_url =
        std::env::var("BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());

    let app_state = AppState {
        db_pool: pool,
        users,
        sessions,
        tokens: token_service,
        mailer,
        rate_limiter,
        base_url,
    };

    info!("Account service initialized successfully");

    // Start the web server
    let app = routes::create_router(app_state);

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Account service listening on {}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
