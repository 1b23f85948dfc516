//! Account service routes
//!
//! Every user-visible outcome is a flash message plus a redirect, mirroring
//! how the rendered pages consume them: page (GET) handlers drain the flash
//! queue into the page payload, action (POST) handlers queue flashes and
//! redirect.

use axum::{
    Extension, Json, Router,
    extract::{Form, Path, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    response::{IntoResponse, Redirect, Response},
    routing::get,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::{
    AppState,
    middleware::{require_confirmed, require_login},
    models::{NewUser, User},
    session::{Flash, FlashLevel, SESSION_COOKIE, SessionManager},
    tokens::TokenPurpose,
    validation::{
        validate_email, validate_name, validate_password, validate_passwords_match,
        validate_username,
    },
};

const CONFIRM_EMAIL_SUBJECT: &str = "Please confirm your email";
const RESET_EMAIL_SUBJECT: &str = "Password Change Requested";

/// Payload the template layer renders for form and landing pages
#[derive(Serialize)]
pub struct PageResponse {
    pub title: String,
    pub flash: Vec<Flash>,
}

/// Registration form fields
#[derive(Deserialize)]
pub struct RegisterForm {
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub profile_pic: Option<String>,
    pub password: String,
    pub password_confirm: String,
}

/// Login form fields
#[derive(Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

/// Password reset request form fields
#[derive(Deserialize)]
pub struct EmailForm {
    pub email: String,
}

/// Password reset completion form fields
#[derive(Deserialize)]
pub struct PasswordResetForm {
    pub password: String,
    pub password_confirm: String,
}

/// Create the router for the account service
pub fn create_router(state: AppState) -> Router {
    let confirmed_only = Router::new()
        .route("/", get(home))
        .route_layer(from_fn_with_state(state.clone(), require_confirmed))
        .route_layer(from_fn_with_state(state.clone(), require_login));

    let session_required = Router::new()
        .route("/confirm/:token", get(confirm_email))
        .route("/unconfirm", get(unconfirmed))
        .route("/resend", get(resend_confirmation))
        .route("/logout", get(logout))
        .route_layer(from_fn_with_state(state.clone(), require_login));

    Router::new()
        .route("/health", get(health_check))
        .route("/register", get(register_page).post(register))
        .route("/login", get(login_page).post(login))
        .route("/reset", get(reset_request_page).post(reset_request))
        .route(
            "/reset-password/:token",
            get(reset_password_page).post(reset_password),
        )
        .merge(confirmed_only)
        .merge(session_required)
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database_up = common::database::health_check(&state.db_pool)
        .await
        .unwrap_or(false);

    Json(serde_json::json!({
        "status": if database_up { "ok" } else { "degraded" },
        "service": "auth-service"
    }))
}

/// Registration page
pub async fn register_page(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Response, AccountError> {
    let (jar, session_id) = ensure_session(jar);
    let flash = drain_flashes(&state, &session_id).await?;

    Ok((jar, page("Register", flash)).into_response())
}

/// User registration endpoint
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<RegisterForm>,
) -> Result<Response, AccountError> {
    info!("Registration attempt for email: {}", form.email);

    let (jar, session_id) = ensure_session(jar);

    let mut errors = Vec::new();
    if let Err(e) = validate_email(&form.email) {
        errors.push(e);
    }
    if let Err(e) = validate_username(&form.username) {
        errors.push(e);
    }
    if let Err(e) = validate_name("First name", &form.first_name) {
        errors.push(e);
    }
    if let Err(e) = validate_name("Last name", &form.last_name) {
        errors.push(e);
    }
    if let Err(e) = validate_password(&form.password) {
        errors.push(e);
    }
    if let Err(e) = validate_passwords_match(&form.password, &form.password_confirm) {
        errors.push(e);
    }

    if errors.is_empty() {
        let email_taken = state.users.find_by_email(&form.email).await.map_err(|e| {
            error!("Failed to check email uniqueness: {}", e);
            AccountError::Internal
        })?;
        if email_taken.is_some() {
            errors.push("Email is already registered".to_string());
        }

        let username_taken = state
            .users
            .find_by_username(&form.username)
            .await
            .map_err(|e| {
                error!("Failed to check username uniqueness: {}", e);
                AccountError::Internal
            })?;
        if username_taken.is_some() {
            errors.push("Username is already taken".to_string());
        }
    }

    if !errors.is_empty() {
        for message in &errors {
            queue_flash(&state, &session_id, FlashLevel::Danger, message).await?;
        }
        return Ok((jar, Redirect::to("/register")).into_response());
    }

    let new_user = NewUser {
        email: form.email,
        username: form.username,
        first_name: form.first_name,
        last_name: form.last_name,
        profile_pic: form.profile_pic.filter(|p| !p.is_empty()),
        password: form.password,
    };

    // The account must be persisted before a confirmation token or session
    // exists for it; any failure from here on leaves no session behind.
    let user = state.users.create(&new_user).await.map_err(|e| {
        error!("Failed to create user: {}", e);
        AccountError::Internal
    })?;

    let token = state
        .tokens
        .generate(&user.email, TokenPurpose::Confirm)
        .map_err(|e| {
            error!("Failed to generate confirmation token: {}", e);
            AccountError::Internal
        })?;
    let confirmation_url = format!("{}/confirm/{}", state.base_url, token);

    state
        .mailer
        .send(
            &user.email,
            CONFIRM_EMAIL_SUBJECT,
            &confirmation_email_html(&confirmation_url),
        )
        .await
        .map_err(|e| {
            error!("Failed to send confirmation email: {}", e);
            AccountError::Internal
        })?;

    state.sessions.log_in(&session_id, user.id).await.map_err(|e| {
        error!("Failed to start session: {}", e);
        AccountError::Internal
    })?;

    queue_flash(
        &state,
        &session_id,
        FlashLevel::Info,
        &format!(
            "A confirmation email has been sent to {}. Please confirm your email.",
            user.email
        ),
    )
    .await?;

    Ok((jar, Redirect::to("/unconfirm")).into_response())
}

/// Confirmation link target
pub async fn confirm_email(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(token): Path<String>,
) -> Result<Response, AccountError> {
    let (jar, session_id) = ensure_session(jar);

    let email = match state.tokens.verify(&token, TokenPurpose::Confirm) {
        Ok(email) => email,
        Err(e) => {
            info!("Rejected confirmation token: {}", e);
            queue_flash(
                &state,
                &session_id,
                FlashLevel::Danger,
                "The confirmation link is invalid or has expired",
            )
            .await?;
            return Ok((jar, Redirect::to("/unconfirm")).into_response());
        }
    };

    let account = state
        .users
        .find_by_email(&email)
        .await
        .map_err(|e| {
            error!("Failed to look up account for confirmation: {}", e);
            AccountError::Internal
        })?
        .ok_or(AccountError::NotFound)?;

    // Re-used link after a successful confirmation: report success, touch
    // nothing (the timestamp stays at first confirmation).
    if account.confirmed {
        queue_flash(
            &state,
            &session_id,
            FlashLevel::Success,
            "Your account has already been confirmed. Please login.",
        )
        .await?;
        return Ok((jar, Redirect::to("/login")).into_response());
    }

    let account = state.users.confirm(account.id).await.map_err(|e| {
        error!("Failed to confirm account: {}", e);
        AccountError::Internal
    })?;

    queue_flash(
        &state,
        &session_id,
        FlashLevel::Success,
        &format!(
            "{}, you have successfully confirmed your account. Thank you",
            account.first_name
        ),
    )
    .await?;

    Ok((jar, Redirect::to("/campgrounds")).into_response())
}

/// Unconfirmed landing page
pub async fn unconfirmed(
    State(state): State<AppState>,
    jar: CookieJar,
    Extension(user): Extension<User>,
) -> Result<Response, AccountError> {
    if user.confirmed {
        return Ok(Redirect::to("/").into_response());
    }

    let (jar, session_id) = ensure_session(jar);
    let flash = drain_flashes(&state, &session_id).await?;

    Ok((jar, page("Awaiting confirmation", flash)).into_response())
}

/// Login page
pub async fn login_page(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Response, AccountError> {
    let (jar, session_id) = ensure_session(jar);
    let flash = drain_flashes(&state, &session_id).await?;

    Ok((jar, page("Login", flash)).into_response())
}

/// User login endpoint
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<Response, AccountError> {
    info!("Login attempt for email: {}", form.email);

    let (jar, session_id) = ensure_session(jar);

    if !state.rate_limiter.is_allowed(&form.email).await {
        queue_flash(
            &state,
            &session_id,
            FlashLevel::Danger,
            "Too many login attempts. Please try again later.",
        )
        .await?;
        return Ok((jar, Redirect::to("/login")).into_response());
    }

    let account = state.users.find_by_email(&form.email).await.map_err(|e| {
        error!("Failed to look up account for login: {}", e);
        AccountError::Internal
    })?;

    // Unknown email and wrong password share one outcome below.
    let credentials_ok = match &account {
        Some(account) => state
            .users
            .verify_password(account, &form.password)
            .unwrap_or_else(|e| {
                error!("Failed to verify password: {}", e);
                false
            }),
        None => false,
    };

    if let (true, Some(account)) = (credentials_ok, account) {
        state.rate_limiter.clear(&form.email).await;
        state
            .sessions
            .log_in(&session_id, account.id)
            .await
            .map_err(|e| {
                error!("Failed to start session: {}", e);
                AccountError::Internal
            })?;
        return Ok((jar, Redirect::to("/")).into_response());
    }

    queue_flash(
        &state,
        &session_id,
        FlashLevel::Danger,
        "Invalid credentials. Please provide valid credentials to login.",
    )
    .await?;

    Ok((jar, Redirect::to("/login")).into_response())
}

/// Resend the confirmation email to the logged-in account
pub async fn resend_confirmation(
    State(state): State<AppState>,
    jar: CookieJar,
    Extension(user): Extension<User>,
) -> Result<Response, AccountError> {
    let (jar, session_id) = ensure_session(jar);

    let token = state
        .tokens
        .generate(&user.email, TokenPurpose::Confirm)
        .map_err(|e| {
            error!("Failed to generate confirmation token: {}", e);
            AccountError::Internal
        })?;
    let confirmation_url = format!("{}/confirm/{}", state.base_url, token);

    state
        .mailer
        .send(
            &user.email,
            CONFIRM_EMAIL_SUBJECT,
            &confirmation_email_html(&confirmation_url),
        )
        .await
        .map_err(|e| {
            error!("Failed to send confirmation email: {}", e);
            AccountError::Internal
        })?;

    queue_flash(
        &state,
        &session_id,
        FlashLevel::Success,
        &format!("A confirmation email has been sent to {}", user.email),
    )
    .await?;

    Ok((jar, Redirect::to("/unconfirm")).into_response())
}

/// Password reset request page
pub async fn reset_request_page(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Response, AccountError> {
    let (jar, session_id) = ensure_session(jar);
    let flash = drain_flashes(&state, &session_id).await?;

    Ok((jar, page("Reset your password", flash)).into_response())
}

/// Password reset request endpoint
pub async fn reset_request(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<EmailForm>,
) -> Result<Response, AccountError> {
    info!("Password reset requested for email: {}", form.email);

    let (jar, session_id) = ensure_session(jar);

    if !state.rate_limiter.is_allowed(&form.email).await {
        queue_flash(
            &state,
            &session_id,
            FlashLevel::Danger,
            "Too many reset attempts. Please try again later.",
        )
        .await?;
        return Ok((jar, Redirect::to("/reset")).into_response());
    }

    let account = state.users.find_by_email(&form.email).await.map_err(|e| {
        error!("Failed to look up account for reset: {}", e);
        AccountError::Internal
    })?;

    let Some(account) = account else {
        // Unregistered address: back to the form with no hint either way.
        return Ok((jar, Redirect::to("/reset")).into_response());
    };

    if !account.confirmed {
        queue_flash(
            &state,
            &session_id,
            FlashLevel::Warning,
            "You will need to confirm your account before resetting your password",
        )
        .await?;
        return Ok((jar, Redirect::to("/resend")).into_response());
    }

    let token = state
        .tokens
        .generate(&account.email, TokenPurpose::Reset)
        .map_err(|e| {
            error!("Failed to generate reset token: {}", e);
            AccountError::Internal
        })?;
    let reset_url = format!("{}/reset-password/{}", state.base_url, token);

    state
        .mailer
        .send(
            &account.email,
            RESET_EMAIL_SUBJECT,
            &reset_email_html(&reset_url),
        )
        .await
        .map_err(|e| {
            error!("Failed to send reset email: {}", e);
            AccountError::Internal
        })?;

    queue_flash(
        &state,
        &session_id,
        FlashLevel::Info,
        &format!(
            "We sent an email to {} with a link to change your password. \
             Please check your inbox for the email.",
            account.email
        ),
    )
    .await?;

    Ok((jar, Redirect::to("/login")).into_response())
}

/// Password reset completion page
pub async fn reset_password_page(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(token): Path<String>,
) -> Result<Response, AccountError> {
    let (jar, session_id) = ensure_session(jar);

    if let Err(e) = state.tokens.verify(&token, TokenPurpose::Reset) {
        info!("Rejected password reset token: {}", e);
        queue_flash(
            &state,
            &session_id,
            FlashLevel::Warning,
            "The password reset link is invalid or has expired",
        )
        .await?;
        return Ok((jar, Redirect::to("/login")).into_response());
    }

    let flash = drain_flashes(&state, &session_id).await?;

    Ok((jar, page("Change your password", flash)).into_response())
}

/// Password reset completion endpoint
pub async fn reset_password(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(token): Path<String>,
    Form(form): Form<PasswordResetForm>,
) -> Result<Response, AccountError> {
    let (jar, session_id) = ensure_session(jar);

    let email = match state.tokens.verify(&token, TokenPurpose::Reset) {
        Ok(email) => email,
        Err(e) => {
            info!("Rejected password reset token: {}", e);
            queue_flash(
                &state,
                &session_id,
                FlashLevel::Warning,
                "The password reset link is invalid or has expired",
            )
            .await?;
            return Ok((jar, Redirect::to("/login")).into_response());
        }
    };

    let mut errors = Vec::new();
    if let Err(e) = validate_password(&form.password) {
        errors.push(e);
    }
    if let Err(e) = validate_passwords_match(&form.password, &form.password_confirm) {
        errors.push(e);
    }

    if !errors.is_empty() {
        for message in &errors {
            queue_flash(&state, &session_id, FlashLevel::Danger, message).await?;
        }
        return Ok((jar, Redirect::to(&format!("/reset-password/{}", token))).into_response());
    }

    let account = state.users.find_by_email(&email).await.map_err(|e| {
        error!("Failed to look up account for reset: {}", e);
        AccountError::Internal
    })?;

    let Some(account) = account else {
        // Valid token for an address with no account (deleted in between).
        queue_flash(
            &state,
            &session_id,
            FlashLevel::Danger,
            "No account was found for this reset link",
        )
        .await?;
        return Ok((jar, Redirect::to("/reset")).into_response());
    };

    state
        .users
        .update_password(account.id, &form.password)
        .await
        .map_err(|e| {
            error!("Failed to update password: {}", e);
            AccountError::Internal
        })?;

    queue_flash(
        &state,
        &session_id,
        FlashLevel::Success,
        "You have successfully changed your password.",
    )
    .await?;

    Ok((jar, Redirect::to("/login")).into_response())
}

/// Logout endpoint
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
    Extension(user): Extension<User>,
) -> Result<Response, AccountError> {
    info!("Logout for user: {}", user.username);

    let (jar, session_id) = ensure_session(jar);

    // Flash first: the queue outlives the session entry so the goodbye
    // notice shows on the login page.
    queue_flash(
        &state,
        &session_id,
        FlashLevel::Success,
        &format!("{}, you have successfully logged out", user.username),
    )
    .await?;

    state.sessions.log_out(&session_id).await.map_err(|e| {
        error!("Failed to end session: {}", e);
        AccountError::Internal
    })?;

    Ok((jar, Redirect::to("/login")).into_response())
}

/// Home page, reachable by confirmed accounts only
pub async fn home(
    State(state): State<AppState>,
    jar: CookieJar,
    Extension(user): Extension<User>,
) -> Result<Response, AccountError> {
    let (jar, session_id) = ensure_session(jar);
    let flash = drain_flashes(&state, &session_id).await?;

    Ok((
        jar,
        page(&format!("Welcome back, {}", user.first_name), flash),
    )
        .into_response())
}

/// Reuse the session cookie or start an anonymous session to carry flashes
fn ensure_session(jar: CookieJar) -> (CookieJar, String) {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        let session_id = cookie.value().to_string();
        return (jar, session_id);
    }

    let session_id = SessionManager::new_session_id();
    let cookie = Cookie::build((SESSION_COOKIE, session_id.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build();

    (jar.add(cookie), session_id)
}

fn page(title: &str, flash: Vec<Flash>) -> Json<PageResponse> {
    Json(PageResponse {
        title: title.to_string(),
        flash,
    })
}

async fn queue_flash(
    state: &AppState,
    session_id: &str,
    level: FlashLevel,
    message: &str,
) -> Result<(), AccountError> {
    state
        .sessions
        .flash(session_id, level, message)
        .await
        .map_err(|e| {
            error!("Failed to queue flash message: {}", e);
            AccountError::Internal
        })
}

async fn drain_flashes(state: &AppState, session_id: &str) -> Result<Vec<Flash>, AccountError> {
    state.sessions.take_flashes(session_id).await.map_err(|e| {
        error!("Failed to drain flash messages: {}", e);
        AccountError::Internal
    })
}

fn confirmation_email_html(confirmation_url: &str) -> String {
    format!(
        "<p>Welcome to Campstead! Please confirm your email by following \
         <a href=\"{confirmation_url}\">this link</a>.</p>"
    )
}

fn reset_email_html(reset_url: &str) -> String {
    format!(
        "<p>A password change was requested for your Campstead account. \
         Follow <a href=\"{reset_url}\">this link</a> to choose a new password. \
         If you did not request this change, you can ignore this email.</p>"
    )
}

/// Custom error type for account route failures
#[derive(Debug)]
pub enum AccountError {
    NotFound,
    Internal,
}

impl IntoResponse for AccountError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AccountError::NotFound => (StatusCode::NOT_FOUND, "Account not found"),
            AccountError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
        };

        let body = Json(serde_json::json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_session_creates_then_preserves_the_id() {
        let (jar, session_id) = ensure_session(CookieJar::default());
        assert!(!session_id.is_empty());
        assert!(jar.get(SESSION_COOKIE).is_some());

        let (_, same_id) = ensure_session(jar);
        assert_eq!(session_id, same_id);
    }

    #[test]
    fn test_confirmation_email_carries_the_link() {
        let html = confirmation_email_html("http://localhost:3000/confirm/abc");
        assert!(html.contains("http://localhost:3000/confirm/abc"));
    }

    #[test]
    fn test_reset_email_carries_the_link() {
        let html = reset_email_html("http://localhost:3000/reset-password/abc");
        assert!(html.contains("http://localhost:3000/reset-password/abc"));
    }
}
