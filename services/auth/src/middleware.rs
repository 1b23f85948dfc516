//! Middleware guards for session-gated and confirmation-gated routes

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use tracing::error;

use crate::{
    AppState,
    models::User,
    session::{FlashLevel, SESSION_COOKIE},
};

/// Resolve the session cookie to a logged-in user
///
/// The user row is loaded once here and injected into request extensions so
/// handlers read an explicit `User` instead of re-resolving ambient session
/// state. Requests without a live session are redirected to the login page.
pub async fn require_login(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let jar = CookieJar::from_headers(req.headers());
    let Some(session_id) = jar.get(SESSION_COOKIE).map(|c| c.value().to_string()) else {
        return Ok(Redirect::to("/login").into_response());
    };

    let user_id = match state.sessions.current_user_id(&session_id).await {
        Ok(Some(user_id)) => user_id,
        Ok(None) => return Ok(Redirect::to("/login").into_response()),
        Err(e) => {
            error!("Failed to resolve session: {}", e);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    let user = match state.users.find_by_id(user_id).await {
        Ok(Some(user)) => user,
        // Session points at a deleted account; treat as logged out.
        Ok(None) => return Ok(Redirect::to("/login").into_response()),
        Err(e) => {
            error!("Failed to load session user: {}", e);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    req.extensions_mut().insert(user);

    Ok(next.run(req).await)
}

/// Block unconfirmed accounts from protected routes
///
/// Must run after [`require_login`]. Confirmed accounts pass through
/// unchanged; unconfirmed ones get a warning flash and a redirect to the
/// waiting page.
pub async fn require_confirmed(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(user) = req.extensions().get::<User>().cloned() else {
        return Ok(Redirect::to("/login").into_response());
    };

    if !user.confirmed {
        let jar = CookieJar::from_headers(req.headers());
        if let Some(session_id) = jar.get(SESSION_COOKIE).map(|c| c.value().to_string()) {
            if let Err(e) = state
                .sessions
                .flash(&session_id, FlashLevel::Warning, "Please confirm your account!")
                .await
            {
                error!("Failed to queue flash message: {}", e);
            }
        }
        return Ok(Redirect::to("/unconfirm").into_response());
    }

    Ok(next.run(req).await)
}
