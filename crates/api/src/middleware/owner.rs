use axum::{extract::Request, http::StatusCode, middleware::Next, response::Response, Json};
use axum_extra::extract::CookieJar;
use services::{GuestSessionId, Owner, UserId};
use tracing::debug;

use crate::models::ErrorResponse;

/// Set by the upstream auth gateway for signed-in users
pub const USER_ID_HEADER: &str = "x-user-id";
/// Anonymous session cookie
pub const GUEST_COOKIE: &str = "guestSessionId";

/// Owner resolved for the current request
#[derive(Debug, Clone)]
pub struct RequestOwner(pub Owner);

fn unauthorized(message: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse::new(message, "authentication_error")),
    )
}

/// Resolve the request owner: an authenticated user id wins over the guest cookie.
pub fn resolve_owner(request: &Request) -> Result<Owner, (StatusCode, Json<ErrorResponse>)> {
    if let Some(value) = request.headers().get(USER_ID_HEADER) {
        let user_id = value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<UserId>().ok())
            .ok_or_else(|| unauthorized("Invalid user id header"))?;
        return Ok(Owner::User(user_id));
    }

    let jar = CookieJar::from_headers(request.headers());
    if let Some(cookie) = jar.get(GUEST_COOKIE) {
        let guest = GuestSessionId::parse(cookie.value())
            .map_err(|_| unauthorized("Invalid guest session cookie"))?;
        return Ok(Owner::Guest(guest));
    }

    Err(unauthorized("Missing user id or guest session"))
}

pub async fn owner_middleware(
    mut request: Request,
    next: Next,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    let owner = resolve_owner(&request)?;
    debug!("Request owner: {}", owner);
    request.extensions_mut().insert(RequestOwner(owner));
    Ok(next.run(request).await)
}
