//! Username API handlers.
//!
//! ```text
//! POST   /api/v1/usernames {"username":"alice"}
//! DELETE /api/v1/usernames/{username}
//! GET    /api/v1/usernames/{username}/email
//! ```

use actix_web::{delete, get, post, web};
use serde::{Deserialize, Serialize};

use crate::domain::Error;
use crate::inbound::http::ApiResult;
use crate::inbound::http::identity::CallerIdentity;
use crate::inbound::http::state::AppState;

/// Reservation request body for `POST /api/v1/usernames`.
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReserveUsernameRequest {
    /// Requested handle; normalised to trimmed lower-case.
    #[schema(example = "alice")]
    pub username: String,
}

/// Acknowledgement body for reservation and release.
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UsernameAck {
    /// Always `true` on success.
    pub ok: bool,
}

/// Lookup response body.
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UsernameEmailResponse {
    /// Email bound to the username.
    pub email: String,
}

/// Reserve a username for the calling account.
#[utoipa::path(
    post,
    path = "/api/v1/usernames",
    request_body = ReserveUsernameRequest,
    responses(
        (status = 200, description = "Username reserved", body = UsernameAck),
        (status = 400, description = "Invalid username", body = Error),
        (status = 401, description = "Unauthorised", body = Error),
        (status = 409, description = "Username already taken", body = Error),
        (status = 500, description = "Internal server error", body = Error)
    ),
    tags = ["usernames"],
    operation_id = "reserveUsername"
)]
#[post("/usernames")]
pub async fn reserve_username(
    caller: CallerIdentity,
    state: web::Data<AppState>,
    payload: web::Json<ReserveUsernameRequest>,
) -> ApiResult<web::Json<UsernameAck>> {
    state
        .registry
        .reserve(caller.account_id(), caller.email(), &payload.username)
        .await?;
    Ok(web::Json(UsernameAck { ok: true }))
}

/// Release a username owned by the calling account.
#[utoipa::path(
    delete,
    path = "/api/v1/usernames/{username}",
    params(("username" = String, Path, description = "Handle to release")),
    responses(
        (status = 200, description = "Username released (or was never taken)", body = UsernameAck),
        (status = 401, description = "Unauthorised", body = Error),
        (status = 403, description = "Owned by another account", body = Error),
        (status = 500, description = "Internal server error", body = Error)
    ),
    tags = ["usernames"],
    operation_id = "releaseUsername"
)]
#[delete("/usernames/{username}")]
pub async fn release_username(
    caller: CallerIdentity,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<web::Json<UsernameAck>> {
    state
        .registry
        .release(caller.account_id(), &path.into_inner())
        .await?;
    Ok(web::Json(UsernameAck { ok: true }))
}

/// Resolve the email bound to a username. Public: used by
/// login-by-username before the caller has a session.
#[utoipa::path(
    get,
    path = "/api/v1/usernames/{username}/email",
    params(("username" = String, Path, description = "Handle to look up")),
    responses(
        (status = 200, description = "Email found", body = UsernameEmailResponse),
        (status = 404, description = "Unknown username or no email", body = Error),
        (status = 500, description = "Internal server error", body = Error)
    ),
    tags = ["usernames"],
    operation_id = "getEmailForUsername",
    security([])
)]
#[get("/usernames/{username}/email")]
pub async fn get_email_for_username(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<web::Json<UsernameEmailResponse>> {
    let email = state.registry.lookup_email(&path.into_inner()).await?;
    Ok(web::Json(UsernameEmailResponse { email }))
}
