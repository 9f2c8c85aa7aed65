//! Change-notification hook handlers.
//!
//! The identity provider and the store's change feed deliver their
//! notifications over HTTP; these handlers validate the envelope and
//! enqueue it for the matching consumer. Delivery is fire-and-forget:
//! a hook answers `202 Accepted` once the event is queued.
//!
//! ```text
//! POST /api/v1/hooks/account-created {"uid":"u1","email":"u1@school.edu"}
//! POST /api/v1/hooks/appointments {"kind":"created","appointmentId":"...","after":{...}}
//! ```

use actix_web::{HttpResponse, post, web};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::domain::{AccountCreated, AccountId, Appointment, AppointmentEvent, AppointmentId, Error};
use crate::inbound::http::ApiResult;
use crate::inbound::http::identity::CallerIdentity;
use crate::inbound::http::state::AppState;

/// Account-created notification body.
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccountCreatedRequest {
    /// New account id.
    pub uid: String,
    /// Email the account registered with.
    pub email: String,
}

/// Appointment change notification body.
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentEventRequest {
    /// One of `created`, `updated`, `deleted`.
    #[schema(example = "created")]
    pub kind: String,
    /// Affected appointment document id.
    pub appointment_id: String,
    /// Snapshot before the change (`updated`, `deleted`).
    #[serde(default)]
    #[schema(value_type = Object)]
    pub before: Option<Value>,
    /// Snapshot after the change (`created`, `updated`).
    #[serde(default)]
    #[schema(value_type = Object)]
    pub after: Option<Value>,
}

fn decode_snapshot(field: &str, snapshot: Option<Value>) -> Result<Appointment, Error> {
    let value = snapshot.ok_or_else(|| {
        Error::invalid_request(format!("missing {field} snapshot"))
            .with_details(json!({ "field": field }))
    })?;
    serde_json::from_value(value).map_err(|_| {
        Error::invalid_request(format!("malformed {field} snapshot"))
            .with_details(json!({ "field": field }))
    })
}

fn parse_event(request: AppointmentEventRequest) -> Result<AppointmentEvent, Error> {
    let id = AppointmentId::new(request.appointment_id.as_str()).map_err(|_| {
        Error::invalid_request("malformed appointment id")
            .with_details(json!({ "field": "appointmentId" }))
    })?;
    match request.kind.as_str() {
        "created" => Ok(AppointmentEvent::Created {
            id,
            appointment: decode_snapshot("after", request.after)?,
        }),
        "updated" => Ok(AppointmentEvent::Updated {
            id,
            before: decode_snapshot("before", request.before)?,
            after: decode_snapshot("after", request.after)?,
        }),
        "deleted" => Ok(AppointmentEvent::Deleted {
            id,
            appointment: decode_snapshot("before", request.before)?,
        }),
        _ => Err(Error::invalid_request("unknown event kind")
            .with_details(json!({ "field": "kind", "allowed": ["created", "updated", "deleted"] }))),
    }
}

/// Receive an account-created notification from the identity provider.
#[utoipa::path(
    post,
    path = "/api/v1/hooks/account-created",
    request_body = AccountCreatedRequest,
    responses(
        (status = 202, description = "Notification queued"),
        (status = 400, description = "Invalid request", body = Error),
        (status = 401, description = "Unauthorised", body = Error),
        (status = 503, description = "Consumer unavailable", body = Error)
    ),
    tags = ["hooks"],
    operation_id = "accountCreatedHook"
)]
#[post("/hooks/account-created")]
pub async fn account_created_hook(
    _caller: CallerIdentity,
    state: web::Data<AppState>,
    payload: web::Json<AccountCreatedRequest>,
) -> ApiResult<HttpResponse> {
    let payload = payload.into_inner();
    let uid = AccountId::new(payload.uid.as_str()).map_err(|_| {
        Error::invalid_request("account id must not be empty")
            .with_details(json!({ "field": "uid" }))
    })?;
    state
        .account_events
        .send(AccountCreated {
            uid,
            email: payload.email,
        })
        .await
        .map_err(|_| Error::service_unavailable("account notification consumer unavailable"))?;
    Ok(HttpResponse::Accepted().finish())
}

/// Receive an appointment change notification from the store's change feed.
#[utoipa::path(
    post,
    path = "/api/v1/hooks/appointments",
    request_body = AppointmentEventRequest,
    responses(
        (status = 202, description = "Notification queued"),
        (status = 400, description = "Invalid request", body = Error),
        (status = 401, description = "Unauthorised", body = Error),
        (status = 503, description = "Consumer unavailable", body = Error)
    ),
    tags = ["hooks"],
    operation_id = "appointmentChangedHook"
)]
#[post("/hooks/appointments")]
pub async fn appointment_changed_hook(
    _caller: CallerIdentity,
    state: web::Data<AppState>,
    payload: web::Json<AppointmentEventRequest>,
) -> ApiResult<HttpResponse> {
    let event = parse_event(payload.into_inner())?;
    state
        .appointment_events
        .send(event)
        .await
        .map_err(|_| Error::service_unavailable("appointment notification consumer unavailable"))?;
    Ok(HttpResponse::Accepted().finish())
}
