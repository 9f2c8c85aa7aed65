//! Appointment API handlers.
//!
//! ```text
//! POST   /api/v1/appointments {"date":"2025-06-01","window":"09:00-10:00"}
//! DELETE /api/v1/appointments/{id}
//! POST   /api/v1/appointments/{id}/reschedule {"date":"...","window":"..."}
//! POST   /api/v1/appointments/{id}/status {"status":"PAID"}
//! ```

use actix_web::{HttpResponse, delete, post, web};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::domain::{
    AppointmentId, AppointmentStatus, BookingDate, Error, PaymentMethod, TimeWindow,
};
use crate::inbound::http::ApiResult;
use crate::inbound::http::identity::CallerIdentity;
use crate::inbound::http::state::AppState;

/// Booking request body for `POST /api/v1/appointments`.
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateAppointmentRequest {
    /// Calendar date, strict `YYYY-MM-DD`.
    #[schema(example = "2025-06-01")]
    pub date: String,
    /// One of the fixed time windows.
    #[schema(example = "09:00-10:00")]
    pub window: String,
    /// Payment method; defaults to `E_WALLET`.
    #[serde(default)]
    pub payment_method: Option<String>,
}

/// Booking response body.
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentIdResponse {
    /// Deterministic appointment identifier.
    pub appointment_id: AppointmentId,
}

/// Reschedule request body.
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RescheduleAppointmentRequest {
    /// New calendar date, strict `YYYY-MM-DD`.
    pub date: String,
    /// New time window.
    pub window: String,
}

/// Status update request body.
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    /// Target lifecycle state.
    #[schema(example = "PAID")]
    pub status: String,
}

fn parse_date(raw: &str) -> Result<BookingDate, Error> {
    BookingDate::parse(raw).map_err(|_| {
        Error::invalid_request("date must be formatted YYYY-MM-DD")
            .with_details(json!({ "field": "date" }))
    })
}

fn parse_window(raw: &str) -> Result<TimeWindow, Error> {
    raw.parse().map_err(|_| {
        let allowed: Vec<_> = TimeWindow::ALL.iter().map(|w| w.as_str()).collect();
        Error::invalid_request("unknown time window")
            .with_details(json!({ "field": "window", "allowed": allowed }))
    })
}

fn parse_payment_method(raw: Option<&str>) -> Result<PaymentMethod, Error> {
    match raw {
        None => Ok(PaymentMethod::EWallet),
        Some(raw) => raw.parse().map_err(|_| {
            Error::invalid_request("unknown payment method")
                .with_details(json!({ "field": "paymentMethod" }))
        }),
    }
}

fn parse_appointment_id(raw: &str) -> Result<AppointmentId, Error> {
    AppointmentId::new(raw).map_err(|_| {
        Error::invalid_request("malformed appointment id").with_details(json!({ "field": "id" }))
    })
}

fn parse_status(raw: &str) -> Result<AppointmentStatus, Error> {
    raw.parse().map_err(|_| {
        Error::invalid_request("unknown appointment status")
            .with_details(json!({ "field": "status" }))
    })
}

/// Book an appointment slot for the calling account.
#[utoipa::path(
    post,
    path = "/api/v1/appointments",
    request_body = CreateAppointmentRequest,
    responses(
        (status = 200, description = "Appointment booked", body = AppointmentIdResponse),
        (status = 400, description = "Invalid request", body = Error),
        (status = 401, description = "Unauthorised", body = Error),
        (status = 409, description = "Already booked for this slot", body = Error),
        (status = 429, description = "Slot full or booking cap reached", body = Error),
        (status = 500, description = "Internal server error", body = Error)
    ),
    tags = ["appointments"],
    operation_id = "createAppointment"
)]
#[post("/appointments")]
pub async fn create_appointment(
    caller: CallerIdentity,
    state: web::Data<AppState>,
    payload: web::Json<CreateAppointmentRequest>,
) -> ApiResult<web::Json<AppointmentIdResponse>> {
    let payload = payload.into_inner();
    let date = parse_date(&payload.date)?;
    let window = parse_window(&payload.window)?;
    let payment_method = parse_payment_method(payload.payment_method.as_deref())?;
    let appointment_id = state
        .booking
        .create(caller.account_id(), date, window, payment_method)
        .await?;
    Ok(web::Json(AppointmentIdResponse { appointment_id }))
}

/// Delete the calling account's appointment and free its slot unit.
#[utoipa::path(
    delete,
    path = "/api/v1/appointments/{id}",
    params(("id" = String, Path, description = "Appointment id")),
    responses(
        (status = 204, description = "Appointment deleted"),
        (status = 400, description = "Invalid request", body = Error),
        (status = 401, description = "Unauthorised", body = Error),
        (status = 403, description = "Not the owner", body = Error),
        (status = 404, description = "Not found", body = Error),
        (status = 500, description = "Internal server error", body = Error)
    ),
    tags = ["appointments"],
    operation_id = "deleteAppointment"
)]
#[delete("/appointments/{id}")]
pub async fn delete_appointment(
    caller: CallerIdentity,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let id = parse_appointment_id(&path.into_inner())?;
    state.booking.delete(caller.account_id(), &id).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// Move the calling account's appointment to another slot.
#[utoipa::path(
    post,
    path = "/api/v1/appointments/{id}/reschedule",
    params(("id" = String, Path, description = "Appointment id")),
    request_body = RescheduleAppointmentRequest,
    responses(
        (status = 200, description = "Appointment moved", body = AppointmentIdResponse),
        (status = 400, description = "Invalid request", body = Error),
        (status = 401, description = "Unauthorised", body = Error),
        (status = 403, description = "Not the owner", body = Error),
        (status = 404, description = "Not found", body = Error),
        (status = 409, description = "Target slot already booked", body = Error),
        (status = 429, description = "Target slot full", body = Error),
        (status = 500, description = "Internal server error", body = Error)
    ),
    tags = ["appointments"],
    operation_id = "rescheduleAppointment"
)]
#[post("/appointments/{id}/reschedule")]
pub async fn reschedule_appointment(
    caller: CallerIdentity,
    state: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<RescheduleAppointmentRequest>,
) -> ApiResult<web::Json<AppointmentIdResponse>> {
    let id = parse_appointment_id(&path.into_inner())?;
    let payload = payload.into_inner();
    let date = parse_date(&payload.date)?;
    let window = parse_window(&payload.window)?;
    let appointment_id = state
        .booking
        .reschedule(caller.account_id(), &id, date, window)
        .await?;
    Ok(web::Json(AppointmentIdResponse { appointment_id }))
}

/// Move an appointment through its lifecycle. Staff only.
#[utoipa::path(
    post,
    path = "/api/v1/appointments/{id}/status",
    params(("id" = String, Path, description = "Appointment id")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 204, description = "Status updated"),
        (status = 400, description = "Invalid request", body = Error),
        (status = 401, description = "Unauthorised", body = Error),
        (status = 403, description = "Cashier or admin role required", body = Error),
        (status = 404, description = "Not found", body = Error),
        (status = 409, description = "Transition not permitted", body = Error),
        (status = 500, description = "Internal server error", body = Error)
    ),
    tags = ["appointments"],
    operation_id = "updateAppointmentStatus"
)]
#[post("/appointments/{id}/status")]
pub async fn update_appointment_status(
    caller: CallerIdentity,
    state: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<UpdateStatusRequest>,
) -> ApiResult<HttpResponse> {
    let id = parse_appointment_id(&path.into_inner())?;
    let status = parse_status(&payload.status)?;
    state
        .booking
        .update_status(caller.account_id(), &id, status)
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
mod tests {
    use actix_web::http::StatusCode;
    use actix_web::{test as actix_test, web, App};
    use chrono::{Days, Utc};
    use rstest::rstest;
    use serde_json::Value;

    use super::*;
    use crate::inbound::http::identity::VERIFIED_UID_HEADER;
    use crate::inbound::http::test_utils::TestContext;

    fn future_date(days: u64) -> String {
        Utc::now()
            .date_naive()
            .checked_add_days(Days::new(days))
            .expect("date in range")
            .format("%Y-%m-%d")
            .to_string()
    }

    fn test_app(
        context: &TestContext,
    ) -> App<
        impl actix_web::dev::ServiceFactory<
            actix_web::dev::ServiceRequest,
            Config = (),
            Response = actix_web::dev::ServiceResponse,
            Error = actix_web::Error,
            InitError = (),
        > + use<>,
    > {
        App::new().app_data(web::Data::new(context.state.clone())).service(
            web::scope("/api/v1")
                .service(create_appointment)
                .service(delete_appointment)
                .service(reschedule_appointment)
                .service(update_appointment_status),
        )
    }

    #[actix_web::test]
    async fn booking_returns_the_deterministic_id() {
        let context = TestContext::new();
        let app = actix_test::init_service(test_app(&context)).await;

        let res = actix_test::call_service(
            &app,
            actix_test::TestRequest::post()
                .uri("/api/v1/appointments")
                .insert_header((VERIFIED_UID_HEADER, "student-1"))
                .set_json(&CreateAppointmentRequest {
                    date: future_date(7),
                    window: "09:00-10:00".to_owned(),
                    payment_method: None,
                })
                .to_request(),
        )
        .await;

        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = actix_test::read_body_json(res).await;
        let id = body
            .get("appointmentId")
            .and_then(Value::as_str)
            .expect("appointment id");
        assert_eq!(id.len(), 64);
    }

    #[actix_web::test]
    async fn booking_requires_a_verified_identity() {
        let context = TestContext::new();
        let app = actix_test::init_service(test_app(&context)).await;

        let res = actix_test::call_service(
            &app,
            actix_test::TestRequest::post()
                .uri("/api/v1/appointments")
                .set_json(&CreateAppointmentRequest {
                    date: future_date(7),
                    window: "09:00-10:00".to_owned(),
                    payment_method: None,
                })
                .to_request(),
        )
        .await;

        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[rstest]
    #[case("2025-6-01", "09:00-10:00", "date")]
    #[case("2025-06-01", "09:30-10:30", "window")]
    #[actix_web::test]
    async fn malformed_inputs_are_rejected(
        #[case] date: &str,
        #[case] window: &str,
        #[case] field: &str,
    ) {
        let context = TestContext::new();
        let app = actix_test::init_service(test_app(&context)).await;

        let res = actix_test::call_service(
            &app,
            actix_test::TestRequest::post()
                .uri("/api/v1/appointments")
                .insert_header((VERIFIED_UID_HEADER, "student-1"))
                .set_json(&CreateAppointmentRequest {
                    date: date.to_owned(),
                    window: window.to_owned(),
                    payment_method: None,
                })
                .to_request(),
        )
        .await;

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body: Value = actix_test::read_body_json(res).await;
        let details = body.get("details").expect("details present");
        assert_eq!(details.get("field"), Some(&serde_json::json!(field)));
    }

    #[actix_web::test]
    async fn duplicate_bookings_conflict() {
        let context = TestContext::new();
        let app = actix_test::init_service(test_app(&context)).await;
        let request = || {
            actix_test::TestRequest::post()
                .uri("/api/v1/appointments")
                .insert_header((VERIFIED_UID_HEADER, "student-1"))
                .set_json(&CreateAppointmentRequest {
                    date: future_date(7),
                    window: "10:00-11:00".to_owned(),
                    payment_method: Some("PAY_AT_SCHOOL".to_owned()),
                })
                .to_request()
        };

        let first = actix_test::call_service(&app, request()).await;
        assert_eq!(first.status(), StatusCode::OK);
        let second = actix_test::call_service(&app, request()).await;
        assert_eq!(second.status(), StatusCode::CONFLICT);
    }

    #[actix_web::test]
    async fn delete_then_rebook_round_trips() {
        let context = TestContext::new();
        let app = actix_test::init_service(test_app(&context)).await;
        let book = || {
            actix_test::TestRequest::post()
                .uri("/api/v1/appointments")
                .insert_header((VERIFIED_UID_HEADER, "student-1"))
                .set_json(&CreateAppointmentRequest {
                    date: future_date(7),
                    window: "11:00-12:00".to_owned(),
                    payment_method: None,
                })
                .to_request()
        };

        let res = actix_test::call_service(&app, book()).await;
        let body: Value = actix_test::read_body_json(res).await;
        let id = body
            .get("appointmentId")
            .and_then(Value::as_str)
            .expect("appointment id")
            .to_owned();

        let deleted = actix_test::call_service(
            &app,
            actix_test::TestRequest::delete()
                .uri(&format!("/api/v1/appointments/{id}"))
                .insert_header((VERIFIED_UID_HEADER, "student-1"))
                .to_request(),
        )
        .await;
        assert_eq!(deleted.status(), StatusCode::NO_CONTENT);

        let rebooked = actix_test::call_service(&app, book()).await;
        assert_eq!(rebooked.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn status_updates_require_staff() {
        let context = TestContext::new();
        context.seed_role("cashier-1", crate::domain::Role::Cashier).await;
        let app = actix_test::init_service(test_app(&context)).await;

        let res = actix_test::call_service(
            &app,
            actix_test::TestRequest::post()
                .uri("/api/v1/appointments")
                .insert_header((VERIFIED_UID_HEADER, "student-1"))
                .set_json(&CreateAppointmentRequest {
                    date: future_date(7),
                    window: "13:00-14:00".to_owned(),
                    payment_method: None,
                })
                .to_request(),
        )
        .await;
        let body: Value = actix_test::read_body_json(res).await;
        let id = body
            .get("appointmentId")
            .and_then(Value::as_str)
            .expect("appointment id")
            .to_owned();

        let as_student = actix_test::call_service(
            &app,
            actix_test::TestRequest::post()
                .uri(&format!("/api/v1/appointments/{id}/status"))
                .insert_header((VERIFIED_UID_HEADER, "student-1"))
                .set_json(&UpdateStatusRequest {
                    status: "PAID".to_owned(),
                })
                .to_request(),
        )
        .await;
        assert_eq!(as_student.status(), StatusCode::FORBIDDEN);

        let as_cashier = actix_test::call_service(
            &app,
            actix_test::TestRequest::post()
                .uri(&format!("/api/v1/appointments/{id}/status"))
                .insert_header((VERIFIED_UID_HEADER, "cashier-1"))
                .set_json(&UpdateStatusRequest {
                    status: "PAID".to_owned(),
                })
                .to_request(),
        )
        .await;
        assert_eq!(as_cashier.status(), StatusCode::NO_CONTENT);
    }
}
