//! Permit upload API handler.
//!
//! ```text
//! POST /api/v1/permits {"targetUid":"student-1","base64Image":"..."}
//! ```

use actix_web::{post, web};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::domain::{AccountId, Error};
use crate::inbound::http::ApiResult;
use crate::inbound::http::identity::CallerIdentity;
use crate::inbound::http::state::AppState;

/// Upload request body for `POST /api/v1/permits`.
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadPermitRequest {
    /// Account whose clearance record receives the permit.
    pub target_uid: String,
    /// Scanned permit image, base64 encoded.
    pub base64_image: String,
}

/// Upload response body.
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadPermitResponse {
    /// Always `true` on success.
    pub ok: bool,
    /// Retrievable URL of the stored permit.
    pub permit_url: String,
}

/// Attach a scanned permit to a user's clearance record. Admin only.
#[utoipa::path(
    post,
    path = "/api/v1/permits",
    request_body = UploadPermitRequest,
    responses(
        (status = 200, description = "Permit stored", body = UploadPermitResponse),
        (status = 400, description = "Invalid request", body = Error),
        (status = 401, description = "Unauthorised", body = Error),
        (status = 403, description = "Admin role required", body = Error),
        (status = 500, description = "Internal server error", body = Error)
    ),
    tags = ["permits"],
    operation_id = "uploadPermit"
)]
#[post("/permits")]
pub async fn upload_permit(
    caller: CallerIdentity,
    state: web::Data<AppState>,
    payload: web::Json<UploadPermitRequest>,
) -> ApiResult<web::Json<UploadPermitResponse>> {
    let payload = payload.into_inner();
    let target = AccountId::new(payload.target_uid.as_str()).map_err(|_| {
        Error::invalid_request("target account id must not be empty")
            .with_details(json!({ "field": "targetUid" }))
    })?;
    let permit_url = state
        .clearance
        .upload_permit(caller.account_id(), &target, &payload.base64_image)
        .await?;
    Ok(web::Json(UploadPermitResponse {
        ok: true,
        permit_url,
    }))
}

#[cfg(test)]
mod tests {
    use actix_web::http::StatusCode;
    use actix_web::{App, test as actix_test, web};
    use serde_json::Value;

    use super::*;
    use crate::domain::Role;
    use crate::inbound::http::identity::VERIFIED_UID_HEADER;
    use crate::inbound::http::test_utils::TestContext;

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
        App::new()
            .app_data(web::Data::new(context.state.clone()))
            .service(web::scope("/api/v1").service(upload_permit))
    }

    fn upload_request(actor: &'static str) -> actix_web::test::TestRequest {
        actix_test::TestRequest::post()
            .uri("/api/v1/permits")
            .insert_header((VERIFIED_UID_HEADER, actor))
            .set_json(&UploadPermitRequest {
                target_uid: "student-1".to_owned(),
                base64_image: "aGVsbG8=".to_owned(),
            })
    }

    #[actix_web::test]
    async fn admins_can_attach_permits() {
        let context = TestContext::new();
        context.seed_role("admin-1", Role::Admin).await;
        let app = actix_test::init_service(test_app(&context)).await;

        let res = actix_test::call_service(&app, upload_request("admin-1").to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = actix_test::read_body_json(res).await;
        assert_eq!(body.get("ok"), Some(&serde_json::json!(true)));
        assert!(
            body.get("permitUrl")
                .and_then(Value::as_str)
                .is_some_and(|url| url.starts_with("https://"))
        );
    }

    #[actix_web::test]
    async fn non_admins_are_forbidden() {
        let context = TestContext::new();
        context.seed_role("cashier-1", Role::Cashier).await;
        let app = actix_test::init_service(test_app(&context)).await;

        let res = actix_test::call_service(&app, upload_request("cashier-1").to_request()).await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn malformed_images_are_rejected() {
        let context = TestContext::new();
        context.seed_role("admin-1", Role::Admin).await;
        let app = actix_test::init_service(test_app(&context)).await;

        let res = actix_test::call_service(
            &app,
            actix_test::TestRequest::post()
                .uri("/api/v1/permits")
                .insert_header((VERIFIED_UID_HEADER, "admin-1"))
                .set_json(&UploadPermitRequest {
                    target_uid: "student-1".to_owned(),
                    base64_image: "not base64!!!".to_owned(),
                })
                .to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}
