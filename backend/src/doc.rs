//! OpenAPI documentation configuration.
//!
//! Defines the [`ApiDoc`] struct generating the OpenAPI specification for
//! the REST API: all HTTP endpoints from the inbound layer, the shared
//! error schema, and the verified-identity security scheme forwarded by
//! the identity gateway. The generated document backs Swagger UI in debug
//! builds.

use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::domain::{AppointmentId, Error, ErrorCode};
use crate::inbound::http::appointments::{
    AppointmentIdResponse, CreateAppointmentRequest, RescheduleAppointmentRequest,
    UpdateStatusRequest,
};
use crate::inbound::http::hooks::{AccountCreatedRequest, AppointmentEventRequest};
use crate::inbound::http::permits::{UploadPermitRequest, UploadPermitResponse};
use crate::inbound::http::usernames::{
    ReserveUsernameRequest, UsernameAck, UsernameEmailResponse,
};

/// Enrich the generated document with the verified-identity scheme.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi
            .components
            .get_or_insert_with(utoipa::openapi::Components::default);

        components.add_security_scheme(
            "VerifiedIdentity",
            SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                "x-verified-uid",
                "Caller identity asserted by the identity gateway.",
            ))),
        );
    }
}

/// OpenAPI document for the REST API.
#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    info(
        title = "Appointment booking backend API",
        description = "Capacity-bounded slot booking, unique usernames, and clearance permits."
    ),
    servers(
        (url = "/", description = "Relative to the deployment base URL")
    ),
    security(("VerifiedIdentity" = [])),
    paths(
        crate::inbound::http::appointments::create_appointment,
        crate::inbound::http::appointments::delete_appointment,
        crate::inbound::http::appointments::reschedule_appointment,
        crate::inbound::http::appointments::update_appointment_status,
        crate::inbound::http::usernames::reserve_username,
        crate::inbound::http::usernames::release_username,
        crate::inbound::http::usernames::get_email_for_username,
        crate::inbound::http::permits::upload_permit,
        crate::inbound::http::hooks::account_created_hook,
        crate::inbound::http::hooks::appointment_changed_hook,
        crate::inbound::http::health::ready,
        crate::inbound::http::health::live,
    ),
    components(schemas(
        Error,
        ErrorCode,
        AppointmentId,
        CreateAppointmentRequest,
        RescheduleAppointmentRequest,
        UpdateStatusRequest,
        AppointmentIdResponse,
        ReserveUsernameRequest,
        UsernameAck,
        UsernameEmailResponse,
        UploadPermitRequest,
        UploadPermitResponse,
        AccountCreatedRequest,
        AppointmentEventRequest,
    )),
    tags(
        (name = "appointments", description = "Slot booking and lifecycle"),
        (name = "usernames", description = "Unique handle registry"),
        (name = "permits", description = "Clearance permit uploads"),
        (name = "hooks", description = "Change-notification intake"),
        (name = "health", description = "Probes")
    )
)]
pub struct ApiDoc;
