//! Server assembly: state construction and app wiring.

pub mod config;

use std::sync::Arc;

use actix_web::dev::{ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::{App, web};
use mockable::{Clock, DefaultClock};
use tokio::sync::mpsc;
use tracing::warn;

use crate::domain::ports::identity::FixtureIdentityProvider;
use crate::domain::ports::store::DocumentStore;
use crate::domain::ports::uploader::{DocumentUploader, FixtureDocumentUploader};
use crate::domain::{
    BookingService, ClearanceService, HandleRegistry, LedgerMirror, OnboardingService,
    run_account_onboarding, run_appointment_mirror,
};
use crate::inbound::http::appointments::{
    create_appointment, delete_appointment, reschedule_appointment, update_appointment_status,
};
use crate::inbound::http::health::{HealthState, live, ready};
use crate::inbound::http::hooks::{account_created_hook, appointment_changed_hook};
use crate::inbound::http::permits::upload_permit;
use crate::inbound::http::state::AppState;
use crate::inbound::http::usernames::{get_email_for_username, release_username, reserve_username};
use crate::middleware::Trace;
use crate::outbound::memory::MemoryDocumentStore;
use crate::outbound::uploader::HttpDocumentUploader;
use crate::server::config::Cli;

const NOTIFICATION_BUFFER: usize = 64;

/// Build the shared application state and spawn the notification consumers.
///
/// Must run inside the actix system so the consumer tasks have a runtime.
///
/// # Errors
///
/// Fails when the configured uploader endpoint cannot be turned into a
/// client.
pub fn build_state(cli: &Cli) -> std::io::Result<AppState> {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
    let clock: Arc<dyn Clock> = Arc::new(DefaultClock);
    let limits = cli.booking_limits();

    let uploader: Arc<dyn DocumentUploader> = match &cli.uploader_endpoint {
        Some(endpoint) => Arc::new(
            HttpDocumentUploader::new(endpoint.clone())
                .map_err(|err| std::io::Error::other(format!("uploader client: {err}")))?,
        ),
        None => {
            warn!("no uploader endpoint configured; permit uploads use the fixture uploader");
            Arc::new(FixtureDocumentUploader)
        }
    };

    let booking = Arc::new(BookingService::new(
        Arc::clone(&store),
        clock.clone(),
        limits,
    ));
    let registry = Arc::new(HandleRegistry::new(Arc::clone(&store), clock.clone()));
    let clearance = Arc::new(ClearanceService::new(
        Arc::clone(&store),
        uploader,
        clock.clone(),
    ));

    let (appointment_events, appointment_rx) = mpsc::channel(NOTIFICATION_BUFFER);
    let (account_events, account_rx) = mpsc::channel(NOTIFICATION_BUFFER);

    let mirror = Arc::new(LedgerMirror::new(
        Arc::clone(&store),
        Arc::clone(&booking),
        clock.clone(),
        limits.slot_capacity,
    ));
    tokio::spawn(run_appointment_mirror(appointment_rx, mirror));

    // The claim push is deployment specific; single-process deployments run
    // with the fixture provider.
    let onboarding = Arc::new(OnboardingService::new(
        Arc::clone(&store),
        Arc::new(FixtureIdentityProvider),
        cli.role_rules(),
        clock,
    ));
    tokio::spawn(run_account_onboarding(account_rx, onboarding));

    Ok(AppState {
        booking,
        registry,
        clearance,
        appointment_events,
        account_events,
    })
}

/// Assemble the actix application around the shared state.
pub fn build_app(
    state: AppState,
    health_state: web::Data<HealthState>,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    let api = web::scope("/api/v1")
        .service(create_appointment)
        .service(delete_appointment)
        .service(reschedule_appointment)
        .service(update_appointment_status)
        .service(reserve_username)
        .service(release_username)
        .service(get_email_for_username)
        .service(upload_permit)
        .service(account_created_hook)
        .service(appointment_changed_hook);

    let mut app = App::new()
        .app_data(web::Data::new(state))
        .app_data(health_state)
        .wrap(Trace)
        .service(api)
        .service(ready)
        .service(live);

    #[cfg(debug_assertions)]
    {
        use utoipa::OpenApi as _;
        app = app.service(
            utoipa_swagger_ui::SwaggerUi::new("/docs/{_:.*}")
                .url("/api-docs/openapi.json", crate::doc::ApiDoc::openapi()),
        );
    }

    app
}
