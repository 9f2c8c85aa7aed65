//! Backend entry point: wires the booking services, notification
//! consumers, REST endpoints, and OpenAPI docs.

use actix_web::{HttpServer, web};
use clap::Parser as _;
use tracing::warn;
use tracing_subscriber::{EnvFilter, fmt};

use backend::inbound::http::health::HealthState;
use backend::server::config::Cli;
use backend::server::{build_app, build_state};

/// Application bootstrap.
#[actix_web::main]
async fn main() -> std::io::Result<()> {
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .try_init()
    {
        warn!(error = %e, "tracing init failed");
    }

    let cli = Cli::parse();
    let bind_addr = cli.bind;
    let state = build_state(&cli)?;

    let health_state = web::Data::new(HealthState::new());
    // Clone for the server factory so the readiness probe stays accessible.
    let server_health_state = health_state.clone();
    let server = HttpServer::new(move || {
        build_app(state.clone(), server_health_state.clone())
    })
    .bind(bind_addr)?;

    health_state.mark_ready();
    server.run().await
}
