use std::io;
use std::time::Duration;

use actix_cors::Cors;
use actix_web::http::Method;
use actix_web::{web, App, HttpServer};
use tokio_util::sync::CancellationToken;

use crate::config::GatewayConfig;
use crate::handlers;
use crate::state::AppState;

/// Route table, shared by the server and the HTTP tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/gateway", web::post().to(handlers::gateway::handler))
            .route("/gateway", web::get().to(handlers::monitor::handler))
            .route(
                "/gateway",
                web::method(Method::OPTIONS).to(handlers::preflight::handler),
            )
            .route(
                "/gateway/sessions/{session_id}/context",
                web::delete().to(handlers::context::handler),
            ),
    );
}

pub async fn run_server(config: GatewayConfig, port: u16) -> io::Result<()> {
    let interval = Duration::from_millis(config.health_check_interval_ms);
    let state = web::Data::new(AppState::new(config));

    let cancel = CancellationToken::new();
    let monitor_handle = if interval.is_zero() {
        log::info!("Periodic health probing disabled");
        None
    } else {
        log::info!("Probing upstream health every {}ms", interval.as_millis());
        Some(state.health.clone().spawn_periodic(interval, cancel.clone()))
    };

    log::info!("Gateway listening on 0.0.0.0:{}", port);
    let result = HttpServer::new({
        let state = state.clone();
        move || {
            App::new()
                .app_data(state.clone())
                .wrap(Cors::permissive())
                .configure(configure)
        }
    })
    .bind(format!("0.0.0.0:{}", port))?
    .run()
    .await;

    cancel.cancel();
    if let Some(handle) = monitor_handle {
        if let Err(e) = handle.await {
            log::warn!("Health monitor task ended abnormally: {}", e);
        }
    }
    result
}
