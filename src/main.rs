use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tracing_subscriber::EnvFilter;

use kite_dispatch::config::Config;
use kite_dispatch::handlers::{
    driver_handler, health_handler, payment_handler, ride_handler, track_handler, trip_handler,
    user_handler,
};
use kite_dispatch::middleware::idempotency::idempotency_layer;
use kite_dispatch::middleware::rate_limit::rate_limit_layer;
use kite_dispatch::state::AppState;
use kite_dispatch::db;

const OFFER_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kite_dispatch=info,tower_http=warn".into()),
        )
        .init();

    let config = Config::from_env();
    let port = config.port;

    let pool = match db::connect_postgres(&config).await {
        Ok(pool) => pool,
        Err(err) => {
            tracing::error!(error = %err, "failed to connect to postgres");
            std::process::exit(1);
        }
    };
    let redis = match db::connect_redis(&config).await {
        Ok(conn) => conn,
        Err(err) => {
            tracing::error!(error = %err, "failed to connect to redis");
            std::process::exit(1);
        }
    };

    let state = Arc::new(AppState::new(config, pool, redis));

    spawn_offer_sweeper(Arc::clone(&state));

    let app = router(Arc::clone(&state));

    let addr = format!("0.0.0.0:{port}");
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(error = %err, %addr, "failed to bind");
            std::process::exit(1);
        }
    };

    tracing::info!(%addr, "kite-dispatch listening");

    if let Err(err) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    {
        tracing::error!(error = %err, "server error");
    }

    tracing::info!("server stopped");
}

fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route(
            "/users",
            post(user_handler::create_user),
        )
        .route("/users/:id", get(user_handler::get_user))
        .route("/drivers", post(driver_handler::create_driver))
        .route("/drivers/:id", get(driver_handler::get_driver))
        .route("/drivers/:id/online", post(driver_handler::go_online))
        .route("/drivers/:id/offline", post(driver_handler::go_offline))
        .route("/drivers/:id/location", post(driver_handler::update_location))
        .route("/drivers/:id/offers", get(driver_handler::get_pending_offers))
        .route("/drivers/:id/accept", post(driver_handler::accept_offer))
        .route("/drivers/:id/decline", post(driver_handler::decline_offer))
        .route("/rides", post(ride_handler::create_ride))
        .route("/rides/:id", get(ride_handler::get_ride))
        .route("/rides/:id/cancel", post(ride_handler::cancel_ride))
        .route("/rides/:id/status", post(ride_handler::update_ride_status))
        .route("/rides/:id/track", get(track_handler::track_ride))
        .route("/trips/start", post(trip_handler::start_trip))
        .route("/trips/:id", get(trip_handler::get_trip))
        .route("/trips/:id/pause", post(trip_handler::pause_trip))
        .route("/trips/:id/resume", post(trip_handler::resume_trip))
        .route("/trips/:id/end", post(trip_handler::end_trip))
        .route("/payments", post(payment_handler::process_payment))
        .route("/payments/:id", get(payment_handler::get_payment))
        .route("/payments/:id/refund", post(payment_handler::refund_payment));

    Router::new()
        .route("/health", get(health_handler::health))
        .nest("/v1", api)
        .layer(axum::middleware::from_fn_with_state(
            Arc::clone(&state),
            idempotency_layer,
        ))
        .layer(axum::middleware::from_fn_with_state(
            Arc::clone(&state),
            rate_limit_layer,
        ))
        .layer(CatchPanicLayer::custom(handle_panic))
        .with_state(state)
}

/// Unexpected panics become a stable 500 body instead of a dropped
/// connection.
fn handle_panic(err: Box<dyn std::any::Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| err.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic".to_string());
    tracing::error!(panic = %detail, "request handler panicked");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        axum::Json(serde_json::json!({
            "error": "internal_error",
            "message": "internal server error",
        })),
    )
        .into_response()
}

/// Periodic cleanliness sweep over stale pending offers.
fn spawn_offer_sweeper(state: Arc<AppState>) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(OFFER_SWEEP_INTERVAL);
        loop {
            tick.tick().await;
            match state.offer_repo.expire_stale().await {
                Ok(0) => {}
                Ok(count) => tracing::debug!(count, "expired stale offers"),
                Err(err) => tracing::warn!(error = %err, "offer sweep failed"),
            }
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
