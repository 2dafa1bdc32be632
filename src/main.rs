use axum::{
    routing::{delete, get, post},
    Router,
};
use comms_backend::services::broadcast_service::SYSTEM_ACTOR;
use comms_backend::{
    config::{get_config, init_config},
    database::pool::create_pool,
    routes, AppState,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    init_config()?;
    let config = get_config();

    let pool = create_pool().await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let app_state = AppState::postgres(pool);

    // Scheduled-broadcast sweep: promote due broadcasts and fan them out.
    {
        let state = app_state.clone();
        let interval = Duration::from_secs(config.broadcast_sweep_secs);
        tokio::spawn(async move {
            loop {
                match state.broadcasts.promote_due(chrono::Utc::now(), 10).await {
                    Ok(promoted) => {
                        for broadcast in promoted {
                            if let Err(e) = state.dispatch.run(broadcast.id, SYSTEM_ACTOR).await {
                                tracing::error!(
                                    broadcast_id = %broadcast.id,
                                    error = %e,
                                    "scheduled broadcast dispatch failed"
                                );
                            }
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "broadcast sweep error");
                    }
                }
                tokio::time::sleep(interval).await;
            }
        });
    }

    // Interview-reminder sweep.
    {
        let state = app_state.clone();
        let interval = Duration::from_secs(config.reminder_sweep_secs);
        tokio::spawn(async move {
            loop {
                if let Err(e) = state.reminders.sweep(chrono::Utc::now(), 100).await {
                    tracing::error!(error = %e, "reminder sweep error");
                }
                tokio::time::sleep(interval).await;
            }
        });
    }

    let admin_api = Router::new()
        .route(
            "/api/admin/communications",
            get(routes::broadcasts::list_broadcasts).post(routes::broadcasts::create_broadcast),
        )
        .route(
            "/api/admin/communications/logs",
            get(routes::broadcasts::list_logs),
        )
        .route(
            "/api/admin/communications/:id",
            get(routes::broadcasts::get_broadcast).patch(routes::broadcasts::update_broadcast),
        )
        .route(
            "/api/admin/communications/:id/schedule",
            post(routes::broadcasts::schedule_broadcast),
        )
        .route(
            "/api/admin/communications/:id/send",
            post(routes::broadcasts::send_broadcast),
        )
        .route(
            "/api/admin/communications/:id/cancel",
            post(routes::broadcasts::cancel_broadcast),
        )
        .route(
            "/api/admin/communications/:id/messages",
            get(routes::broadcasts::list_broadcast_messages),
        )
        .route(
            "/api/admin/communications/:id/stats",
            get(routes::broadcasts::broadcast_stats),
        )
        .route(
            "/api/admin/audience/preview",
            post(routes::broadcasts::preview_audience),
        )
        .route(
            "/api/admin/templates",
            get(routes::broadcasts::list_templates).post(routes::broadcasts::create_template),
        )
        .route(
            "/api/admin/templates/:id",
            get(routes::broadcasts::get_template),
        );

    let inbox_api = Router::new()
        .route(
            "/api/notifications",
            get(routes::inbox::list_notifications),
        )
        .route(
            "/api/notifications/unread-count",
            get(routes::inbox::unread_count),
        )
        .route(
            "/api/notifications/read-all",
            post(routes::inbox::mark_all_read),
        )
        .route(
            "/api/notifications/preferences",
            get(routes::inbox::get_preferences).patch(routes::inbox::update_preferences),
        )
        .route(
            "/api/notifications/:id/read",
            post(routes::inbox::mark_read),
        )
        .route(
            "/api/notifications/:id",
            delete(routes::inbox::delete_notification),
        );

    let events_api = Router::new()
        .route(
            "/api/events/interview-scheduled",
            post(routes::events::handle_interview_scheduled),
        )
        .route(
            "/api/events/interview-rescheduled",
            post(routes::events::handle_interview_rescheduled),
        )
        .route(
            "/api/events/interview-canceled",
            post(routes::events::handle_interview_canceled),
        )
        .route(
            "/api/events/application-status",
            post(routes::events::handle_application_status),
        )
        .route(
            "/api/events/message-received",
            post(routes::events::handle_message_received),
        )
        .route(
            "/api/events/job-closed",
            post(routes::events::handle_job_closed),
        )
        .route(
            "/api/events/credit-decision",
            post(routes::events::handle_credit_decision),
        );

    let app = Router::new()
        .route("/health", get(routes::health::health))
        .merge(admin_api)
        .merge(inbox_api)
        .merge(events_api)
        .with_state(app_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = config.server_address.parse()?;
    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
