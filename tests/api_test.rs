mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    routing::{get, post},
    Router,
};
use common::{harness, recipient};
use serde_json::json;
use tower::ServiceExt;

use comms_backend::models::broadcast::{BroadcastStatus, ChannelKind};
use comms_backend::models::notification::EventKind;
use comms_backend::routes;
use comms_backend::services::notify_service::EventDispatch;
use comms_backend::services::template_service::TemplateVars;
use comms_backend::AppState;

fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/admin/communications",
            post(routes::broadcasts::create_broadcast),
        )
        .route(
            "/api/notifications",
            get(routes::inbox::list_notifications),
        )
        .route(
            "/api/notifications/unread-count",
            get(routes::inbox::unread_count),
        )
        .route(
            "/api/notifications/:id/read",
            post(routes::inbox::mark_read),
        )
        .with_state(state)
}

#[tokio::test]
async fn creating_a_broadcast_requires_an_actor() {
    let h = harness();
    let app = router(h.state.clone());

    let body = json!({
        "title": "Annonce",
        "kind": "system_info",
        "channels": [{ "channel": "notification", "body": "Bonjour {{prenom}}" }]
    });

    let without_actor = Request::builder()
        .method("POST")
        .uri("/api/admin/communications")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let resp = app.clone().oneshot(without_actor).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let with_actor = Request::builder()
        .method("POST")
        .uri("/api/admin/communications")
        .header("content-type", "application/json")
        .header("x-admin-id", uuid::Uuid::new_v4().to_string())
        .body(Body::from(body.to_string()))
        .unwrap();
    let resp = app.clone().oneshot(with_actor).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let broadcasts = h.state.broadcasts.list(None, 10).await.unwrap();
    assert_eq!(broadcasts.len(), 1);
    assert_eq!(broadcasts[0].status, BroadcastStatus::Draft);
    assert_eq!(broadcasts[0].title, "Annonce");
}

#[tokio::test]
async fn invalid_broadcast_payload_is_rejected() {
    let h = harness();
    let app = router(h.state.clone());

    // An empty title fails validation before any state change.
    let body = json!({
        "title": "",
        "kind": "promotion",
        "channels": []
    });
    let req = Request::builder()
        .method("POST")
        .uri("/api/admin/communications")
        .header("content-type", "application/json")
        .header("x-admin-id", uuid::Uuid::new_v4().to_string())
        .body(Body::from(body.to_string()))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(h.state.broadcasts.list(None, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn inbox_endpoints_are_scoped_by_the_user_header() {
    let h = harness();
    let user = recipient("Aminata", "Diallo");
    h.memory.add_recipient(user.clone());

    let mut dispatch = EventDispatch::new(user.id, EventKind::MessageReceived);
    dispatch.vars = TemplateVars::new()
        .with("job_title", "Comptable")
        .with("company_name", "Société Test");
    dispatch.channels = Some(vec![ChannelKind::InApp]);
    h.state.notify.send(dispatch).await.unwrap();

    let app = router(h.state.clone());

    let no_header = Request::builder()
        .method("GET")
        .uri("/api/notifications/unread-count")
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(no_header).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let count_req = Request::builder()
        .method("GET")
        .uri("/api/notifications/unread-count")
        .header("x-user-id", user.id.to_string())
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(count_req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let id = h.state.inbox.list(user.id, 10).await.unwrap()[0].id;
    let read_req = Request::builder()
        .method("POST")
        .uri(format!("/api/notifications/{}/read", id))
        .header("x-user-id", user.id.to_string())
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(read_req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(h.state.inbox.unread_count(user.id).await.unwrap(), 0);

    // Another user cannot touch someone else's notification.
    let foreign_req = Request::builder()
        .method("POST")
        .uri(format!("/api/notifications/{}/read", id))
        .header("x-user-id", uuid::Uuid::new_v4().to_string())
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(foreign_req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
