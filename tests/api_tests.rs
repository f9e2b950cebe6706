mod common;

use axum::body::{ to_bytes, Body };
use axum::http::{ Request, StatusCode };
use common::{ controller, ScriptedClient };
use pymentor::server::api::router;
use pymentor::server::auth::sign;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn lists_and_fetches_conversations() {
    let client = Arc::new(ScriptedClient::new().title("Sets").reply(&["Sets hold unique items."]));
    let (_store, controller) = controller(client);
    let controller = Arc::new(controller);
    let mut ctx = controller.start_session().await.unwrap();
    controller.submit_turn(&mut ctx, "What is a set?", |_| {}).await.unwrap();
    let app = router(Arc::clone(&controller), None);

    let response = app.clone().oneshot(get("/api/conversations")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let listed = body_json(response).await;
    assert_eq!(listed[0]["id"], ctx.active_id());
    assert_eq!(listed[0]["title"], "Sets");
    assert_eq!(listed[0]["message_count"], 2);

    let uri = format!("/api/conversations/{}", ctx.active_id());
    let response = app.clone().oneshot(get(&uri)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let view = body_json(response).await;
    assert_eq!(view["messages"].as_array().unwrap().len(), 2);
    assert_eq!(view["messages"][0]["role"], "user");

    let response = app.oneshot(get("/api/models")).await.unwrap();
    let models = body_json(response).await;
    assert_eq!(models["models"][0], "gpt-5.1");
}

#[tokio::test]
async fn delete_then_fetch_is_not_found() {
    let (_store, controller) = controller(Arc::new(ScriptedClient::new()));
    let controller = Arc::new(controller);
    let ctx = controller.start_session().await.unwrap();
    let app = router(Arc::clone(&controller), None);
    let uri = format!("/api/conversations/{}", ctx.active_id());

    let request = Request::builder().method("DELETE").uri(&uri).body(Body::empty()).unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app.clone().oneshot(get(&uri)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let request = Request::builder().method("DELETE").uri(&uri).body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn signed_requests_are_required_when_a_key_is_set() {
    let (_store, controller) = controller(Arc::new(ScriptedClient::new()));
    let app = router(Arc::new(controller), Some("shared-secret".into()));

    let response = app.clone().oneshot(get("/api/models")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let ts = chrono::Utc::now().timestamp().to_string();
    let sig = sign("shared-secret", &ts).unwrap();
    let response = app.oneshot(get(&format!("/api/models?ts={}&sig={}", ts, sig))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
