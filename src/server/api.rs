use crate::config::settings::ModelCatalog;
use crate::error::MentorError;
use crate::models::chat::{ ChatMessage, Conversation, ConversationSummary };
use crate::server::auth::verify_query;
use crate::session::SessionController;

use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use axum::{
    routing::get,
    Router,
    Json,
    middleware::{ self, Next },
    extract::{ Path, Request, State },
    response::{ IntoResponse, Response },
    http::StatusCode,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tower_http::cors::{ Any, CorsLayer };
use log::{ info, warn, error };

#[derive(Clone)]
struct AppState {
    controller: Arc<SessionController>,
    api_key: Option<String>,
}

#[derive(Serialize)]
pub struct ConversationView {
    pub id: String,
    pub title: String,
    pub message_count: usize,
    pub messages: Vec<ChatMessage>,
}

impl From<Conversation> for ConversationView {
    fn from(conversation: Conversation) -> Self {
        Self {
            title: conversation.display_title().to_string(),
            message_count: conversation.message_count(),
            messages: conversation.visible_messages(),
            id: conversation.id,
        }
    }
}

pub struct ApiError(MentorError);

impl From<MentorError> for ApiError {
    fn from(err: MentorError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            MentorError::NotFound(_) => StatusCode::NOT_FOUND,
            MentorError::InvalidSettings(_) | MentorError::EmptyMessage => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("API request failed: {}", self.0);
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

async fn require_signature(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if let Some(secret) = state.api_key.as_deref().filter(|k| !k.is_empty()) {
        let query = req.uri().query().unwrap_or("");
        if let Err(e) = verify_query(secret, query, Utc::now().timestamp()) {
            warn!("Rejected API request to {}: {}", req.uri().path(), e);
            return (StatusCode::UNAUTHORIZED, Json(json!({ "error": e.to_string() }))).into_response();
        }
    }
    next.run(req).await
}

async fn list_conversations(
    State(state): State<AppState>
) -> Result<Json<Vec<ConversationSummary>>, ApiError> {
    Ok(Json(state.controller.list_conversations().await?))
}

async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>
) -> Result<Json<ConversationView>, ApiError> {
    let conversation = state.controller.load_conversation(&id).await?;
    Ok(Json(ConversationView::from(conversation)))
}

async fn delete_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>
) -> Result<StatusCode, ApiError> {
    state.controller.delete_conversation(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_models(State(state): State<AppState>) -> Json<ModelCatalog> {
    Json(state.controller.catalog().clone())
}

pub fn router(controller: Arc<SessionController>, api_key: Option<String>) -> Router {
    let app_state = AppState { controller, api_key };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/conversations", get(list_conversations))
        .route("/api/conversations/{id}", get(get_conversation).delete(delete_conversation))
        .route("/api/models", get(list_models))
        .layer(middleware::from_fn_with_state(app_state.clone(), require_signature))
        .layer(cors)
        .with_state(app_state)
}

pub async fn start_http_server(
    http_port: u16,
    controller: Arc<SessionController>,
    api_key: Option<String>
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let addr = format!("0.0.0.0:{}", http_port).parse::<SocketAddr>()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Starting HTTP API server on: http://{}", addr);

    let app = router(controller, api_key);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server error: {}", e);
        }
    });

    Ok(())
}
