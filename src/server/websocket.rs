use crate::models::websocket::{ ClientMessage, ServerMessage };
use crate::server::auth::verify_query;
use crate::session::{ SessionContext, SessionController };

use std::error::Error;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::io::{ AsyncRead, AsyncWrite };
use tokio::sync::mpsc::{ self, UnboundedSender };

use tokio_tungstenite::{ accept_hdr_async_with_config, WebSocketStream };
use tokio_tungstenite::tungstenite::error::{ CapacityError, Error as WsError };
use tokio_tungstenite::tungstenite::handshake::server::{ Request, Response, ErrorResponse };
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::{ Message, WebSocketConfig };

use lazy_static::lazy_static;
use governor::{ RateLimiter, Quota, state::{ InMemoryState, NotKeyed }, clock::DefaultClock };

use chrono::Utc;
use log::{ info, warn, error, debug };
use futures::{ SinkExt, StreamExt };

pub const MAX_MESSAGE_SIZE: usize = 1 * 1024 * 1024;

lazy_static! {
    static ref CONNECTION_LIMITER: RateLimiter<NotKeyed, InMemoryState, DefaultClock> =
        RateLimiter::direct(Quota::per_second(NonZeroU32::new(10).unwrap_or(NonZeroU32::MIN)));
}

pub async fn start_ws_server(
    addr: &str,
    controller: Arc<SessionController>,
    api_key: Option<String>
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;
    info!("WS server listening on: {}", addr);

    loop {
        let (stream, peer) = listener.accept().await?;

        if CONNECTION_LIMITER.check().is_err() {
            warn!("Global connection rate limit exceeded for {}. Dropping connection.", peer);
            continue;
        }

        info!("Incoming connection from: {}", peer);
        let controller_clone = Arc::clone(&controller);
        let required_api_key = api_key.clone();

        tokio::spawn(async move {
            if let Err(e) = process_connection(peer, stream, controller_clone, required_api_key).await {
                error!("Failed to process connection for {}: {}", peer, e);
            }
        });
    }
}

/// Frames and messages over the limit are refused while reading, before they are buffered.
pub fn websocket_config() -> WebSocketConfig {
    WebSocketConfig {
        max_message_size: Some(MAX_MESSAGE_SIZE),
        max_frame_size: Some(MAX_MESSAGE_SIZE),
        ..WebSocketConfig::default()
    }
}

fn unauthorized(reason: String) -> ErrorResponse {
    let mut res = ErrorResponse::new(Some(reason));
    *res.status_mut() = StatusCode::UNAUTHORIZED;
    res
}

/// Runs the handshake (checking the signature when a key is set) and serves the session.
pub async fn process_connection<S>(
    peer: SocketAddr,
    stream: S,
    controller: Arc<SessionController>,
    required_api_key: Option<String>
) -> Result<(), Box<dyn Error + Send + Sync>>
    where S: AsyncRead + AsyncWrite + Unpin + Send + 'static
{
    let auth_callback = |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
        let secret = match &required_api_key {
            Some(k) if !k.is_empty() => k,
            _ => {
                return Ok(response);
            }
        };
        let qs = req.uri().query().unwrap_or("");
        match verify_query(secret, qs, Utc::now().timestamp()) {
            Ok(()) => Ok(response),
            Err(e) => {
                warn!("Rejected handshake from {}: {}", peer, e);
                Err(unauthorized(e.to_string()))
            }
        }
    };

    match accept_hdr_async_with_config(stream, auth_callback, Some(websocket_config())).await {
        Ok(ws) => {
            handle_connection(peer, ws, controller).await;
            Ok(())
        }
        Err(e) => {
            error!("Handshake failed for {}: {}", peer, e);
            Err(Box::new(e) as _)
        }
    }
}

fn session_message(ctx: &SessionContext) -> ServerMessage {
    ServerMessage::Session {
        conversation_id: ctx.active_id().to_string(),
        title: ctx.conversation.display_title().to_string(),
        messages: ctx.conversation.visible_messages(),
        message_count: ctx.conversation.message_count(),
        model: ctx.options.model.clone(),
        temperature: ctx.options.temperature.unwrap_or_default(),
    }
}

async fn chats_message(controller: &SessionController) -> ServerMessage {
    match controller.list_conversations().await {
        Ok(items) => ServerMessage::Chats { items },
        Err(e) => ServerMessage::Error { message: format!("Failed to list conversations: {}", e) },
    }
}

/// Serves one session. The connection owns its `SessionContext`; outgoing
/// messages go through a channel so fragments reach the client while a turn runs.
pub async fn handle_connection<S>(
    peer: SocketAddr,
    websocket: WebSocketStream<S>,
    controller: Arc<SessionController>
)
    where S: AsyncRead + AsyncWrite + Unpin + Send + 'static
{
    info!("New WebSocket connection: {}", peer);

    let (mut sink, mut rx) = websocket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerMessage>();

    let writer = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize message for {}: {}", peer, e);
                    continue;
                }
            };
            if let Err(e) = sink.send(Message::Text(json)).await {
                error!("Error sending to {}: {}", peer, e);
                break;
            }
        }
    });

    match controller.start_session().await {
        Ok(mut ctx) => {
            info!("Assigned conversation ID {} to {}", ctx.active_id(), peer);
            let _ = out_tx.send(session_message(&ctx));
            let _ = out_tx.send(chats_message(&controller).await);

            while let Some(msg) = rx.next().await {
                let message = match msg {
                    Ok(message) => message,
                    Err(WsError::Capacity(CapacityError::MessageTooLong { size, max_size })) => {
                        warn!("Message from {} exceeds size limit ({} > {})", peer, size, max_size);
                        let _ = out_tx.send(ServerMessage::Error {
                            message: "Message too large".to_string(),
                        });
                        break;
                    }
                    Err(e) => {
                        error!("WebSocket error from {}: {}", peer, e);
                        break;
                    }
                };

                match message {
                    Message::Text(text) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => {
                                handle_client_message(&controller, &mut ctx, client_msg, &out_tx).await;
                            }
                            Err(e) => {
                                let _ = out_tx.send(ServerMessage::Error {
                                    message: format!("Invalid message format: {}", e),
                                });
                            }
                        }
                    }
                    Message::Close(_) => {
                        info!("Client {} closed the connection", peer);
                        break;
                    }
                    other => debug!("Ignoring non-text frame from {}: {:?}", peer, other),
                }
            }
        }
        Err(e) => {
            error!("Failed to start session for {}: {}", peer, e);
            let _ = out_tx.send(ServerMessage::Error {
                message: format!("Failed to start session: {}", e),
            });
        }
    }

    drop(out_tx);
    if let Err(e) = writer.await {
        error!("Writer task for {} ended abnormally: {}", peer, e);
    }
    info!("Connection closed: {}", peer);
}

pub async fn handle_client_message(
    controller: &SessionController,
    ctx: &mut SessionContext,
    message: ClientMessage,
    out: &UnboundedSender<ServerMessage>
) {
    let result = match message {
        ClientMessage::Chat { content } => {
            let _ = out.send(ServerMessage::Processing);
            let outcome = controller.submit_turn(ctx, &content, |fragment| {
                let _ = out.send(ServerMessage::Partial { content: fragment.to_string() });
            }).await;
            match outcome {
                Ok(outcome) => {
                    let retitled = outcome.title.is_some();
                    if let Some(title) = outcome.title {
                        let _ = out.send(ServerMessage::Title { title });
                    }
                    let _ = out.send(ServerMessage::Response {
                        content: outcome.reply,
                        timestamp: Utc::now().timestamp(),
                    });
                    if retitled {
                        let _ = out.send(chats_message(controller).await);
                    }
                    Ok(())
                }
                Err(e) => Err(e),
            }
        }
        ClientMessage::NewChat => {
            match controller.new_conversation(ctx).await {
                Ok(()) => {
                    let _ = out.send(session_message(ctx));
                    let _ = out.send(chats_message(controller).await);
                    Ok(())
                }
                Err(e) => Err(e),
            }
        }
        ClientMessage::ListChats => {
            let _ = out.send(chats_message(controller).await);
            Ok(())
        }
        ClientMessage::SwitchChat { id } => {
            match controller.switch_conversation(ctx, &id).await {
                Ok(()) => {
                    let _ = out.send(session_message(ctx));
                    Ok(())
                }
                Err(e) => Err(e),
            }
        }
        ClientMessage::DeleteChat => {
            match controller.delete_active(ctx).await {
                Ok(()) => {
                    let _ = out.send(session_message(ctx));
                    let _ = out.send(chats_message(controller).await);
                    Ok(())
                }
                Err(e) => Err(e),
            }
        }
        ClientMessage::Settings { model, temperature } => {
            match controller.update_options(ctx, model.as_deref(), temperature) {
                Ok(()) => {
                    let _ = out.send(session_message(ctx));
                    Ok(())
                }
                Err(e) => Err(e),
            }
        }
        ClientMessage::History => {
            let _ = out.send(session_message(ctx));
            Ok(())
        }
    };

    if let Err(e) = result {
        warn!("Request failed for conversation {}: {}", ctx.active_id(), e);
        let _ = out.send(ServerMessage::Error { message: e.to_string() });
    }
}
