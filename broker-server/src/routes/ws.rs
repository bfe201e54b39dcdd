use std::sync::Arc;

use actix_web::{web, Error, HttpRequest, HttpResponse};
use broker_core::Dispatcher;
use futures_util::StreamExt;
use serde_json::Value;

use crate::context::classify_websocket;

/// `GET /mcp/ws`, spec.md §6: a WebSocket transport for the same JSON-RPC
/// envelopes `/mcp/request` accepts, classified web/sandboxed per §4.6.
/// Grounded on `actix-ws`'s standard handshake API (the crate is declared
/// in the teacher's `distri-server/Cargo.toml` but unused there; this is
/// its first real call site in this workspace).
pub async fn upgrade(req: HttpRequest, body: web::Payload, dispatcher: web::Data<Arc<Dispatcher>>) -> Result<HttpResponse, Error> {
    let (response, mut session, mut msg_stream) = actix_ws::handle(&req, body)?;
    let ctx = classify_websocket(&req);
    let dispatcher = dispatcher.get_ref().clone();

    actix_web::rt::spawn(async move {
        while let Some(Ok(msg)) = msg_stream.next().await {
            match msg {
                actix_ws::Message::Text(text) => {
                    let Ok(request) = serde_json::from_str::<Value>(&text) else {
                        let error = serde_json::json!({
                            "jsonrpc": "2.0", "id": null,
                            "error": {"code": -32700, "message": "invalid JSON"},
                        });
                        let _ = session.text(error.to_string()).await;
                        continue;
                    };
                    if let Some(response) = dispatcher.handle(&request, &ctx).await {
                        if session.text(response.to_string()).await.is_err() {
                            break;
                        }
                    }
                }
                actix_ws::Message::Ping(bytes) => {
                    if session.pong(&bytes).await.is_err() {
                        break;
                    }
                }
                actix_ws::Message::Close(reason) => {
                    let _ = session.close(reason).await;
                    break;
                }
                _ => {}
            }
        }
    });

    Ok(response)
}
