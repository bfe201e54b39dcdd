use std::sync::Arc;

use actix_web::{web, HttpRequest, HttpResponse};
use broker_core::Dispatcher;
use serde_json::{json, Value};

use crate::context::classify_http;

pub mod stream;
pub mod ws;

pub const SERVER_HEADER_VALUE: &str = "mcp-broker";

fn with_protocol_headers(mut response: HttpResponse) -> HttpResponse {
    let headers = response.headers_mut();
    headers.insert(
        actix_web::http::header::HeaderName::from_static("mcp-protocol-version"),
        actix_web::http::header::HeaderValue::from_static(broker_core::dispatcher::PROTOCOL_VERSION),
    );
    headers.insert(
        actix_web::http::header::HeaderName::from_static("server"),
        actix_web::http::header::HeaderValue::from_static(SERVER_HEADER_VALUE),
    );
    response
}

/// Registers the `/mcp/*`, `/agents` and `/health` surface named in spec.md
/// §6, mirroring `server/distri-server/src/routes.rs`'s `web::resource`
/// per-path style rather than one catch-all handler.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").route(web::get().to(health)))
        .service(web::resource("/mcp/capabilities").route(web::get().to(capabilities)))
        .service(web::resource("/mcp/tools").route(web::get().to(list_tools)))
        .service(web::resource("/mcp/tools/{name}").route(web::post().to(call_tool)))
        .service(web::resource("/mcp/request").route(web::post().to(raw_request)))
        .service(web::resource("/mcp/stream").route(web::get().to(stream::stream)))
        .service(web::resource("/mcp/ws").route(web::get().to(ws::upgrade)))
        .service(web::resource("/agents").route(web::get().to(list_agents)));
}

async fn health() -> HttpResponse {
    with_protocol_headers(HttpResponse::Ok().json(json!({"status": "ok"})))
}

async fn capabilities(dispatcher: web::Data<Arc<Dispatcher>>) -> HttpResponse {
    with_protocol_headers(HttpResponse::Ok().json(dispatcher.capabilities()))
}

async fn list_tools(req: HttpRequest, dispatcher: web::Data<Arc<Dispatcher>>) -> HttpResponse {
    let ctx = classify_http(&req);
    with_protocol_headers(HttpResponse::Ok().json(dispatcher.list_tools(&ctx).await))
}

async fn call_tool(
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Json<Value>,
    dispatcher: web::Data<Arc<Dispatcher>>,
) -> HttpResponse {
    let ctx = classify_http(&req);
    let name = path.into_inner();
    let rpc_request = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "tools/call",
        "params": {"name": name, "arguments": body.into_inner()},
    });
    let response = dispatcher.handle(&rpc_request, &ctx).await.unwrap_or_else(|| json!(null));
    with_protocol_headers(HttpResponse::Ok().json(response))
}

/// `POST /mcp/request`, spec.md §6: the raw JSON-RPC envelope, for clients
/// that speak MCP directly instead of going through the REST sugar above.
async fn raw_request(req: HttpRequest, body: web::Json<Value>, dispatcher: web::Data<Arc<Dispatcher>>) -> HttpResponse {
    let ctx = classify_http(&req);
    match dispatcher.handle(&body.into_inner(), &ctx).await {
        Some(response) => with_protocol_headers(HttpResponse::Ok().json(response)),
        None => with_protocol_headers(HttpResponse::Accepted().finish()),
    }
}

async fn list_agents(dispatcher: web::Data<Arc<Dispatcher>>) -> HttpResponse {
    let agents = dispatcher.tasks().list_agents().await;
    with_protocol_headers(HttpResponse::Ok().json(json!({"agents": agents})))
}
