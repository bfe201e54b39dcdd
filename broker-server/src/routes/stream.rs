use std::time::Duration;

use actix_web::{web, HttpResponse};
use futures_util::stream;
use serde_json::json;

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// `GET /mcp/stream`, spec.md §6: a Server-Sent-Events keepalive channel.
/// The teacher streams SSE through `actix-web-lab`'s `sse` module
/// (`server/distri-server/src/routes.rs`), which this workspace doesn't
/// depend on; this hand-rolls the same `text/event-stream` framing over a
/// plain `actix_web::HttpResponse` streaming body instead of adding that
/// dependency back for one endpoint.
pub async fn stream() -> HttpResponse {
    let ticks = stream::unfold(0u64, |count| async move {
        tokio::time::sleep(KEEPALIVE_INTERVAL).await;
        let payload = json!({"type": "keepalive", "sequence": count});
        let frame = format!("event: keepalive\ndata: {payload}\n\n");
        Some((Ok::<_, actix_web::Error>(web::Bytes::from(frame)), count + 1))
    });

    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .insert_header(("X-Accel-Buffering", "no"))
        .streaming(ticks)
}
