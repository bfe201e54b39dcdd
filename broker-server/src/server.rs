use std::sync::Arc;

use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};
use anyhow::Result;
use broker_core::Dispatcher;

use crate::routes;

/// HTTP/WebSocket/SSE front door for the broker, spec.md §6. Mirrors
/// `server/distri-server/src/server.rs`'s `A2AServer`: an `HttpServer`
/// builder closure re-run per worker, with shared state injected via
/// `app_data` rather than captured per-request.
pub struct BrokerHttpServer {
    dispatcher: Arc<Dispatcher>,
}

impl BrokerHttpServer {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    pub async fn start(&self, host: &str, port: u16) -> Result<()> {
        let dispatcher = self.dispatcher.clone();

        HttpServer::new(move || {
            App::new()
                .wrap(Logger::default())
                .wrap(Cors::permissive())
                .app_data(web::Data::new(dispatcher.clone()))
                .configure(routes::configure)
        })
        .bind((host, port))?
        .run()
        .await?;
        Ok(())
    }
}
