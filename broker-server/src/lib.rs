pub mod context;
pub mod routes;
pub mod server;

pub use server::BrokerHttpServer;
