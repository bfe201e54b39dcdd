use actix_web::HttpRequest;
use broker_types::{ClientContext, ConnectionType, SecurityLevel};

/// Builds a [`ClientContext`] from an inbound HTTP request, spec.md §4.6
/// "Classification rules": loopback IP is treated as local/trusted even over
/// HTTP, any other remote address is remote, and TLS termination (inferred
/// from the connection info's scheme) decides sandboxed vs restricted.
/// Mirrors `server/distri-auth/src/context.rs`'s `UserContext` concept (a
/// small per-request value carrying trust metadata for the auth stack to
/// consult), built fresh for every request rather than cached.
pub fn classify_http(req: &HttpRequest) -> ClientContext {
    let conn_info = req.connection_info();
    let remote_ip = conn_info.realip_remote_addr().map(str::to_string);
    let is_loopback = remote_ip.as_deref().map(is_loopback_addr).unwrap_or(true);
    let is_https = conn_info.scheme() == "https";

    let (connection_type, security_level) = if is_loopback {
        (ConnectionType::Local, SecurityLevel::Trusted)
    } else if is_https {
        (ConnectionType::Remote, SecurityLevel::Sandboxed)
    } else {
        (ConnectionType::Remote, SecurityLevel::Restricted)
    };

    ClientContext {
        connection_type,
        security_level,
        remote_ip,
        origin: req.headers().get("origin").and_then(|v| v.to_str().ok()).map(str::to_string),
        user_agent: req.headers().get("user-agent").and_then(|v| v.to_str().ok()).map(str::to_string),
        client_info: None,
        capabilities: Vec::new(),
        session_token: req
            .headers()
            .get("mcp-session-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    }
}

/// Builds the [`ClientContext`] for a WebSocket upgrade, spec.md §4.6
/// "WebSocket → web/sandboxed" (loopback WebSocket clients still count as
/// local, matching the HTTP rule above, since a browser devtools client on
/// `localhost` is no less trusted than a `curl` on the same host).
pub fn classify_websocket(req: &HttpRequest) -> ClientContext {
    let mut ctx = classify_http(req);
    if ctx.connection_type == ConnectionType::Remote {
        ctx.connection_type = ConnectionType::Web;
        ctx.security_level = SecurityLevel::Sandboxed;
    }
    ctx
}

fn is_loopback_addr(addr: &str) -> bool {
    let host = addr.split(':').next().unwrap_or(addr);
    host == "127.0.0.1" || host == "::1" || host == "localhost"
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn loopback_request_is_local_and_trusted() {
        let req = TestRequest::default().peer_addr("127.0.0.1:9000".parse().unwrap()).to_http_request();
        let ctx = classify_http(&req);
        assert_eq!(ctx.connection_type, ConnectionType::Local);
        assert_eq!(ctx.security_level, SecurityLevel::Trusted);
    }

    #[test]
    fn plain_http_remote_request_is_restricted() {
        let req = TestRequest::default().peer_addr("203.0.113.5:9000".parse().unwrap()).to_http_request();
        let ctx = classify_http(&req);
        assert_eq!(ctx.connection_type, ConnectionType::Remote);
        assert_eq!(ctx.security_level, SecurityLevel::Restricted);
    }

    #[test]
    fn remote_websocket_is_classified_web() {
        let req = TestRequest::default().peer_addr("203.0.113.5:9000".parse().unwrap()).to_http_request();
        let ctx = classify_websocket(&req);
        assert_eq!(ctx.connection_type, ConnectionType::Web);
        assert_eq!(ctx.security_level, SecurityLevel::Sandboxed);
    }

    #[test]
    fn session_header_is_captured() {
        let req = TestRequest::default()
            .peer_addr("203.0.113.5:9000".parse().unwrap())
            .insert_header(("mcp-session-id", "mcp_abc_123"))
            .to_http_request();
        let ctx = classify_http(&req);
        assert_eq!(ctx.session_token.as_deref(), Some("mcp_abc_123"));
    }
}
