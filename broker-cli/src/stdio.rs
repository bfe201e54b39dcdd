use std::sync::Arc;

use anyhow::Result;
use broker_core::Dispatcher;
use broker_types::ClientContext;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// Serves JSON-RPC requests over the broker's own stdin/stdout, one
/// line-delimited request/response per line. spec.md §4.6 classifies
/// stdio transport unconditionally local/trusted, so every request here
/// uses [`ClientContext::local`].
pub async fn serve(dispatcher: Arc<Dispatcher>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let ctx = ClientContext::local();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let request: serde_json::Value = match serde_json::from_str(&line) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(%err, "dropping unparsable stdio request");
                continue;
            }
        };

        if let Some(response) = dispatcher.handle(&request, &ctx).await {
            let mut encoded = serde_json::to_string(&response)?;
            encoded.push('\n');
            stdout.write_all(encoded.as_bytes()).await?;
            stdout.flush().await?;
        }
    }
    Ok(())
}
