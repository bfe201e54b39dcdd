use async_trait::async_trait;
use broker_types::BrokerEvent;
use serde_json::Value;

/// Publication sink for the optional event bus, spec.md §1/§9 "Event bus is
/// optional". Publishing is always best-effort: a sink failure is logged and
/// swallowed, never propagated to the caller (spec.md §4.2.5).
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, subject: &str, payload: Value);
}

/// Default sink: the core must operate correctly with no bus present.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

#[async_trait]
impl EventSink for NoopSink {
    async fn publish(&self, subject: &str, _payload: Value) {
        tracing::trace!(subject, "event bus absent, dropping publication");
    }
}

pub async fn publish_event(sink: &dyn EventSink, subject: impl Into<String>, payload: Value) {
    let subject = subject.into();
    let event = BrokerEvent::new(subject.clone(), payload);
    match serde_json::to_value(&event) {
        Ok(envelope) => sink.publish(&subject, envelope).await,
        Err(err) => tracing::warn!(%subject, error = %err, "failed to envelope event"),
    }
}

#[cfg(feature = "nats")]
pub mod nats {
    use super::EventSink;
    use async_trait::async_trait;
    use serde_json::Value;

    /// Durable-stream backed sink, spec.md §1 "a persistent event bus
    /// (subject-based publish/subscribe with durable streams)". Grounded on
    /// the `async-nats` dependency used for pub/sub envelopes in the
    /// broader example pack (not in the teacher itself — the teacher has no
    /// bus of its own, so this adapts the pack's `async-nats` usage rather
    /// than copying teacher code; see DESIGN.md).
    pub struct NatsSink {
        client: async_nats::Client,
    }

    impl NatsSink {
        pub async fn connect(url: &str) -> anyhow::Result<Self> {
            let client = async_nats::connect(url).await?;
            Ok(Self { client })
        }
    }

    #[async_trait]
    impl EventSink for NatsSink {
        async fn publish(&self, subject: &str, payload: Value) {
            let bytes = match serde_json::to_vec(&payload) {
                Ok(b) => b,
                Err(err) => {
                    tracing::warn!(%subject, error = %err, "failed to serialize event payload");
                    return;
                }
            };
            if let Err(err) = self.client.publish(subject.to_string(), bytes.into()).await {
                tracing::warn!(%subject, error = %err, "event bus publish failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_sink_never_panics() {
        NoopSink.publish("agent.registered.default", serde_json::json!({})).await;
    }
}
