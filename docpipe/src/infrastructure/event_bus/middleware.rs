// /////////////////////////////////////////////////////////////////////////////
// docpipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Stock middleware steps registered ahead of the handler chain.

use docpipe_domain::services::event_bus::{BusEvent, Middleware};
use docpipe_domain::CoreError;

/// Emits a structured `tracing` event for every message passing through the
/// bus, tagged with its correlation id when present.
pub struct TracingMiddleware;

#[async_trait::async_trait]
impl Middleware for TracingMiddleware {
    async fn apply(&self, event: BusEvent) -> Result<Option<BusEvent>, CoreError> {
        match event.correlation_id {
            Some(correlation_id) => {
                tracing::debug!(topic = %event.topic, %correlation_id, "event published");
            }
            None => {
                tracing::debug!(topic = %event.topic, "event published");
            }
        }
        Ok(Some(event))
    }

    fn name(&self) -> &'static str {
        "tracing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn tracing_middleware_passes_the_event_through_unchanged() {
        let middleware = TracingMiddleware;
        let event = BusEvent::new("file.received", json!({"ok": true}));
        let topic = event.topic.clone();
        let passed = middleware.apply(event).await.unwrap().unwrap();
        assert_eq!(passed.topic, topic);
    }
}
