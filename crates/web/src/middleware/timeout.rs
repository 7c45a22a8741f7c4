//! Handler-level timeout.

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::context::Context;
use crate::handler::Handler;

/// Bounds the remaining chain with a deadline, as an ordinary handler.
///
/// This is the composable form of the race the execution supervisor
/// runs. Semantics differ in one respect: the supervisor abandons the
/// worker task and lets it run to completion detached, while this
/// middleware drops the remaining chain's future at its next await
/// point, cancelling it. Exactly one layer should own timeouts — prefer
/// the supervisor's per-route deadline and reach for this only on
/// chains with no route timeout configured, or the chain gets timed
/// twice.
pub struct Timeout {
    duration: Duration,
}

impl Timeout {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

#[async_trait]
impl Handler for Timeout {
    async fn call(&self, ctx: &mut Context) {
        let outcome = tokio::time::timeout(self.duration, ctx.next()).await;
        if outcome.is_err() {
            warn!(timeout = ?self.duration, "handler chain timed out");
            ctx.response().set_timeout_response();
        }
    }
}
