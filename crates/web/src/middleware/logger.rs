//! Per-request access logging.

use std::time::Instant;

use async_trait::async_trait;
use tracing::info;

use crate::context::Context;
use crate::handler::Handler;

/// Records method, path, final status, and elapsed wall-clock time for
/// every request passing through it. The status is read from the
/// response accumulator after the rest of the chain has run, since it is
/// only known once handlers finish.
pub struct Logger;

#[async_trait]
impl Handler for Logger {
    async fn call(&self, ctx: &mut Context) {
        let start = Instant::now();
        let method = ctx.method().clone();
        let path = ctx.path().to_owned();

        ctx.next().await;

        let status = ctx.status();
        info!(
            %method,
            %path,
            status = status.as_u16(),
            elapsed = ?start.elapsed(),
            "request served"
        );
    }
}
