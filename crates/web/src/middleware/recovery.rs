//! In-chain panic recovery.

use std::backtrace::Backtrace;
use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures::FutureExt;
use tracing::error;

use crate::context::Context;
use crate::executor::panic_message;
use crate::handler::Handler;

/// Catches panics escaping the remaining chain, logs the payload with a
/// recovery-point backtrace, and answers 500 when nothing was committed.
///
/// The execution supervisor already recovers panics at the worker
/// boundary; this middleware exists as defense in depth for chains that
/// want recovery *before* outer middleware (so a logger above it still
/// observes the 500). A panic handled here never reaches the supervisor,
/// so the two recoveries cannot double-fire.
pub struct Recovery;

#[async_trait]
impl Handler for Recovery {
    async fn call(&self, ctx: &mut Context) {
        let outcome = AssertUnwindSafe(ctx.next()).catch_unwind().await;
        if let Err(payload) = outcome {
            let detail =
                format!("{}\n{}", panic_message(payload.as_ref()), Backtrace::force_capture());
            error!("handler panicked: {detail}");
            ctx.response().set_panic_response(&detail, ctx.config().debug);
        }
    }
}
