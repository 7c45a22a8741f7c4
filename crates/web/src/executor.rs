//! The execution supervisor.
//!
//! Each matched request runs its handler chain on a dedicated worker
//! task while the dispatch path races a timer, so every request resolves
//! to exactly one of `Completed`, `Panicked`, or `TimedOut`:
//!
//! * `Completed` — the chain finished (exhausted, or a handler returned
//!   without continuing); the accumulator is flushed as built.
//! * `Panicked` — the panic is recovered at the join boundary, logged
//!   with a recovery-point backtrace, and turned into a 500 when nothing
//!   was committed yet. Already-committed output cannot be rewritten and
//!   is flushed as-is.
//! * `TimedOut` — a 503 is flushed immediately. The worker is neither
//!   awaited nor aborted: dropping its join handle detaches it, so one
//!   task may outlive its request until its next await point. This leak
//!   is a deliberate trade-off; the closed accumulator rejects whatever
//!   the orphan still writes.

use std::any::Any;
use std::backtrace::Backtrace;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use tracing::{error, warn};

use crate::pool::PooledContext;

pub(crate) async fn execute(
    ctx: PooledContext,
    timeout: Option<Duration>,
    debug: bool,
) -> http::Response<Full<Bytes>> {
    let response = ctx.response_handle();

    let mut worker = tokio::spawn(drive(ctx));
    let joined = match timeout.filter(|limit| !limit.is_zero()) {
        Some(limit) => {
            tokio::select! {
                joined = &mut worker => Some(joined),
                () = tokio::time::sleep(limit) => None,
            }
        }
        None => Some((&mut worker).await),
    };

    match joined {
        Some(Ok(ctx)) => {
            let flushed = response.finalize();
            // release to the pool only after the flush
            drop(ctx);
            flushed
        }
        Some(Err(join_error)) if join_error.is_panic() => {
            let detail = format!(
                "{}\n{}",
                panic_message(join_error.into_panic().as_ref()),
                Backtrace::force_capture()
            );
            error!("handler panicked: {detail}");
            response.set_panic_response(&detail, debug);
            response.finalize()
        }
        Some(Err(join_error)) => {
            error!(cause = %join_error, "request worker failed");
            response.set_panic_response("request worker failed", false);
            response.finalize()
        }
        None => {
            warn!(timeout = ?timeout, "handler chain timed out");
            response.set_timeout_response();
            response.finalize()
            // `worker` is dropped here, detaching the orphaned task
        }
    }
}

/// Runs the chain to completion on the worker task. The context rides
/// along in the task output so it is not released before the flush.
async fn drive(mut ctx: PooledContext) -> PooledContext {
    ctx.next().await;
    ctx
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}
