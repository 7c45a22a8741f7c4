//! The context pool.
//!
//! Contexts are recycled between requests to avoid per-request
//! allocation. [`Pool::acquire`] hands out a fully reset context;
//! release happens through the [`PooledContext`] guard's `Drop`, which
//! runs on every exit path — normal completion, early return, and panic
//! unwind alike — so a context can neither leak nor be used after
//! release. The free list is the only structure shared between request
//! workers and is guarded by a mutex.

use std::net::SocketAddr;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use bytes::Bytes;

use crate::config::Config;
use crate::context::Context;
use crate::handler::HandlerChain;

/// Parked contexts kept beyond this are dropped instead of pooled.
const MAX_PARKED: usize = 1024;

pub(crate) struct Pool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    free: Mutex<Vec<Box<Context>>>,
    config: Arc<Config>,
}

impl Pool {
    pub(crate) fn new(config: Arc<Config>) -> Self {
        Self { inner: Arc::new(PoolInner { free: Mutex::new(Vec::new()), config }) }
    }

    /// Returns a context — recycled when one is parked, freshly allocated
    /// otherwise — reset to pristine state for this request.
    pub(crate) fn acquire(
        &self,
        parts: http::request::Parts,
        body: Bytes,
        remote: Option<SocketAddr>,
        chain: HandlerChain,
        params: Vec<(String, String)>,
    ) -> PooledContext {
        let recycled = lock(&self.inner.free).pop();
        let mut ctx =
            recycled.unwrap_or_else(|| Box::new(Context::new(Arc::clone(&self.inner.config))));
        ctx.reset(parts, body, remote, chain, params);
        PooledContext { ctx: Some(ctx), pool: Arc::downgrade(&self.inner) }
    }
}

/// An acquired context. Dereferences to [`Context`]; dropping it clears
/// every request reference and returns the context to the pool.
pub(crate) struct PooledContext {
    ctx: Option<Box<Context>>,
    pool: Weak<PoolInner>,
}

impl Deref for PooledContext {
    type Target = Context;

    fn deref(&self) -> &Context {
        // the slot is only emptied inside drop
        self.ctx.as_deref().expect("context present until drop")
    }
}

impl DerefMut for PooledContext {
    fn deref_mut(&mut self) -> &mut Context {
        self.ctx.as_deref_mut().expect("context present until drop")
    }
}

impl Drop for PooledContext {
    fn drop(&mut self) {
        let Some(mut ctx) = self.ctx.take() else {
            return;
        };
        ctx.clear();
        if let Some(pool) = self.pool.upgrade() {
            let mut free = lock(&pool.free);
            if free.len() < MAX_PARKED {
                free.push(ctx);
            }
        }
    }
}

// Unwinding workers can poison the free list; stripping the poison is
// sound because release always leaves a cleared context.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Request, StatusCode};

    fn parts(uri: &str) -> http::request::Parts {
        Request::builder().uri(uri).body(()).unwrap().into_parts().0
    }

    fn acquire(pool: &Pool, uri: &str) -> PooledContext {
        pool.acquire(parts(uri), Bytes::new(), None, Arc::new([]), Vec::new())
    }

    #[test]
    fn reuse_resets_every_field() {
        let pool = Pool::new(Arc::new(Config::default()));

        let mut first = acquire(&pool, "/a?id=2");
        let first_ptr: *const Context = &*first;
        first.values_mut().add_path("id", "1");
        first.set_status(StatusCode::NOT_FOUND);
        first.write(b"stale").unwrap();
        assert!(first.response().written());
        drop(first);

        let second = acquire(&pool, "/b");
        let second_ptr: *const Context = &*second;
        // the pool handed back the same underlying object...
        assert_eq!(first_ptr, second_ptr);
        // ...with fresh-acquire defaults
        assert_eq!(second.cursor(), 0);
        assert_eq!(second.status(), StatusCode::OK);
        assert!(!second.response().written());
        assert_eq!(second.response().size(), -1);
        assert_eq!(second.path(), "/b");
        assert!(!second.has("id"));
    }

    #[test]
    fn fresh_allocation_when_the_pool_is_empty() {
        let pool = Pool::new(Arc::new(Config::default()));
        let first = acquire(&pool, "/a");
        let second = acquire(&pool, "/b");
        let first_ptr: *const Context = &*first;
        let second_ptr: *const Context = &*second;
        assert_ne!(first_ptr, second_ptr);
    }
}
