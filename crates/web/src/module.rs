//! Prefix-scoped routing modules.
//!
//! A [`Module`] is a named scope in the routing namespace: it carries a
//! path prefix and an ordered middleware list, and child modules inherit
//! and extend both. A route's final handler list is the concatenation of
//! every ancestor's middleware (root to leaf) followed by the route's own
//! handlers, captured at registration time — `middleware` calls only
//! affect routes registered afterwards. Registration order is execution
//! order; there is no priority system.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use http::Method;

use crate::handler::{Handler, IntoHandlers};
use crate::router::{Route, Router};
use crate::static_files::StaticFiles;

/// Chains longer than this are a configuration error, caught at
/// registration time rather than at request time.
pub(crate) const MAX_CHAIN: usize = 128;

pub struct Module<'r> {
    router: &'r mut Router,
    prefix: String,
    handlers: Vec<Arc<dyn Handler>>,
    timeout: Option<Duration>,
}

macro_rules! method_sugar {
    ($(#[$doc:meta])* $name:ident, $method:ident) => {
        $(#[$doc])*
        pub fn $name(&mut self, path: &str, handlers: impl IntoHandlers) {
            self.handle(Method::$method, path, handlers);
        }
    };
}

impl<'r> Module<'r> {
    pub(crate) fn new(
        router: &'r mut Router,
        prefix: String,
        handlers: Vec<Arc<dyn Handler>>,
        timeout: Option<Duration>,
    ) -> Self {
        Self { router, prefix, handlers, timeout }
    }

    /// The effective, slash-normalized path prefix of this scope.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Creates a child scope. Its prefix is this module's prefix joined
    /// with `prefix`, and its handler list is this module's effective
    /// list followed by `middlewares`. A child with no middleware of its
    /// own simply forwards the parent's list unchanged.
    pub fn module(&mut self, prefix: &str, middlewares: impl IntoHandlers) -> Module<'_> {
        let handlers = combine(&self.handlers, middlewares.into_handlers());
        let prefix = join_paths(&self.prefix, prefix);
        Module { router: &mut *self.router, prefix, handlers, timeout: self.timeout }
    }

    /// Appends middleware to this scope. Affects only routes registered
    /// on this module or its descendants after the call.
    pub fn middleware(&mut self, middlewares: impl IntoHandlers) {
        self.handlers = combine(&self.handlers, middlewares.into_handlers());
    }

    /// Overrides the handler deadline for routes registered afterwards.
    /// A zero duration arms no timer.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = Some(timeout);
    }

    /// Registers a route. The final handler list is this module's
    /// effective middleware followed by `handlers`, in registration
    /// order.
    pub fn handle(&mut self, method: Method, path: &str, handlers: impl IntoHandlers) {
        let chain = combine(&self.handlers, handlers.into_handlers());
        let pattern = join_paths(&self.prefix, path);
        self.router.register(method, Route { pattern, chain: chain.into(), timeout: self.timeout });
    }

    method_sugar!(
        /// Registers a GET route; shorthand for [`Module::handle`].
        get, GET);
    method_sugar!(
        /// Registers a POST route; shorthand for [`Module::handle`].
        post, POST);
    method_sugar!(put, PUT);
    method_sugar!(delete, DELETE);
    method_sugar!(head, HEAD);
    method_sugar!(options, OPTIONS);
    method_sugar!(patch, PATCH);

    /// Serves files below `root` under a catch-all route at `path`.
    pub fn static_dir(&mut self, path: &str, root: impl Into<PathBuf>) {
        let pattern = join_paths(path, "{*filepath}");
        self.handle(Method::GET, &pattern, StaticFiles::new(root.into()));
    }
}

/// Concatenates an inherited handler list with newly supplied handlers,
/// enforcing the chain-length cap.
pub(crate) fn combine(
    base: &[Arc<dyn Handler>],
    extra: Vec<Arc<dyn Handler>>,
) -> Vec<Arc<dyn Handler>> {
    let mut chain = Vec::with_capacity(base.len() + extra.len());
    chain.extend(base.iter().map(Arc::clone));
    chain.extend(extra);
    assert!(chain.len() <= MAX_CHAIN, "handler chain exceeds {MAX_CHAIN} handlers");
    chain
}

/// Joins two path components, collapsing duplicate slashes.
pub(crate) fn join_paths(base: &str, component: &str) -> String {
    let mut joined = String::with_capacity(base.len() + component.len() + 1);
    for part in base.split('/').chain(component.split('/')) {
        if part.is_empty() {
            continue;
        }
        joined.push('/');
        joined.push_str(part);
    }
    if joined.is_empty() {
        joined.push('/');
    }
    joined
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::handler::handler_fn;
    use async_trait::async_trait;

    async fn noop(_ctx: &mut Context) {}

    #[test]
    fn join_normalizes_slashes() {
        assert_eq!(join_paths("/", "users"), "/users");
        assert_eq!(join_paths("/api/", "/users/"), "/api/users");
        assert_eq!(join_paths("/api", "users/{id}"), "/api/users/{id}");
        assert_eq!(join_paths("/", "/"), "/");
        assert_eq!(join_paths("", ""), "/");
    }

    #[test]
    fn nested_prefixes_accumulate() {
        let mut router = Router::new();
        let mut root = Module::new(&mut router, "/".to_owned(), Vec::new(), None);
        let mut api = root.module("api", ());
        assert_eq!(api.prefix(), "/api");
        let v1 = api.module("/v1/", ());
        assert_eq!(v1.prefix(), "/api/v1");
    }

    #[test]
    fn registration_captures_the_middleware_list() {
        struct Tag;
        #[async_trait]
        impl Handler for Tag {
            async fn call(&self, ctx: &mut Context) {
                ctx.next().await;
            }
        }

        let mut router = Router::new();
        let mut root = Module::new(&mut router, "/".to_owned(), Vec::new(), None);
        root.get("/before", handler_fn(noop));
        root.middleware(Tag);
        root.get("/after", handler_fn(noop));

        let (before, _) = router.lookup(&Method::GET, "/before").unwrap();
        let (after, _) = router.lookup(&Method::GET, "/after").unwrap();
        assert_eq!(before.chain.len(), 1);
        assert_eq!(after.chain.len(), 2);
    }

    #[test]
    #[should_panic(expected = "handler chain exceeds")]
    fn chain_length_is_capped_at_registration() {
        let noop_handler: Arc<dyn Handler> = Arc::new(handler_fn(noop));
        let oversized: Vec<Arc<dyn Handler>> =
            (0..=MAX_CHAIN).map(|_| Arc::clone(&noop_handler)).collect();

        let mut router = Router::new();
        let mut root = Module::new(&mut router, "/".to_owned(), Vec::new(), None);
        root.get("/too-long", oversized);
    }
}
