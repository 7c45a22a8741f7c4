//! The application: composition root binding configuration, the router,
//! the context pool, and dispatch.

use std::fmt::Display;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::{Method, StatusCode};
use http_body_util::{BodyExt, Full};
use tracing::warn;

use crate::config::Config;
use crate::context::Context;
use crate::error::ServeError;
use crate::handler::{Handler, HandlerChain, IntoHandlers};
use crate::module::{combine, join_paths, Module};
use crate::pool::Pool;
use crate::response::Response;
use crate::router::Router;
use crate::{executor, server};

/// The built-in terminal handler for unmatched requests.
struct NotFound;

#[async_trait]
impl Handler for NotFound {
    async fn call(&self, ctx: &mut Context) {
        ctx.not_found();
    }
}

/// A web application.
///
/// Routes and middleware are registered up front — the route table is
/// read-only once serving starts — and requests are dispatched through
/// the pooled context pipeline. The root of the module tree lives here:
/// [`App::middleware`], [`App::handle`] and the method shorthands operate
/// on the root scope, and [`App::module`] opens nested scopes.
///
/// ```ignore
/// let mut app = App::new(Config::default());
/// app.middleware(middleware::Logger);
/// app.get("/users/{id}", handler_fn(get_user));
/// app.run("127.0.0.1:3000").await?;
/// ```
pub struct App {
    config: Arc<Config>,
    router: Router,
    root_handlers: Vec<Arc<dyn Handler>>,
    default_chain: HandlerChain,
    pool: Pool,
}

impl App {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);
        let default_chain: HandlerChain = Arc::new([Arc::new(NotFound) as Arc<dyn Handler>]);
        Self {
            pool: Pool::new(Arc::clone(&config)),
            router: Router::new(),
            root_handlers: Vec::new(),
            default_chain,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Appends middleware to the root scope; affects routes registered
    /// afterwards.
    pub fn middleware(&mut self, middlewares: impl IntoHandlers) {
        self.root_handlers = combine(&self.root_handlers, middlewares.into_handlers());
    }

    /// Opens a nested routing scope under the root.
    pub fn module(&mut self, prefix: &str, middlewares: impl IntoHandlers) -> Module<'_> {
        let handlers = combine(&self.root_handlers, middlewares.into_handlers());
        Module::new(&mut self.router, join_paths("/", prefix), handlers, self.config.timeout)
    }

    fn root(&mut self) -> Module<'_> {
        Module::new(
            &mut self.router,
            "/".to_owned(),
            self.root_handlers.clone(),
            self.config.timeout,
        )
    }

    /// Registers a route on the root scope.
    pub fn handle(&mut self, method: Method, path: &str, handlers: impl IntoHandlers) {
        self.root().handle(method, path, handlers);
    }

    pub fn get(&mut self, path: &str, handlers: impl IntoHandlers) {
        self.root().get(path, handlers);
    }

    pub fn post(&mut self, path: &str, handlers: impl IntoHandlers) {
        self.root().post(path, handlers);
    }

    pub fn put(&mut self, path: &str, handlers: impl IntoHandlers) {
        self.root().put(path, handlers);
    }

    pub fn delete(&mut self, path: &str, handlers: impl IntoHandlers) {
        self.root().delete(path, handlers);
    }

    pub fn head(&mut self, path: &str, handlers: impl IntoHandlers) {
        self.root().head(path, handlers);
    }

    pub fn options(&mut self, path: &str, handlers: impl IntoHandlers) {
        self.root().options(path, handlers);
    }

    /// Serves files below `root` under a catch-all route at `path`.
    pub fn static_dir(&mut self, path: &str, root: impl Into<std::path::PathBuf>) {
        self.root().static_dir(path, root);
    }

    /// Replaces the chain run for unmatched requests. The default chain
    /// answers 404 with an empty body.
    pub fn default_handler(&mut self, handlers: impl IntoHandlers) {
        self.default_chain = combine(&[], handlers.into_handlers()).into();
    }

    /// Dispatches one request through the pipeline: collect the body,
    /// match the route, acquire a pooled context, inject path parameters,
    /// and hand over to the execution supervisor. Unmatched requests run
    /// the default chain so a 404 is produced through the same response
    /// accumulator path as every other response.
    pub async fn dispatch<B>(
        &self,
        request: http::Request<B>,
        remote: Option<SocketAddr>,
    ) -> http::Response<Full<Bytes>>
    where
        B: http_body::Body,
        B::Error: Display,
    {
        let (parts, body) = request.into_parts();
        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                warn!(cause = %e, "failed to read request body");
                let response = Response::new();
                response.set_status(StatusCode::BAD_REQUEST);
                return response.finalize();
            }
        };

        let (chain, timeout, params) = match self.router.lookup(&parts.method, parts.uri.path()) {
            Some((route, params)) => (Arc::clone(&route.chain), route.timeout, params),
            None => (Arc::clone(&self.default_chain), self.config.timeout, Vec::new()),
        };

        let ctx = self.pool.acquire(parts, body, remote, chain, params);
        executor::execute(ctx, timeout, self.config.debug).await
    }

    /// Binds the listen address and serves until the process exits.
    pub async fn run(self, addr: &str) -> Result<(), ServeError> {
        server::serve(self, addr).await
    }
}
