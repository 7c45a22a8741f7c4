//! The handler trait and adapters.
//!
//! A handler is one unit of per-request logic in the chain. It receives
//! the mutable [`Context`], may read values and write to the response,
//! and continues the chain by awaiting [`Context::next`] — or ends it
//! early by simply not calling `next`. Results are communicated only by
//! mutating the response accumulator; there is no return value.
//!
//! Middleware types implement [`Handler`] directly with `#[async_trait]`.
//! Plain functions go through [`handler_fn`]:
//!
//! ```ignore
//! async fn show(ctx: &mut Context) {
//!     let _ = ctx.text("hello");
//! }
//! app.get("/show", handler_fn(show));
//! ```
//!
//! `handler_fn` accepts named `async fn`s; closures generally need their
//! argument and future types spelled out, so prefer named functions or a
//! struct implementing [`Handler`].

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::Context;

/// An ordered, immutable handler list compiled at registration time.
pub(crate) type HandlerChain = Arc<[Arc<dyn Handler>]>;

/// A unit of per-request logic in the chain.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn call(&self, ctx: &mut Context);
}

/// Lifetime-erasing helper so plain `async fn(&mut Context)` items can be
/// stored behind [`Handler`]. The borrowed argument means the returned
/// future captures the call lifetime, which a single type parameter
/// cannot express; the per-lifetime associated type can.
pub trait HandlerFn<'a>: Send + Sync + 'static {
    type Fut: Future<Output = ()> + Send + 'a;
    fn invoke(&self, ctx: &'a mut Context) -> Self::Fut;
}

impl<'a, F, Fut> HandlerFn<'a> for F
where
    F: Fn(&'a mut Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'a,
{
    type Fut = Fut;

    fn invoke(&self, ctx: &'a mut Context) -> Fut {
        self(ctx)
    }
}

/// A [`HandlerFn`] holder implementing [`Handler`].
pub struct FnHandler<F>(F);

/// Wraps a plain `async fn(&mut Context)` as a chain handler.
pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: for<'any> HandlerFn<'any>,
{
    FnHandler(f)
}

#[async_trait]
impl<F> Handler for FnHandler<F>
where
    F: for<'any> HandlerFn<'any>,
{
    async fn call(&self, ctx: &mut Context) {
        self.0.invoke(ctx).await;
    }
}

/// Conversion of registration arguments into a handler list.
///
/// Implemented for a single [`Handler`], for a prepared
/// `Vec<Arc<dyn Handler>>` (see [`handlers!`](crate::handlers)), and for
/// `()` as the empty list.
pub trait IntoHandlers {
    fn into_handlers(self) -> Vec<Arc<dyn Handler>>;
}

impl<H: Handler> IntoHandlers for H {
    fn into_handlers(self) -> Vec<Arc<dyn Handler>> {
        vec![Arc::new(self)]
    }
}

impl IntoHandlers for Vec<Arc<dyn Handler>> {
    fn into_handlers(self) -> Vec<Arc<dyn Handler>> {
        self
    }
}

impl IntoHandlers for () {
    fn into_handlers(self) -> Vec<Arc<dyn Handler>> {
        Vec::new()
    }
}

/// Builds a handler list from several handlers, in registration order:
///
/// ```ignore
/// api.get("/users/{id}", handlers![middleware::Gzip, handler_fn(get_user)]);
/// ```
#[macro_export]
macro_rules! handlers {
    ($($handler:expr),+ $(,)?) => {
        ::std::vec![$(::std::sync::Arc::new($handler) as ::std::sync::Arc<dyn $crate::Handler>),+]
    };
}
