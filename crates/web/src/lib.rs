//! kumo-web: a small middleware-chain web framework.
//!
//! Every request is wrapped in a pooled [`Context`] and driven through an
//! ordered chain of [`Handler`]s compiled at registration time from the
//! [`Module`] tree. A handler continues the chain with
//! [`Context::next`] or ends it by returning; all output goes through
//! the buffered [`Response`] accumulator, which is flushed to the
//! transport exactly once. An execution supervisor bounds each request
//! with an optional per-route deadline and recovers handler panics.
//!
//! The HTTP transport (hyper), the path matcher (matchit), and template
//! rendering are external collaborators; this crate owns the pipeline
//! between them.

mod app;
mod config;
mod context;
mod error;
mod executor;
mod handler;
mod module;
mod pool;
mod response;
mod router;
mod server;
mod static_files;
mod values;

pub mod middleware;

pub use app::App;
pub use config::Config;
pub use context::Context;
pub use error::{ResponseError, ServeError, ValueError};
pub use handler::{handler_fn, FnHandler, Handler, HandlerFn, IntoHandlers};
pub use module::Module;
pub use response::Response;
pub use values::Values;

pub use http::{Method, StatusCode};
