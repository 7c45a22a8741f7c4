use std::time::Duration;

use tracing::Level;

/// Construction-time configuration, threaded from [`App`](crate::App)
/// into every request context.
///
/// There is no process-global state here: two independently configured
/// applications can coexist in one process (which the tests rely on).
#[derive(Debug, Clone)]
pub struct Config {
    /// When enabled, 500 responses carry the panic payload and a capture
    /// of the recovery-point backtrace as a `text/plain` body. Production
    /// responses stay blank.
    pub debug: bool,

    /// Default deadline for a handler chain. `None` (or a zero duration)
    /// arms no timer. Modules can override it per route.
    pub timeout: Option<Duration>,

    /// Trusted reverse-proxy address prefix. Forwarding headers
    /// (`X-Forwarded-For`, `X-Real-IP`, `X-Forwarded-Proto`) are only
    /// honored when the peer address starts with this prefix.
    pub proxy_addr: Option<String>,

    /// Maximum severity forwarded to the subscriber installed by
    /// [`App::run`](crate::App::run). Call sites log unconditionally;
    /// leveling is the subscriber's job.
    pub log_level: Level,
}

impl Default for Config {
    fn default() -> Self {
        Self { debug: false, timeout: None, proxy_addr: None, log_level: Level::INFO }
    }
}
