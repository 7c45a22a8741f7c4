//! Route registration and matching.
//!
//! One radix tree per HTTP method, delegating the actual path matching to
//! [`matchit`]. Patterns use `{name}` captures and `{*rest}` catch-alls;
//! overlapping static and capture segments follow matchit precedence
//! (the static segment wins). Route tables are built at startup and
//! treated as read-only while serving.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use http::Method;
use tracing::{debug, warn};

use crate::handler::HandlerChain;

/// A compiled (method, pattern) registration. Immutable after startup.
pub(crate) struct Route {
    pub(crate) pattern: String,
    pub(crate) chain: HandlerChain,
    pub(crate) timeout: Option<Duration>,
}

pub(crate) struct Router {
    trees: HashMap<Method, matchit::Router<Arc<Route>>>,
}

impl Router {
    pub(crate) fn new() -> Self {
        Self { trees: HashMap::new() }
    }

    /// Registers a route. On a duplicate (method, path) the first
    /// registration wins and the conflict is logged; a malformed pattern
    /// is a configuration error and panics at startup.
    pub(crate) fn register(&mut self, method: Method, route: Route) {
        let pattern = route.pattern.clone();
        let tree = self.trees.entry(method.clone()).or_default();
        match tree.insert(pattern.as_str(), Arc::new(route)) {
            Ok(()) => debug!(%method, %pattern, "route registered"),
            Err(matchit::InsertError::Conflict { .. }) => {
                warn!(%method, %pattern, "route already registered, keeping the first registration");
            }
            Err(e) => panic!("invalid route pattern `{pattern}`: {e}"),
        }
    }

    /// Maps (method, path) to the registered chain plus extracted path
    /// parameters, or `None` when nothing matches.
    pub(crate) fn lookup(
        &self,
        method: &Method,
        path: &str,
    ) -> Option<(Arc<Route>, Vec<(String, String)>)> {
        let tree = self.trees.get(method)?;
        let matched = tree.at(path).ok()?;
        let params =
            matched.params.iter().map(|(key, value)| (key.to_owned(), value.to_owned())).collect();
        Some((Arc::clone(matched.value), params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(pattern: &str) -> Route {
        Route { pattern: pattern.to_owned(), chain: Arc::new([]), timeout: None }
    }

    #[test]
    fn lookup_extracts_named_params() {
        let mut router = Router::new();
        router.register(Method::GET, route("/users/{id}"));

        let (matched, params) = router.lookup(&Method::GET, "/users/42").unwrap();
        assert_eq!(matched.pattern, "/users/{id}");
        assert_eq!(params, vec![("id".to_owned(), "42".to_owned())]);
    }

    #[test]
    fn methods_are_independent() {
        let mut router = Router::new();
        router.register(Method::GET, route("/users"));
        assert!(router.lookup(&Method::POST, "/users").is_none());
    }

    #[test]
    fn static_segment_beats_capture() {
        let mut router = Router::new();
        router.register(Method::GET, route("/users/{id}"));
        router.register(Method::GET, route("/users/me"));

        let (matched, params) = router.lookup(&Method::GET, "/users/me").unwrap();
        assert_eq!(matched.pattern, "/users/me");
        assert!(params.is_empty());
    }

    #[test]
    fn duplicate_registration_keeps_the_first() {
        let mut router = Router::new();
        let mut first = route("/dup");
        first.timeout = Some(Duration::from_secs(1));
        router.register(Method::GET, first);
        router.register(Method::GET, route("/dup"));

        let (matched, _) = router.lookup(&Method::GET, "/dup").unwrap();
        assert_eq!(matched.timeout, Some(Duration::from_secs(1)));
    }

    #[test]
    fn catch_all_matches_nested_paths() {
        let mut router = Router::new();
        router.register(Method::GET, route("/static/{*filepath}"));

        let (_, params) = router.lookup(&Method::GET, "/static/css/site.css").unwrap();
        assert_eq!(params, vec![("filepath".to_owned(), "css/site.css".to_owned())]);
    }
}
