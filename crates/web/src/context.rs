//! The per-request context.
//!
//! A [`Context`] aggregates everything one request needs: the inbound
//! request data, the [`Values`] store, the shared response accumulator,
//! the compiled handler chain, and the chain cursor. Contexts are pooled
//! and fully reset between requests; see [`crate::pool`].

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, Method, StatusCode, Uri, Version};
use serde::Serialize;

use crate::config::Config;
use crate::error::{ResponseError, ValueError};
use crate::handler::HandlerChain;
use crate::response::Response;
use crate::values::Values;

pub struct Context {
    method: Method,
    uri: Uri,
    version: Version,
    req_headers: HeaderMap,
    remote: Option<SocketAddr>,
    body: Bytes,
    values: Values,
    response: Response,
    chain: HandlerChain,
    cursor: usize,
    config: Arc<Config>,
}

impl Context {
    pub(crate) fn new(config: Arc<Config>) -> Self {
        Self {
            method: Method::GET,
            uri: Uri::from_static("/"),
            version: Version::default(),
            req_headers: HeaderMap::new(),
            remote: None,
            body: Bytes::new(),
            values: Values::new(),
            response: Response::new(),
            chain: Arc::new([]),
            cursor: 0,
            config,
        }
    }

    /// Rebuilds the context for a fresh request: cursor back to zero,
    /// response accumulator at its defaults, value store rebuilt from the
    /// three sources.
    pub(crate) fn reset(
        &mut self,
        parts: http::request::Parts,
        body: Bytes,
        remote: Option<SocketAddr>,
        chain: HandlerChain,
        params: Vec<(String, String)>,
    ) {
        self.method = parts.method;
        self.uri = parts.uri;
        self.version = parts.version;
        self.req_headers = parts.headers;
        self.remote = remote;

        let raw_query = self.uri.query().map(str::to_owned);
        let raw_form = self.is_form().then(|| body.clone());
        self.values.reset(raw_query, raw_form);
        for (key, value) in params {
            self.values.add_path(key, value);
        }

        self.body = body;
        self.chain = chain;
        self.cursor = 0;
        self.response.reset();
    }

    /// Drops every request reference on release back to the pool, so a
    /// parked context cannot keep request or response data alive.
    pub(crate) fn clear(&mut self) {
        self.method = Method::GET;
        self.uri = Uri::from_static("/");
        self.version = Version::default();
        self.req_headers.clear();
        self.remote = None;
        self.body = Bytes::new();
        self.values.clear();
        self.chain = Arc::new([]);
        self.cursor = 0;
        self.response.reset();
    }

    fn is_form(&self) -> bool {
        self.request_header(CONTENT_TYPE.as_str())
            .is_some_and(|ct| ct.starts_with(mime::APPLICATION_WWW_FORM_URLENCODED.as_ref()))
    }

    /// Continues the handler chain: reads the handler at the cursor,
    /// advances the cursor, and invokes it. Because the increment happens
    /// before the invocation, a handler awaiting `next()` resumes the
    /// chain right after itself. Past the end of the chain this is a
    /// no-op — which is also how a handler ends the chain early: by not
    /// calling it.
    pub async fn next(&mut self) {
        if self.cursor >= self.chain.len() {
            return;
        }
        let index = self.cursor;
        self.cursor += 1;
        let handler = Arc::clone(&self.chain[index]);
        handler.call(self).await;
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // -- request introspection ------------------------------------------

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn query_string(&self) -> Option<&str> {
        self.uri.query()
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.req_headers
    }

    /// Returns a request header as a string, if present and valid UTF-8.
    pub fn request_header(&self, key: &str) -> Option<&str> {
        self.req_headers.get(key).and_then(|v| v.to_str().ok())
    }

    /// The buffered request body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn is_get(&self) -> bool {
        self.method == Method::GET
    }

    pub fn is_post(&self) -> bool {
        self.method == Method::POST
    }

    /// True for `X-Requested-With: XMLHttpRequest`.
    pub fn is_ajax(&self) -> bool {
        self.request_header("x-requested-with") == Some("XMLHttpRequest")
    }

    /// True when the request scheme is https, or when a trusted proxy
    /// reports `X-Forwarded-Proto: https`.
    pub fn is_secure(&self) -> bool {
        if self.uri.scheme_str() == Some("https") {
            return true;
        }
        self.from_trusted_proxy()
            && self
                .request_header("x-forwarded-proto")
                .is_some_and(|proto| proto.eq_ignore_ascii_case("https"))
    }

    /// True for multipart form uploads.
    pub fn is_upload(&self) -> bool {
        self.request_header(CONTENT_TYPE.as_str())
            .is_some_and(|ct| ct.contains(mime::MULTIPART_FORM_DATA.as_ref()))
    }

    /// The transport peer address.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote
    }

    /// Addresses reported by `X-Real-IP` and `X-Forwarded-For`, in header
    /// order.
    pub fn forwarded_addrs(&self) -> Vec<String> {
        let mut addrs = Vec::new();
        for name in ["x-real-ip", "x-forwarded-for"] {
            if let Some(raw) = self.request_header(name) {
                addrs.extend(raw.split(',').map(str::trim).filter(|ip| !ip.is_empty()).map(str::to_owned));
            }
        }
        addrs
    }

    pub fn forwarded_addr(&self) -> Option<String> {
        self.forwarded_addrs().into_iter().next()
    }

    /// Resolves the client address. Forwarding headers are only honored
    /// when the peer matches the configured trusted proxy prefix;
    /// otherwise the transport peer address is used directly.
    pub fn client_addr(&self) -> Option<String> {
        if self.from_trusted_proxy() {
            if let Some(addr) = self.forwarded_addr() {
                return Some(addr);
            }
        }
        self.remote.map(|addr| addr.ip().to_string())
    }

    fn from_trusted_proxy(&self) -> bool {
        match (&self.config.proxy_addr, self.remote) {
            (Some(prefix), Some(remote)) => remote.ip().to_string().starts_with(prefix.as_str()),
            _ => false,
        }
    }

    // -- value access ---------------------------------------------------

    pub fn values(&self) -> &Values {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut Values {
        &mut self.values
    }

    pub fn has(&self, key: &str) -> bool {
        self.values.has(key)
    }

    pub fn string(&self, key: &str) -> Result<String, ValueError> {
        self.values.string(key)
    }

    pub fn string_or(&self, key: &str, failover: &str) -> String {
        self.values.string_or(key, failover)
    }

    pub fn int(&self, key: &str) -> Result<i64, ValueError> {
        self.values.int(key)
    }

    pub fn int_or(&self, key: &str, failover: i64) -> i64 {
        self.values.int_or(key, failover)
    }

    pub fn float(&self, key: &str) -> Result<f64, ValueError> {
        self.values.float(key)
    }

    pub fn float_or(&self, key: &str, failover: f64) -> f64 {
        self.values.float_or(key, failover)
    }

    pub fn boolean(&self, key: &str) -> Result<bool, ValueError> {
        self.values.boolean(key)
    }

    pub fn boolean_or(&self, key: &str, failover: bool) -> bool {
        self.values.boolean_or(key, failover)
    }

    // -- response access ------------------------------------------------

    pub fn response(&self) -> &Response {
        &self.response
    }

    pub(crate) fn response_handle(&self) -> Response {
        self.response.clone()
    }

    pub fn status(&self) -> StatusCode {
        self.response.status()
    }

    pub fn set_status(&self, status: StatusCode) {
        self.response.set_status(status);
    }

    pub fn set_header(&self, key: &str, value: &str) {
        self.response.set_header(key, value);
    }

    pub fn add_header(&self, key: &str, value: &str) {
        self.response.add_header(key, value);
    }

    pub fn set_cookie(&self, cookie: &str) {
        self.response.set_cookie(cookie);
    }

    pub fn write(&self, data: &[u8]) -> Result<usize, ResponseError> {
        self.response.write(data)
    }

    pub fn raw(&self, body: &[u8], content_type: &str) -> Result<usize, ResponseError> {
        self.response.raw(body, content_type)
    }

    pub fn text(&self, body: &str) -> Result<usize, ResponseError> {
        self.response.text(body)
    }

    pub fn html(&self, body: &str) -> Result<usize, ResponseError> {
        self.response.html(body)
    }

    pub fn json<T: Serialize + ?Sized>(&self, value: &T) -> Result<usize, ResponseError> {
        self.response.json(value)
    }

    pub fn redirect(&self, location: &str, status: StatusCode) {
        self.response.redirect(location, status);
    }

    pub fn redirect_found(&self, location: &str) {
        self.response.redirect_found(location);
    }

    pub fn redirect_moved(&self, location: &str) {
        self.response.redirect_moved(location);
    }

    pub fn not_modified(&self) {
        self.response.not_modified();
    }

    pub fn unauthorized(&self) {
        self.response.unauthorized();
    }

    pub fn forbidden(&self) {
        self.response.forbidden();
    }

    pub fn not_found(&self) {
        self.response.not_found();
    }

    pub fn fail(&self) {
        self.response.fail();
    }

    #[cfg(test)]
    pub(crate) fn cursor(&self) -> usize {
        self.cursor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Request;

    fn context_for(request: Request<()>) -> Context {
        let (parts, ()) = request.into_parts();
        let mut ctx = Context::new(Arc::new(Config::default()));
        ctx.reset(parts, Bytes::new(), None, Arc::new([]), Vec::new());
        ctx
    }

    #[test]
    fn request_introspection() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/users/1?verbose=t")
            .header("x-requested-with", "XMLHttpRequest")
            .body(())
            .unwrap();
        let ctx = context_for(request);

        assert!(ctx.is_post());
        assert!(!ctx.is_get());
        assert!(ctx.is_ajax());
        assert_eq!(ctx.path(), "/users/1");
        assert_eq!(ctx.query_string(), Some("verbose=t"));
        assert!(ctx.boolean_or("verbose", false));
    }

    #[test]
    fn forwarding_headers_require_a_trusted_proxy() {
        let request = Request::builder()
            .uri("/")
            .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
            .header("x-forwarded-proto", "https")
            .body(())
            .unwrap();
        let (parts, ()) = request.into_parts();
        let remote = Some("10.0.0.1:443".parse().unwrap());

        let mut ctx = Context::new(Arc::new(Config::default()));
        ctx.reset(parts.clone(), Bytes::new(), remote, Arc::new([]), Vec::new());
        // untrusted peer: the transport address wins and the scheme rules
        assert_eq!(ctx.client_addr().unwrap(), "10.0.0.1");
        assert!(!ctx.is_secure());

        let config = Config { proxy_addr: Some("10.".to_owned()), ..Config::default() };
        let mut trusted = Context::new(Arc::new(config));
        trusted.reset(parts, Bytes::new(), remote, Arc::new([]), Vec::new());
        assert_eq!(trusted.client_addr().unwrap(), "203.0.113.9");
        assert!(trusted.is_secure());
    }

    #[test]
    fn form_body_feeds_the_value_store() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/submit")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(())
            .unwrap();
        let (parts, ()) = request.into_parts();
        let mut ctx = Context::new(Arc::new(Config::default()));
        ctx.reset(parts, Bytes::from_static(b"name=kumo"), None, Arc::new([]), Vec::new());

        assert_eq!(ctx.string_or("name", ""), "kumo");
    }
}
