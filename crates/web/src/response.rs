//! The buffered response accumulator.
//!
//! Handler code builds the response incrementally — status, headers, body
//! — and the whole thing is flushed to the transport exactly once, after
//! the chain finishes. Two flags drive the lifecycle:
//!
//! * `committed`: set by the first body write (or an explicit commit
//!   helper). Status code and headers are frozen from this point on;
//!   later mutations are silently dropped, never applied.
//! * `closed`: set by a redirect, a timeout, or the final flush. Writes
//!   against a closed response fail with [`ResponseError::Closed`] — this
//!   is how output from a worker that outlived its deadline is detected
//!   and discarded.
//!
//! The accumulator is a cheap handle over shared state so the execution
//! supervisor can flush it even when the worker task still owns the
//! request context.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::{Bytes, BytesMut};
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE, LOCATION, SET_COOKIE};
use http::StatusCode;
use http_body_util::Full;
use serde::Serialize;
use tracing::debug;

use crate::error::ResponseError;

const TIMEOUT_BODY: &[u8] = b"service unavailable\n";

#[derive(Debug)]
pub(crate) struct ResponseState {
    pub(crate) status: StatusCode,
    pub(crate) headers: http::HeaderMap,
    pub(crate) body: BytesMut,
    pub(crate) committed: bool,
    pub(crate) closed: bool,
}

impl ResponseState {
    fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: http::HeaderMap::new(),
            body: BytesMut::new(),
            committed: false,
            closed: false,
        }
    }

    fn reset(&mut self) {
        self.status = StatusCode::OK;
        self.headers.clear();
        self.body.clear();
        self.committed = false;
        self.closed = false;
    }
}

/// Buffered response state for one request.
#[derive(Debug, Clone)]
pub struct Response {
    state: Arc<Mutex<ResponseState>>,
}

impl Response {
    pub(crate) fn new() -> Self {
        Self { state: Arc::new(Mutex::new(ResponseState::new())) }
    }

    /// Resets for reuse. When the supervisor of a previous request still
    /// holds a handle (a panicked or timed-out worker released early),
    /// the shared state is abandoned to it and a fresh one is allocated.
    pub(crate) fn reset(&mut self) {
        match Arc::get_mut(&mut self.state) {
            Some(mutex) => mutex.get_mut().unwrap_or_else(PoisonError::into_inner).reset(),
            None => *self = Self::new(),
        }
    }

    // A handler panic can poison the lock mid-write; the supervisor must
    // still be able to flush, so poisoning is stripped.
    pub(crate) fn state(&self) -> MutexGuard<'_, ResponseState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The status code that will be (or was) flushed.
    pub fn status(&self) -> StatusCode {
        self.state().status
    }

    /// Sets the status code. Ignored once the response is committed.
    pub fn set_status(&self, status: StatusCode) {
        let mut state = self.state();
        if state.committed {
            debug!(status = status.as_u16(), "status change after commit ignored");
            return;
        }
        state.status = status;
    }

    /// Number of body bytes accumulated, or -1 while nothing has been
    /// committed yet.
    pub fn size(&self) -> i64 {
        let state = self.state();
        if state.committed { state.body.len() as i64 } else { -1 }
    }

    /// Whether the status line and headers are committed.
    pub fn written(&self) -> bool {
        self.state().committed
    }

    /// Returns the first value of a response header.
    pub fn header(&self, key: &str) -> Option<String> {
        self.state().headers.get(key).and_then(|v| v.to_str().ok()).map(str::to_owned)
    }

    /// Sets a response header, replacing previous values. A no-op once
    /// the response is committed.
    pub fn set_header(&self, key: &str, value: &str) {
        self.edit_headers(key, value, |headers, name, value| {
            headers.insert(name, value);
        });
    }

    /// Appends a response header. A no-op once the response is committed.
    pub fn add_header(&self, key: &str, value: &str) {
        self.edit_headers(key, value, |headers, name, value| {
            headers.append(name, value);
        });
    }

    /// Removes a response header. A no-op once the response is committed.
    pub fn remove_header(&self, key: &str) {
        let mut state = self.state();
        if state.committed {
            return;
        }
        if let Ok(name) = HeaderName::try_from(key) {
            state.headers.remove(name);
        }
    }

    /// Appends a `Set-Cookie` header from a preformatted cookie string.
    pub fn set_cookie(&self, cookie: &str) {
        let mut state = self.state();
        if state.committed {
            return;
        }
        match HeaderValue::try_from(cookie) {
            Ok(value) => {
                state.headers.append(SET_COOKIE, value);
            }
            Err(e) => debug!(cause = %e, "invalid cookie dropped"),
        }
    }

    fn edit_headers<F>(&self, key: &str, value: &str, apply: F)
    where
        F: FnOnce(&mut http::HeaderMap, HeaderName, HeaderValue),
    {
        let mut state = self.state();
        if state.committed {
            debug!(key, "header change after commit ignored");
            return;
        }
        match (HeaderName::try_from(key), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => apply(&mut state.headers, name, value),
            _ => debug!(key, "invalid header dropped"),
        }
    }

    /// Appends body bytes. The first write commits the status line and
    /// headers. Returns the number of bytes accepted, or
    /// [`ResponseError::Closed`] after a redirect, timeout, or flush.
    pub fn write(&self, data: &[u8]) -> Result<usize, ResponseError> {
        let mut state = self.state();
        if state.closed {
            return Err(ResponseError::Closed);
        }
        state.committed = true;
        state.body.extend_from_slice(data);
        Ok(data.len())
    }

    /// Writes raw bytes under the given content type.
    pub fn raw(&self, body: &[u8], content_type: &str) -> Result<usize, ResponseError> {
        if !content_type.is_empty() {
            self.set_header(CONTENT_TYPE.as_str(), content_type);
        }
        self.write(body)
    }

    /// Writes a `text/plain; charset=utf-8` body.
    pub fn text(&self, body: &str) -> Result<usize, ResponseError> {
        self.raw(body.as_bytes(), mime::TEXT_PLAIN_UTF_8.as_ref())
    }

    /// Writes a `text/html; charset=utf-8` body.
    pub fn html(&self, body: &str) -> Result<usize, ResponseError> {
        self.raw(body.as_bytes(), mime::TEXT_HTML_UTF_8.as_ref())
    }

    /// Serializes `value` as the JSON body. Serialization runs before any
    /// byte is written, so a failure leaves no partial output; callers
    /// should treat this as the first and only write of the response.
    pub fn json<T: Serialize + ?Sized>(&self, value: &T) -> Result<usize, ResponseError> {
        let encoded = serde_json::to_vec(value)?;
        self.set_header(CONTENT_TYPE.as_str(), "application/json; charset=utf-8");
        self.write(&encoded)
    }

    /// Sets `Location` and the status code, then commits immediately.
    /// A redirect is terminal: later writes fail with `Closed`.
    pub fn redirect(&self, location: &str, status: StatusCode) {
        let mut state = self.state();
        if state.closed || state.committed {
            debug!(location, "redirect after write ignored");
            return;
        }
        match HeaderValue::try_from(location) {
            Ok(value) => {
                state.headers.insert(LOCATION, value);
            }
            Err(e) => {
                debug!(cause = %e, "invalid redirect location dropped");
                return;
            }
        }
        state.status = status;
        state.committed = true;
        state.closed = true;
    }

    /// Redirects with `302 Found`.
    pub fn redirect_found(&self, location: &str) {
        self.redirect(location, StatusCode::FOUND);
    }

    /// Redirects with `301 Moved Permanently`.
    pub fn redirect_moved(&self, location: &str) {
        self.redirect(location, StatusCode::MOVED_PERMANENTLY);
    }

    fn commit_status(&self, status: StatusCode) {
        let mut state = self.state();
        if state.closed || state.committed {
            return;
        }
        state.status = status;
        state.committed = true;
    }

    /// Commits HTTP 304 Not Modified with an empty body.
    pub fn not_modified(&self) {
        self.commit_status(StatusCode::NOT_MODIFIED);
    }

    /// Commits HTTP 401 Unauthorized with an empty body.
    pub fn unauthorized(&self) {
        self.commit_status(StatusCode::UNAUTHORIZED);
    }

    /// Commits HTTP 403 Forbidden with an empty body.
    pub fn forbidden(&self) {
        self.commit_status(StatusCode::FORBIDDEN);
    }

    /// Commits HTTP 404 Not Found with an empty body.
    pub fn not_found(&self) {
        self.commit_status(StatusCode::NOT_FOUND);
    }

    /// Commits HTTP 500 Internal Server Error with an empty body.
    pub fn fail(&self) {
        self.commit_status(StatusCode::INTERNAL_SERVER_ERROR);
    }

    /// Converts a recovered panic into a 500. If something was already
    /// committed the headers cannot be rewritten; the caller has logged
    /// and the buffered output is flushed as-is.
    pub(crate) fn set_panic_response(&self, detail: &str, debug_body: bool) {
        let mut state = self.state();
        if state.committed {
            return;
        }
        state.status = StatusCode::INTERNAL_SERVER_ERROR;
        if debug_body {
            state.headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
            state.body.clear();
            state.body.extend_from_slice(detail.as_bytes());
        }
        state.committed = true;
    }

    /// Marks the request timed out: 503 with a generic body when nothing
    /// was committed, and the state closed either way so the abandoned
    /// worker's writes are rejected.
    pub(crate) fn set_timeout_response(&self) {
        let mut state = self.state();
        if !state.committed {
            state.status = StatusCode::SERVICE_UNAVAILABLE;
            state.headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
            state.body.clear();
            state.body.extend_from_slice(TIMEOUT_BODY);
            state.committed = true;
        }
        state.closed = true;
    }

    /// Flushes the accumulated state into a transport response and closes
    /// it. Called exactly once per request by the execution supervisor;
    /// the redirect path needs no special casing here because a redirect
    /// already froze the status, `Location` header, and empty body.
    pub(crate) fn finalize(&self) -> http::Response<Full<Bytes>> {
        let mut state = self.state();
        state.closed = true;
        let body = std::mem::take(&mut state.body).freeze();
        let mut response = http::Response::new(Full::new(body));
        *response.status_mut() = state.status;
        *response.headers_mut() = std::mem::take(&mut state.headers);
        response
    }
}
