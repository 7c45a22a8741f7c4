//! Conditional gzip compression of the buffered response body.

use std::io::Write;

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use http::header::{HeaderValue, ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, VARY};
use tracing::error;

use crate::context::Context;
use crate::handler::Handler;
use crate::response::Response;

const COMPRESSIBLE_PREFIXES: [&str; 2] = ["text/", "application/json"];

/// Transparently gzips the response when the client advertises support
/// (`Accept-Encoding: gzip`) and the final `Content-Type` is on the
/// allow-list (`text/*`, `application/json`). Anything else passes
/// through uncompressed. Because the accumulator buffers the whole body,
/// the decision is made after the rest of the chain has run, when the
/// final content type is known.
pub struct Gzip;

#[async_trait]
impl Handler for Gzip {
    async fn call(&self, ctx: &mut Context) {
        let client_accepts = ctx
            .request_header(ACCEPT_ENCODING.as_str())
            .is_some_and(|encodings| encodings.contains("gzip"));

        ctx.next().await;

        if client_accepts {
            compress(ctx.response());
        }
    }
}

/// Rewrites the buffered body in place before the flush. This is part of
/// the flush machinery, so it edits the accumulator state directly
/// rather than going through the handler-facing mutators frozen by the
/// commit flag.
fn compress(response: &Response) {
    let mut state = response.state();
    if state.closed || state.body.is_empty() {
        return;
    }
    if state.headers.contains_key(CONTENT_ENCODING) {
        return;
    }
    let compressible = state
        .headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|ct| COMPRESSIBLE_PREFIXES.iter().any(|prefix| ct.starts_with(prefix)));
    if !compressible {
        return;
    }

    let mut encoder = GzEncoder::new(Vec::with_capacity(state.body.len()), Compression::best());
    if let Err(e) = encoder.write_all(&state.body) {
        error!(cause = %e, "gzip encoding failed");
        return;
    }
    let encoded = match encoder.finish() {
        Ok(encoded) => encoded,
        Err(e) => {
            error!(cause = %e, "gzip encoding failed");
            return;
        }
    };

    state.body.clear();
    state.body.extend_from_slice(&encoded);
    // the length changed; the transport recomputes it at flush time
    state.headers.remove(CONTENT_LENGTH);
    state.headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
    state.headers.insert(VARY, HeaderValue::from_static("Accept-Encoding"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn compresses_allow_listed_content_types() {
        let response = Response::new();
        response.json(&serde_json::json!({"payload": "a".repeat(256)})).unwrap();
        let original = response.state().body.clone();

        compress(&response);

        let state = response.state();
        assert_eq!(state.headers.get(CONTENT_ENCODING).unwrap(), "gzip");
        assert_eq!(state.headers.get(VARY).unwrap(), "Accept-Encoding");

        let mut decoder = flate2::read::GzDecoder::new(&state.body[..]);
        let mut decoded = Vec::new();
        decoder.read_to_end(&mut decoded).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn skips_non_compressible_content() {
        let response = Response::new();
        response.raw(b"\x89PNG", mime::IMAGE_PNG.as_ref()).unwrap();

        compress(&response);

        let state = response.state();
        assert!(state.headers.get(CONTENT_ENCODING).is_none());
        assert_eq!(&state.body[..], b"\x89PNG");
    }

    #[test]
    fn skips_closed_responses() {
        let response = Response::new();
        response.text("too late").unwrap();
        response.set_timeout_response();

        compress(&response);

        assert!(response.state().headers.get(CONTENT_ENCODING).is_none());
    }
}
