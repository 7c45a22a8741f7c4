//! Static file serving for catch-all routes.

use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, error};

use crate::context::Context;
use crate::handler::Handler;

/// Terminal handler behind [`Module::static_dir`](crate::Module::static_dir).
/// Expects the matched route to provide a `filepath` catch-all capture.
pub(crate) struct StaticFiles {
    root: PathBuf,
}

impl StaticFiles {
    pub(crate) fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

#[async_trait]
impl Handler for StaticFiles {
    async fn call(&self, ctx: &mut Context) {
        let Some(rel) = ctx.values().get("filepath").map(str::to_owned) else {
            debug!("missing filepath capture");
            ctx.not_found();
            return;
        };
        let rel = rel.trim_start_matches('/');
        if rel.split('/').any(|part| part == "..") {
            ctx.forbidden();
            return;
        }

        let path = self.root.join(rel);
        match tokio::fs::read(&path).await {
            Ok(contents) => {
                if let Err(e) = ctx.raw(&contents, content_type_for(&path)) {
                    debug!(cause = %e, "static file write dropped");
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => ctx.not_found(),
            Err(e) => {
                error!(cause = %e, path = %path.display(), "failed to read static file");
                ctx.fail();
            }
        }
    }
}

fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(OsStr::to_str) {
        Some("html" | "htm") => mime::TEXT_HTML_UTF_8.as_ref(),
        Some("css") => mime::TEXT_CSS.as_ref(),
        Some("js") => mime::TEXT_JAVASCRIPT.as_ref(),
        Some("json") => mime::APPLICATION_JSON.as_ref(),
        Some("txt") => mime::TEXT_PLAIN_UTF_8.as_ref(),
        Some("svg") => mime::IMAGE_SVG.as_ref(),
        Some("png") => mime::IMAGE_PNG.as_ref(),
        Some("jpg" | "jpeg") => mime::IMAGE_JPEG.as_ref(),
        Some("gif") => mime::IMAGE_GIF.as_ref(),
        _ => mime::APPLICATION_OCTET_STREAM.as_ref(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_extensions_resolve() {
        assert_eq!(content_type_for(Path::new("a/index.html")), "text/html; charset=utf-8");
        assert_eq!(content_type_for(Path::new("a/site.css")), "text/css");
        assert_eq!(content_type_for(Path::new("a/blob.bin")), "application/octet-stream");
    }
}
