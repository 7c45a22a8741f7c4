//! The accept loop bridging the application to the host HTTP stack.

use std::convert::Infallible;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;

use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::FmtSubscriber;

use crate::app::App;
use crate::error::ServeError;

pub(crate) async fn serve(app: App, addr: &str) -> Result<(), ServeError> {
    let subscriber = FmtSubscriber::builder().with_max_level(app.config().log_level).finish();
    // a second application in the same process keeps the subscriber that
    // is already installed
    let _ = tracing::subscriber::set_global_default(subscriber);

    let addrs: Vec<SocketAddr> = addr.to_socket_addrs()?.collect();
    if addrs.is_empty() {
        return Err(ServeError::invalid_address(addr));
    }

    let listener = TcpListener::bind(addrs.as_slice()).await?;
    let local_addr = listener.local_addr()?;
    info!(addr = %local_addr, "listening");

    let app = Arc::new(app);
    loop {
        let (stream, remote) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(cause = %e, "failed to accept");
                continue;
            }
        };

        let app = Arc::clone(&app);
        tokio::spawn(async move {
            let io = TokioIo::new(stream);
            let service = service_fn(move |request| {
                let app = Arc::clone(&app);
                async move { Ok::<_, Infallible>(app.dispatch(request, Some(remote)).await) }
            });

            // the auto builder negotiates HTTP/1.1 or HTTP/2 per connection
            if let Err(e) = ConnBuilder::new(TokioExecutor::new()).serve_connection(io, service).await
            {
                error!(peer = %remote, cause = %e, "connection error");
            }
        });
    }
}
