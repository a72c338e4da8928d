//! Echo peer for local development.
//!
//! Accepts WebSocket connections on the relay endpoint and sends every
//! text frame straight back, so a relay can be exercised without a real
//! controller on the other end.

use futures_util::{SinkExt, StreamExt};
use protocol::ENDPOINT_PATH;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::{self, Message as Frame};
use tracing::{debug, info, warn};

/// Serve echo sessions until the listener fails.
pub async fn serve(listener: TcpListener) -> std::io::Result<()> {
    info!(addr = %listener.local_addr()?, path = ENDPOINT_PATH, "echo peer listening");
    loop {
        let (socket, peer) = listener.accept().await?;
        tokio::spawn(async move {
            if let Err(e) = session(socket).await {
                warn!(%peer, error = %e, "echo session failed");
            }
        });
    }
}

async fn session(socket: TcpStream) -> Result<(), tungstenite::Error> {
    let mut ws = accept_hdr_async(socket, check_path).await?;
    debug!("echo session open");

    while let Some(frame) = ws.next().await {
        match frame? {
            Frame::Text(text) => ws.send(Frame::Text(text)).await?,
            Frame::Close(_) => break,
            _ => {}
        }
    }

    debug!("echo session closed");
    Ok(())
}

#[allow(clippy::result_large_err)]
fn check_path(request: &Request, response: Response) -> Result<Response, ErrorResponse> {
    let path = request.uri().path();
    if serves(path) {
        return Ok(response);
    }
    let mut rejection = ErrorResponse::new(Some(format!("no endpoint at {path}")));
    *rejection.status_mut() = StatusCode::NOT_FOUND;
    Err(rejection)
}

/// Whether `path` ends in the endpoint's segments, below any base path.
fn serves(path: &str) -> bool {
    path.trim_end_matches('/')
        .strip_suffix(ENDPOINT_PATH)
        .is_some_and(|base| base.ends_with('/'))
}
