use std::net::SocketAddr;

use futures::future::join_all;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use common::sync::{Request, Response};

use crate::codec::{self, CodecError};
use crate::ServiceState;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("an error occurred running the sync server: {0}")]
    ServingFailed(#[from] std::io::Error),
}

/// TCP listener handing each connection its own sync handler
pub struct Server {
    listener: TcpListener,
    state: ServiceState,
}

impl Server {
    pub async fn bind(addr: SocketAddr, state: ServiceState) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, state })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown_rx` fires, then wait for the
    ///  open ones to close
    pub async fn serve(self, mut shutdown_rx: watch::Receiver<()>) -> Result<(), ServerError> {
        tracing::info!(addr = ?self.listener.local_addr()?, "sync server listening");
        let mut connections: Vec<JoinHandle<()>> = Vec::new();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            tracing::warn!("sync server: accept failed: {}", e);
                            continue;
                        }
                    };
                    connections.retain(|handle| !handle.is_finished());
                    let state = self.state.clone();
                    let rx = shutdown_rx.clone();
                    connections.push(tokio::spawn(async move {
                        serve_connection(stream, peer, state, rx).await;
                    }));
                }
                _ = shutdown_rx.changed() => {
                    tracing::info!("sync server shutting down");
                    break;
                }
            }
        }

        join_all(connections).await;
        Ok(())
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    state: ServiceState,
    mut shutdown_rx: watch::Receiver<()>,
) {
    tracing::debug!("sync server: connection from {}", peer);
    if let Err(e) = stream.set_nodelay(true) {
        tracing::warn!("sync server: failed to set nodelay for {}: {}", peer, e);
    }
    let (reader, writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    let (outbound, outbound_rx) = flume::unbounded();
    let writer = tokio::spawn(write_responses(writer, outbound_rx));
    let handler = state.handler(outbound.clone());

    loop {
        tokio::select! {
            frame = codec::read_frame::<_, Request>(&mut reader) => match frame {
                Ok(Some(request)) => {
                    tracing::trace!("sync server: {} sent {:?}", peer, request);
                    if let Some(reply) = handler.handle(request) {
                        if outbound.send(reply).is_err() {
                            break;
                        }
                    }
                }
                Ok(None) => {
                    tracing::debug!("sync server: {} disconnected", peer);
                    break;
                }
                Err(e) => {
                    tracing::warn!("sync server: dropping {}: {}", peer, e);
                    break;
                }
            },
            _ = shutdown_rx.changed() => break,
        }
    }

    // the writer stops once every sender is gone
    drop(handler);
    drop(outbound);
    match writer.await {
        Ok(Err(e)) => tracing::debug!("sync server: writer for {} failed: {}", peer, e),
        Err(e) => tracing::error!("sync server: writer for {} panicked: {}", peer, e),
        Ok(Ok(())) => {}
    }
}

async fn write_responses(
    mut writer: OwnedWriteHalf,
    outbound: flume::Receiver<Response>,
) -> Result<(), CodecError> {
    while let Ok(response) = outbound.recv_async().await {
        codec::write_frame(&mut writer, &response).await?;
    }
    writer.shutdown().await?;
    Ok(())
}
