//! UDP receiver for content updates.

use super::handler::ContentHandler;
use crate::error::ServerError;
use log::{error, info, warn};
use shared::crypto::{self, FrameKey};
use shared::{Envelope, MAX_DATAGRAM_SIZE};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct ContentConnector {
    address: String,
    key: FrameKey,
    handler: Arc<ContentHandler>,
    cancel: CancellationToken,
    receiver: Option<JoinHandle<Result<(), ServerError>>>,
}

impl ContentConnector {
    pub fn new(address: impl Into<String>, key: FrameKey, handler: ContentHandler) -> Self {
        Self {
            address: address.into(),
            key,
            handler: Arc::new(handler),
            cancel: CancellationToken::new(),
            receiver: None,
        }
    }

    /// Token that stops the receive loop. Cancelled by [`close`](Self::close)
    /// and by process termination signals.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Binds the socket and starts receiving. Returns the bound address.
    pub async fn connect(&mut self) -> Result<SocketAddr, ServerError> {
        if self.receiver.is_some() {
            return Err(ServerError::Config(
                "content connector is already connected".to_string(),
            ));
        }

        let socket = UdpSocket::bind(&self.address).await?;
        let local_addr = socket.local_addr()?;
        info!("Content connector listening on {}", local_addr);

        self.receiver = Some(tokio::spawn(receive_loop(
            socket,
            self.key,
            Arc::clone(&self.handler),
            self.cancel.clone(),
        )));
        spawn_signal_listener(self.cancel.clone());

        Ok(local_addr)
    }

    /// Requests the receive loop to stop. Safe to call any number of times.
    pub fn close(&self) {
        if !self.cancel.is_cancelled() {
            info!("Closing content connector");
        }
        self.cancel.cancel();
    }

    /// Waits for the receive loop to finish.
    pub async fn wait(&mut self) -> Result<(), ServerError> {
        match self.receiver.take() {
            Some(receiver) => receiver.await?,
            None => Ok(()),
        }
    }
}

async fn receive_loop(
    socket: UdpSocket,
    key: FrameKey,
    handler: Arc<ContentHandler>,
    cancel: CancellationToken,
) -> Result<(), ServerError> {
    let mut buffer = [0u8; MAX_DATAGRAM_SIZE];

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                info!("Content connector stopped");
                return Ok(());
            }
            received = socket.recv_from(&mut buffer) => {
                let (len, addr) = match received {
                    Ok(received) => received,
                    Err(e) => {
                        error!("Content socket receive failed: {}", e);
                        return Err(e.into());
                    }
                };

                let envelope: Envelope = match crypto::open_packet(&key, &buffer[..len]) {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        warn!("Dropped content frame from {}: {}", addr, e);
                        continue;
                    }
                };

                if let Err(e) = handler.process(&envelope).await {
                    if e.is_request_level() {
                        warn!("Content update {:?} from {} failed: {}", envelope.key, addr, e);
                    } else {
                        error!("Content update {:?} from {} failed: {}", envelope.key, addr, e);
                    }
                }
            }
        }
    }
}

fn spawn_signal_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {}
            result = shutdown_signal() => {
                match result {
                    Ok(()) => {
                        info!("Received shutdown signal");
                        cancel.cancel();
                    }
                    Err(e) => warn!("Shutdown signals unavailable: {}", e),
                }
            }
        }
    });
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut quit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = interrupt.recv() => {}
        _ = terminate.recv() => {}
        _ = quit.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
