//! UDP receiver for control packets. Every packet gets exactly one reply.

use super::control::ControlHandler;
use crate::error::ServerError;
use log::{error, info, warn};
use shared::crypto::{self, FrameKey};
use shared::{ControlPacket, MAX_DATAGRAM_SIZE};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct MetadataConnector {
    address: String,
    key: FrameKey,
    handler: Arc<ControlHandler>,
    cancel: CancellationToken,
    receiver: Option<JoinHandle<Result<(), ServerError>>>,
}

impl MetadataConnector {
    pub fn new(
        address: impl Into<String>,
        key: FrameKey,
        handler: ControlHandler,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            address: address.into(),
            key,
            handler: Arc::new(handler),
            cancel,
            receiver: None,
        }
    }

    pub async fn connect(&mut self) -> Result<SocketAddr, ServerError> {
        if self.receiver.is_some() {
            return Err(ServerError::Config(
                "metadata connector is already connected".to_string(),
            ));
        }

        let socket = UdpSocket::bind(&self.address).await?;
        let local_addr = socket.local_addr()?;
        info!("Metadata connector listening on {}", local_addr);

        self.receiver = Some(tokio::spawn(receive_loop(
            socket,
            self.key,
            Arc::clone(&self.handler),
            self.cancel.clone(),
        )));
        Ok(local_addr)
    }

    pub fn close(&self) {
        self.cancel.cancel();
    }

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
    handler: Arc<ControlHandler>,
    cancel: CancellationToken,
) -> Result<(), ServerError> {
    let mut buffer = [0u8; MAX_DATAGRAM_SIZE];

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                info!("Metadata connector stopped");
                return Ok(());
            }
            received = socket.recv_from(&mut buffer) => {
                let (len, addr) = match received {
                    Ok(received) => received,
                    Err(e) => {
                        error!("Metadata socket receive failed: {}", e);
                        return Err(e.into());
                    }
                };

                let packet: ControlPacket = match crypto::open_packet(&key, &buffer[..len]) {
                    Ok(packet) => packet,
                    Err(e) => {
                        warn!("Dropped control frame from {}: {}", addr, e);
                        continue;
                    }
                };

                let reply = handler.respond(packet).await;
                let frame = crypto::seal_packet(&key, &reply)?;
                if let Err(e) = socket.send_to(&frame, addr).await {
                    warn!("Failed to reply to {}: {}", addr, e);
                }
            }
        }
    }
}
