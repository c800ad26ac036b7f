//! Manual smoke test against a running server: handshake, ping, a fresh
//! started session with one lobby, and one position update.

use clap::Parser;
use server::utils::get_timestamp;
use shared::crypto::{derive_key, open_packet, seal_packet, FrameKey};
use shared::{opcode, ControlPacket, Envelope, UpdatePositionRequest, MAX_DATAGRAM_SIZE};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Sends probe packets to a live-state server")]
struct Args {
    /// Server host
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    #[clap(long, default_value = "8090")]
    content_port: u16,
    #[clap(long, default_value = "8091")]
    metadata_port: u16,
    #[clap(long = "encryption-key", env = "SERVER_ENCRYPTION_KEY", hide_env_values = true)]
    encryption_passphrase: String,
    /// User name to register as
    #[clap(short, long, default_value = "probe")]
    issuer: String,
    /// Name of the session to create, defaults to one derived from the clock
    #[clap(long)]
    session_name: Option<String>,
}

async fn exchange(
    socket: &UdpSocket,
    key: &FrameKey,
    addr: SocketAddr,
    packet: &ControlPacket,
) -> Result<ControlPacket, Box<dyn std::error::Error>> {
    println!("Sending {:?}", packet);
    socket.send_to(&seal_packet(key, packet)?, addr).await?;

    let mut buf = [0u8; MAX_DATAGRAM_SIZE];
    let (len, _) = timeout(Duration::from_secs(3), socket.recv_from(&mut buf)).await??;
    Ok(open_packet(key, &buf[..len])?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let key = derive_key(&args.encryption_passphrase);

    // Create local socket
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    println!("Probe socket bound to {}", socket.local_addr()?);

    let metadata_addr: SocketAddr = format!("{}:{}", args.host, args.metadata_port).parse()?;
    let content_addr: SocketAddr = format!("{}:{}", args.host, args.content_port).parse()?;

    let handshake = ControlPacket::Handshake {
        issuer: args.issuer.clone(),
    };
    match exchange(&socket, &key, metadata_addr, &handshake).await? {
        ControlPacket::HandshakeAccepted { user_id } => {
            println!("Handshake accepted with user ID: {}", user_id)
        }
        other => {
            println!("Expected HandshakeAccepted but got: {:?}", other);
            return Ok(());
        }
    }

    let sent_at = get_timestamp();
    let ping = ControlPacket::Ping {
        issuer: args.issuer.clone(),
        timestamp: sent_at,
    };
    match exchange(&socket, &key, metadata_addr, &ping).await? {
        ControlPacket::Pong { timestamp } => {
            println!("Pong after {} ms", get_timestamp().saturating_sub(timestamp))
        }
        other => println!("Unexpected reply to ping: {:?}", other),
    }

    let create = ControlPacket::CreateSession {
        issuer: args.issuer.clone(),
        name: args
            .session_name
            .unwrap_or_else(|| format!("smoke-{}", get_timestamp())),
        seed: i64::try_from(sent_at).unwrap_or_default(),
    };
    let session_id = match exchange(&socket, &key, metadata_addr, &create).await? {
        ControlPacket::SessionCreated { session_id } => session_id,
        other => {
            println!("Expected SessionCreated but got: {:?}", other);
            return Ok(());
        }
    };

    let join = ControlPacket::CreateLobby {
        issuer: args.issuer.clone(),
        session_id,
    };
    let lobby_id = match exchange(&socket, &key, metadata_addr, &join).await? {
        ControlPacket::LobbyCreated { lobby_id, skin, .. } => {
            println!("Seated in lobby {} with skin {}", lobby_id, skin);
            lobby_id
        }
        other => {
            println!("Expected LobbyCreated but got: {:?}", other);
            return Ok(());
        }
    };

    let start = ControlPacket::StartSession {
        issuer: args.issuer.clone(),
        session_id,
    };
    println!("{:?}", exchange(&socket, &key, metadata_addr, &start).await?);

    let update = UpdatePositionRequest {
        issuer: args.issuer,
        session_id,
        lobby_id,
        x: 100.0,
        y: 200.0,
    };
    let envelope = Envelope::new(opcode::UPDATE_USER_METADATA_POSITIONS, &update)?;
    socket
        .send_to(&seal_packet(&key, &envelope)?, content_addr)
        .await?;
    println!("Sent position update to {}", content_addr);

    let lobby_set = ControlPacket::GetLobbySet { session_id };
    println!("{:?}", exchange(&socket, &key, metadata_addr, &lobby_set).await?);

    println!("Probe finished");
    Ok(())
}
