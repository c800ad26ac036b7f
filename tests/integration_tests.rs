//! Integration tests for the live-state server
//!
//! These tests drive the connectors over real UDP sockets and check the
//! effects on the networking cache and the sqlite store.

use assert_approx_eq::assert_approx_eq;
use server::cache::{CacheSession, EventKind, NetworkingCache};
use server::config::{CacheLimits, Config, EventSettings, GenerationSettings};
use server::connector::{ContentConnector, ContentHandler, ControlHandler, MetadataConnector};
use server::db;
use server::readthrough;
use server::repository::{NewLobby, Repository};
use server::workers::{EventEngine, FixedEventSelector, RepositorySync};
use shared::crypto::{derive_key, open_packet, seal_packet, FrameKey};
use shared::{opcode, ControlPacket, Envelope, UpdatePositionRequest, MAX_DATAGRAM_SIZE};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{sleep, timeout};

async fn repository() -> Repository {
    let connection = db::connect("sqlite::memory:", Duration::from_millis(10), 0)
        .await
        .unwrap();
    db::create_schema(&connection).await.unwrap();
    let cache = NetworkingCache::new(CacheLimits {
        max_sessions: 8,
        max_session_players: 8,
    })
    .unwrap();
    Repository::new(connection, Arc::new(cache))
}

fn generation_settings() -> GenerationSettings {
    Config::from_args(["server", "--encryption-key", "integration"])
        .unwrap()
        .generation_settings()
}

struct Harness {
    repository: Repository,
    key: FrameKey,
    content: ContentConnector,
    metadata: MetadataConnector,
    content_addr: SocketAddr,
    metadata_addr: SocketAddr,
    client: UdpSocket,
}

impl Harness {
    async fn start() -> Self {
        let repository = repository().await;
        let key = derive_key("integration");
        let handler = ContentHandler::new(repository.clone(), generation_settings());
        let mut content = ContentConnector::new("127.0.0.1:0", key, handler);
        let mut metadata = MetadataConnector::new(
            "127.0.0.1:0",
            key,
            ControlHandler::new(repository.clone(), 8),
            content.cancellation().child_token(),
        );
        let content_addr = content.connect().await.unwrap();
        let metadata_addr = metadata.connect().await.unwrap();
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        Self {
            repository,
            key,
            content,
            metadata,
            content_addr,
            metadata_addr,
            client,
        }
    }

    async fn control(&self, packet: &ControlPacket) -> ControlPacket {
        let frame = seal_packet(&self.key, packet).unwrap();
        self.client.send_to(&frame, self.metadata_addr).await.unwrap();

        let mut buf = [0u8; MAX_DATAGRAM_SIZE];
        let (len, _) = timeout(Duration::from_secs(2), self.client.recv_from(&mut buf))
            .await
            .expect("control reply timed out")
            .unwrap();
        open_packet(&self.key, &buf[..len]).unwrap()
    }

    async fn send_content(&self, envelope: &Envelope) {
        let frame = seal_packet(&self.key, envelope).unwrap();
        self.client.send_to(&frame, self.content_addr).await.unwrap();
    }

    async fn handshake(&self, issuer: &str) -> i64 {
        match self
            .control(&ControlPacket::Handshake {
                issuer: issuer.to_string(),
            })
            .await
        {
            ControlPacket::HandshakeAccepted { user_id } => user_id,
            other => panic!("Expected HandshakeAccepted, got {:?}", other),
        }
    }

    async fn stop(mut self) {
        self.content.close();
        self.content.wait().await.unwrap();
        self.metadata.wait().await.unwrap();
    }
}

/// Polls `check` until it holds or one second has passed.
async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..50 {
        if check().await {
            return true;
        }
        sleep(Duration::from_millis(20)).await;
    }
    false
}

/// CONTROL CHANNEL TESTS
mod control_tests {
    use super::*;

    /// Tests that a handshake registers the user and a ping is answered
    #[tokio::test]
    async fn handshake_and_ping_over_udp() {
        let harness = Harness::start().await;

        let user_id = harness.handshake("alice").await;
        assert_eq!(harness.handshake("alice").await, user_id);

        let pong = harness
            .control(&ControlPacket::Ping {
                issuer: "alice".to_string(),
                timestamp: 1234,
            })
            .await;
        assert_eq!(pong, ControlPacket::Pong { timestamp: 1234 });
        assert!(harness
            .repository
            .cache()
            .user_activity()
            .get("alice")
            .await
            .is_some());

        harness.stop().await;
    }

    /// Tests a session going from creation to a toxic rain hit and removal,
    /// driven only by control packets
    #[tokio::test]
    async fn session_lifecycle_over_udp() {
        let harness = Harness::start().await;
        harness.handshake("alice").await;
        harness.handshake("bob").await;

        let session_id = match harness
            .control(&ControlPacket::CreateSession {
                issuer: "alice".to_string(),
                name: "storm".to_string(),
                seed: 9,
            })
            .await
        {
            ControlPacket::SessionCreated { session_id } => session_id,
            other => panic!("Expected SessionCreated, got {:?}", other),
        };

        for (issuer, expect_host) in [("alice", true), ("bob", false)] {
            let reply = harness
                .control(&ControlPacket::CreateLobby {
                    issuer: issuer.to_string(),
                    session_id,
                })
                .await;
            match reply {
                ControlPacket::LobbyCreated { host, .. } => assert_eq!(host, expect_host),
                other => panic!("Expected LobbyCreated, got {:?}", other),
            }
        }

        let started = harness
            .control(&ControlPacket::StartSession {
                issuer: "alice".to_string(),
                session_id,
            })
            .await;
        assert_eq!(started, ControlPacket::SessionStarted { session_id });

        match harness.control(&ControlPacket::GetLobbySet { session_id }).await {
            ControlPacket::LobbySet { entries, .. } => {
                let issuers: Vec<&str> = entries.iter().map(|e| e.issuer.as_str()).collect();
                assert_eq!(issuers, vec!["alice", "bob"]);
            }
            other => panic!("Expected LobbySet, got {:?}", other),
        }

        {
            let mut tx = harness.repository.cache().metadata().begin().await;
            for issuer in ["alice", "bob"] {
                readthrough::metadata(&mut tx, &harness.repository, issuer)
                    .await
                    .unwrap();
            }
        }
        let engine = EventEngine::new(
            Arc::clone(harness.repository.cache()),
            EventSettings {
                duration: Duration::from_secs(20),
                frequency: Duration::from_secs(2),
                pause: Duration::from_secs(90),
                hit_rate: 20,
            },
            Duration::from_secs(2),
            FixedEventSelector(Some(EventKind::ToxicRain)),
        );
        assert_eq!(engine.tick().await.unwrap(), 2);
        let bob = harness.repository.cache().metadata().get("bob").await.unwrap();
        assert_eq!(bob[0].health, 80);

        // Seats of a started session stay until the session is removed.
        let late = harness
            .control(&ControlPacket::RemoveLobby {
                issuer: "bob".to_string(),
                session_id,
            })
            .await;
        assert!(matches!(late, ControlPacket::Rejected { .. }));

        harness.repository.sessions().delete(session_id).await.unwrap();
        let sync = RepositorySync::new(harness.repository.clone(), Duration::from_secs(15));
        assert_eq!(sync.tick().await.unwrap(), 0);
        assert_eq!(harness.repository.lobbies().count().await.unwrap(), 0);

        harness.stop().await;
    }

    /// Tests that closing the content connector also stops the metadata channel
    #[tokio::test]
    async fn close_stops_both_channels() {
        let mut harness = Harness::start().await;

        harness.content.close();
        harness.content.close();

        timeout(Duration::from_secs(2), harness.metadata.wait())
            .await
            .expect("metadata channel did not stop")
            .unwrap();
        harness.content.wait().await.unwrap();
    }
}

/// CONTENT CHANNEL TESTS
mod content_tests {
    use super::*;

    /// Tests the full path from a position update to the lobbies table
    #[tokio::test]
    async fn position_update_reaches_storage() {
        let harness = Harness::start().await;
        let user_id = harness.handshake("alice").await;
        let repository = &harness.repository;
        let session = repository.sessions().insert("arena", 42, user_id).await.unwrap();
        let lobby = repository
            .lobbies()
            .insert(NewLobby {
                user_id,
                session_id: session.id,
                skin: 1,
                host: true,
            })
            .await
            .unwrap();

        let update = UpdatePositionRequest {
            issuer: "alice".to_string(),
            session_id: session.id,
            lobby_id: lobby.id,
            x: 320.0,
            y: 240.0,
        };
        harness
            .send_content(&Envelope::new(opcode::UPDATE_USER_METADATA_POSITIONS, &update).unwrap())
            .await;

        let cache = Arc::clone(repository.cache());
        assert!(
            eventually(|| {
                let cache = Arc::clone(&cache);
                async move {
                    cache
                        .metadata()
                        .get("alice")
                        .await
                        .map_or(false, |records| records[0].active)
                }
            })
            .await
        );

        let sync = RepositorySync::new(repository.clone(), Duration::from_secs(15));
        assert_eq!(sync.tick().await.unwrap(), 1);

        let stored = repository.lobbies().get_by_user_id(user_id).await.unwrap();
        assert!(stored[0].active);
        assert_approx_eq!(stored[0].position_x, 320.0);
        assert_approx_eq!(stored[0].position_y, 240.0);

        harness.stop().await;
    }

    /// Tests that forged frames are dropped without stopping the receiver
    #[tokio::test]
    async fn forged_frames_are_dropped() {
        let harness = Harness::start().await;
        let user_id = harness.handshake("bob").await;

        let forged = Envelope::new(
            opcode::SUBMIT_CHAT_MESSAGE,
            &shared::ChatMessageRequest {
                issuer: "bob".to_string(),
                session_id: 1,
                content: "forged".to_string(),
            },
        )
        .unwrap();
        let wrong_key = seal_packet(&derive_key("intruder"), &forged).unwrap();
        harness
            .client
            .send_to(&wrong_key, harness.content_addr)
            .await
            .unwrap();
        harness
            .client
            .send_to(b"garbage", harness.content_addr)
            .await
            .unwrap();

        let genuine = Envelope::new(
            opcode::SUBMIT_CHAT_MESSAGE,
            &shared::ChatMessageRequest {
                issuer: "bob".to_string(),
                session_id: 1,
                content: "genuine".to_string(),
            },
        )
        .unwrap();
        harness.send_content(&genuine).await;

        let repository = harness.repository.clone();
        assert!(
            eventually(|| {
                let repository = repository.clone();
                async move {
                    !repository
                        .messages()
                        .get_by_issuer(user_id)
                        .await
                        .unwrap()
                        .is_empty()
                }
            })
            .await
        );

        let messages = repository.messages().get_by_issuer(user_id).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "genuine");

        harness.stop().await;
    }
}

/// CONSISTENCY TESTS
mod consistency_tests {
    use super::*;
    use chrono::Utc;
    use sea_orm::{ActiveModelTrait, Set};
    use server::entity::user;

    /// Tests that inserting session "alpha" for user 7 evicts the cached views
    #[tokio::test]
    async fn session_insert_invalidates_views() {
        let repository = repository().await;
        user::ActiveModel {
            id: Set(7),
            name: Set("seven".to_string()),
            created_at: Set(Utc::now()),
        }
        .insert(repository.connection())
        .await
        .unwrap();

        let before = readthrough::user_sessions(&repository, "seven").await.unwrap();
        assert!(before.is_empty());

        let alpha = repository.sessions().insert("alpha", 1, 7).await.unwrap();

        let cache = repository.cache();
        assert!(cache.sessions().get(&alpha.id).await.is_none());
        assert!(cache.user_sessions().get("seven").await.is_none());

        let after = readthrough::user_sessions(&repository, "seven").await.unwrap();
        assert_eq!(after, vec![CacheSession::from(&alpha)]);
    }

    /// Tests the toxic rain scenario on state loaded through the read-through helpers
    #[tokio::test]
    async fn toxic_rain_hits_loaded_players() {
        let repository = repository().await;
        let alice = repository.users().insert("alice").await.unwrap();
        let session = repository.sessions().insert("storm", 3, alice.id).await.unwrap();
        repository.sessions().set_started(session.id, true).await.unwrap();
        repository
            .lobbies()
            .insert(NewLobby {
                user_id: alice.id,
                session_id: session.id,
                skin: 1,
                host: true,
            })
            .await
            .unwrap();

        readthrough::session(&repository, session.id).await.unwrap();
        readthrough::lobby_set(&repository, session.id).await.unwrap();
        {
            let mut tx = repository.cache().metadata().begin().await;
            let records = readthrough::metadata(&mut tx, &repository, "alice")
                .await
                .unwrap();
            assert_eq!(records[0].health, 100);
        }

        let engine = EventEngine::new(
            Arc::clone(repository.cache()),
            EventSettings {
                duration: Duration::from_secs(20),
                frequency: Duration::from_secs(2),
                pause: Duration::from_secs(90),
                hit_rate: 20,
            },
            Duration::from_secs(2),
            FixedEventSelector(Some(EventKind::ToxicRain)),
        );
        assert_eq!(engine.tick().await.unwrap(), 1);

        let records = repository.cache().metadata().get("alice").await.unwrap();
        assert_eq!(records[0].health, 80);
        assert!(!records[0].eliminated);
    }
}
