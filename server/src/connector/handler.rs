//! Content channel request handling.

use crate::config::{CombatSettings, GenerationSettings};
use crate::error::ServerError;
use crate::generation::{self, ItemKind};
use crate::readthrough;
use crate::repository::Repository;
use crate::utils::since_epoch;
use log::{debug, warn};
use shared::{
    opcode, ChatMessageRequest, Envelope, HitPlayerRequest, OpenItemRequest,
    UpdatePositionRequest, UpdateStaticRequest,
};

/// Applies decoded content updates to the networking cache.
pub struct ContentHandler {
    repository: Repository,
    settings: GenerationSettings,
    combat: CombatSettings,
}

impl ContentHandler {
    pub fn new(repository: Repository, settings: GenerationSettings) -> Self {
        Self {
            repository,
            settings,
            combat: CombatSettings::default(),
        }
    }

    pub fn with_combat(mut self, combat: CombatSettings) -> Self {
        self.combat = combat;
        self
    }

    /// Dispatches one envelope on its opcode. Unknown opcodes are ignored.
    pub async fn process(&self, envelope: &Envelope) -> Result<(), ServerError> {
        match envelope.key.as_str() {
            opcode::UPDATE_USER_METADATA_POSITIONS => {
                self.update_positions(envelope.decode()?).await
            }
            opcode::UPDATE_USER_METADATA_STATIC => self.update_static(envelope.decode()?).await,
            opcode::OPEN_GENERATED_CHEST => {
                self.open_item(ItemKind::Chest, envelope.decode()?).await
            }
            opcode::OPEN_GENERATED_HEALTH_PACK => {
                self.open_item(ItemKind::HealthPack, envelope.decode()?).await
            }
            opcode::SUBMIT_CHAT_MESSAGE => self.submit_chat_message(envelope.decode()?).await,
            opcode::HIT_PLAYER_WITH_FIST => self.hit_with_fist(envelope.decode()?).await,
            other => {
                warn!("Ignoring content update with unknown key {:?}", other);
                Ok(())
            }
        }
    }

    async fn update_positions(&self, request: UpdatePositionRequest) -> Result<(), ServerError> {
        {
            let mut metadata = self.repository.cache().metadata().begin().await;
            let records =
                readthrough::metadata(&mut metadata, &self.repository, &request.issuer).await?;
            let record = records
                .iter_mut()
                .find(|record| record.lobby_id == request.lobby_id)
                .ok_or(ServerError::LobbyNotFound)?;

            if record.eliminated {
                return Err(ServerError::UserEliminated);
            }
            record.active = true;
            record.position_x = request.x;
            record.position_y = request.y;
            metadata.commit();
        }

        self.repository
            .cache()
            .user_activity()
            .add(request.issuer, since_epoch())
            .await;
        Ok(())
    }

    async fn update_static(&self, request: UpdateStaticRequest) -> Result<(), ServerError> {
        let mut metadata = self.repository.cache().metadata().begin().await;
        let records =
            readthrough::metadata(&mut metadata, &self.repository, &request.issuer).await?;
        let record = records
            .iter_mut()
            .find(|record| record.lobby_id == request.lobby_id)
            .ok_or(ServerError::LobbyNotFound)?;

        if record.eliminated {
            return Err(ServerError::UserEliminated);
        }
        record.position_static = request.is_static;
        metadata.commit();
        Ok(())
    }

    async fn open_item(&self, kind: ItemKind, request: OpenItemRequest) -> Result<(), ServerError> {
        let session = readthrough::session(&self.repository, request.session_id).await?;
        if !session.started {
            return Err(ServerError::SessionNotStarted(session.id));
        }

        let lobby_set = readthrough::lobby_set(&self.repository, session.id).await?;
        if !lobby_set.iter().any(|entry| entry.issuer == request.issuer) {
            return Err(ServerError::UserNotInLobby);
        }

        let cache = self.repository.cache();
        let segment = match kind {
            ItemKind::Chest => cache.generated_chests(),
            ItemKind::HealthPack => cache.generated_health_packs(),
        };

        let mut items = segment.begin().await;
        if !items.contains(session.name.as_str()) {
            let generated = generation::generate_items(kind, &self.settings, session.seed);
            debug!(
                "Generated {} {} positions for session {}",
                generated.len(),
                kind.name(),
                session.name
            );
            items.add(session.name.clone(), generated);
        }

        let positions = items
            .get_mut(session.name.as_str())
            .ok_or(ServerError::ItemNotFound)?;
        let index = generation::nearest_within(
            positions,
            &request.position,
            self.settings.interaction_radius,
        )
        .ok_or(ServerError::ItemNotFound)?;

        if kind == ItemKind::HealthPack {
            let mut metadata = cache.metadata().begin().await;
            let records =
                readthrough::metadata(&mut metadata, &self.repository, &request.issuer).await?;
            let record = records
                .iter_mut()
                .find(|record| record.session_id == session.id)
                .ok_or(ServerError::LobbyNotFound)?;

            if record.eliminated {
                return Err(ServerError::UserEliminated);
            }
            record.heal(self.settings.health_pack_rate);
            metadata.commit();
        }

        positions.remove(index);
        items.commit();
        debug!("{} opened a {} in session {}", request.issuer, kind.name(), session.name);
        Ok(())
    }

    /// Damages every other live player of the session standing within fist
    /// reach of the issuer. Players reaching zero health are eliminated.
    async fn hit_with_fist(&self, request: HitPlayerRequest) -> Result<(), ServerError> {
        let session = readthrough::session(&self.repository, request.session_id).await?;
        if !session.started {
            return Err(ServerError::SessionNotStarted(session.id));
        }

        let lobby_set = readthrough::lobby_set(&self.repository, session.id).await?;
        if !lobby_set.iter().any(|entry| entry.issuer == request.issuer) {
            return Err(ServerError::UserNotInLobby);
        }

        let mut metadata = self.repository.cache().metadata().begin().await;
        let (origin_x, origin_y) = {
            let records =
                readthrough::metadata(&mut metadata, &self.repository, &request.issuer).await?;
            let attacker = records
                .iter()
                .find(|record| record.session_id == session.id)
                .ok_or(ServerError::UserNotInLobby)?;
            if attacker.eliminated {
                return Err(ServerError::UserEliminated);
            }
            (attacker.position_x, attacker.position_y)
        };

        let mut hits = 0;
        for entry in lobby_set.iter().filter(|entry| entry.issuer != request.issuer) {
            let records = readthrough::metadata(&mut metadata, &self.repository, &entry.issuer).await?;
            for record in records
                .iter_mut()
                .filter(|record| record.session_id == session.id && !record.eliminated)
            {
                let distance =
                    (record.position_x - origin_x).hypot(record.position_y - origin_y);
                if distance <= self.combat.fist_distance {
                    record.apply_damage(self.combat.fist_rate);
                    hits += 1;
                    if record.eliminated {
                        debug!("{} eliminated in session {}", entry.issuer, session.name);
                    }
                }
            }
        }
        metadata.commit();

        debug!("{} hit {} players in session {}", request.issuer, hits, session.name);
        Ok(())
    }

    async fn submit_chat_message(&self, request: ChatMessageRequest) -> Result<(), ServerError> {
        if request.content.trim().is_empty() {
            return Err(ServerError::InvalidRequest("empty chat message"));
        }

        let issuer = readthrough::resolve_user_id(&self.repository, &request.issuer).await?;
        self.repository
            .messages()
            .insert(&request.content, issuer)
            .await?;
        Ok(())
    }
}
