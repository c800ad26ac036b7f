//! Session item layouts.

use crate::config::GenerationSettings;
use shared::{generate_positions, Position};

/// Mixed into the session seed for health packs so they do not land on chests.
const HEALTH_PACK_SALT: u64 = 0x9E37_79B9_7F4A_7C15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Chest,
    HealthPack,
}

impl ItemKind {
    pub fn name(&self) -> &'static str {
        match self {
            ItemKind::Chest => "chest",
            ItemKind::HealthPack => "health pack",
        }
    }
}

pub fn generate_chest_positions(settings: &GenerationSettings, seed: i64) -> Vec<Position> {
    generate_positions(
        settings.width,
        settings.height,
        settings.max_chests,
        settings.radius,
        seed as u64,
    )
}

pub fn generate_health_pack_positions(settings: &GenerationSettings, seed: i64) -> Vec<Position> {
    generate_positions(
        settings.width,
        settings.height,
        settings.max_health_packs,
        settings.radius,
        (seed as u64) ^ HEALTH_PACK_SALT,
    )
}

pub fn generate_items(kind: ItemKind, settings: &GenerationSettings, seed: i64) -> Vec<Position> {
    match kind {
        ItemKind::Chest => generate_chest_positions(settings, seed),
        ItemKind::HealthPack => generate_health_pack_positions(settings, seed),
    }
}

/// Index of the item nearest to `target` that lies within `radius` of it.
pub fn nearest_within(items: &[Position], target: &Position, radius: f64) -> Option<usize> {
    let limit = radius * radius;
    items
        .iter()
        .enumerate()
        .map(|(index, item)| (index, item.distance_squared(target)))
        .filter(|(_, distance)| *distance <= limit)
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(index, _)| index)
}
