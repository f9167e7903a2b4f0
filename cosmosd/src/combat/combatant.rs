//! Combatants
//!
//! A participant in an encounter: identity, hit points, initiative and
//! status tags. Hit points are kept in `[0, max_hp]` by every mutator.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Encounter-local combatant identifier, never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CombatantId(pub u64);

impl std::fmt::Display for CombatantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CombatantId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(CombatantId)
    }
}

/// Which side a combatant fights on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombatantKind {
    Player,
    Ally,
    #[default]
    Npc,
    Enemy,
}

impl FromStr for CombatantKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "player" | "pc" => Ok(CombatantKind::Player),
            "ally" => Ok(CombatantKind::Ally),
            "npc" => Ok(CombatantKind::Npc),
            "enemy" | "foe" => Ok(CombatantKind::Enemy),
            other => Err(format!("unknown combatant type: {}", other)),
        }
    }
}

impl std::fmt::Display for CombatantKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CombatantKind::Player => "player",
            CombatantKind::Ally => "ally",
            CombatantKind::Npc => "npc",
            CombatantKind::Enemy => "enemy",
        };
        write!(f, "{}", s)
    }
}

/// Coarse health band derived from the HP percentage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    /// Above 75%
    Healthy,
    /// Above 50%
    Wounded,
    /// Above 25%
    Injured,
    /// Above 0%
    Critical,
    /// At 0 HP
    Dying,
}

impl HealthState {
    pub fn from_hp(current: u32, max: u32) -> Self {
        if current == 0 || max == 0 {
            return HealthState::Dying;
        }
        let percentage = current as f64 / max as f64 * 100.0;
        if percentage > 75.0 {
            HealthState::Healthy
        } else if percentage > 50.0 {
            HealthState::Wounded
        } else if percentage > 25.0 {
            HealthState::Injured
        } else {
            HealthState::Critical
        }
    }
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HealthState::Healthy => "Healthy",
            HealthState::Wounded => "Wounded",
            HealthState::Injured => "Injured",
            HealthState::Critical => "Critical",
            HealthState::Dying => "Dying",
        };
        write!(f, "{}", s)
    }
}

/// Status tags with a display name
pub const KNOWN_STATUSES: &[(&str, &str)] = &[
    ("stunned", "Stunned"),
    ("prone", "Prone"),
    ("burning", "Burning"),
    ("frozen", "Frozen"),
    ("invisible", "Invisible"),
    ("cover", "In Cover"),
    ("flying", "Flying"),
    ("concentrating", "Concentrating"),
];

/// Display name for a status tag; unknown tags display as themselves
pub fn status_name(tag: &str) -> &str {
    KNOWN_STATUSES
        .iter()
        .find(|(known, _)| *known == tag)
        .map(|(_, name)| *name)
        .unwrap_or(tag)
}

/// Damage type dealt by a damage-over-time status, for log messages
pub fn status_damage_type(tag: &str) -> Option<&'static str> {
    match tag {
        "burning" => Some("fire"),
        "frozen" => Some("cold"),
        _ => None,
    }
}

/// Normalize a status tag for storage and comparison
pub fn normalize_status(tag: &str) -> String {
    tag.trim().to_lowercase()
}

/// A participant in an encounter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Combatant {
    pub id: CombatantId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: CombatantKind,
    current_hp: u32,
    max_hp: u32,
    pub initiative: Option<i32>,
    pub initiative_modifier: i32,
    /// Active status tags, in the order they were applied
    status_effects: Vec<String>,
}

impl Combatant {
    /// Create a combatant at full health with no initiative
    pub fn new(
        id: CombatantId,
        name: impl Into<String>,
        kind: CombatantKind,
        max_hp: u32,
        initiative_modifier: i32,
    ) -> Self {
        let max_hp = max_hp.max(1);
        Self {
            id,
            name: name.into(),
            kind,
            current_hp: max_hp,
            max_hp,
            initiative: None,
            initiative_modifier,
            status_effects: Vec::new(),
        }
    }

    pub fn current_hp(&self) -> u32 {
        self.current_hp
    }

    pub fn max_hp(&self) -> u32 {
        self.max_hp
    }

    pub fn status_effects(&self) -> &[String] {
        &self.status_effects
    }

    pub fn has_status(&self, tag: &str) -> bool {
        let tag = normalize_status(tag);
        self.status_effects.iter().any(|s| *s == tag)
    }

    pub fn health_state(&self) -> HealthState {
        HealthState::from_hp(self.current_hp, self.max_hp)
    }

    pub fn is_dying(&self) -> bool {
        self.current_hp == 0
    }

    /// Subtract damage, stopping at zero. Returns the new HP.
    pub fn take_damage(&mut self, amount: u32) -> u32 {
        self.current_hp = self.current_hp.saturating_sub(amount);
        self.current_hp
    }

    /// Heal up to max HP. Returns the amount actually healed.
    pub fn heal(&mut self, amount: u32) -> u32 {
        let actual = amount.min(self.max_hp - self.current_hp);
        self.current_hp += actual;
        actual
    }

    /// Set HP directly, clamped into range. Returns the signed change.
    pub fn set_hp(&mut self, value: i64) -> i64 {
        let clamped = value.clamp(0, self.max_hp as i64) as u32;
        let change = clamped as i64 - self.current_hp as i64;
        self.current_hp = clamped;
        change
    }

    /// Change maximum HP (at least 1). Current HP is clamped into the new range.
    pub fn set_max_hp(&mut self, max_hp: u32) {
        self.max_hp = max_hp.max(1);
        self.current_hp = self.current_hp.min(self.max_hp);
    }

    /// Returns false if the tag was already present
    pub fn add_status(&mut self, tag: &str) -> bool {
        let tag = normalize_status(tag);
        if tag.is_empty() || self.status_effects.contains(&tag) {
            return false;
        }
        self.status_effects.push(tag);
        true
    }

    /// Returns false if the tag was not present
    pub fn remove_status(&mut self, tag: &str) -> bool {
        let tag = normalize_status(tag);
        let before = self.status_effects.len();
        self.status_effects.retain(|s| *s != tag);
        self.status_effects.len() != before
    }

    /// Restore invariants after deserializing untrusted data
    pub(crate) fn sanitize(&mut self) {
        self.max_hp = self.max_hp.max(1);
        self.current_hp = self.current_hp.min(self.max_hp);
        let mut seen = Vec::with_capacity(self.status_effects.len());
        for tag in self.status_effects.drain(..) {
            let tag = normalize_status(&tag);
            if !tag.is_empty() && !seen.contains(&tag) {
                seen.push(tag);
            }
        }
        self.status_effects = seen;
    }
}
