//! Encounter state machine
//!
//! Drives a single encounter through its lifecycle:
//! - Idle: combatants can be added, edited and have initiative rolled
//! - Active: exactly one combatant holds the turn, rounds advance
//!
//! Turn order is captured once when combat starts (initiative descending,
//! then initiative modifier descending, then insertion order) and walked
//! positionally after that. Damage-over-time tags fire once per round, at
//! the moment the turn wraps back to the top of the order.
//!
//! All mutation of combatants goes through [`EncounterState`].

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use super::combatant::{status_damage_type, status_name, Combatant, CombatantId, CombatantKind};
use super::dice::{DiceEngine, DIE_SIDES};
use super::log::{CombatLog, LogKind};
use super::registry::{CombatantRegistry, InitiativeRoll};
use super::scale::{self, Scale};

/// Structural misuse of the state machine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncounterError {
    #[error("cannot start combat with no combatants")]
    EmptyEncounter,

    #[error("combat is already active")]
    AlreadyActive,

    #[error("combat is not active")]
    CombatNotActive,

    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

/// Lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombatPhase {
    Idle,
    Active,
}

/// Tunable round rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundRules {
    /// Sides on the initiative die
    pub initiative_die: u32,
    /// Status tag -> damage applied at each round boundary
    pub damage_over_time: BTreeMap<String, u32>,
}

impl Default for RoundRules {
    fn default() -> Self {
        let mut damage_over_time = BTreeMap::new();
        damage_over_time.insert("burning".to_string(), 5);
        Self {
            initiative_die: DIE_SIDES,
            damage_over_time,
        }
    }
}

/// Notifications emitted after the state has changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EncounterEvent {
    CombatStarted {
        round: u32,
    },
    CombatEnded {
        round: u32,
    },
    RoundStarted {
        round: u32,
    },
    TurnChanged {
        previous: Option<CombatantId>,
        current: CombatantId,
        round: u32,
    },
    CombatantDying {
        id: CombatantId,
    },
    ScaleChanged {
        previous: Scale,
        current: Scale,
    },
}

/// Subscriber to encounter events
pub trait EncounterObserver: Send {
    fn notify(&mut self, event: &EncounterEvent);
}

impl<F> EncounterObserver for F
where
    F: FnMut(&EncounterEvent) + Send,
{
    fn notify(&mut self, event: &EncounterEvent) {
        self(event)
    }
}

/// Serializable picture of an encounter, for save/restore
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncounterSnapshot {
    pub combatants: Vec<Combatant>,
    pub round: u32,
    #[serde(default)]
    pub scale: Scale,
    pub is_active: bool,
    pub current_turn: Option<CombatantId>,
    #[serde(default)]
    pub turn_order: Vec<CombatantId>,
    #[serde(default)]
    pub log: CombatLog,
    #[serde(default)]
    pub next_id: u64,
}

/// One encounter: its combatants, rounds, turn holder and log
pub struct EncounterState {
    registry: CombatantRegistry,
    round: u32,
    scale: Scale,
    log: CombatLog,
    active: bool,
    /// Captured at start; empty while idle
    turn_order: Vec<CombatantId>,
    turn_index: usize,
    dice: DiceEngine,
    rules: RoundRules,
    observers: Vec<Box<dyn EncounterObserver>>,
}

impl std::fmt::Debug for EncounterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncounterState")
            .field("combatants", &self.registry.len())
            .field("round", &self.round)
            .field("scale", &self.scale)
            .field("active", &self.active)
            .field("current_turn", &self.current_turn())
            .finish_non_exhaustive()
    }
}

impl Default for EncounterState {
    fn default() -> Self {
        Self::new(DiceEngine::new(), RoundRules::default())
    }
}

fn initiative_cmp(a: &Combatant, b: &Combatant) -> Ordering {
    // Descending; combatants without initiative sort last
    b.initiative
        .cmp(&a.initiative)
        .then(b.initiative_modifier.cmp(&a.initiative_modifier))
}

impl EncounterState {
    /// Create an empty, idle encounter
    pub fn new(dice: DiceEngine, rules: RoundRules) -> Self {
        Self {
            registry: CombatantRegistry::new(),
            round: 1,
            scale: Scale::default(),
            log: CombatLog::new(),
            active: false,
            turn_order: Vec::new(),
            turn_index: 0,
            dice,
            rules,
            observers: Vec::new(),
        }
    }

    /// Start at a scale other than Personal, without logging a change
    pub fn with_scale(mut self, scale: Scale) -> Self {
        self.scale = scale;
        self
    }

    // ---- queries ----

    pub fn phase(&self) -> CombatPhase {
        if self.active {
            CombatPhase::Active
        } else {
            CombatPhase::Idle
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn scale(&self) -> Scale {
        self.scale
    }

    pub fn rules(&self) -> &RoundRules {
        &self.rules
    }

    pub fn log(&self) -> &CombatLog {
        &self.log
    }

    pub fn registry(&self) -> &CombatantRegistry {
        &self.registry
    }

    pub fn combatant(&self, id: CombatantId) -> Option<&Combatant> {
        self.registry.get(id)
    }

    pub fn combatants(&self) -> impl Iterator<Item = &Combatant> {
        self.registry.iter()
    }

    /// Combatant holding the turn, if combat is active
    pub fn current_turn(&self) -> Option<CombatantId> {
        if !self.active {
            return None;
        }
        self.turn_order.get(self.turn_index).copied()
    }

    pub fn current_combatant(&self) -> Option<&Combatant> {
        self.current_turn().and_then(|id| self.registry.get(id))
    }

    /// The captured turn order; empty while idle
    pub fn turn_order(&self) -> &[CombatantId] {
        &self.turn_order
    }

    /// Order the combatants would act in if combat started now
    pub fn initiative_order(&self) -> Vec<CombatantId> {
        let mut combatants: Vec<&Combatant> = self.registry.iter().collect();
        combatants.sort_by(|a, b| initiative_cmp(a, b));
        combatants.into_iter().map(|c| c.id).collect()
    }

    // ---- observers ----

    pub fn subscribe(&mut self, observer: impl EncounterObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    fn emit(&mut self, event: EncounterEvent) {
        for observer in &mut self.observers {
            observer.notify(&event);
        }
    }

    fn record(&mut self, kind: LogKind, message: impl Into<String>) {
        self.log.push(kind, self.round, message);
    }

    fn name_of(&self, id: CombatantId) -> String {
        self.registry
            .get(id)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| format!("#{}", id))
    }

    // ---- combatant operations ----

    /// Add a combatant. While combat is active its initiative is rolled
    /// immediately and it joins the turn order without reordering anyone.
    pub fn add_combatant(
        &mut self,
        name: impl Into<String>,
        kind: CombatantKind,
        max_hp: u32,
        initiative_modifier: i32,
    ) -> CombatantId {
        let id = self.registry.add(name, kind, max_hp, initiative_modifier);
        let name = self.name_of(id);
        self.record(LogKind::Add, format!("{} joined combat", name));

        if self.active {
            self.roll_initiative_logged(id);
            self.insert_into_order(id);
        }
        id
    }

    fn insert_into_order(&mut self, id: CombatantId) {
        let Some(newcomer) = self.registry.get(id) else {
            return;
        };
        let position = self
            .turn_order
            .iter()
            .position(|other| {
                self.registry
                    .get(*other)
                    .is_some_and(|o| initiative_cmp(newcomer, o) == Ordering::Less)
            })
            .unwrap_or(self.turn_order.len());

        self.turn_order.insert(position, id);
        if position <= self.turn_index {
            self.turn_index += 1;
        }
    }

    /// Remove a combatant; unknown ids are ignored
    ///
    /// Removing the turn holder passes the turn to whoever followed them.
    /// Removing the last combatant ends combat.
    pub fn remove_combatant(&mut self, id: CombatantId) -> Option<Combatant> {
        let removed = self.registry.remove(id)?;
        self.record(LogKind::Remove, format!("{} removed from combat", removed.name));

        if !self.active {
            return Some(removed);
        }

        let Some(position) = self.turn_order.iter().position(|other| *other == id) else {
            return Some(removed);
        };
        self.turn_order.remove(position);

        if self.turn_order.is_empty() {
            self.finish_combat();
            return Some(removed);
        }

        match position.cmp(&self.turn_index) {
            Ordering::Less => self.turn_index -= 1,
            Ordering::Greater => {}
            Ordering::Equal => {
                if self.turn_index >= self.turn_order.len() {
                    self.turn_index = 0;
                    self.begin_round();
                }
                self.announce_turn(Some(id));
            }
        }

        Some(removed)
    }

    /// Change a combatant's name. Returns the old name.
    pub fn rename(&mut self, id: CombatantId, name: impl Into<String>) -> Option<String> {
        let name = name.into();
        let old = self.registry.rename(id, name.clone())?;
        self.record(LogKind::Edit, format!("{} renamed to {}", old, name));
        Some(old)
    }

    /// Apply damage. Returns the new HP, or `None` for an unknown id.
    pub fn apply_damage(&mut self, id: CombatantId, amount: u32) -> Option<u32> {
        self.apply_typed_damage(id, amount, None)
    }

    /// Apply damage of a named type ("fire", "kinetic"...). The type only
    /// shows up in the log.
    pub fn apply_typed_damage(
        &mut self,
        id: CombatantId,
        amount: u32,
        damage_type: Option<&str>,
    ) -> Option<u32> {
        let name = self.registry.get(id)?.name.clone();
        let message = format!("{} takes {}", name, damage_phrase(amount, damage_type));
        self.damage_with_message(id, amount, message)
    }

    /// Apply damage dealt at another scale, converted to the encounter's
    /// current scale and rounded to whole hit points.
    pub fn apply_scaled_damage(
        &mut self,
        id: CombatantId,
        amount: f64,
        from: Scale,
        damage_type: Option<&str>,
    ) -> Option<u32> {
        let name = self.registry.get(id)?.name.clone();
        let converted = scale::convert(amount.max(0.0), from, self.scale);
        let hp_damage = converted.round() as u32;
        let phrase = damage_phrase(hp_damage, damage_type);
        let message = if from == self.scale {
            format!("{} takes {}", name, phrase)
        } else {
            format!(
                "{} takes {} ({} {}-scale -> {} {}-scale)",
                name, phrase, amount, from, converted, self.scale
            )
        };
        self.damage_with_message(id, hp_damage, message)
    }

    fn damage_with_message(&mut self, id: CombatantId, amount: u32, message: String) -> Option<u32> {
        let before = self.registry.get(id)?.current_hp();
        let after = self.registry.apply_damage(id, amount)?;
        self.record(LogKind::Damage, message);
        if before > 0 && after == 0 {
            self.mark_dying(id);
        }
        Some(after)
    }

    fn mark_dying(&mut self, id: CombatantId) {
        let name = self.name_of(id);
        self.record(LogKind::Death, format!("{} is dying!", name));
        info!("{} is dying", name);
        self.emit(EncounterEvent::CombatantDying { id });
    }

    /// Heal up to max HP. Returns the HP actually restored.
    pub fn heal(&mut self, id: CombatantId, amount: u32) -> Option<u32> {
        let healed = self.registry.heal(id, amount)?;
        let name = self.name_of(id);
        self.record(LogKind::Heal, format!("{} heals {} HP", name, healed));
        Some(healed)
    }

    /// Set HP directly (clamped). Returns the signed change.
    pub fn set_hp(&mut self, id: CombatantId, value: i64) -> Option<i64> {
        let before = self.registry.get(id)?.current_hp();
        let change = self.registry.set_hp(id, value)?;
        let name = self.name_of(id);
        match change.cmp(&0) {
            Ordering::Greater => self.record(LogKind::Heal, format!("{} heals {} HP", name, change)),
            Ordering::Less => {
                self.record(LogKind::Damage, format!("{} takes {} damage", name, -change))
            }
            Ordering::Equal => {}
        }
        if before > 0 && before as i64 + change == 0 {
            self.mark_dying(id);
        }
        Some(change)
    }

    /// Change a combatant's maximum HP and/or initiative modifier, e.g. after
    /// its character sheet was edited. Current HP is clamped into the new
    /// range. A running combat keeps its captured turn order.
    pub fn update_stats(
        &mut self,
        id: CombatantId,
        max_hp: Option<u32>,
        initiative_modifier: Option<i32>,
    ) -> Option<()> {
        if !self.registry.update_stats(id, max_hp, initiative_modifier) {
            return None;
        }
        let combatant = self.registry.get(id)?;
        let message = format!(
            "{} updated: max HP {}, initiative modifier {:+}",
            combatant.name,
            combatant.max_hp(),
            combatant.initiative_modifier
        );
        self.record(LogKind::Edit, message);
        Some(())
    }

    /// Add a status tag. Returns false if unknown id or already present.
    pub fn add_status(&mut self, id: CombatantId, tag: &str) -> bool {
        if !self.registry.add_status(id, tag) {
            return false;
        }
        let name = self.name_of(id);
        let tag = tag.trim().to_lowercase();
        self.record(LogKind::Status, format!("{} is {}", name, status_name(&tag)));
        true
    }

    /// Remove a status tag. Returns false if unknown id or not present.
    pub fn remove_status(&mut self, id: CombatantId, tag: &str) -> bool {
        if !self.registry.remove_status(id, tag) {
            return false;
        }
        let name = self.name_of(id);
        let tag = tag.trim().to_lowercase();
        self.record(
            LogKind::Status,
            format!("{} is no longer {}", name, status_name(&tag)),
        );
        true
    }

    // ---- initiative ----

    /// Roll initiative for one combatant. Only legal while idle.
    pub fn roll_initiative(
        &mut self,
        id: CombatantId,
    ) -> Result<Option<InitiativeRoll>, EncounterError> {
        if self.active {
            return Err(EncounterError::AlreadyActive);
        }
        Ok(self.roll_initiative_logged(id))
    }

    /// Roll initiative for everyone who has none. Only legal while idle.
    pub fn roll_all_initiative(
        &mut self,
    ) -> Result<Vec<(CombatantId, InitiativeRoll)>, EncounterError> {
        if self.active {
            return Err(EncounterError::AlreadyActive);
        }
        Ok(self.roll_missing_initiative())
    }

    /// Enter an initiative value by hand (or clear it). Only legal while idle.
    pub fn set_initiative(
        &mut self,
        id: CombatantId,
        initiative: Option<i32>,
    ) -> Result<bool, EncounterError> {
        if self.active {
            return Err(EncounterError::AlreadyActive);
        }
        let Some(combatant) = self.registry.iter_mut().find(|c| c.id == id) else {
            return Ok(false);
        };
        combatant.initiative = initiative;
        let name = combatant.name.clone();
        match initiative {
            Some(value) => self.record(LogKind::Roll, format!("{} initiative set to {}", name, value)),
            None => self.record(LogKind::Roll, format!("{} initiative cleared", name)),
        }
        Ok(true)
    }

    fn roll_initiative_logged(&mut self, id: CombatantId) -> Option<InitiativeRoll> {
        let roll = self
            .registry
            .roll_initiative(id, &mut self.dice, self.rules.initiative_die)?;
        let name = self.name_of(id);
        self.record(
            LogKind::Roll,
            format!(
                "{} rolled initiative: {} + {} = {}",
                name, roll.roll, roll.modifier, roll.total
            ),
        );
        Some(roll)
    }

    fn roll_missing_initiative(&mut self) -> Vec<(CombatantId, InitiativeRoll)> {
        let missing: Vec<CombatantId> = self
            .registry
            .iter()
            .filter(|c| c.initiative.is_none())
            .map(|c| c.id)
            .collect();

        missing
            .into_iter()
            .filter_map(|id| self.roll_initiative_logged(id).map(|roll| (id, roll)))
            .collect()
    }

    // ---- lifecycle ----

    /// Start combat. Returns the first turn holder.
    pub fn start(&mut self) -> Result<CombatantId, EncounterError> {
        if self.active {
            return Err(EncounterError::AlreadyActive);
        }
        if self.registry.is_empty() {
            return Err(EncounterError::EmptyEncounter);
        }

        self.roll_missing_initiative();

        self.round = 1;
        self.turn_order = self.initiative_order();
        self.turn_index = 0;
        self.active = true;

        self.record(LogKind::System, "Combat started!");
        info!(
            combatants = self.turn_order.len(),
            "combat started"
        );
        self.emit(EncounterEvent::CombatStarted { round: self.round });
        self.announce_turn(None);

        Ok(self.turn_order[0])
    }

    /// Pass the turn to the next combatant. Returns the new turn holder.
    pub fn next_turn(&mut self) -> Result<CombatantId, EncounterError> {
        if !self.active {
            return Err(EncounterError::CombatNotActive);
        }

        let previous = self.current_turn();
        self.turn_index += 1;
        if self.turn_index >= self.turn_order.len() {
            self.turn_index = 0;
            self.begin_round();
        }
        self.announce_turn(previous);

        self.current_turn().ok_or(EncounterError::CombatNotActive)
    }

    /// End combat. Initiative is cleared; HP and status effects carry over.
    pub fn end(&mut self) -> Result<(), EncounterError> {
        if !self.active {
            return Err(EncounterError::CombatNotActive);
        }
        self.finish_combat();
        Ok(())
    }

    fn finish_combat(&mut self) {
        self.active = false;
        self.turn_order.clear();
        self.turn_index = 0;
        self.registry.clear_initiative();
        self.record(LogKind::System, "Combat ended");
        info!(round = self.round, "combat ended");
        self.emit(EncounterEvent::CombatEnded { round: self.round });
    }

    /// Remove every combatant and reset the log. Only legal while idle.
    pub fn clear(&mut self) -> Result<(), EncounterError> {
        if self.active {
            return Err(EncounterError::AlreadyActive);
        }
        self.registry.clear();
        self.log.clear();
        self.round = 1;
        Ok(())
    }

    /// Change the encounter's scale
    pub fn set_scale(&mut self, scale: Scale) {
        if scale == self.scale {
            return;
        }
        let previous = self.scale;
        self.scale = scale;
        self.record(LogKind::Scale, format!("Combat scale changed to {}", scale));
        self.emit(EncounterEvent::ScaleChanged {
            previous,
            current: scale,
        });
    }

    fn announce_turn(&mut self, previous: Option<CombatantId>) {
        let Some(current) = self.current_turn() else {
            return;
        };
        let name = self.name_of(current);
        self.record(LogKind::Turn, format!("{}'s turn", name));
        debug!(round = self.round, "{}'s turn", name);
        self.emit(EncounterEvent::TurnChanged {
            previous,
            current,
            round: self.round,
        });
    }

    fn begin_round(&mut self) {
        self.round += 1;
        self.record(LogKind::System, format!("Round {} begins", self.round));
        debug!(round = self.round, "round started");
        self.emit(EncounterEvent::RoundStarted { round: self.round });
        self.process_round_effects();
    }

    fn process_round_effects(&mut self) {
        let mut hits: Vec<(CombatantId, String, u32)> = Vec::new();
        for combatant in self.registry.iter() {
            for (tag, damage) in &self.rules.damage_over_time {
                if combatant.has_status(tag) {
                    hits.push((combatant.id, tag.clone(), *damage));
                }
            }
        }

        for (id, tag, damage) in hits {
            let name = self.name_of(id);
            let phrase = damage_phrase(damage, status_damage_type(&tag));
            self.damage_with_message(id, damage, format!("{} takes {} from {}", name, phrase, tag));
        }
    }

    // ---- snapshots ----

    /// Capture the encounter as plain data
    pub fn snapshot(&self) -> EncounterSnapshot {
        EncounterSnapshot {
            combatants: self.registry.iter().cloned().collect(),
            round: self.round,
            scale: self.scale,
            is_active: self.active,
            current_turn: self.current_turn(),
            turn_order: self.turn_order.clone(),
            log: self.log.clone(),
            next_id: self.registry.next_id(),
        }
    }

    /// Rebuild an encounter from a snapshot
    ///
    /// An active snapshot without a stored turn order gets one derived
    /// from initiative, as if combat had just started.
    pub fn from_snapshot(
        snapshot: EncounterSnapshot,
        dice: DiceEngine,
        rules: RoundRules,
    ) -> Result<Self, EncounterError> {
        let mut state = Self::new(dice, rules);

        if snapshot.next_id == u64::MAX {
            return Err(EncounterError::InvalidSnapshot(
                "combatant ids exhausted".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for combatant in snapshot.combatants {
            if combatant.id.0 == u64::MAX {
                return Err(EncounterError::InvalidSnapshot(format!(
                    "combatant id {} out of range",
                    combatant.id
                )));
            }
            if !seen.insert(combatant.id) {
                return Err(EncounterError::InvalidSnapshot(format!(
                    "duplicate combatant id {}",
                    combatant.id
                )));
            }
            state.registry.insert(combatant);
        }
        state.registry.set_next_id(snapshot.next_id);

        state.round = snapshot.round.max(1);
        state.scale = snapshot.scale;
        state.log = snapshot.log;

        if !snapshot.is_active {
            return Ok(state);
        }

        if state.registry.is_empty() {
            return Err(EncounterError::InvalidSnapshot(
                "active encounter has no combatants".to_string(),
            ));
        }

        let order = if snapshot.turn_order.is_empty() {
            state.initiative_order()
        } else {
            let listed: HashSet<CombatantId> = snapshot.turn_order.iter().copied().collect();
            if listed.len() != snapshot.turn_order.len()
                || listed.len() != state.registry.len()
                || !listed.iter().all(|id| state.registry.contains(*id))
            {
                return Err(EncounterError::InvalidSnapshot(
                    "turn order does not match combatants".to_string(),
                ));
            }
            snapshot.turn_order
        };

        let turn_index = match snapshot.current_turn {
            Some(current) => order.iter().position(|id| *id == current).ok_or_else(|| {
                EncounterError::InvalidSnapshot(format!("unknown turn holder {}", current))
            })?,
            None => 0,
        };

        state.turn_order = order;
        state.turn_index = turn_index;
        state.active = true;
        Ok(state)
    }
}

/// "5 damage" or "5 fire damage"
fn damage_phrase(amount: u32, damage_type: Option<&str>) -> String {
    match damage_type {
        Some(kind) if !kind.trim().is_empty() => format!("{} {} damage", amount, kind.trim()),
        _ => format!("{} damage", amount),
    }
}
