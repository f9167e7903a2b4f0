//! Combatant registry
//!
//! Owns the combatants of one encounter. Unknown ids are tolerated
//! everywhere: every mutator returns `None` (or `false`) instead of failing,
//! since stale ids routinely arrive from double-clicks and racing panels.

use std::collections::BTreeMap;

use serde::Serialize;

use super::combatant::{Combatant, CombatantId, CombatantKind};
use super::dice::DiceEngine;

/// Outcome of an initiative roll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InitiativeRoll {
    pub roll: u32,
    pub modifier: i32,
    pub total: i32,
}

/// Combatants of one encounter, iterated in insertion order
#[derive(Debug, Clone, Default)]
pub struct CombatantRegistry {
    // Ids are handed out monotonically, so key order is insertion order
    combatants: BTreeMap<CombatantId, Combatant>,
    next_id: u64,
}

impl CombatantRegistry {
    pub fn new() -> Self {
        Self {
            combatants: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Register a new combatant at full health
    pub fn add(
        &mut self,
        name: impl Into<String>,
        kind: CombatantKind,
        max_hp: u32,
        initiative_modifier: i32,
    ) -> CombatantId {
        let id = CombatantId(self.next_id.max(1));
        self.next_id = id.0.saturating_add(1);
        self.combatants.insert(
            id,
            Combatant::new(id, name, kind, max_hp, initiative_modifier),
        );
        id
    }

    /// Insert a fully-formed combatant (snapshot restore)
    pub(crate) fn insert(&mut self, mut combatant: Combatant) {
        combatant.sanitize();
        self.next_id = self.next_id.max(combatant.id.0.saturating_add(1));
        self.combatants.insert(combatant.id, combatant);
    }

    /// Remove a combatant; removing an unknown id is a no-op
    pub fn remove(&mut self, id: CombatantId) -> Option<Combatant> {
        self.combatants.remove(&id)
    }

    pub fn get(&self, id: CombatantId) -> Option<&Combatant> {
        self.combatants.get(&id)
    }

    pub fn contains(&self, id: CombatantId) -> bool {
        self.combatants.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Combatant> {
        self.combatants.values()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Combatant> {
        self.combatants.values_mut()
    }

    pub fn ids(&self) -> Vec<CombatantId> {
        self.combatants.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.combatants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.combatants.is_empty()
    }

    /// Next id that will be handed out
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    pub(crate) fn set_next_id(&mut self, next_id: u64) {
        self.next_id = self.next_id.max(next_id);
    }

    /// Subtract damage, stopping at zero. Returns the new HP.
    pub fn apply_damage(&mut self, id: CombatantId, amount: u32) -> Option<u32> {
        self.combatants.get_mut(&id).map(|c| c.take_damage(amount))
    }

    /// Heal up to max HP. Returns the amount actually healed.
    pub fn heal(&mut self, id: CombatantId, amount: u32) -> Option<u32> {
        self.combatants.get_mut(&id).map(|c| c.heal(amount))
    }

    /// Set HP directly, clamped to `[0, max_hp]`. Returns the signed change.
    pub fn set_hp(&mut self, id: CombatantId, value: i64) -> Option<i64> {
        self.combatants.get_mut(&id).map(|c| c.set_hp(value))
    }

    /// Returns true if the tag was newly added
    pub fn add_status(&mut self, id: CombatantId, tag: &str) -> bool {
        self.combatants
            .get_mut(&id)
            .is_some_and(|c| c.add_status(tag))
    }

    /// Returns true if the tag was present and removed
    pub fn remove_status(&mut self, id: CombatantId, tag: &str) -> bool {
        self.combatants
            .get_mut(&id)
            .is_some_and(|c| c.remove_status(tag))
    }

    /// Change a combatant's display name. Returns the old name.
    pub fn rename(&mut self, id: CombatantId, name: impl Into<String>) -> Option<String> {
        self.combatants
            .get_mut(&id)
            .map(|c| std::mem::replace(&mut c.name, name.into()))
    }

    /// Change maximum HP and/or initiative modifier. Returns false for an
    /// unknown id.
    pub fn update_stats(
        &mut self,
        id: CombatantId,
        max_hp: Option<u32>,
        initiative_modifier: Option<i32>,
    ) -> bool {
        let Some(combatant) = self.combatants.get_mut(&id) else {
            return false;
        };
        if let Some(max_hp) = max_hp {
            combatant.set_max_hp(max_hp);
        }
        if let Some(modifier) = initiative_modifier {
            combatant.initiative_modifier = modifier;
        }
        true
    }

    /// Roll one initiative die plus the combatant's modifier and store it
    pub fn roll_initiative(
        &mut self,
        id: CombatantId,
        dice: &mut DiceEngine,
        die_sides: u32,
    ) -> Option<InitiativeRoll> {
        let combatant = self.combatants.get_mut(&id)?;
        let roll = dice.roll_die(die_sides);
        let total = (roll as i32).saturating_add(combatant.initiative_modifier);
        combatant.initiative = Some(total);
        Some(InitiativeRoll {
            roll,
            modifier: combatant.initiative_modifier,
            total,
        })
    }

    pub(crate) fn clear_initiative(&mut self) {
        for combatant in self.combatants.values_mut() {
            combatant.initiative = None;
        }
    }

    pub(crate) fn clear(&mut self) {
        // next_id is kept so ids are never reused
        self.combatants.clear();
    }
}
