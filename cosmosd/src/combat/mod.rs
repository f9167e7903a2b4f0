//! Combat and scale resolution core
//!
//! Everything needed to run an encounter without any I/O:
//! - Dice rolling against a target number (2d10, advantage/disadvantage keep
//!   two of 3d10)
//! - A small dice formula language ("2d10+@agility")
//! - Damage conversion between power scales
//! - Combatants, their registry, and the combat log
//! - The encounter state machine (rounds, turns, round effects)

mod combatant;
mod dice;
mod encounter;
mod formula;
mod log;
mod registry;
mod scale;

pub use combatant::{
    normalize_status, status_damage_type, status_name, Combatant, CombatantId, CombatantKind,
    HealthState, KNOWN_STATUSES,
};
pub use dice::{
    DiceEngine, DiceRollResult, RollHistory, RollMode, SuccessDegree, CRITICAL_FAILURE,
    CRITICAL_SUCCESS, DEFAULT_HISTORY_LIMIT, DIE_SIDES,
};
pub use encounter::{
    CombatPhase, EncounterError, EncounterEvent, EncounterObserver, EncounterSnapshot,
    EncounterState, RoundRules,
};
pub use formula::{
    parse_formula, Formula, FormulaError, FormulaResult, Keep, Term, TermOutcome, MAX_DICE,
    MAX_SIDES, MAX_TERMS,
};
pub use log::{CombatLog, LogEntry, LogKind};
pub use registry::{CombatantRegistry, InitiativeRoll};
pub use scale::{convert, ratio, Conversion, Scale, ScaleEffect, ScaleInfo};
