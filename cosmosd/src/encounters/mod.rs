//! Encounter manager
//!
//! Holds every live encounter of the daemon:
//! - Each encounter sits behind its own lock, so mutations of one
//!   encounter are serialized while different encounters proceed in parallel
//! - Snapshots are written to SQLite after every mutation (when configured)
//! - A shared dice engine and roll history serve free-standing rolls

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::combat::{
    parse_formula, CombatPhase, DiceEngine, DiceRollResult, EncounterError, EncounterEvent,
    EncounterSnapshot, EncounterState, FormulaError, FormulaResult, RollHistory, RollMode, Scale,
};
use crate::config::RulesConfig;
use crate::db::Database;

/// Errors from manager operations
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("encounter not found: {0}")]
    NotFound(Uuid),

    #[error("combatant not found: {0}")]
    CombatantNotFound(u64),

    #[error(transparent)]
    Encounter(#[from] EncounterError),
}

/// Listing entry for an encounter
#[derive(Debug, Clone, Serialize)]
pub struct EncounterSummary {
    pub id: Uuid,
    pub name: String,
    pub phase: CombatPhase,
    pub round: u32,
    pub scale: Scale,
    pub combatants: usize,
    pub created_at: DateTime<Utc>,
}

/// Result of a mutation together with the events it produced
#[derive(Debug, Clone)]
pub struct Mutation<R> {
    pub result: R,
    pub events: Vec<EncounterEvent>,
}

struct Entry {
    name: String,
    created_at: DateTime<Utc>,
    state: EncounterState,
    events: Arc<Mutex<Vec<EncounterEvent>>>,
}

impl Entry {
    fn summary(&self, id: Uuid) -> EncounterSummary {
        EncounterSummary {
            id,
            name: self.name.clone(),
            phase: self.state.phase(),
            round: self.state.round(),
            scale: self.state.scale(),
            combatants: self.state.registry().len(),
            created_at: self.created_at,
        }
    }
}

struct Slot {
    entry: Mutex<Entry>,
    /// Held across a mutation and its persistence so saves land in order
    write: tokio::sync::Mutex<()>,
}

impl Slot {
    fn new(entry: Entry) -> Arc<Self> {
        Arc::new(Self {
            entry: Mutex::new(entry),
            write: tokio::sync::Mutex::new(()),
        })
    }
}

/// Registry of live encounters
pub struct EncounterManager {
    encounters: RwLock<HashMap<Uuid, Arc<Slot>>>,
    db: Option<Arc<Database>>,
    rules: RulesConfig,
    dice: Mutex<DiceEngine>,
    history: Mutex<RollHistory>,
}

impl EncounterManager {
    /// Create a manager; `db` enables snapshot persistence
    pub fn new(db: Option<Arc<Database>>, rules: RulesConfig) -> Self {
        let history = RollHistory::new(rules.history_limit);
        Self {
            encounters: RwLock::new(HashMap::new()),
            db,
            rules,
            dice: Mutex::new(DiceEngine::new()),
            history: Mutex::new(history),
        }
    }

    /// Create a shared instance
    pub fn shared(db: Option<Arc<Database>>, rules: RulesConfig) -> Arc<Self> {
        Arc::new(Self::new(db, rules))
    }

    pub fn rules(&self) -> &RulesConfig {
        &self.rules
    }

    fn new_state(&self) -> EncounterState {
        EncounterState::new(DiceEngine::new(), self.rules.round_rules())
            .with_scale(self.rules.default_scale)
    }

    fn restore_state(&self, snapshot: EncounterSnapshot) -> Result<EncounterState, EncounterError> {
        EncounterState::from_snapshot(snapshot, DiceEngine::new(), self.rules.round_rules())
    }

    /// Wrap a state machine, collecting its events for the caller
    fn wire(name: String, created_at: DateTime<Utc>, mut state: EncounterState) -> Entry {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        state.subscribe(move |event: &EncounterEvent| {
            debug!(?event, "encounter event");
            sink.lock().push(event.clone());
        });

        Entry {
            name,
            created_at,
            state,
            events,
        }
    }

    async fn insert(&self, id: Uuid, entry: Entry) -> EncounterSummary {
        let summary = entry.summary(id);
        let snapshot = self.db.as_ref().map(|_| entry.state.snapshot());
        self.encounters.write().await.insert(id, Slot::new(entry));

        if let Some(snapshot) = snapshot {
            self.persist(id, &summary.name, &snapshot).await;
        }
        summary
    }

    /// Reload every stored encounter. Returns how many were restored.
    pub async fn load_from_db(&self) -> anyhow::Result<usize> {
        let Some(db) = self.db.as_ref() else {
            return Ok(0);
        };

        let rows = db.load_encounters().await?;
        let mut restored = 0;
        for row in rows {
            let id = match Uuid::parse_str(&row.id) {
                Ok(id) => id,
                Err(e) => {
                    warn!("Skipping encounter with bad id {}: {}", row.id, e);
                    continue;
                }
            };
            let snapshot: EncounterSnapshot = match serde_json::from_str(&row.snapshot) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!("Skipping unreadable encounter {}: {}", id, e);
                    continue;
                }
            };
            let created_at =
                chrono::NaiveDateTime::parse_from_str(&row.created_at, "%Y-%m-%d %H:%M:%S")
                    .map(|naive| naive.and_utc())
                    .unwrap_or_else(|_| Utc::now());

            match self.restore_state(snapshot) {
                Ok(state) => {
                    let entry = Self::wire(row.name, created_at, state);
                    self.encounters.write().await.insert(id, Slot::new(entry));
                    restored += 1;
                }
                Err(e) => warn!("Skipping invalid encounter {}: {}", id, e),
            }
        }

        info!("Restored {} encounters", restored);
        Ok(restored)
    }

    async fn persist(&self, id: Uuid, name: &str, snapshot: &EncounterSnapshot) {
        let Some(db) = self.db.as_ref() else {
            return;
        };
        let json = match serde_json::to_string(snapshot) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to encode encounter {}: {}", id, e);
                return;
            }
        };
        if let Err(e) = db.save_encounter(id, name, &json).await {
            warn!("Failed to persist encounter {}: {}", id, e);
        }
    }

    async fn slot(&self, id: Uuid) -> Result<Arc<Slot>, ManagerError> {
        self.encounters
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(ManagerError::NotFound(id))
    }

    // ---- encounter lifecycle ----

    /// Create an empty encounter
    pub async fn create(&self, name: impl Into<String>) -> EncounterSummary {
        let id = Uuid::new_v4();
        let name = name.into();
        info!("Creating encounter {} ({})", name, id);
        let entry = Self::wire(name, Utc::now(), self.new_state());
        self.insert(id, entry).await
    }

    /// Create an encounter from a snapshot
    pub async fn import(
        &self,
        name: impl Into<String>,
        snapshot: EncounterSnapshot,
    ) -> Result<EncounterSummary, ManagerError> {
        let id = Uuid::new_v4();
        let state = self.restore_state(snapshot)?;
        let entry = Self::wire(name.into(), Utc::now(), state);
        info!("Imported encounter {} ({})", entry.name, id);
        Ok(self.insert(id, entry).await)
    }

    /// All encounters, oldest first
    pub async fn list(&self) -> Vec<EncounterSummary> {
        let slots: Vec<(Uuid, Arc<Slot>)> = self
            .encounters
            .read()
            .await
            .iter()
            .map(|(id, slot)| (*id, slot.clone()))
            .collect();

        let mut summaries: Vec<EncounterSummary> = slots
            .into_iter()
            .map(|(id, slot)| slot.entry.lock().summary(id))
            .collect();
        summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        summaries
    }

    pub async fn summary(&self, id: Uuid) -> Result<EncounterSummary, ManagerError> {
        let slot = self.slot(id).await?;
        let summary = slot.entry.lock().summary(id);
        Ok(summary)
    }

    /// Delete an encounter and its stored snapshot
    pub async fn delete(&self, id: Uuid) -> Result<(), ManagerError> {
        let slot = self
            .encounters
            .write()
            .await
            .remove(&id)
            .ok_or(ManagerError::NotFound(id))?;

        // wait out any in-flight mutation before dropping the row
        let _write = slot.write.lock().await;
        if let Some(db) = self.db.as_ref() {
            if let Err(e) = db.delete_encounter(id).await {
                warn!("Failed to delete encounter {} from DB: {}", id, e);
            }
        }
        info!("Deleted encounter {}", id);
        Ok(())
    }

    /// Rename an encounter
    pub async fn rename(&self, id: Uuid, name: impl Into<String>) -> Result<EncounterSummary, ManagerError> {
        let name = name.into();
        self.mutate_entry(id, move |entry| entry.name = name).await?;
        self.summary(id).await
    }

    // ---- state access ----

    /// Run a read-only closure against an encounter
    pub async fn read<R>(
        &self,
        id: Uuid,
        f: impl FnOnce(&str, &EncounterState) -> R,
    ) -> Result<R, ManagerError> {
        let slot = self.slot(id).await?;
        let entry = slot.entry.lock();
        Ok(f(&entry.name, &entry.state))
    }

    /// Run a mutation against an encounter, then persist its snapshot
    pub async fn mutate<R>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut EncounterState) -> R,
    ) -> Result<Mutation<R>, ManagerError> {
        self.mutate_entry(id, |entry| f(&mut entry.state)).await
    }

    async fn mutate_entry<R>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut Entry) -> R,
    ) -> Result<Mutation<R>, ManagerError> {
        let slot = self.slot(id).await?;
        let _write = slot.write.lock().await;
        if !self.encounters.read().await.contains_key(&id) {
            return Err(ManagerError::NotFound(id));
        }

        let (result, events, name, snapshot) = {
            let mut entry = slot.entry.lock();
            let result = f(&mut *entry);
            let events = std::mem::take(&mut *entry.events.lock());
            let snapshot = self.db.as_ref().map(|_| entry.state.snapshot());
            (result, events, entry.name.clone(), snapshot)
        };

        if let Some(snapshot) = snapshot {
            self.persist(id, &name, &snapshot).await;
        }
        Ok(Mutation { result, events })
    }

    /// Replace an encounter's state with a snapshot
    pub async fn restore(
        &self,
        id: Uuid,
        snapshot: EncounterSnapshot,
    ) -> Result<EncounterSummary, ManagerError> {
        let slot = self.slot(id).await?;
        let (name, created_at) = {
            let entry = slot.entry.lock();
            (entry.name.clone(), entry.created_at)
        };
        let fresh = Self::wire(name, created_at, self.restore_state(snapshot)?);
        self.mutate_entry(id, move |entry| *entry = fresh).await?;
        self.summary(id).await
    }

    // ---- free-standing dice ----

    /// Roll a resolution check (2d10, or 3d10 keep two) and record the result
    pub fn roll(&self, modifier: i32, target_number: i32, mode: RollMode) -> DiceRollResult {
        let result = self.dice.lock().roll(modifier, target_number, mode);
        self.history.lock().push(result.clone());
        result
    }

    /// Up to `limit` recent rolls, newest first
    pub fn history(&self, limit: usize) -> Vec<DiceRollResult> {
        self.history.lock().entries().take(limit).cloned().collect()
    }

    pub fn clear_history(&self) {
        self.history.lock().clear();
    }

    /// Parse and roll a dice formula
    pub fn evaluate(
        &self,
        formula: &str,
        attributes: &HashMap<String, i32>,
    ) -> Result<FormulaResult, FormulaError> {
        let formula = parse_formula(formula)?;
        formula.evaluate(&mut self.dice.lock(), attributes)
    }
}
