//! Encounter and combatant endpoints
//!
//! Every mutating endpoint answers with the operation's result, the events
//! it raised, and the encounter state afterwards.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{ApiError, ApiJson};
use super::AppState;
use crate::combat::{
    CombatPhase, Combatant, CombatantId, CombatantKind, EncounterEvent, EncounterSnapshot,
    EncounterState, HealthState, InitiativeRoll, LogEntry, LogKind, Scale,
};
use crate::encounters::ManagerError;

/// Build encounter router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/encounters", get(list).post(create))
        .route("/encounters/import", post(import))
        .route(
            "/encounters/{id}",
            get(show).patch(rename_encounter).delete(delete),
        )
        .route("/encounters/{id}/snapshot", get(export).put(restore))
        .route("/encounters/{id}/log", get(log))
        .route("/encounters/{id}/start", post(start))
        .route("/encounters/{id}/next", post(next_turn))
        .route("/encounters/{id}/end", post(end))
        .route("/encounters/{id}/clear", post(clear))
        .route("/encounters/{id}/initiative", post(roll_all_initiative))
        .route("/encounters/{id}/scale", put(set_scale))
        .route(
            "/encounters/{id}/combatants",
            get(list_combatants).post(add_combatant),
        )
        .route(
            "/encounters/{id}/combatants/{cid}",
            get(show_combatant)
                .patch(update_combatant)
                .delete(remove_combatant),
        )
        .route("/encounters/{id}/combatants/{cid}/damage", post(damage))
        .route("/encounters/{id}/combatants/{cid}/heal", post(heal))
        .route("/encounters/{id}/combatants/{cid}/hp", put(set_hp))
        .route("/encounters/{id}/combatants/{cid}/status", post(add_status))
        .route(
            "/encounters/{id}/combatants/{cid}/status/{tag}",
            axum::routing::delete(remove_status),
        )
        .route(
            "/encounters/{id}/combatants/{cid}/initiative",
            post(roll_initiative).put(set_initiative),
        )
}

// ---- views ----

/// A combatant with its derived health band
#[derive(Debug, Serialize)]
pub struct CombatantView {
    #[serde(flatten)]
    pub combatant: Combatant,
    pub health: HealthState,
    pub is_current: bool,
}

impl CombatantView {
    fn of(combatant: &Combatant, current: Option<CombatantId>) -> Self {
        Self {
            health: combatant.health_state(),
            is_current: current == Some(combatant.id),
            combatant: combatant.clone(),
        }
    }
}

/// Encounter state as shown to clients
#[derive(Debug, Serialize)]
pub struct StateView {
    pub phase: CombatPhase,
    pub round: u32,
    pub scale: Scale,
    pub current_turn: Option<CombatantId>,
    pub turn_order: Vec<CombatantId>,
    /// In turn order while active, initiative order while idle
    pub combatants: Vec<CombatantView>,
}

impl StateView {
    fn of(state: &EncounterState) -> Self {
        let current = state.current_turn();
        let order = if state.is_active() {
            state.turn_order().to_vec()
        } else {
            state.initiative_order()
        };
        let combatants = order
            .iter()
            .filter_map(|id| state.combatant(*id))
            .map(|c| CombatantView::of(c, current))
            .collect();

        Self {
            phase: state.phase(),
            round: state.round(),
            scale: state.scale(),
            current_turn: current,
            turn_order: state.turn_order().to_vec(),
            combatants,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EncounterView {
    pub id: Uuid,
    pub name: String,
    #[serde(flatten)]
    pub state: StateView,
}

/// Response to a mutating request
#[derive(Debug, Serialize)]
pub struct ActionResponse<T> {
    pub result: T,
    pub events: Vec<EncounterEvent>,
    pub state: StateView,
}

fn missing(cid: CombatantId) -> ApiError {
    ManagerError::CombatantNotFound(cid.0).into()
}

/// Run an operation against one encounter and describe the outcome
async fn act<T, F>(state: &AppState, id: Uuid, op: F) -> Result<Json<ActionResponse<T>>, ApiError>
where
    T: Serialize + Send,
    F: FnOnce(&mut EncounterState) -> Result<T, ApiError> + Send,
{
    let mutation = state
        .encounters
        .mutate(id, |encounter| {
            let result = op(encounter);
            (result, StateView::of(encounter))
        })
        .await?;

    let (result, view) = mutation.result;
    Ok(Json(ActionResponse {
        result: result?,
        events: mutation.events,
        state: view,
    }))
}

fn non_negative(amount: f64) -> Result<f64, ApiError> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(ApiError::BadRequest(
            "amount must be a non-negative number".into(),
        ));
    }
    Ok(amount)
}

fn non_empty(value: &str, what: &str) -> Result<String, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::BadRequest(format!("{} must not be empty", what)));
    }
    Ok(trimmed.to_string())
}

// ---- encounters ----

async fn list(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.encounters.list().await)
}

#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    #[serde(default)]
    pub name: Option<String>,
}

async fn create(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = match req.name {
        Some(name) => non_empty(&name, "name")?,
        None => "Untitled Encounter".to_string(),
    };
    let summary = state.encounters.create(name).await;
    Ok((StatusCode::CREATED, Json(summary)))
}

async fn show(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let view = state
        .encounters
        .read(id, |name, encounter| EncounterView {
            id,
            name: name.to_string(),
            state: StateView::of(encounter),
        })
        .await?;
    Ok(Json(view))
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub name: String,
}

async fn rename_encounter(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ApiJson(req): ApiJson<RenameRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = non_empty(&req.name, "name")?;
    Ok(Json(state.encounters.rename(id, name).await?))
}

async fn delete(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.encounters.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn export(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let snapshot = state.encounters.read(id, |_, e| e.snapshot()).await?;
    Ok(Json(snapshot))
}

async fn restore(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ApiJson(snapshot): ApiJson<EncounterSnapshot>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.encounters.restore(id, snapshot).await?))
}

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    pub name: String,
    pub snapshot: EncounterSnapshot,
}

async fn import(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ImportRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = non_empty(&req.name, "name")?;
    let summary = state.encounters.import(name, req.snapshot).await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    pub limit: Option<usize>,
    pub kind: Option<LogKind>,
}

/// Log entries, oldest first; `limit` keeps only the most recent
async fn log(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<LogQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let entries = state
        .encounters
        .read(id, |_, encounter| {
            let mut entries: Vec<LogEntry> = encounter
                .log()
                .entries()
                .iter()
                .rev()
                .filter(|e| query.kind.map_or(true, |kind| e.kind == kind))
                .take(query.limit.unwrap_or(usize::MAX))
                .cloned()
                .collect();
            entries.reverse();
            entries
        })
        .await?;
    Ok(Json(entries))
}

// ---- lifecycle ----

async fn start(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    act(&state, id, |e| Ok(e.start()?)).await
}

async fn next_turn(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    act(&state, id, |e| Ok(e.next_turn()?)).await
}

async fn end(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    act(&state, id, |e| Ok(e.end()?)).await
}

async fn clear(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    act(&state, id, |e| Ok(e.clear()?)).await
}

#[derive(Debug, Serialize)]
struct InitiativeResult {
    id: CombatantId,
    #[serde(flatten)]
    roll: InitiativeRoll,
}

async fn roll_all_initiative(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    act(&state, id, |e| {
        let rolls = e.roll_all_initiative()?;
        Ok(rolls
            .into_iter()
            .map(|(id, roll)| InitiativeResult { id, roll })
            .collect::<Vec<_>>())
    })
    .await
}

#[derive(Debug, Deserialize)]
pub struct ScaleRequest {
    pub scale: Scale,
}

async fn set_scale(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ApiJson(req): ApiJson<ScaleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    act(&state, id, move |e| {
        e.set_scale(req.scale);
        Ok(e.scale())
    })
    .await
}

// ---- combatants ----

async fn list_combatants(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let view = state.encounters.read(id, |_, e| StateView::of(e)).await?;
    Ok(Json(view.combatants))
}

#[derive(Debug, Deserialize)]
pub struct AddCombatantRequest {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: CombatantKind,
    pub max_hp: u32,
    #[serde(default)]
    pub initiative_modifier: i32,
}

async fn add_combatant(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ApiJson(req): ApiJson<AddCombatantRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = non_empty(&req.name, "name")?;
    if req.max_hp == 0 {
        return Err(ApiError::BadRequest("max_hp must be at least 1".into()));
    }

    let response = act(&state, id, move |e| {
        let cid = e.add_combatant(name, req.kind, req.max_hp, req.initiative_modifier);
        let current = e.current_turn();
        e.combatant(cid)
            .map(|c| CombatantView::of(c, current))
            .ok_or_else(|| missing(cid))
    })
    .await?;
    Ok((StatusCode::CREATED, response))
}

async fn show_combatant(
    State(state): State<AppState>,
    Path((id, cid)): Path<(Uuid, u64)>,
) -> Result<impl IntoResponse, ApiError> {
    let cid = CombatantId(cid);
    let view = state
        .encounters
        .read(id, |_, e| {
            e.combatant(cid)
                .map(|c| CombatantView::of(c, e.current_turn()))
        })
        .await?
        .ok_or_else(|| missing(cid))?;
    Ok(Json(view))
}

#[derive(Debug, Deserialize)]
pub struct UpdateCombatantRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub max_hp: Option<u32>,
    #[serde(default)]
    pub initiative_modifier: Option<i32>,
}

/// Rename a combatant and/or sync its stats from an edited character
async fn update_combatant(
    State(state): State<AppState>,
    Path((id, cid)): Path<(Uuid, u64)>,
    ApiJson(req): ApiJson<UpdateCombatantRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let cid = CombatantId(cid);
    let name = req.name.as_deref().map(|n| non_empty(n, "name")).transpose()?;
    if req.max_hp == Some(0) {
        return Err(ApiError::BadRequest("max_hp must be at least 1".into()));
    }
    if name.is_none() && req.max_hp.is_none() && req.initiative_modifier.is_none() {
        return Err(ApiError::BadRequest("nothing to update".into()));
    }

    act(&state, id, move |e| {
        if let Some(name) = name {
            e.rename(cid, name).ok_or_else(|| missing(cid))?;
        }
        if req.max_hp.is_some() || req.initiative_modifier.is_some() {
            e.update_stats(cid, req.max_hp, req.initiative_modifier)
                .ok_or_else(|| missing(cid))?;
        }
        let current = e.current_turn();
        e.combatant(cid)
            .map(|c| CombatantView::of(c, current))
            .ok_or_else(|| missing(cid))
    })
    .await
}

async fn remove_combatant(
    State(state): State<AppState>,
    Path((id, cid)): Path<(Uuid, u64)>,
) -> Result<impl IntoResponse, ApiError> {
    let cid = CombatantId(cid);
    act(&state, id, move |e| e.remove_combatant(cid).ok_or_else(|| missing(cid))).await
}

#[derive(Debug, Deserialize)]
pub struct DamageRequest {
    pub amount: f64,
    /// Scale the damage was dealt at; defaults to the encounter's scale
    #[serde(default)]
    pub from_scale: Option<Scale>,
    /// Free-form damage type for the log ("fire", "kinetic")
    #[serde(default)]
    pub damage_type: Option<String>,
}

#[derive(Debug, Serialize)]
struct HpResult {
    current_hp: u32,
    health: HealthState,
}

fn hp_result(e: &EncounterState, cid: CombatantId) -> Result<HpResult, ApiError> {
    e.combatant(cid)
        .map(|c| HpResult {
            current_hp: c.current_hp(),
            health: c.health_state(),
        })
        .ok_or_else(|| missing(cid))
}

async fn damage(
    State(state): State<AppState>,
    Path((id, cid)): Path<(Uuid, u64)>,
    ApiJson(req): ApiJson<DamageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let cid = CombatantId(cid);
    let amount = non_negative(req.amount)?;
    let damage_type = req
        .damage_type
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty());
    act(&state, id, move |e| {
        let damage_type = damage_type.as_deref();
        let applied = match req.from_scale {
            Some(from) => e.apply_scaled_damage(cid, amount, from, damage_type),
            None => e.apply_typed_damage(
                cid,
                amount.round().min(u32::MAX as f64) as u32,
                damage_type,
            ),
        };
        applied.ok_or_else(|| missing(cid))?;
        hp_result(e, cid)
    })
    .await
}

#[derive(Debug, Deserialize)]
pub struct HealRequest {
    pub amount: i64,
}

#[derive(Debug, Serialize)]
struct HealResult {
    healed: u32,
    current_hp: u32,
    health: HealthState,
}

async fn heal(
    State(state): State<AppState>,
    Path((id, cid)): Path<(Uuid, u64)>,
    ApiJson(req): ApiJson<HealRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let cid = CombatantId(cid);
    if req.amount < 0 {
        return Err(ApiError::BadRequest("amount must not be negative".into()));
    }
    let amount = u32::try_from(req.amount).unwrap_or(u32::MAX);
    act(&state, id, move |e| {
        let healed = e.heal(cid, amount).ok_or_else(|| missing(cid))?;
        let hp = hp_result(e, cid)?;
        Ok(HealResult {
            healed,
            current_hp: hp.current_hp,
            health: hp.health,
        })
    })
    .await
}

#[derive(Debug, Deserialize)]
pub struct SetHpRequest {
    pub value: i64,
}

#[derive(Debug, Serialize)]
struct SetHpResult {
    change: i64,
    current_hp: u32,
    health: HealthState,
}

async fn set_hp(
    State(state): State<AppState>,
    Path((id, cid)): Path<(Uuid, u64)>,
    ApiJson(req): ApiJson<SetHpRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let cid = CombatantId(cid);
    act(&state, id, move |e| {
        let change = e.set_hp(cid, req.value).ok_or_else(|| missing(cid))?;
        let hp = hp_result(e, cid)?;
        Ok(SetHpResult {
            change,
            current_hp: hp.current_hp,
            health: hp.health,
        })
    })
    .await
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub tag: String,
}

#[derive(Debug, Serialize)]
struct StatusResult {
    changed: bool,
    status_effects: Vec<String>,
}

fn status_result(e: &EncounterState, cid: CombatantId, changed: bool) -> Result<StatusResult, ApiError> {
    e.combatant(cid)
        .map(|c| StatusResult {
            changed,
            status_effects: c.status_effects().to_vec(),
        })
        .ok_or_else(|| missing(cid))
}

async fn add_status(
    State(state): State<AppState>,
    Path((id, cid)): Path<(Uuid, u64)>,
    ApiJson(req): ApiJson<StatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let cid = CombatantId(cid);
    let tag = non_empty(&req.tag, "tag")?;
    act(&state, id, move |e| {
        let changed = e.add_status(cid, &tag);
        status_result(e, cid, changed)
    })
    .await
}

async fn remove_status(
    State(state): State<AppState>,
    Path((id, cid, tag)): Path<(Uuid, u64, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let cid = CombatantId(cid);
    act(&state, id, move |e| {
        let changed = e.remove_status(cid, &tag);
        status_result(e, cid, changed)
    })
    .await
}

async fn roll_initiative(
    State(state): State<AppState>,
    Path((id, cid)): Path<(Uuid, u64)>,
) -> Result<impl IntoResponse, ApiError> {
    let cid = CombatantId(cid);
    act(&state, id, move |e| {
        e.roll_initiative(cid)?.ok_or_else(|| missing(cid))
    })
    .await
}

#[derive(Debug, Deserialize)]
pub struct SetInitiativeRequest {
    pub value: Option<i32>,
}

async fn set_initiative(
    State(state): State<AppState>,
    Path((id, cid)): Path<(Uuid, u64)>,
    ApiJson(req): ApiJson<SetInitiativeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let cid = CombatantId(cid);
    act(&state, id, move |e| {
        if !e.set_initiative(cid, req.value)? {
            return Err(missing(cid));
        }
        Ok(req.value)
    })
    .await
}
