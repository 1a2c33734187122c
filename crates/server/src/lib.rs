pub mod config;

#[cfg(test)]
mod tests;

use anyhow::Context;
use axum::extract::{Path, State};
use axum::http::{HeaderValue, StatusCode};
use axum::{
    routing::{get, post},
    Json, Router,
};
use corvax_lab_engine::{
    format_amount, BuildBlocker, Engine, EngineConfig, EngineError, EngineEvent, MachineId,
    MachineInstance, MachineType, MachineTypeDescriptor, MintStatus, ResourceBundle, ResourceKind,
    ResourceLedger, RoomState, Store,
};
use corvax_lab_protocol::{
    AffordRequest, AffordResponse, Amounts, BuildRequest, CreditRequest, ErrorBody, ErrorKind,
    MintOutcome, MoveRequest, Notification, RoomChange, RoomRequest,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

pub use config::{Cli, ServerConfig};

/// One player's live session. The engine sits behind a single lock so every
/// command runs check-then-act without interleaving.
pub struct AppState {
    session: Mutex<Engine>,
    store: Store,
    player_id: String,
}

impl AppState {
    /// Restores the player's saved state, or starts a fresh session.
    pub fn load(store: Store, player_id: impl Into<String>, config: EngineConfig) -> anyhow::Result<Self> {
        let player_id = player_id.into();
        let mut engine = Engine::new(config);
        match store
            .load_snapshot(&player_id)
            .with_context(|| format!("load saved state for {player_id}"))?
        {
            Some(snapshot) => {
                let report = engine.load_initial_state(snapshot);
                info!(
                    %player_id,
                    machines = engine.list_machines().len(),
                    clean = report.is_clean(),
                    "session restored"
                );
            }
            None => info!(%player_id, "no saved state, starting fresh"),
        }
        engine.drain_events();
        Ok(Self {
            session: Mutex::new(engine),
            store,
            player_id,
        })
    }

    fn session(&self) -> MutexGuard<'_, Engine> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drains committed events and writes them with the current state.
    fn persist(&self, engine: &mut Engine) {
        let events = engine.drain_events();
        if events.is_empty() {
            return;
        }
        self.persist_with(engine, &events);
    }

    /// Writes the current snapshot with `events`. Failures are logged and the
    /// in-memory state is kept.
    fn persist_with(&self, engine: &Engine, events: &[EngineEvent]) {
        if let Err(e) = self
            .store
            .save_snapshot(&self.player_id, &engine.snapshot(), events)
        {
            warn!(player_id = %self.player_id, error = %format!("{e:#}"), "persist failed");
        }
    }
}

type ApiError = (StatusCode, Json<ErrorBody>);
type ApiResult<T> = Result<Json<T>, ApiError>;

fn engine_error(err: EngineError) -> ApiError {
    let (status, kind) = match &err {
        EngineError::NotFound(_) => (StatusCode::NOT_FOUND, ErrorKind::NotFound),
        EngineError::InsufficientResources { .. } => {
            (StatusCode::CONFLICT, ErrorKind::InsufficientResources)
        }
        EngineError::BuildNotAllowed { .. } => (StatusCode::CONFLICT, ErrorKind::BuildNotAllowed),
        EngineError::MaxLevelReached { .. } => (StatusCode::CONFLICT, ErrorKind::MaxLevelReached),
    };
    let mut body = ErrorBody::new(kind, err.to_string());
    if let EngineError::InsufficientResources { missing } = &err {
        body.missing = Some(amounts_from(missing));
    }
    (status, Json(body))
}

fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody::new(ErrorKind::BadRequest, message)),
    )
}

fn internal(err: anyhow::Error) -> ApiError {
    warn!(error = %format!("{err:#}"), "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody::new(ErrorKind::Internal, "internal error")),
    )
}

fn bundle_from(amounts: &Amounts) -> Result<ResourceBundle, ApiError> {
    amounts
        .iter()
        .map(|(key, amount)| {
            ResourceKind::parse(key)
                .map(|kind| (kind, *amount))
                .ok_or_else(|| bad_request(format!("unknown resource: {key}")))
        })
        .collect()
}

fn amounts_from(bundle: &ResourceBundle) -> Amounts {
    bundle
        .iter()
        .map(|(kind, amount)| (kind.as_str().to_string(), amount))
        .collect()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineView {
    #[serde(flatten)]
    pub machine: MachineInstance,
    pub name: &'static str,
    pub icon: &'static str,
    pub base_color: &'static str,
    pub max_level: u32,
    pub can_upgrade: bool,
    pub upgrade_cost: Option<ResourceBundle>,
    pub upgrade_label: Option<String>,
    pub upgrade_affordable: bool,
    pub mint: MintStatus,
}

fn machine_view(engine: &Engine, m: &MachineInstance) -> MachineView {
    let d = engine.catalog().descriptor(m.machine_type);
    let upgrade_cost = engine.upgrade_cost(m.id);
    MachineView {
        machine: m.clone(),
        name: d.name,
        icon: d.icon,
        base_color: d.base_color,
        max_level: d.max_level,
        can_upgrade: engine.can_upgrade_machine(m.id),
        upgrade_label: upgrade_cost.as_ref().map(ToString::to_string),
        upgrade_affordable: upgrade_cost.as_ref().is_some_and(|c| engine.can_afford(c)),
        upgrade_cost,
        mint: engine.mint_status(m.id).unwrap_or(MintStatus::NotEligible),
    }
}

fn committed_view(engine: &Engine, id: MachineId) -> ApiResult<MachineView> {
    let m = engine
        .machine(id)
        .ok_or(EngineError::NotFound(id))
        .map_err(engine_error)?;
    Ok(Json(machine_view(engine, m)))
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    #[serde(rename = "type")]
    pub machine_type: MachineType,
    pub name: &'static str,
    pub icon: &'static str,
    pub base_color: &'static str,
    pub max_level: u32,
    pub levelable: bool,
    pub mint_eligible: bool,
    pub owned: usize,
    pub cost: ResourceBundle,
    pub cost_label: String,
    pub affordable: bool,
    pub can_build: bool,
    pub blockers: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<&'static str>,
}

fn catalog_entry(engine: &Engine, d: &MachineTypeDescriptor) -> CatalogEntry {
    let cost = engine.calculate_machine_cost(d.machine);
    let blockers = engine.build_blockers(d.machine);
    CatalogEntry {
        machine_type: d.machine,
        name: d.name,
        icon: d.icon,
        base_color: d.base_color,
        max_level: d.max_level,
        levelable: d.levelable(),
        mint_eligible: d.mint_eligible,
        owned: engine
            .list_machines()
            .iter()
            .filter(|m| m.machine_type == d.machine)
            .count(),
        cost_label: cost.to_string(),
        affordable: engine.can_afford(&cost),
        can_build: blockers.is_empty(),
        note: blockers.iter().find_map(|b| match b {
            BuildBlocker::Unmet { note, .. } => Some(*note),
            BuildBlocker::IdsExhausted | BuildBlocker::CeilingReached { .. } => None,
        }),
        blockers: blockers.iter().map(ToString::to_string).collect(),
        cost,
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcesView {
    pub amounts: ResourceLedger,
    pub display: BTreeMap<&'static str, String>,
}

fn resources_view(ledger: &ResourceLedger) -> ResourcesView {
    ResourcesView {
        amounts: *ledger,
        display: ResourceKind::ALL
            .into_iter()
            .map(|k| (k.as_str(), format_amount(ledger.get(k))))
            .collect(),
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomsView {
    #[serde(flatten)]
    pub rooms: RoomState,
    /// Machines placed in the current room.
    pub machines: Vec<MachineId>,
}

fn rooms_view(engine: &Engine) -> RoomsView {
    let rooms = engine.get_room_state();
    RoomsView {
        machines: engine
            .machines_in_room(rooms.current_room())
            .into_iter()
            .map(|m| m.id)
            .collect(),
        rooms,
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateView {
    pub rev: i64,
    pub resources: ResourcesView,
    pub machines: Vec<MachineView>,
    pub rooms: RoomsView,
}

pub fn build_router(state: AppState, allowed_origins: Vec<String>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/state", get(api_state))
        .route("/api/resources", get(api_resources))
        .route("/api/resources/credit", post(api_credit))
        .route("/api/afford", post(api_afford))
        .route("/api/catalog", get(api_catalog))
        .route("/api/machines", get(api_machines).post(api_build))
        .route("/api/machines/by-type", get(api_machines_by_type))
        .route("/api/machines/{id}/upgrade", post(api_upgrade))
        .route("/api/machines/{id}/move", post(api_move))
        .route("/api/machines/{id}/mint", post(api_mint))
        .route("/api/rooms", get(api_rooms))
        .route("/api/rooms/current", post(api_set_room))
        .route("/api/rooms/unlock", post(api_unlock_room))
        .route("/api/rooms/acknowledge", post(api_acknowledge_room))
        .with_state(Arc::new(state))
        // Configured origins only, never `*`.
        .layer(local_only_cors(allowed_origins))
}

async fn health() -> &'static str {
    "ok"
}

async fn api_state(State(state): State<Arc<AppState>>) -> ApiResult<StateView> {
    let engine = state.session();
    let rev = state.store.get_rev(&state.player_id).map_err(internal)?;
    Ok(Json(StateView {
        rev,
        resources: resources_view(engine.get_resources()),
        machines: engine
            .list_machines()
            .iter()
            .map(|m| machine_view(&engine, m))
            .collect(),
        rooms: rooms_view(&engine),
    }))
}

async fn api_resources(State(state): State<Arc<AppState>>) -> Json<ResourcesView> {
    let engine = state.session();
    Json(resources_view(engine.get_resources()))
}

async fn api_credit(
    State(state): State<Arc<AppState>>,
    Json(input): Json<CreditRequest>,
) -> ApiResult<ResourcesView> {
    let income = bundle_from(&input.income)?;
    let mut engine = state.session();
    engine.credit(&income);
    let view = resources_view(engine.get_resources());
    state.persist(&mut engine);
    Ok(Json(view))
}

async fn api_afford(
    State(state): State<Arc<AppState>>,
    Json(input): Json<AffordRequest>,
) -> ApiResult<AffordResponse> {
    let cost = bundle_from(&input.cost)?;
    let engine = state.session();
    Ok(Json(AffordResponse {
        affordable: engine.can_afford(&cost),
    }))
}

async fn api_catalog(State(state): State<Arc<AppState>>) -> Json<Vec<CatalogEntry>> {
    let engine = state.session();
    Json(
        engine
            .catalog()
            .descriptors()
            .iter()
            .map(|d| catalog_entry(&engine, d))
            .collect(),
    )
}

async fn api_machines(State(state): State<Arc<AppState>>) -> Json<Vec<MachineView>> {
    let engine = state.session();
    Json(
        engine
            .list_machines()
            .iter()
            .map(|m| machine_view(&engine, m))
            .collect(),
    )
}

async fn api_machines_by_type(
    State(state): State<Arc<AppState>>,
) -> Json<BTreeMap<MachineType, Vec<MachineView>>> {
    let engine = state.session();
    Json(
        engine
            .machines_by_type()
            .into_iter()
            .map(|(t, ms)| (t, ms.into_iter().map(|m| machine_view(&engine, m)).collect()))
            .collect(),
    )
}

async fn api_build(
    State(state): State<Arc<AppState>>,
    Json(input): Json<BuildRequest>,
) -> ApiResult<MachineView> {
    let machine = input
        .machine_type
        .parse::<MachineType>()
        .map_err(|e| bad_request(e.to_string()))?;
    if !input.x.is_finite() || !input.y.is_finite() {
        return Err(bad_request("position must be finite"));
    }

    let mut engine = state.session();
    let built = engine
        .build_machine(machine, input.x, input.y)
        .map_err(engine_error)?;
    let view = machine_view(&engine, &built);
    state.persist(&mut engine);
    Ok(Json(view))
}

async fn api_upgrade(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> ApiResult<MachineView> {
    let mut engine = state.session();
    let upgraded = engine
        .upgrade_machine(MachineId(id))
        .map_err(engine_error)?;
    let view = machine_view(&engine, &upgraded);
    state.persist(&mut engine);
    Ok(Json(view))
}

async fn api_move(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Json(input): Json<MoveRequest>,
) -> ApiResult<MachineView> {
    if !input.x.is_finite() || !input.y.is_finite() {
        return Err(bad_request("position must be finite"));
    }
    let id = MachineId(id);
    let mut engine = state.session();
    engine
        .move_machine(id, input.x, input.y)
        .map_err(engine_error)?;
    let view = committed_view(&engine, id)?;
    state.persist(&mut engine);
    Ok(view)
}

/// Wallet gating happens client-side before this is called.
async fn api_mint(State(state): State<Arc<AppState>>, Path(id): Path<u64>) -> Json<MintOutcome> {
    let mut engine = state.session();
    let minted = engine.trigger_mint_if_eligible(MachineId(id));
    state.persist(&mut engine);
    Json(MintOutcome { minted })
}

async fn api_rooms(State(state): State<Arc<AppState>>) -> Json<RoomsView> {
    let engine = state.session();
    Json(rooms_view(&engine))
}

fn room_change(engine: &Engine, changed: bool, notification: Option<Notification>) -> RoomChange {
    let rooms = engine.get_room_state();
    RoomChange {
        changed,
        current_room: rooms.current_room(),
        rooms_unlocked: rooms.rooms_unlocked(),
        notification: notification.filter(|_| changed),
    }
}

async fn api_set_room(
    State(state): State<Arc<AppState>>,
    Json(input): Json<RoomRequest>,
) -> Json<RoomChange> {
    let mut engine = state.session();
    let changed = engine.set_current_room(input.room);
    let change = room_change(&engine, changed, Some(Notification::entered_room(input.room)));
    state.persist(&mut engine);
    Json(change)
}

async fn api_unlock_room(State(state): State<Arc<AppState>>) -> Json<RoomChange> {
    let mut engine = state.session();
    let changed = engine.unlock_next_room();
    let unlocked = engine.get_room_state().rooms_unlocked();
    let change = room_change(&engine, changed, Some(Notification::room_unlocked(unlocked)));
    state.persist(&mut engine);
    Json(change)
}

async fn api_acknowledge_room(State(state): State<Arc<AppState>>) -> Json<RoomsView> {
    let mut engine = state.session();
    let was_seen = engine.get_room_state().unlock_seen();
    engine.acknowledge_room_unlock();
    let view = rooms_view(&engine);
    if !was_seen {
        // Acknowledging emits no event; write the flag directly.
        state.persist_with(&engine, &[]);
    }
    Json(view)
}

pub async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("bind {}", config.bind))?;
    serve_listener(listener, config, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await?;
    Ok(())
}

pub async fn serve_listener(
    listener: tokio::net::TcpListener,
    config: ServerConfig,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<SocketAddr> {
    let store = Store::new(config.db_path.clone());
    store.open().context("open database")?;
    let state = AppState::load(store, config.player_id.clone(), config.engine.clone())?;
    let app = build_router(state, config.allowed_origins.clone());
    let addr = listener.local_addr()?;
    info!(%addr, db = %config.db_path.display(), player_id = %config.player_id, "corvax lab server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(addr)
}

fn local_only_cors(allowed_origins: Vec<String>) -> CorsLayer {
    use axum::http::header;
    use axum::http::Method;

    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _req| {
            origin_allowed(origin, &allowed_origins)
        }))
}

fn origin_allowed(origin: &HeaderValue, allowed: &[String]) -> bool {
    let Ok(origin) = origin.to_str() else {
        return false;
    };
    allowed.iter().any(|entry| match origin.strip_prefix(entry.as_str()) {
        // Origin is the entry itself or the entry plus a port.
        Some(rest) => rest.is_empty() || (rest.starts_with(':') && !has_port(entry)),
        None => false,
    })
}

fn has_port(entry: &str) -> bool {
    let host = entry.split_once("://").map_or(entry, |(_, rest)| rest);
    host.rsplit_once(':')
        .is_some_and(|(_, port)| !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()))
}
