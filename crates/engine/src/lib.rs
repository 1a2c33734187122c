//! Corvax Lab machine economy: resources, machine construction and upgrades,
//! room progression and one-shot NFT mint rights.
//!
//! [`Engine`] owns the whole session state. Callers hold the engine (or a
//! lock around it) and go through its query/command methods; each command
//! runs check-then-act against the state in one step, so a repeated intent can
//! never spend resources twice or mint twice.

pub mod catalog;
pub mod config;
mod error;
pub mod events;
pub mod gate;
pub mod mint;
pub mod registry;
pub mod resources;
pub mod rooms;
pub mod snapshot;
pub mod store;


use std::collections::BTreeMap;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

pub use catalog::{Catalog, MachineType, MachineTypeDescriptor};
pub use config::EngineConfig;
pub use error::EngineError;
pub use events::EngineEvent;
pub use gate::{BuildBlocker, ProgressionGate};
pub use mint::MintStatus;
pub use registry::{MachineId, MachineInstance, MachineRegistry};
pub use resources::{format_amount, ResourceBundle, ResourceKind, ResourceLedger};
pub use rooms::RoomState;
pub use snapshot::{GameSnapshot, LoadReport, MachineRecord};
pub use store::Store;

pub(crate) fn now_ms() -> i64 {
    let ms = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    i64::try_from(ms).unwrap_or(i64::MAX)
}

#[derive(Debug, Clone)]
pub struct Engine {
    catalog: Catalog,
    config: EngineConfig,
    ledger: ResourceLedger,
    registry: MachineRegistry,
    rooms: RoomState,
    events: Vec<EngineEvent>,
}

impl Engine {
    /// A brand-new player: starting resources, no machines, room 1.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_catalog(Catalog::default(), config)
    }

    pub fn with_catalog(catalog: Catalog, config: EngineConfig) -> Self {
        let mut ledger = config.starting_resources;
        ledger.normalize();
        Self {
            catalog,
            config,
            ledger,
            registry: MachineRegistry::new(),
            rooms: RoomState::default(),
            events: Vec::new(),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn gate(&self) -> ProgressionGate<'_> {
        ProgressionGate::new(&self.catalog, &self.config.build_ceilings)
    }

    /// Replaces the session state with an externally sourced snapshot.
    /// Only the engine invariants are enforced; see [`LoadReport`].
    pub fn load_initial_state(&mut self, snapshot: GameSnapshot) -> LoadReport {
        let normalized = snapshot::normalize(snapshot, &self.catalog);
        let report = normalized.report;
        if !report.is_clean() {
            warn!(
                clamped_resources = report.clamped_resources,
                unknown_types = ?report.unknown_types,
                duplicate_ids = report.duplicate_ids,
                exhausted_ids = report.exhausted_ids,
                adjusted_machines = report.adjusted_machines,
                rooms_adjusted = report.rooms_adjusted,
                "snapshot normalized on load"
            );
        }
        self.ledger = normalized.ledger;
        self.registry = normalized.registry;
        self.rooms = normalized.rooms;
        self.events.push(EngineEvent::StateLoaded {
            machines: self.registry.len(),
        });
        report
    }

    /// Current state in the shape accepted by [`Engine::load_initial_state`].
    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            resources: self.ledger,
            machines: self
                .registry
                .as_slice()
                .iter()
                .map(MachineRecord::from)
                .collect(),
            rooms: self.rooms,
        }
    }

    /// Hands over the events committed since the last call.
    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn get_resources(&self) -> &ResourceLedger {
        &self.ledger
    }

    pub fn list_machines(&self) -> &[MachineInstance] {
        self.registry.as_slice()
    }

    pub fn machine(&self, id: MachineId) -> Option<&MachineInstance> {
        self.registry.get(id)
    }

    pub fn machines_by_type(&self) -> BTreeMap<MachineType, Vec<&MachineInstance>> {
        self.registry.by_type()
    }

    pub fn machines_in_room(&self, room: u32) -> Vec<&MachineInstance> {
        self.registry.in_room(room).collect()
    }

    pub fn get_room_state(&self) -> RoomState {
        self.rooms
    }

    pub fn calculate_machine_cost(&self, machine: MachineType) -> ResourceBundle {
        self.catalog
            .cost_of(machine, self.registry.count_of(machine))
    }

    pub fn can_build_machine(&self, machine: MachineType) -> bool {
        self.gate().can_build(machine, &self.registry)
    }

    pub fn build_blockers(&self, machine: MachineType) -> Vec<BuildBlocker> {
        self.gate().blockers(machine, &self.registry)
    }

    pub fn can_afford(&self, cost: &ResourceBundle) -> bool {
        self.ledger.affordable(cost)
    }

    pub fn can_upgrade_machine(&self, id: MachineId) -> bool {
        self.registry
            .get(id)
            .is_some_and(|m| self.gate().can_upgrade(m))
    }

    /// Cost of the next level; `None` for unknown ids or machines at their cap.
    pub fn upgrade_cost(&self, id: MachineId) -> Option<ResourceBundle> {
        let m = self.registry.get(id)?;
        self.catalog.upgrade_cost(m.machine_type, m.level)
    }

    pub fn mint_status(&self, id: MachineId) -> Option<MintStatus> {
        self.registry
            .get(id)
            .map(|m| mint::mint_status(&self.catalog, m))
    }

    /// Builds a machine in the current room. Eligibility is checked before
    /// affordability; on any error nothing is deducted and nothing is inserted.
    pub fn build_machine(
        &mut self,
        machine: MachineType,
        x: f64,
        y: f64,
    ) -> Result<MachineInstance, EngineError> {
        if !self.can_build_machine(machine) {
            debug!(%machine, "build rejected by progression gate");
            return Err(EngineError::BuildNotAllowed { machine });
        }
        let cost = self.calculate_machine_cost(machine);
        self.ledger.deduct(&cost)?;

        let room = self.rooms.current_room();
        let instance = self.registry.insert(machine, x, y, room).clone();
        debug!(id = %instance.id, %machine, room, %cost, "machine built");
        self.events.push(EngineEvent::MachineBuilt {
            id: instance.id,
            machine_type: machine,
            x,
            y,
            room,
            cost,
        });
        Ok(instance)
    }

    pub fn upgrade_machine(&mut self, id: MachineId) -> Result<MachineInstance, EngineError> {
        let catalog = self.catalog;
        let instance = self
            .registry
            .get_mut(id)
            .ok_or(EngineError::NotFound(id))?;
        let cost = catalog
            .upgrade_cost(instance.machine_type, instance.level)
            .ok_or(EngineError::MaxLevelReached {
                id,
                level: instance.level,
            })?;
        self.ledger.deduct(&cost)?;

        instance.level += 1;
        let upgraded = instance.clone();
        debug!(%id, level = upgraded.level, %cost, "machine upgraded");
        self.events.push(EngineEvent::MachineUpgraded {
            id,
            level: upgraded.level,
            cost,
        });
        Ok(upgraded)
    }

    pub fn move_machine(&mut self, id: MachineId, x: f64, y: f64) -> Result<(), EngineError> {
        let instance = self
            .registry
            .get_mut(id)
            .ok_or(EngineError::NotFound(id))?;
        instance.x = x;
        instance.y = y;
        self.events.push(EngineEvent::MachineMoved { id, x, y });
        Ok(())
    }

    /// Consumes the instance's one-shot mint right. True exactly once per
    /// mint-eligible instance; false for repeats, unknown ids and types
    /// without a mint right. Wallet gating is the caller's job.
    pub fn trigger_mint_if_eligible(&mut self, id: MachineId) -> bool {
        let catalog = self.catalog;
        let Some(instance) = self.registry.get_mut(id) else {
            debug!(%id, "mint requested for unknown machine");
            return false;
        };
        let marker = u64::try_from(now_ms()).unwrap_or(1);
        if !mint::consume(&catalog, instance, marker) {
            return false;
        }
        let marker = instance.last_activated;
        info!(%id, marker, "mint recorded");
        self.events.push(EngineEvent::MintRecorded { id, marker });
        true
    }

    /// Switches to an unlocked room. False (and no change) for the current
    /// room or a room that is not unlocked.
    pub fn set_current_room(&mut self, room: u32) -> bool {
        if !self.rooms.navigate_to(room) {
            return false;
        }
        self.events.push(EngineEvent::RoomEntered { room });
        true
    }

    pub fn unlock_next_room(&mut self) -> bool {
        if !self.rooms.unlock_next(self.config.max_rooms) {
            debug!(max_rooms = ?self.config.max_rooms, "no room left to unlock");
            return false;
        }
        let rooms_unlocked = self.rooms.rooms_unlocked();
        info!(rooms_unlocked, "room unlocked");
        self.events.push(EngineEvent::RoomUnlocked { rooms_unlocked });
        true
    }

    pub fn acknowledge_room_unlock(&mut self) {
        self.rooms.acknowledge_unlock();
    }

    /// Production income from outside the engine.
    pub fn credit(&mut self, income: &ResourceBundle) {
        self.ledger.credit(income);
        self.events.push(EngineEvent::ResourcesCredited {
            income: income.clone(),
        });
    }
}
