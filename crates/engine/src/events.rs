use serde::{Deserialize, Serialize};

use crate::catalog::MachineType;
use crate::registry::MachineId;
use crate::resources::ResourceBundle;

/// Record of a committed state transition, appended to the store's event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineEvent {
    MachineBuilt {
        id: MachineId,
        machine_type: MachineType,
        x: f64,
        y: f64,
        room: u32,
        cost: ResourceBundle,
    },
    MachineUpgraded {
        id: MachineId,
        level: u32,
        cost: ResourceBundle,
    },
    MachineMoved {
        id: MachineId,
        x: f64,
        y: f64,
    },
    MintRecorded {
        id: MachineId,
        marker: u64,
    },
    RoomEntered {
        room: u32,
    },
    RoomUnlocked {
        rooms_unlocked: u32,
    },
    ResourcesCredited {
        income: ResourceBundle,
    },
    StateLoaded {
        machines: usize,
    },
}

impl EngineEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            EngineEvent::MachineBuilt { .. } => "machine.built",
            EngineEvent::MachineUpgraded { .. } => "machine.upgraded",
            EngineEvent::MachineMoved { .. } => "machine.moved",
            EngineEvent::MintRecorded { .. } => "machine.mint_recorded",
            EngineEvent::RoomEntered { .. } => "room.entered",
            EngineEvent::RoomUnlocked { .. } => "room.unlocked",
            EngineEvent::ResourcesCredited { .. } => "resources.credited",
            EngineEvent::StateLoaded { .. } => "state.loaded",
        }
    }

    pub fn machine_id(&self) -> Option<MachineId> {
        match self {
            EngineEvent::MachineBuilt { id, .. }
            | EngineEvent::MachineUpgraded { id, .. }
            | EngineEvent::MachineMoved { id, .. }
            | EngineEvent::MintRecorded { id, .. } => Some(*id),
            _ => None,
        }
    }
}
