//! Externally sourced session state and its normalization on load.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::catalog::{Catalog, MachineType};
use crate::registry::{MachineId, MachineInstance, MachineRegistry};
use crate::resources::ResourceLedger;
use crate::rooms::RoomState;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GameSnapshot {
    pub resources: ResourceLedger,
    pub machines: Vec<MachineRecord>,
    pub rooms: RoomState,
}

/// A machine as persisted. The type stays a string; unknown types are
/// dropped by normalization instead of failing the whole load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineRecord {
    pub id: u64,
    #[serde(rename = "type")]
    pub machine_type: String,
    #[serde(default = "first")]
    pub level: u32,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default = "first")]
    pub room: u32,
    #[serde(default)]
    pub last_activated: u64,
}

fn first() -> u32 {
    1
}

impl From<&MachineInstance> for MachineRecord {
    fn from(m: &MachineInstance) -> Self {
        Self {
            id: m.id.0,
            machine_type: m.machine_type.as_str().to_string(),
            level: m.level,
            x: m.x,
            y: m.y,
            room: m.room,
            last_activated: m.last_activated,
        }
    }
}

/// What normalization had to change while loading a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub clamped_resources: usize,
    pub unknown_types: Vec<String>,
    pub duplicate_ids: usize,
    /// Records dropped because their id leaves nothing for the next build.
    pub exhausted_ids: usize,
    pub adjusted_machines: usize,
    pub rooms_adjusted: bool,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.clamped_resources == 0
            && self.unknown_types.is_empty()
            && self.duplicate_ids == 0
            && self.exhausted_ids == 0
            && self.adjusted_machines == 0
            && !self.rooms_adjusted
    }
}

pub(crate) struct Normalized {
    pub ledger: ResourceLedger,
    pub registry: MachineRegistry,
    pub rooms: RoomState,
    pub report: LoadReport,
}

/// Clamps negative resources and puts the current room back in range.
/// Machines of unknown type, with a repeated id, or with id `u64::MAX` are
/// dropped; levels are pulled into `1..=max_level` and rooms into the
/// unlocked range.
pub(crate) fn normalize(snapshot: GameSnapshot, catalog: &Catalog) -> Normalized {
    let mut report = LoadReport::default();

    let mut ledger = snapshot.resources;
    report.clamped_resources = ledger.normalize();

    let mut rooms = snapshot.rooms;
    report.rooms_adjusted = rooms.normalize();

    let mut seen = BTreeSet::new();
    let mut machines = Vec::with_capacity(snapshot.machines.len());
    for record in snapshot.machines {
        let Ok(machine_type) = record.machine_type.parse::<MachineType>() else {
            report.unknown_types.push(record.machine_type);
            continue;
        };
        if record.id.checked_add(1).is_none() {
            report.exhausted_ids += 1;
            continue;
        }
        if !seen.insert(record.id) {
            report.duplicate_ids += 1;
            continue;
        }

        let level = record.level.clamp(1, catalog.max_level(machine_type));
        let room = record.room.clamp(1, rooms.rooms_unlocked());
        let x = if record.x.is_finite() { record.x } else { 0.0 };
        let y = if record.y.is_finite() { record.y } else { 0.0 };
        if level != record.level || room != record.room || x != record.x || y != record.y {
            report.adjusted_machines += 1;
        }

        machines.push(MachineInstance {
            id: MachineId(record.id),
            machine_type,
            level,
            x,
            y,
            room,
            last_activated: record.last_activated,
        });
    }

    Normalized {
        ledger,
        registry: MachineRegistry::from_instances(machines),
        rooms,
        report,
    }
}
