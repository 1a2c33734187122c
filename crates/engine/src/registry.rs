use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::catalog::MachineType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MachineId(pub u64);

impl fmt::Display for MachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One owned, placed machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineInstance {
    pub id: MachineId,
    #[serde(rename = "type")]
    pub machine_type: MachineType,
    pub level: u32,
    pub x: f64,
    pub y: f64,
    pub room: u32,
    /// 0 until the instance's NFT mint has been recorded.
    pub last_activated: u64,
}

/// The machines the player owns, in build order. Instances are never removed.
#[derive(Debug, Clone, PartialEq)]
pub struct MachineRegistry {
    machines: Vec<MachineInstance>,
    next_id: u64,
}

impl Default for MachineRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MachineRegistry {
    pub fn new() -> Self {
        Self {
            machines: Vec::new(),
            next_id: 1,
        }
    }

    /// Rebuilds a registry from already-normalized instances. An instance
    /// holding `u64::MAX` leaves no id for the next build.
    pub fn from_instances(machines: Vec<MachineInstance>) -> Self {
        let next_id = machines
            .iter()
            .map(|m| m.id.0)
            .max()
            .map_or(1, |max| max.saturating_add(1));
        Self { machines, next_id }
    }

    /// False once every id below `u64::MAX` has been handed out.
    pub fn has_free_id(&self) -> bool {
        self.next_id < u64::MAX
    }

    /// Callers check `has_free_id` first.
    pub(crate) fn insert(
        &mut self,
        machine_type: MachineType,
        x: f64,
        y: f64,
        room: u32,
    ) -> &MachineInstance {
        let id = MachineId(self.next_id);
        self.next_id = self.next_id.saturating_add(1);
        self.machines.push(MachineInstance {
            id,
            machine_type,
            level: 1,
            x,
            y,
            room,
            last_activated: 0,
        });
        &self.machines[self.machines.len() - 1]
    }

    pub fn get(&self, id: MachineId) -> Option<&MachineInstance> {
        self.machines.iter().find(|m| m.id == id)
    }

    pub(crate) fn get_mut(&mut self, id: MachineId) -> Option<&mut MachineInstance> {
        self.machines.iter_mut().find(|m| m.id == id)
    }

    pub fn as_slice(&self) -> &[MachineInstance] {
        &self.machines
    }

    pub fn len(&self) -> usize {
        self.machines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.machines.is_empty()
    }

    pub fn count_of(&self, machine_type: MachineType) -> usize {
        self.machines
            .iter()
            .filter(|m| m.machine_type == machine_type)
            .count()
    }

    pub fn highest_level_of(&self, machine_type: MachineType) -> Option<u32> {
        self.machines
            .iter()
            .filter(|m| m.machine_type == machine_type)
            .map(|m| m.level)
            .max()
    }

    /// Instances grouped by type, recomputed on every call.
    pub fn by_type(&self) -> BTreeMap<MachineType, Vec<&MachineInstance>> {
        let mut groups: BTreeMap<MachineType, Vec<&MachineInstance>> = BTreeMap::new();
        for m in &self.machines {
            groups.entry(m.machine_type).or_default().push(m);
        }
        groups
    }

    pub fn in_room(&self, room: u32) -> impl Iterator<Item = &MachineInstance> {
        self.machines.iter().filter(move |m| m.room == room)
    }
}
